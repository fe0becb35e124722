//! Handler table: the seam between the dispatch loop and business logic.
//!
//! The dispatch loop only needs "look up by type, invoke, get a payload or an
//! error back". Everything a handler reports, including a panic, is turned
//! into a well-formed [`Response`].

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use switchyard_id::{DomainName, RequestId};
use tracing::{debug, error, warn};

use crate::error::HandlerError;
use crate::frame::{Request, Response};

/// Metadata about the request being handled.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub domain: DomainName,
    pub request_id: RequestId,
    pub message_type: String,
}

impl From<&Request> for RequestContext {
    fn from(request: &Request) -> Self {
        Self {
            domain: request.domain.clone(),
            request_id: request.request_id.clone(),
            message_type: request.message_type.clone(),
        }
    }
}

/// A business-logic handler for one message type.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles a request payload and returns the response payload.
    async fn handle(&self, ctx: &RequestContext, payload: &str) -> Result<String, HandlerError>;
}

/// Adapter turning an async closure into a [`Handler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: &RequestContext, payload: &str) -> Result<String, HandlerError> {
        (self.0)(ctx.clone(), payload.to_owned()).await
    }
}

/// Message type to handler lookup table.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the same type.
    pub fn register(&mut self, message_type: impl Into<String>, handler: impl Handler) -> &mut Self {
        self.handlers.insert(message_type.into(), Arc::new(handler));
        self
    }

    /// Registers an async closure as a handler.
    pub fn register_fn<F, Fut>(&mut self, message_type: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(RequestContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, HandlerError>> + Send + 'static,
    {
        self.register(message_type, FnHandler(f))
    }

    /// Returns true if a handler exists for `message_type`.
    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Returns the registered message types, sorted.
    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Invokes the handler for `request` and builds its response.
    ///
    /// Never fails: unknown types, handler errors, and handler panics all
    /// come back as `success=false` responses carrying the same request ID.
    pub async fn dispatch(&self, request: &Request) -> Response {
        let Some(handler) = self.handlers.get(&request.message_type) else {
            warn!(
                domain = %request.domain,
                request_id = %request.request_id,
                message_type = %request.message_type,
                "No handler registered for message type"
            );
            return request.fail(format!(
                "no handler registered for type {}",
                request.message_type
            ));
        };

        let ctx = RequestContext::from(request);
        let outcome = AssertUnwindSafe(handler.handle(&ctx, &request.payload))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(payload)) => {
                debug!(
                    domain = %request.domain,
                    request_id = %request.request_id,
                    message_type = %request.message_type,
                    "Handler succeeded"
                );
                request.reply(payload)
            }
            Ok(Err(e)) => {
                debug!(
                    domain = %request.domain,
                    request_id = %request.request_id,
                    message_type = %request.message_type,
                    error = %e,
                    "Handler returned error"
                );
                request.fail(e.to_string())
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(
                    domain = %request.domain,
                    request_id = %request.request_id,
                    message_type = %request.message_type,
                    panic = %detail,
                    "Handler panicked"
                );
                request.fail(format!("handler panicked: {detail}"))
            }
        }
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("message_types", &self.message_types())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
