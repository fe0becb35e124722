//! Requests the control plane itself answers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use switchyard_envelope::{ConnectionId, DomainName, Handler, HandlerError, HandlerTable, RequestContext};

use crate::registry::DomainRegistry;

pub const REGISTER_REQUEST: &str = "register_request";
pub const PING_REQUEST: &str = "ping_request";

/// Body of the `register_response` a worker receives.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterAck {
    domain: DomainName,
    connection_id: Option<ConnectionId>,
}

/// Acknowledges a worker's registration.
///
/// The dispatch loop has already registered the channel by the time this
/// runs; the reply only reports what the registry holds.
struct RegisterHandler {
    registry: Arc<DomainRegistry>,
}

#[async_trait]
impl Handler for RegisterHandler {
    async fn handle(&self, ctx: &RequestContext, _payload: &str) -> Result<String, HandlerError> {
        let ack = RegisterAck {
            domain: ctx.domain.clone(),
            connection_id: self
                .registry
                .lookup(ctx.domain.as_str())
                .map(|channel| channel.connection_id()),
        };
        Ok(serde_json::to_string(&ack)?)
    }
}

/// Builds the control plane's own handler table.
pub fn builtin_handlers(registry: Arc<DomainRegistry>) -> HandlerTable {
    let mut table = HandlerTable::new();
    table
        .register(REGISTER_REQUEST, RegisterHandler { registry })
        .register_fn(PING_REQUEST, |_ctx, _payload| async { Ok("pong".to_string()) });
    table
}
