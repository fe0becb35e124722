//! Outbound call path: send a request to a domain and wait for its response.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use switchyard_envelope::{MessageEnvelope, RequestId, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlator::Correlator;
use crate::error::CallError;
use crate::registry::{DomainRegistry, EnqueueError};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the correlator's default deadline.
    pub timeout: Option<Duration>,
    /// Caller-chosen correlation token; generated when absent.
    pub request_id: Option<RequestId>,
    /// Aborts the wait when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What a domain answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResponse {
    /// Treats a `success=false` response as an error.
    pub fn into_result(self) -> Result<String, CallError> {
        if self.success {
            Ok(self.payload)
        } else {
            Err(CallError::Handler {
                message: self.error.unwrap_or_else(|| "unspecified handler error".to_string()),
            })
        }
    }
}

impl From<Response> for CallResponse {
    fn from(response: Response) -> Self {
        Self {
            message_type: response.message_type,
            payload: response.payload,
            success: response.success,
            error: response.error,
        }
    }
}

/// Removes a pending entry if the call future is dropped mid-wait.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    request_id: RequestId,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.correlator.cancel(
                &self.request_id,
                CallError::Cancelled {
                    request_id: self.request_id.clone(),
                },
            );
        }
    }
}

/// Issues requests to connected domains.
#[derive(Clone)]
pub struct DomainClient {
    registry: Arc<DomainRegistry>,
    correlator: Arc<Correlator>,
}

impl DomainClient {
    pub fn new(registry: Arc<DomainRegistry>, correlator: Arc<Correlator>) -> Self {
        Self {
            registry,
            correlator,
        }
    }

    /// Sends `message_type` with `payload` to `domain` and waits for the reply.
    ///
    /// The domain's business errors arrive as `success=false` responses, not
    /// as `Err`.
    pub async fn call(
        &self,
        domain: &str,
        message_type: &str,
        payload: impl Into<String>,
        options: CallOptions,
    ) -> Result<CallResponse, CallError> {
        let channel = self
            .registry
            .lookup(domain)
            .ok_or_else(|| CallError::NotConnected {
                domain: domain.to_string(),
            })?;

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.correlator.default_timeout());

        let (request_id, handle) = match options.request_id {
            Some(request_id) => {
                let handle = self.correlator.create_with_id(
                    request_id.clone(),
                    channel.name().clone(),
                    channel.connection_id(),
                    Some(timeout),
                )?;
                (request_id, handle)
            }
            None => self.correlator.create(
                channel.name().clone(),
                channel.connection_id(),
                Some(timeout),
            ),
        };

        let mut guard = PendingGuard {
            correlator: self.correlator.as_ref(),
            request_id: request_id.clone(),
            armed: true,
        };

        let envelope = MessageEnvelope::request(
            channel.name().clone(),
            message_type,
            payload,
            request_id.clone(),
        );

        if let Err(e) = channel.try_send(envelope) {
            guard.disarm();
            self.correlator.cancel(
                &request_id,
                CallError::TransportSendFailure {
                    domain: domain.to_string(),
                    reason: e.to_string(),
                },
            );
            if e == EnqueueError::Closed {
                warn!(domain = %domain, request_id = %request_id, "Domain channel closed");
            }
            return Err(CallError::TransportSendFailure {
                domain: domain.to_string(),
                reason: e.to_string(),
            });
        }
        drop(channel);

        debug!(
            domain = %domain,
            request_id = %request_id,
            message_type = %message_type,
            timeout_ms = timeout.as_millis() as u64,
            "Request sent"
        );

        let cancel = options.cancel.unwrap_or_default();

        let outcome = tokio::select! {
            outcome = handle => outcome,
            _ = tokio::time::sleep(timeout) => {
                self.correlator.cancel(&request_id, CallError::Timeout { request_id: request_id.clone() });
                Err(CallError::Timeout { request_id: request_id.clone() })
            }
            _ = cancel.cancelled() => {
                self.correlator.cancel(&request_id, CallError::Cancelled { request_id: request_id.clone() });
                Err(CallError::Cancelled { request_id: request_id.clone() })
            }
        };
        guard.disarm();

        outcome.map(CallResponse::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_envelope::{ConnectionId, DomainName};
    use tokio::sync::mpsc;

    use crate::registry::DomainChannel;

    fn setup(capacity: usize) -> (DomainClient, Arc<Correlator>, mpsc::Receiver<MessageEnvelope>, ConnectionId) {
        let registry = Arc::new(DomainRegistry::new());
        let correlator = Arc::new(Correlator::default());
        let (tx, rx) = mpsc::channel(capacity);
        let connection_id = ConnectionId::new();
        registry.register(DomainChannel::new(
            DomainName::new("users").unwrap(),
            connection_id,
            tx,
        ));
        (
            DomainClient::new(registry, Arc::clone(&correlator)),
            correlator,
            rx,
            connection_id,
        )
    }

    #[tokio::test]
    async fn test_not_connected_fails_fast() {
        let (client, correlator, _rx, _) = setup(1);
        let err = client
            .call("orders", "order_index_request", "", CallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NotConnected { .. }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_resolves_with_response() {
        let (client, correlator, mut rx, connection_id) = setup(4);

        let responder = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move {
                let envelope = rx.recv().await.unwrap();
                correlator.complete(
                    connection_id,
                    Response {
                        domain: envelope.domain,
                        message_type: "user_index_response".to_string(),
                        payload: "[]".to_string(),
                        request_id: envelope.request_id,
                        success: true,
                        error: None,
                    },
                );
            })
        };

        let response = client
            .call("users", "user_index_request", "{}", CallOptions::new())
            .await
            .unwrap();
        responder.await.unwrap();

        assert_eq!(response.payload, "[]");
        assert_eq!(response.clone().into_result().unwrap(), "[]");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_is_send_failure() {
        let (client, correlator, _rx, _) = setup(1);
        let options = || CallOptions::new().timeout(Duration::from_millis(10));

        let _ = client.call("users", "a_request", "", options()).await;
        let err = client
            .call("users", "b_request", "", options())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::TransportSendFailure { .. }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let (client, correlator, _rx, _) = setup(4);
        let err = client
            .call(
                "users",
                "slow_request",
                "",
                CallOptions::new().timeout(Duration::from_secs(2)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_call_removes_entry() {
        let (client, correlator, mut rx, _) = setup(4);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("users", "slow_request", "", CallOptions::new()).await }
        });
        rx.recv().await.unwrap();
        assert_eq!(correlator.pending_count(), 1);

        call.abort();
        let _ = call.await;
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_into_result_maps_handler_error() {
        let response = CallResponse {
            message_type: "x_response".to_string(),
            payload: String::new(),
            success: false,
            error: Some("nope".to_string()),
        };
        assert!(matches!(
            response.into_result(),
            Err(CallError::Handler { message }) if message == "nope"
        ));
    }
}
