//! Error types for the call path and the process supervisor.

use std::time::Duration;

use switchyard_envelope::RequestId;
use thiserror::Error;

/// Why a `call` did not produce a response.
///
/// Business-logic failures are not call errors: they arrive as
/// `success=false` responses. [`CallError::Handler`] only appears when the
/// caller opts in via `CallResponse::into_result`.
#[derive(Debug, Error)]
pub enum CallError {
    /// No channel is registered for the target domain.
    #[error("domain not connected: {domain}")]
    NotConnected { domain: String },

    /// The request could not be handed to the domain's channel.
    #[error("failed to send to domain {domain}: {reason}")]
    TransportSendFailure { domain: String, reason: String },

    /// No response arrived before the deadline.
    #[error("request {request_id} timed out")]
    Timeout { request_id: RequestId },

    /// The caller's cancellation signal fired.
    #[error("request {request_id} cancelled")]
    Cancelled { request_id: RequestId },

    /// The domain's channel closed while the request was outstanding.
    #[error("domain {domain} disconnected with request {request_id} outstanding")]
    DomainDisconnected {
        domain: String,
        request_id: RequestId,
    },

    /// A caller-chosen request ID collides with an outstanding request.
    #[error("request id {request_id} is already outstanding")]
    DuplicateRequestId { request_id: RequestId },

    /// The domain's handler reported a failure.
    #[error("handler error: {message}")]
    Handler { message: String },
}

impl CallError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CallError::NotConnected { .. } => "not_connected",
            CallError::TransportSendFailure { .. } => "transport_send_failure",
            CallError::Timeout { .. } => "timeout",
            CallError::Cancelled { .. } => "cancelled",
            CallError::DomainDisconnected { .. } => "domain_disconnected",
            CallError::DuplicateRequestId { .. } => "duplicate_request_id",
            CallError::Handler { .. } => "handler_error",
        }
    }
}

/// Errors reported by the process supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker process could not be launched.
    #[error("failed to spawn worker {name}: {source}")]
    SpawnFailure {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker never became ready.
    #[error("worker {name} not ready after {waited:?}")]
    ReadinessTimeout { name: String, waited: Duration },

    /// The worker process exited before becoming ready.
    #[error("worker {name} exited during startup (exit code {code:?})")]
    ExitedDuringStartup { name: String, code: Option<i32> },

    /// A worker with this name is already starting or running.
    #[error("worker {name} is already running")]
    AlreadyRunning { name: String },

    /// No worker with this name is managed.
    #[error("unknown worker: {name}")]
    UnknownWorker { name: String },
}

impl SupervisorError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::SpawnFailure { .. } => "spawn_failure",
            SupervisorError::ReadinessTimeout { .. } => "readiness_timeout",
            SupervisorError::ExitedDuringStartup { .. } => "exited_during_startup",
            SupervisorError::AlreadyRunning { .. } => "already_running",
            SupervisorError::UnknownWorker { .. } => "unknown_worker",
        }
    }
}
