use switchyard_envelope::TransportError;
use thiserror::Error;

/// Errors that end a worker session or prevent the worker from starting.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The control plane could not be reached.
    #[error("failed to connect to control plane: {0}")]
    Connect(String),

    /// The established channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The liveness endpoint could not be bound.
    #[error("liveness endpoint: {0}")]
    Liveness(#[from] std::io::Error),
}
