//! One connection to the control plane, from handshake to close.

use switchyard_envelope::{
    Frame, FrameReader, FrameWriter, HandlerTable, MessageEnvelope, RequestId,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::transport;

/// Message type of the registration handshake.
pub const REGISTER_REQUEST: &str = "register_request";

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested.
    Shutdown,
    /// The control plane closed the connection.
    Disconnected { registered: bool },
}

/// Connects, registers, and serves requests until the connection ends.
///
/// Requests are handled one at a time in arrival order and answered on the
/// same connection.
pub async fn run(
    config: &WorkerConfig,
    handlers: &HandlerTable,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, WorkerError> {
    let (socket, _) = tokio_tungstenite::connect_async(config.control_plane_url.as_str())
        .await
        .map_err(|e| WorkerError::Connect(e.to_string()))?;
    let (mut reader, mut writer) = transport::split(socket);

    let register_id = RequestId::generate();
    writer
        .write_frame(&MessageEnvelope::request(
            config.domain.clone(),
            REGISTER_REQUEST,
            "",
            register_id.clone(),
        ))
        .await?;
    info!(
        domain = %config.domain,
        url = %config.control_plane_url,
        "Connected to control plane; registration sent"
    );

    let mut registered = false;

    loop {
        let frame = tokio::select! {
            frame = reader.read_frame() => frame?,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    if let Err(e) = writer.close().await {
                        debug!(error = %e, "Close during shutdown failed");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                continue;
            }
        };

        let Some(frame) = frame else {
            info!(domain = %config.domain, "Control plane closed the connection");
            return Ok(SessionEnd::Disconnected { registered });
        };

        match frame {
            Frame::Response(response) if response.request_id == register_id => {
                if response.success {
                    registered = true;
                    info!(domain = %config.domain, ack = %response.payload, "Registration acknowledged");
                } else {
                    warn!(
                        domain = %config.domain,
                        error = ?response.error,
                        "Registration rejected"
                    );
                }
            }
            Frame::Response(response) => {
                debug!(
                    request_id = %response.request_id,
                    message_type = %response.message_type,
                    "Unexpected response dropped"
                );
            }
            Frame::Request(request) => {
                let response = handlers.dispatch(&request).await;
                let mut envelope = MessageEnvelope::from(response);
                envelope.domain = config.domain.clone();
                writer.write_frame(&envelope).await?;
            }
        }
    }
}
