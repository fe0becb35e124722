//! WebSocket endpoint workers connect to.
//!
//! Each accepted socket becomes one domain channel driven by the
//! dispatcher. The read half decodes frames; the write half is owned by the
//! channel's writer task.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use switchyard_envelope::{Frame, FrameReader, FrameWriter, MessageEnvelope, TransportError};
use tracing::{debug, warn};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/connect", get(connect))
}

async fn connect(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let connection_id = state
            .dispatcher()
            .run(WsReader { stream }, WsWriter { sink })
            .await;
        debug!(connection_id = %connection_id, "WebSocket connection ended");
    })
}

/// Read half of a server-side WebSocket.
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        while let Some(message) = self.stream.next().await {
            let message = message.map_err(|e| TransportError::Connection(e.to_string()))?;
            let decoded = match message {
                Message::Text(text) => Frame::decode(text.as_str()),
                Message::Binary(bytes) => Frame::decode_slice(&bytes),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            match decoded {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(error = %e, "Dropping malformed frame"),
            }
        }
        Ok(None)
    }
}

/// Write half of a server-side WebSocket.
pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        let text = serde_json::to_string(envelope)?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}
