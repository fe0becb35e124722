//! Client-side WebSocket frame transport.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use switchyard_envelope::{Frame, FrameReader, FrameWriter, MessageEnvelope, TransportError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half of the worker's control-plane connection.
pub struct WsReader {
    stream: SplitStream<Socket>,
}

/// Write half of the worker's control-plane connection.
pub struct WsWriter {
    sink: SplitSink<Socket, Message>,
}

/// Splits a connected socket into frame reader and writer.
pub fn split(socket: Socket) -> (WsReader, WsWriter) {
    let (sink, stream) = socket.split();
    (WsReader { stream }, WsWriter { sink })
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
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            match decoded {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(error = %e, "Dropping malformed frame"),
            }
        }
        Ok(None)
    }
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
