//! Frame transport traits.
//!
//! A domain channel is a persistent duplex stream of frames. The read and
//! write halves are owned by different tasks (the dispatch loop reads; a
//! single writer task writes), so they are separate traits.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::MessageEnvelope;
use crate::error::TransportError;
use crate::frame::Frame;

/// Read half of a domain channel.
#[async_trait]
pub trait FrameReader: Send {
    /// Waits for the next frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream. Implementations skip
    /// (and log) frames that fail to decode rather than returning an error.
    async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Write half of a domain channel.
#[async_trait]
pub trait FrameWriter: Send {
    /// Writes one envelope.
    async fn write_frame(&mut self, envelope: &MessageEnvelope) -> Result<(), TransportError>;

    /// Closes the write half.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// In-memory channel ends, for embedding and tests.
pub mod memory {
    use super::*;

    /// Read half backed by an mpsc receiver.
    pub struct MemoryReader {
        rx: mpsc::Receiver<MessageEnvelope>,
    }

    /// Write half backed by an mpsc sender.
    #[derive(Clone)]
    pub struct MemoryWriter {
        tx: mpsc::Sender<MessageEnvelope>,
    }

    /// One side of an in-memory duplex channel.
    pub struct MemoryEnd {
        pub reader: MemoryReader,
        pub writer: MemoryWriter,
    }

    /// Creates two connected channel ends.
    ///
    /// Whatever one end writes, the other end reads. Dropping both writers
    /// that feed a reader ends its stream.
    pub fn pair(capacity: usize) -> (MemoryEnd, MemoryEnd) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            MemoryEnd {
                reader: MemoryReader { rx: a_rx },
                writer: MemoryWriter { tx: b_tx },
            },
            MemoryEnd {
                reader: MemoryReader { rx: b_rx },
                writer: MemoryWriter { tx: a_tx },
            },
        )
    }

    impl MemoryReader {
        /// Receives the next raw envelope.
        pub async fn recv(&mut self) -> Option<MessageEnvelope> {
            self.rx.recv().await
        }
    }

    impl MemoryWriter {
        /// Sends a raw envelope.
        pub async fn send(&self, envelope: MessageEnvelope) -> Result<(), TransportError> {
            self.tx
                .send(envelope)
                .await
                .map_err(|_| TransportError::Closed)
        }
    }

    #[async_trait]
    impl FrameReader for MemoryReader {
        async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
            Ok(self.rx.recv().await.map(Frame::from))
        }
    }

    #[async_trait]
    impl FrameWriter for MemoryWriter {
        async fn write_frame(&mut self, envelope: &MessageEnvelope) -> Result<(), TransportError> {
            self.send(envelope.clone()).await
        }
    }
}
