//! Dispatch loop: one task per domain channel.
//!
//! The loop reads frames in arrival order. Responses go to the correlator
//! and requests go to the handler table. Writes never happen here; every
//! outbound envelope goes through the channel's queue to its writer task.

use std::sync::Arc;
use std::time::Duration;

use switchyard_envelope::{
    ConnectionId, Frame, FrameReader, FrameWriter, HandlerTable, MessageEnvelope,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::correlator::Correlator;
use crate::registry::{DomainChannel, DomainRegistry};

/// Default capacity of each channel's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// How long teardown waits for the writer to flush before aborting it.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs dispatch loops against shared registry, correlator and handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DomainRegistry>,
    correlator: Arc<Correlator>,
    handlers: Arc<HandlerTable>,
    fail_pending_on_disconnect: bool,
    outbound_capacity: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<DomainRegistry>,
        correlator: Arc<Correlator>,
        handlers: Arc<HandlerTable>,
    ) -> Self {
        Self {
            registry,
            correlator,
            handlers,
            fail_pending_on_disconnect: false,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Fail a connection's pending requests as soon as it closes, instead of
    /// leaving them to time out.
    pub fn fail_pending_on_disconnect(mut self, enabled: bool) -> Self {
        self.fail_pending_on_disconnect = enabled;
        self
    }

    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Spawns a dispatch loop for a freshly accepted connection.
    pub fn spawn<R, W>(&self, reader: R, writer: W) -> JoinHandle<ConnectionId>
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(reader, writer).await })
    }

    /// Runs a dispatch loop to completion and returns the connection's ID.
    pub async fn run<R, W>(&self, mut reader: R, writer: W) -> ConnectionId
    where
        R: FrameReader,
        W: FrameWriter + 'static,
    {
        let connection_id = ConnectionId::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let mut writer_task = tokio::spawn(write_loop(connection_id, writer, outbound_rx));

        debug!(connection_id = %connection_id, "Connection accepted");

        let mut channel: Option<DomainChannel> = None;

        loop {
            let frame = match reader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(connection_id = %connection_id, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "Connection read failed");
                    break;
                }
            };

            let active = match &channel {
                Some(active) => {
                    if frame.domain() != active.name() {
                        warn!(
                            connection_id = %connection_id,
                            domain = %active.name(),
                            frame_domain = %frame.domain(),
                            "Frame domain does not match channel; keeping channel identity"
                        );
                    }
                    active.clone()
                }
                None => {
                    let registered = DomainChannel::new(
                        frame.domain().clone(),
                        connection_id,
                        outbound_tx.clone(),
                    );
                    self.registry.register(registered.clone());
                    channel = Some(registered.clone());
                    registered
                }
            };

            match frame {
                Frame::Response(response) => {
                    self.correlator.complete(connection_id, response);
                }
                Frame::Request(request) => {
                    let response = self.handlers.dispatch(&request).await;
                    let mut envelope = MessageEnvelope::from(response);
                    envelope.domain = active.name().clone();
                    if outbound_tx.send(envelope).await.is_err() {
                        warn!(
                            connection_id = %connection_id,
                            domain = %active.name(),
                            request_id = %request.request_id,
                            "Writer stopped; dropping response and closing connection"
                        );
                        break;
                    }
                }
            }
        }

        if let Some(channel) = channel.take() {
            self.registry.release(&channel);
            if self.fail_pending_on_disconnect {
                let failed = self.correlator.fail_connection(connection_id);
                if failed > 0 {
                    info!(
                        connection_id = %connection_id,
                        domain = %channel.name(),
                        failed,
                        "Failed pending requests of closed connection"
                    );
                }
            }
        }
        drop(outbound_tx);

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
            .await
            .is_err()
        {
            warn!(connection_id = %connection_id, "Writer did not drain in time; aborting");
            writer_task.abort();
        }

        debug!(connection_id = %connection_id, "Connection finished");
        connection_id
    }
}

/// Drains a channel's outbound queue into its transport.
///
/// Ends when every queue sender is gone or a write fails.
async fn write_loop<W: FrameWriter>(
    connection_id: ConnectionId,
    mut writer: W,
    mut outbound: mpsc::Receiver<MessageEnvelope>,
) {
    while let Some(envelope) = outbound.recv().await {
        if let Err(e) = writer.write_frame(&envelope).await {
            warn!(
                connection_id = %connection_id,
                request_id = %envelope.request_id,
                error = %e,
                "Write failed; closing writer"
            );
            break;
        }
    }

    if let Err(e) = writer.close().await {
        debug!(connection_id = %connection_id, error = %e, "Writer close failed");
    }
}
