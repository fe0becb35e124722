//! Domain registry: which channel currently speaks for each domain name.
//!
//! At most one channel is active per name. Registering a second channel
//! under the same name supersedes the first; the registry reports that as an
//! event but has no opinion on it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use switchyard_envelope::{ConnectionId, DomainName, MessageEnvelope};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Capacity of the registry event broadcast.
const EVENT_CAPACITY: usize = 64;

/// Why an envelope could not be queued on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbound queue is at capacity.
    Full,
    /// The channel's writer has stopped.
    Closed,
}

impl std::fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnqueueError::Full => write!(f, "outbound queue full"),
            EnqueueError::Closed => write!(f, "channel closed"),
        }
    }
}

/// The single active channel for one domain.
///
/// Cheap to clone. The transport itself is owned by a writer task; this
/// handle only holds the sending side of its outbound queue.
#[derive(Clone)]
pub struct DomainChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    name: DomainName,
    connection_id: ConnectionId,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<MessageEnvelope>,
}

impl DomainChannel {
    /// Creates a channel handle around an outbound queue.
    pub fn new(
        name: DomainName,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<MessageEnvelope>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name,
                connection_id,
                connected_at: Utc::now(),
                outbound,
            }),
        }
    }

    pub fn name(&self) -> &DomainName {
        &self.inner.name
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.inner.connection_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    /// Queues an envelope for the writer task without waiting.
    pub fn try_send(&self, envelope: MessageEnvelope) -> Result<(), EnqueueError> {
        self.inner.outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Returns true once the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.inner.outbound.is_closed()
    }

    fn is_same_connection(&self, other: &DomainChannel) -> bool {
        self.inner.connection_id == other.inner.connection_id
    }
}

impl std::fmt::Debug for DomainChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainChannel")
            .field("name", &self.inner.name)
            .field("connection_id", &self.inner.connection_id)
            .field("connected_at", &self.inner.connected_at)
            .finish()
    }
}

/// Observable changes to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A domain gained a channel where it had none.
    Registered {
        domain: DomainName,
        connection_id: ConnectionId,
    },
    /// A domain's channel was replaced by a newer connection.
    Superseded {
        domain: DomainName,
        previous: ConnectionId,
        current: ConnectionId,
    },
    /// A domain lost its channel.
    Unregistered {
        domain: DomainName,
        connection_id: ConnectionId,
    },
}

/// Snapshot of one registered domain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    pub name: DomainName,
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
}

/// Concurrency-safe map from domain name to its active channel.
pub struct DomainRegistry {
    channels: RwLock<HashMap<DomainName, DomainChannel>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            channels: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Makes `channel` the active channel for its domain.
    ///
    /// Returns the channel it superseded, if any. In-flight calls on the old
    /// channel are left alone.
    pub fn register(&self, channel: DomainChannel) -> Option<DomainChannel> {
        let domain = channel.name().clone();
        let current = channel.connection_id();

        let previous = self
            .channels
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(domain.clone(), channel);

        let event = match &previous {
            Some(old) => {
                info!(
                    domain = %domain,
                    previous = %old.connection_id(),
                    current = %current,
                    "Domain channel superseded"
                );
                RegistryEvent::Superseded {
                    domain,
                    previous: old.connection_id(),
                    current,
                }
            }
            None => {
                info!(domain = %domain, connection_id = %current, "Domain registered");
                RegistryEvent::Registered {
                    domain,
                    connection_id: current,
                }
            }
        };
        self.publish(event);

        previous
    }

    /// Removes whatever channel is registered under `name`.
    pub fn unregister(&self, name: &str) -> Option<DomainChannel> {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .remove(name);

        if let Some(channel) = &removed {
            info!(
                domain = %channel.name(),
                connection_id = %channel.connection_id(),
                "Domain unregistered"
            );
            self.publish(RegistryEvent::Unregistered {
                domain: channel.name().clone(),
                connection_id: channel.connection_id(),
            });
        }

        removed
    }

    /// Removes `channel` only if it is still the active one for its name.
    ///
    /// A superseded connection tearing down must not evict its successor.
    pub fn release(&self, channel: &DomainChannel) -> bool {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(|poison| poison.into_inner());

        let is_active = channels
            .get(channel.name().as_str())
            .is_some_and(|active| active.is_same_connection(channel));

        if !is_active {
            debug!(
                domain = %channel.name(),
                connection_id = %channel.connection_id(),
                "Superseded channel released; registry unchanged"
            );
            return false;
        }

        channels.remove(channel.name().as_str());
        drop(channels);

        info!(
            domain = %channel.name(),
            connection_id = %channel.connection_id(),
            "Domain unregistered"
        );
        self.publish(RegistryEvent::Unregistered {
            domain: channel.name().clone(),
            connection_id: channel.connection_id(),
        });
        true
    }

    /// Returns the active channel for `name`.
    pub fn lookup(&self, name: &str) -> Option<DomainChannel> {
        self.channels
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(name)
            .cloned()
    }

    /// Returns a snapshot of every registered domain, sorted by name.
    pub fn domains(&self) -> Vec<DomainInfo> {
        let mut domains: Vec<_> = self
            .channels
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .values()
            .map(|c| DomainInfo {
                name: c.name().clone(),
                connection_id: c.connection_id(),
                connected_at: c.connected_at(),
            })
            .collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        domains
    }

    /// Number of registered domains.
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
