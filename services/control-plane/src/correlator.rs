//! Request correlator: matches responses to the callers waiting on them.
//!
//! Every outstanding request owns one entry holding a single-use completion
//! slot. An entry is removed from the table by whichever of these happens
//! first, and only then is its slot written:
//!
//! - a response from the connection the request was written to
//! - the deadline passing (observed by [`Correlator::sweep`])
//! - the caller giving up (timeout, cancellation, send failure)
//! - the connection being failed as a whole ([`Correlator::fail_connection`])
//!
//! Removal under the lock is what makes resolution at-most-once: a late or
//! duplicate response finds nothing and is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use switchyard_envelope::{ConnectionId, DomainName, RequestId, Response};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CallError;

/// Deadline applied when a request does not specify one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between expiry passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How a pending request was resolved.
pub type Outcome = Result<Response, CallError>;

struct PendingEntry {
    domain: DomainName,
    connection_id: ConnectionId,
    deadline: Instant,
    slot: oneshot::Sender<Outcome>,
}

/// Result of offering a response to the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The waiting caller received the response.
    Delivered,
    /// No request with that ID is outstanding (late, duplicate, or unknown).
    Unknown,
    /// The request is outstanding on a different connection; left pending.
    ForeignConnection,
}

/// The caller's side of a pending request.
///
/// Resolves exactly once with the response or the reason there is none.
#[derive(Debug)]
pub struct WaitHandle {
    request_id: RequestId,
    rx: oneshot::Receiver<Outcome>,
}

impl WaitHandle {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for WaitHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = ready!(Pin::new(&mut self.rx).poll(cx));
        // The slot is only dropped unwritten if the correlator itself is gone.
        Poll::Ready(received.unwrap_or_else(|_| {
            Err(CallError::Cancelled {
                request_id: self.request_id.clone(),
            })
        }))
    }
}

/// Concurrency-safe table of outstanding requests.
pub struct Correlator {
    pending: Mutex<HashMap<RequestId, PendingEntry>>,
    default_timeout: Duration,
}

impl Correlator {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Registers a request under a freshly generated ID.
    pub fn create(
        &self,
        domain: DomainName,
        connection_id: ConnectionId,
        timeout: Option<Duration>,
    ) -> (RequestId, WaitHandle) {
        let deadline = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let mut pending = self.lock();

        let mut request_id = RequestId::generate();
        while pending.contains_key(&request_id) {
            request_id = RequestId::generate();
        }

        let handle = Self::insert(&mut pending, request_id.clone(), domain, connection_id, deadline);
        (request_id, handle)
    }

    /// Registers a request under a caller-chosen ID.
    ///
    /// Fails if that ID is currently outstanding for any domain.
    pub fn create_with_id(
        &self,
        request_id: RequestId,
        domain: DomainName,
        connection_id: ConnectionId,
        timeout: Option<Duration>,
    ) -> Result<WaitHandle, CallError> {
        let deadline = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let mut pending = self.lock();

        if pending.contains_key(&request_id) {
            return Err(CallError::DuplicateRequestId { request_id });
        }

        Ok(Self::insert(&mut pending, request_id, domain, connection_id, deadline))
    }

    fn insert(
        pending: &mut HashMap<RequestId, PendingEntry>,
        request_id: RequestId,
        domain: DomainName,
        connection_id: ConnectionId,
        deadline: Instant,
    ) -> WaitHandle {
        let (slot, rx) = oneshot::channel();
        debug!(
            request_id = %request_id,
            domain = %domain,
            connection_id = %connection_id,
            "Pending request created"
        );
        pending.insert(
            request_id.clone(),
            PendingEntry {
                domain,
                connection_id,
                deadline,
                slot,
            },
        );
        WaitHandle { request_id, rx }
    }

    /// Delivers a response that arrived on `connection_id`.
    ///
    /// Never fails: an unknown ID is logged and dropped. A response for a
    /// request written to another connection leaves that request pending.
    pub fn complete(&self, connection_id: ConnectionId, response: Response) -> Completion {
        let entry = {
            let mut pending = self.lock();
            let owner = pending
                .get(&response.request_id)
                .map(|entry| entry.connection_id);
            match owner {
                None => None,
                Some(owner) if owner != connection_id => {
                    warn!(
                        request_id = %response.request_id,
                        domain = %response.domain,
                        expected_connection = %owner,
                        received_connection = %connection_id,
                        "Response arrived on a different connection; ignoring"
                    );
                    return Completion::ForeignConnection;
                }
                Some(_) => pending.remove(&response.request_id),
            }
        };

        match entry {
            Some(entry) => {
                debug!(
                    request_id = %response.request_id,
                    domain = %entry.domain,
                    success = response.success,
                    "Response delivered"
                );
                // The caller may have stopped waiting; nothing to do then.
                let _ = entry.slot.send(Ok(response));
                Completion::Delivered
            }
            None => {
                debug!(
                    request_id = %response.request_id,
                    domain = %response.domain,
                    message_type = %response.message_type,
                    "Late or duplicate response dropped"
                );
                Completion::Unknown
            }
        }
    }

    /// Resolves an outstanding request with `reason` and removes it.
    ///
    /// Returns false if the request was already resolved.
    pub fn cancel(&self, request_id: &RequestId, reason: CallError) -> bool {
        let entry = self.lock().remove(request_id);
        match entry {
            Some(entry) => {
                debug!(
                    request_id = %request_id,
                    domain = %entry.domain,
                    reason = reason.code(),
                    "Pending request resolved without response"
                );
                let _ = entry.slot.send(Err(reason));
                true
            }
            None => false,
        }
    }

    /// Expires every request whose deadline is at or before `now`.
    ///
    /// Returns the number of requests expired.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<(RequestId, PendingEntry)> = {
            let mut pending = self.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (request_id, entry) in &expired {
            debug!(request_id = %request_id, domain = %entry.domain, "Pending request expired");
        }
        let count = expired.len();
        for (request_id, entry) in expired {
            let _ = entry.slot.send(Err(CallError::Timeout { request_id }));
        }
        count
    }

    /// Fails every request outstanding on `connection_id`.
    ///
    /// Returns the number of requests failed.
    pub fn fail_connection(&self, connection_id: ConnectionId) -> usize {
        let failed: Vec<(RequestId, PendingEntry)> = {
            let mut pending = self.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, entry)| entry.connection_id == connection_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = failed.len();
        for (request_id, entry) in failed {
            let _ = entry.slot.send(Err(CallError::DomainDisconnected {
                domain: entry.domain.to_string(),
                request_id,
            }));
        }
        count
    }

    /// Returns true if `request_id` is outstanding.
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.lock().contains_key(request_id)
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, PendingEntry>> {
        self.pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// Runs periodic expiry passes until shutdown.
pub async fn run_sweeper(
    correlator: Arc<Correlator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "Starting request sweeper");

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let expired = correlator.sweep(Instant::now());
                if expired > 0 {
                    warn!(
                        expired,
                        pending = correlator.pending_count(),
                        "Expired pending requests"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Request sweeper shutting down");
                    break;
                }
            }
        }
    }
}
