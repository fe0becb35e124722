//! Request/response correlation over live dispatch loops.
//!
//! Fake workers are driven through in-memory channel ends so every frame the
//! control plane writes can be inspected and answered by hand.

use std::sync::Arc;
use std::time::Duration;

use switchyard_control_plane::call::{CallOptions, CallResponse, DomainClient};
use switchyard_control_plane::correlator::{run_sweeper, Correlator};
use switchyard_control_plane::dispatch::Dispatcher;
use switchyard_control_plane::handlers::builtin_handlers;
use switchyard_control_plane::registry::DomainRegistry;
use switchyard_control_plane::CallError;
use switchyard_envelope::transport::memory::{self, MemoryEnd};
use switchyard_envelope::{response_type_for, ConnectionId, DomainName, MessageEnvelope, RequestId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct ControlPlane {
    registry: Arc<DomainRegistry>,
    correlator: Arc<Correlator>,
    dispatcher: Dispatcher,
    client: DomainClient,
}

impl ControlPlane {
    fn new(fail_pending_on_disconnect: bool) -> Self {
        let registry = Arc::new(DomainRegistry::new());
        let correlator = Arc::new(Correlator::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&correlator),
            Arc::new(builtin_handlers(Arc::clone(&registry))),
        )
        .fail_pending_on_disconnect(fail_pending_on_disconnect);
        let client = DomainClient::new(Arc::clone(&registry), Arc::clone(&correlator));

        Self {
            registry,
            correlator,
            dispatcher,
            client,
        }
    }

    /// Connects a fake worker and completes its registration handshake.
    async fn connect(&self, domain: &str) -> (MemoryEnd, JoinHandle<ConnectionId>) {
        let (server, mut worker) = memory::pair(32);
        let task = self.dispatcher.spawn(server.reader, server.writer);

        worker
            .writer
            .send(MessageEnvelope::request(
                DomainName::new(domain).unwrap(),
                "register_request",
                "",
                RequestId::generate(),
            ))
            .await
            .unwrap();
        let ack = worker.reader.recv().await.unwrap();
        assert_eq!(ack.message_type, "register_response");
        assert_eq!(ack.success, Some(true));

        (worker, task)
    }

    fn spawn_call(
        &self,
        domain: &str,
        message_type: &str,
        options: CallOptions,
    ) -> JoinHandle<Result<CallResponse, CallError>> {
        let client = self.client.clone();
        let domain = domain.to_string();
        let message_type = message_type.to_string();
        tokio::spawn(async move { client.call(&domain, &message_type, "{}", options).await })
    }
}

fn reply(request: &MessageEnvelope, payload: &str) -> MessageEnvelope {
    MessageEnvelope {
        domain: request.domain.clone(),
        message_type: response_type_for(&request.message_type),
        payload: payload.to_string(),
        request_id: request.request_id.clone(),
        success: Some(true),
        error: None,
    }
}

#[tokio::test]
async fn registered_domain_answers_call() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    let call = plane.spawn_call("users", "user_index_request", CallOptions::new());

    let request = worker.reader.recv().await.unwrap();
    assert_eq!(request.message_type, "user_index_request");
    assert_eq!(request.payload, "{}");
    assert!(request.success.is_none());
    worker.writer.send(reply(&request, "[]")).await.unwrap();

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.message_type, "user_index_response");
    assert_eq!(response.payload, "[]");
    assert!(response.success);
    assert_eq!(plane.correlator.pending_count(), 0);
}

#[tokio::test]
async fn unknown_domain_fails_fast() {
    let plane = ControlPlane::new(false);
    let started = std::time::Instant::now();

    let err = plane
        .client
        .call("orders", "order_create_request", "{}", CallOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::NotConnected { ref domain } if domain == "orders"));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(plane.correlator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_domain_times_out_within_timeout_plus_sweep() {
    let plane = ControlPlane::new(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_sweeper(
        Arc::clone(&plane.correlator),
        Duration::from_secs(30),
        shutdown_rx,
    ));
    let (mut worker, _task) = plane.connect("users").await;

    let started = Instant::now();
    let call = plane.spawn_call("users", "user_index_request", CallOptions::new());
    let request = worker.reader.recv().await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, CallError::Timeout { .. }));
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed <= Duration::from_secs(60));
    assert!(!plane.correlator.contains(&request.request_id));

    shutdown_tx.send(true).unwrap();
    sweeper.await.unwrap();
}

#[tokio::test]
async fn out_of_order_replies_reach_their_callers() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    let a1 = plane.spawn_call(
        "users",
        "user_get_request",
        CallOptions::new().request_id(RequestId::new("a1").unwrap()),
    );
    let first = worker.reader.recv().await.unwrap();
    let a2 = plane.spawn_call(
        "users",
        "user_get_request",
        CallOptions::new().request_id(RequestId::new("a2").unwrap()),
    );
    let second = worker.reader.recv().await.unwrap();
    assert_eq!(first.request_id.as_str(), "a1");
    assert_eq!(second.request_id.as_str(), "a2");

    worker.writer.send(reply(&second, "user-2")).await.unwrap();
    worker.writer.send(reply(&first, "user-1")).await.unwrap();

    assert_eq!(a2.await.unwrap().unwrap().payload, "user-2");
    assert_eq!(a1.await.unwrap().unwrap().payload, "user-1");
    assert_eq!(plane.correlator.pending_count(), 0);
}

#[tokio::test]
async fn duplicate_reply_is_dropped() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    let call = plane.spawn_call("users", "user_index_request", CallOptions::new());
    let request = worker.reader.recv().await.unwrap();
    worker.writer.send(reply(&request, "first")).await.unwrap();
    worker.writer.send(reply(&request, "second")).await.unwrap();

    assert_eq!(call.await.unwrap().unwrap().payload, "first");

    // The channel keeps working after the stray frame.
    let next = plane.spawn_call("users", "user_index_request", CallOptions::new());
    let request = worker.reader.recv().await.unwrap();
    worker.writer.send(reply(&request, "third")).await.unwrap();
    assert_eq!(next.await.unwrap().unwrap().payload, "third");
    assert_eq!(plane.correlator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_reply_after_timeout_is_dropped() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    let call = plane.spawn_call(
        "users",
        "slow_request",
        CallOptions::new().timeout(Duration::from_secs(1)),
    );
    let request = worker.reader.recv().await.unwrap();
    assert!(matches!(call.await.unwrap(), Err(CallError::Timeout { .. })));

    worker.writer.send(reply(&request, "late")).await.unwrap();

    let next = plane.spawn_call("users", "fast_request", CallOptions::new());
    let fresh = worker.reader.recv().await.unwrap();
    worker.writer.send(reply(&fresh, "ok")).await.unwrap();
    assert_eq!(next.await.unwrap().unwrap().payload, "ok");
    assert!(!plane.correlator.contains(&request.request_id));
}

#[tokio::test(start_paused = true)]
async fn cancellation_preempts_timeout() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    let token = CancellationToken::new();
    let started = Instant::now();
    let call = plane.spawn_call(
        "users",
        "slow_request",
        CallOptions::new()
            .timeout(Duration::from_secs(60))
            .cancel(token.clone()),
    );
    let request = worker.reader.recv().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    assert!(matches!(call.await.unwrap(), Err(CallError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(!plane.correlator.contains(&request.request_id));
}

#[tokio::test]
async fn caller_chosen_id_must_be_unique_while_outstanding() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    let id = RequestId::new("fixed").unwrap();
    let first = plane.spawn_call("users", "a_request", CallOptions::new().request_id(id.clone()));
    let request = worker.reader.recv().await.unwrap();

    let err = plane
        .client
        .call("users", "b_request", "{}", CallOptions::new().request_id(id))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::DuplicateRequestId { .. }));

    worker.writer.send(reply(&request, "done")).await.unwrap();
    assert_eq!(first.await.unwrap().unwrap().payload, "done");
}

#[tokio::test(start_paused = true)]
async fn superseded_channel_requests_resolve_by_timeout() {
    let plane = ControlPlane::new(false);
    let (mut old_worker, old_task) = plane.connect("users").await;

    let stranded = plane.spawn_call(
        "users",
        "user_index_request",
        CallOptions::new().timeout(Duration::from_secs(5)),
    );
    let stranded_request = old_worker.reader.recv().await.unwrap();

    let (mut new_worker, _new_task) = plane.connect("users").await;
    let new_connection = plane.registry.lookup("users").unwrap().connection_id();

    // New calls route to the new channel.
    let fresh = plane.spawn_call("users", "user_index_request", CallOptions::new());
    let fresh_request = new_worker.reader.recv().await.unwrap();
    new_worker.writer.send(reply(&fresh_request, "new")).await.unwrap();
    assert_eq!(fresh.await.unwrap().unwrap().payload, "new");

    // The new channel cannot answer for the old one.
    new_worker
        .writer
        .send(reply(&stranded_request, "hijacked"))
        .await
        .unwrap();
    assert!(matches!(
        stranded.await.unwrap(),
        Err(CallError::Timeout { .. })
    ));

    // The old connection closing leaves its successor registered.
    drop(old_worker);
    old_task.await.unwrap();
    assert_eq!(
        plane.registry.lookup("users").unwrap().connection_id(),
        new_connection
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_leaves_pending_requests_to_time_out_by_default() {
    let plane = ControlPlane::new(false);
    let (mut worker, task) = plane.connect("users").await;

    let started = Instant::now();
    let call = plane.spawn_call(
        "users",
        "user_index_request",
        CallOptions::new().timeout(Duration::from_secs(10)),
    );
    worker.reader.recv().await.unwrap();

    drop(worker);
    task.await.unwrap();
    assert!(plane.registry.lookup("users").is_none());

    assert!(matches!(call.await.unwrap(), Err(CallError::Timeout { .. })));
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn disconnect_fails_pending_requests_when_enabled() {
    let plane = ControlPlane::new(true);
    let (mut worker, task) = plane.connect("users").await;

    let started = Instant::now();
    let call = plane.spawn_call(
        "users",
        "user_index_request",
        CallOptions::new().timeout(Duration::from_secs(10)),
    );
    worker.reader.recv().await.unwrap();

    drop(worker);
    task.await.unwrap();

    assert!(matches!(
        call.await.unwrap(),
        Err(CallError::DomainDisconnected { .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(plane.correlator.pending_count(), 0);
}

#[tokio::test]
async fn worker_requests_reach_builtin_handlers() {
    let plane = ControlPlane::new(false);
    let (mut worker, _task) = plane.connect("users").await;

    worker
        .writer
        .send(MessageEnvelope::request(
            DomainName::new("users").unwrap(),
            "ping_request",
            "",
            RequestId::new("p1").unwrap(),
        ))
        .await
        .unwrap();
    let pong = worker.reader.recv().await.unwrap();
    assert_eq!(pong.message_type, "ping_response");
    assert_eq!(pong.payload, "pong");
    assert_eq!(pong.request_id.as_str(), "p1");

    worker
        .writer
        .send(MessageEnvelope::request(
            DomainName::new("users").unwrap(),
            "nonsense_request",
            "",
            RequestId::new("p2").unwrap(),
        ))
        .await
        .unwrap();
    let error = worker.reader.recv().await.unwrap();
    assert_eq!(error.success, Some(false));
    assert!(error.error.is_some());
}
