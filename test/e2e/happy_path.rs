//! End-to-end happy path test.
//!
//! Runs the real control-plane router on a local port and the worker SDK
//! in-process, talking over a real WebSocket. Verifies:
//!
//! 1. Worker registration and domain introspection
//! 2. Request/response round trips, including handler errors
//! 3. Concurrent calls over one channel
//! 4. Unregistration on worker shutdown
//! 5. A worker started before the control plane connects once it is up
//!
//! ## Running
//!
//! ```bash
//! cargo test -p switchyard-e2e --test happy_path
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchyard_control_plane::{
    api, call::CallOptions, config::Config, state::AppState, supervisor::HttpProbe,
};
use switchyard_envelope::DomainName;
use switchyard_worker::{BackoffPolicy, HandlerError, HandlerTable, Worker, WorkerConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

async fn serve_control_plane(listener: TcpListener) -> AppState {
    let config = Config::from_lookup(|_| None).unwrap();
    let state = AppState::new(&config, Arc::new(HttpProbe::new().unwrap()));
    let app = api::create_router(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });
    state
}

fn handlers() -> HandlerTable {
    let mut handlers = HandlerTable::new();
    handlers
        .register_fn("echo_request", |_ctx, payload| async move { Ok(payload) })
        .register_fn("reject_request", |_ctx, _payload| async move {
            Err::<String, _>(HandlerError::failed("rejected"))
        });
    handlers
}

fn start_worker(addr: SocketAddr, domain: &str) -> (watch::Sender<bool>, JoinHandle<()>) {
    let config = WorkerConfig {
        control_plane_url: format!("ws://{addr}/v1/domains/connect"),
        domain: DomainName::new(domain).unwrap(),
        port: 0,
        log_level: "info".to_string(),
    };
    let backoff = BackoffPolicy {
        base: Duration::from_millis(50),
        max: Duration::from_millis(200),
        jitter: 0.0,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        Worker::new(config, handlers())
            .backoff(backoff)
            .run(shutdown_rx)
            .await
            .unwrap();
    });
    (shutdown_tx, handle)
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn worker_round_trip_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = serve_control_plane(listener).await;

    let (shutdown_tx, worker) = start_worker(addr, "users");
    wait_until("users to register", || state.registry().lookup("users").is_some()).await;

    // Introspection
    let body: serde_json::Value = reqwest::get(format!("http://{addr}/v1/domains"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["domains"][0]["name"], "users");

    // Round trip
    let response = state
        .client()
        .call("users", "echo_request", r#"{"id":7}"#, CallOptions::new())
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.message_type, "echo_response");
    assert_eq!(response.payload, r#"{"id":7}"#);

    // Handler errors are responses, not call errors
    let response = state
        .client()
        .call("users", "reject_request", "", CallOptions::new())
        .await
        .unwrap();
    assert!(!response.success);
    assert!(response.error.as_deref().unwrap_or_default().contains("rejected"));

    let response = state
        .client()
        .call("users", "missing_request", "", CallOptions::new())
        .await
        .unwrap();
    assert!(!response.success);

    // Shutdown unregisters
    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
    wait_until("users to unregister", || state.registry().lookup("users").is_none()).await;
    assert_eq!(state.correlator().pending_count(), 0);
}

#[tokio::test]
async fn concurrent_calls_share_one_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = serve_control_plane(listener).await;

    let (shutdown_tx, worker) = start_worker(addr, "users");
    wait_until("users to register", || state.registry().lookup("users").is_some()).await;

    let calls: Vec<_> = (0..20)
        .map(|i| {
            let client = state.client().clone();
            tokio::spawn(async move {
                let payload = format!("payload-{i}");
                let response = client
                    .call("users", "echo_request", payload.clone(), CallOptions::new())
                    .await
                    .unwrap();
                (payload, response.payload)
            })
        })
        .collect();

    for call in calls {
        let (sent, received) = call.await.unwrap();
        assert_eq!(sent, received);
    }
    assert_eq!(state.correlator().pending_count(), 0);

    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
}

#[tokio::test]
async fn worker_connects_once_control_plane_is_up() {
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let (shutdown_tx, worker) = start_worker(addr, "email");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    let state = serve_control_plane(listener).await;
    wait_until("email to register", || state.registry().lookup("email").is_some()).await;

    let response = state
        .client()
        .call("email", "echo_request", "hi", CallOptions::new())
        .await
        .unwrap();
    assert_eq!(response.payload, "hi");

    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
}
