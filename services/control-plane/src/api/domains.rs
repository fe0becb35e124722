//! Introspection of connected domains and managed workers.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::registry::DomainInfo;
use crate::state::AppState;
use crate::supervisor::WorkerStatus;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainsResponse {
    pub domains: Vec<DomainInfo>,
    pub workers: Vec<WorkerStatus>,
    pub pending_requests: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_domains))
}

async fn list_domains(State(state): State<AppState>) -> Json<DomainsResponse> {
    Json(DomainsResponse {
        domains: state.registry().domains(),
        workers: state.supervisor().workers(),
        pending_requests: state.correlator().pending_count(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use switchyard_envelope::{ConnectionId, DomainName};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::api::{create_router, test_support};
    use crate::registry::DomainChannel;

    #[tokio::test]
    async fn test_lists_registered_domains() {
        let state = test_support::state();
        let (tx, _rx) = mpsc::channel(1);
        state.registry().register(DomainChannel::new(
            DomainName::new("users").unwrap(),
            ConnectionId::new(),
            tx,
        ));

        let response = create_router(state)
            .oneshot(Request::get("/v1/domains").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["domains"][0]["name"], "users");
        assert_eq!(json["pendingRequests"], 0);
    }
}
