//! HTTP handlers for the web role.
//!
//! Handlers hold no state of their own between requests. Everything durable
//! (counters, the queue) lives in the shared store, so any number of web
//! processes can sit behind a load balancer and report consistent counts.

use crate::server::{
    telemetry::{increment_identities_issued, increment_visits, record_request_duration},
    web::{AppState, cookie, error::ApiError},
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tally_core::{Store, bytes::Bytes};

/// Payload returned by [`visit`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitResponse {
    pub served_by: String,
    pub session_id: String,
    pub session_count: i64,
    pub global_count: i64,
    /// Process-local random value. Carries no meaning across processes.
    pub local_noise: u32,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueParams {
    job: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnqueueResponse {
    pub enqueued: String,
}

/// `GET /` - counts a visit and reports the counters.
///
/// Resolves the visitor from the `sid` cookie (issuing one on first contact),
/// records the visit in the shared store, and returns both counts.
#[tracing::instrument(skip_all)]
pub async fn visit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let start = Instant::now();

    let resolved = state.resolver.resolve(cookie::session_token(&headers))?;
    let visit = state.counters.record_visit(&resolved.identity).await?;
    increment_visits();

    let body = VisitResponse {
        served_by: state.hostname.to_string(),
        session_id: resolved.identity,
        session_count: visit.session_count,
        global_count: visit.global_count,
        local_noise: rand::rng().random_range(0..100_000),
    };
    let mut response = Json(body).into_response();

    if let Some(token) = resolved.issued {
        let set_cookie = cookie::issue(&token)
            .map_err(|e| ApiError::Internal(format!("invalid session cookie: {e}")))?;
        response.headers_mut().append(SET_COOKIE, set_cookie);
        increment_identities_issued();
    }

    record_request_duration(start.elapsed().as_secs_f64() * 1000.0);
    Ok(response)
}

/// `GET /enqueue?job=<name>` - pushes `name` onto the work queue.
#[tracing::instrument(skip_all)]
pub async fn enqueue(
    State(state): State<AppState>,
    Query(params): Query<EnqueueParams>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let job = params
        .job
        .filter(|job| !job.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing `job` parameter".to_string()))?;

    state
        .counters
        .store()
        .push(&state.queue, Bytes::from(job.clone()))
        .await?;

    tracing::debug!(%job, queue = %state.queue, "Enqueued job");
    Ok(Json(EnqueueResponse { enqueued: job }))
}

/// `GET /healthz` - liveness of this process.
pub async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::web::{SharedStore, router};
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header::COOKIE},
    };
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use tally_core::{GLOBAL_KEY, RandSource, session_key, store::MemoryStore};
    use tower::ServiceExt;

    struct NoEntropy;

    impl RandSource for NoEntropy {
        fn rand(&self) -> tally_core::Result<u128> {
            Err(tally_core::Error::IdentityGeneration {
                reason: "entropy source offline".to_string(),
            })
        }
    }

    fn state(store: Arc<MemoryStore>) -> AppState {
        let shared: SharedStore = store;
        AppState::new(shared, "web-1", "jobs")
    }

    fn app(store: Arc<MemoryStore>) -> Router {
        router(state(store))
    }

    async fn get(app: &Router, uri: &str, sid: Option<&str>) -> Response {
        let mut request = Request::get(uri);
        if let Some(sid) = sid {
            request = request.header(COOKIE, format!("sid={sid}"));
        }
        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json<T: DeserializeOwned>(response: Response) -> T {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn first_visit_issues_cookie_and_counts_one() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone());

        let response = get(&app, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        let body: VisitResponse = json(response).await;

        assert_eq!(set_cookie, format!("sid={}; Path=/", body.session_id));
        assert_eq!(body.served_by, "web-1");
        assert_eq!(body.session_count, 1);
        assert_eq!(body.global_count, 1);
        assert!(body.local_noise < 100_000);
        assert_eq!(store.get(&session_key(&body.session_id)), Some(1));
    }

    #[tokio::test]
    async fn returning_visitor_keeps_identity_and_counts_up() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone());

        for k in 1..=3 {
            let response = get(&app, "/", Some("returning")).await;
            assert!(response.headers().get(SET_COOKIE).is_none());
            let body: VisitResponse = json(response).await;
            assert_eq!(body.session_id, "returning");
            assert_eq!(body.session_count, k);
        }

        let body: VisitResponse = json(get(&app, "/", None).await).await;
        assert_ne!(body.session_id, "returning");
        assert_eq!(body.session_count, 1);
        assert_eq!(body.global_count, 4);
        assert_eq!(store.get(GLOBAL_KEY), Some(4));
    }

    #[tokio::test]
    async fn store_outage_is_an_explicit_error() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone());
        store.set_available(false);

        let response = get(&app, "/", Some("alice")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Store unavailable"));
        assert!(body.get("session_count").is_none());
    }

    #[tokio::test]
    async fn enqueue_pushes_onto_the_queue() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone());

        let response = get(&app, "/enqueue?job=demo-job", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: EnqueueResponse = json(response).await;
        assert_eq!(body.enqueued, "demo-job");

        let popped = store
            .blocking_pop("jobs", Some(core::time::Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(popped, Some(Bytes::from("demo-job")));
    }

    #[tokio::test]
    async fn enqueue_without_job_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone());

        for uri in ["/enqueue", "/enqueue?job="] {
            let response = get(&app, uri, None).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(store.queue_len("jobs"), 0);
    }

    #[tokio::test]
    async fn enqueue_store_outage_is_503() {
        let store = Arc::new(MemoryStore::new());
        let app = app(store.clone());
        store.set_available(false);

        let response = get(&app, "/enqueue?job=demo-job", None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Store unavailable"));

        store.set_available(true);
        assert_eq!(store.queue_len("jobs"), 0);
    }

    #[tokio::test]
    async fn identity_failure_is_500() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state(store.clone()).with_rand(Arc::new(NoEntropy)));

        let response = get(&app, "/", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(SET_COOKIE).is_none());
        let body: serde_json::Value = json(response).await;
        assert!(body["error"].as_str().unwrap().contains("entropy source offline"));
        // Nothing was counted for the failed request.
        assert_eq!(store.get(GLOBAL_KEY), None);

        // A returning visitor never needs fresh entropy.
        let response = get(&app, "/", Some("alice")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let app = app(Arc::new(MemoryStore::new()));
        let response = get(&app, "/healthz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }
}
