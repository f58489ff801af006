use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use fxgen_common::*;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::errors::SchedulerError;
use crate::scheduler::{Scheduler, TransitionOutcome};
use crate::status::StatusReporter;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub reporter: StatusReporter,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        let reporter = StatusReporter::new(scheduler.store().clone());
        Self {
            scheduler,
            reporter,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub description: String,
    pub platform: Option<String>,
    pub options: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ConcurrencyRequest {
    #[serde(alias = "maxConcurrent")]
    pub max_concurrent: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub job_id: String,
    pub applied: bool,
    /// Status after the request; `None` when the job does not exist
    pub status: Option<JobStatus>,
}

impl TransitionResponse {
    fn new(job_id: String, outcome: TransitionOutcome) -> Self {
        let (applied, status) = match outcome {
            TransitionOutcome::Applied(status) => (true, Some(status)),
            TransitionOutcome::Ignored(status) => (false, Some(status)),
            TransitionOutcome::NotFound => (false, None),
        };
        Self {
            job_id,
            applied,
            status,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyResponse {
    pub requested: usize,
    pub max_concurrent: usize,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => {
                warn!(error = %msg, "Store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            err if err.is_transient() => ApiError::Unavailable(err.to_string()),
            SchedulerError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        SchedulerError::Store(err).into()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/retry", post(retry_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .route("/api/queue", get(queue_status))
        .route("/api/queue/concurrency", put(set_concurrency))
        .route("/api/queue/pause", post(pause_queue))
        .route("/api/queue/resume", post(resume_queue))
        .route("/api/effects", get(list_effects))
        .route("/api/effects/{id}", get(get_effect))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_job(
    State(state): State<SharedState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let platform = match req.platform.as_deref() {
        Some(raw) => Platform::from_str(raw).map_err(ApiError::BadRequest)?,
        None => Platform::default(),
    };
    let options = match req.options {
        None | Some(serde_json::Value::Null) => empty_options(),
        Some(value @ serde_json::Value::Object(_)) => value,
        Some(_) => return Err(ApiError::BadRequest("options must be a JSON object".into())),
    };
    let request = GenerationRequest::new(req.description, platform).with_options(options);
    let job = state.scheduler.enqueue(request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(JobStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    Ok(Json(state.reporter.jobs(status).await?))
}

async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.reporter.job_status(&id).await? {
        Some(view) => Ok(Json(view)),
        None => Err(ApiError::NotFound(format!("Job {} not found", id))),
    }
}

async fn retry_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.scheduler.retry(&id).await?;
    Ok(Json(TransitionResponse::new(id, outcome)))
}

async fn cancel_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.scheduler.cancel(&id).await?;
    Ok(Json(TransitionResponse::new(id, outcome)))
}

async fn queue_status(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.queue_status().await?))
}

async fn set_concurrency(
    State(state): State<SharedState>,
    Json(req): Json<ConcurrencyRequest>,
) -> impl IntoResponse {
    let applied = state.scheduler.set_concurrency(req.max_concurrent);
    Json(ConcurrencyResponse {
        requested: req.max_concurrent,
        max_concurrent: applied,
    })
}

async fn pause_queue(State(state): State<SharedState>) -> impl IntoResponse {
    state.scheduler.pause();
    Json(state.scheduler.snapshot())
}

async fn resume_queue(State(state): State<SharedState>) -> impl IntoResponse {
    state.scheduler.resume();
    Json(state.scheduler.snapshot())
}

async fn list_effects(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.store().list_effects().await?))
}

async fn get_effect(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.scheduler.store().get_effect(&id).await? {
        Some(effect) => Ok(Json(effect)),
        None => Err(ApiError::NotFound(format!("Effect {} not found", id))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::generator::TemplateGenerator;
    use crate::scheduler::{ManualClock, SchedulerSettings};
    use crate::store::SqliteStore;

    fn test_state() -> SharedState {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let scheduler = Arc::new(Scheduler::with_clock(
            store,
            Arc::new(TemplateGenerator::new()),
            SchedulerSettings::default(),
            Arc::new(ManualClock::default()),
        ));
        Arc::new(AppState::new(scheduler))
    }

    fn test_app(state: &SharedState) -> Router {
        api_router().with_state(state.clone())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn create(state: &SharedState, description: &str) -> serde_json::Value {
        let response = test_app(state)
            .oneshot(json_request(
                "POST",
                "/api/jobs",
                serde_json::json!({"description": description, "platform": "threejs"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = test_state();
        let response = test_app(&state)
            .oneshot(empty_request("GET", "/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_job() {
        let state = test_state();
        let job = create(&state, "purple portal").await;
        assert_eq!(job["status"], "queued");
        assert_eq!(job["platform"], "threejs");
        assert_eq!(job["progress"], 0);
        assert!(job["estimated_time_ms"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_create_job_rejects_bad_input() {
        let state = test_state();
        let cases = [
            serde_json::json!({"description": "  "}),
            serde_json::json!({"description": "fire", "platform": "unity"}),
            serde_json::json!({"description": "fire", "options": [1, 2]}),
        ];
        for body in cases {
            let response = test_app(&state)
                .oneshot(json_request("POST", "/api/jobs", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let err: serde_json::Value = body_json(response.into_body()).await;
            assert!(err["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_get_job_status_payload() {
        let state = test_state();
        let job = create(&state, "snow").await;
        let id = job["id"].as_str().unwrap();

        let response = test_app(&state)
            .oneshot(empty_request("GET", &format!("/api/jobs/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(view["id"], id);
        assert_eq!(view["status"], "queued");
        assert!(view["estimatedTime"].is_number());
        assert!(view.get("result").is_none());
    }

    #[tokio::test]
    async fn test_get_missing_job_is_404() {
        let state = test_state();
        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/jobs/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_jobs_with_filter() {
        let state = test_state();
        create(&state, "one").await;
        create(&state, "two").await;

        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/jobs?status=queued"))
            .await
            .unwrap();
        let jobs: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(jobs.len(), 2);

        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/jobs?status=completed"))
            .await
            .unwrap();
        let jobs: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(jobs.is_empty());

        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/jobs?status=running"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_then_retry() {
        let state = test_state();
        let job = create(&state, "rain").await;
        let id = job["id"].as_str().unwrap();

        let response = test_app(&state)
            .oneshot(empty_request("POST", &format!("/api/jobs/{}/cancel", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["applied"], true);
        assert_eq!(body["status"], "failed");

        let response = test_app(&state)
            .oneshot(empty_request("POST", &format!("/api/jobs/{}/cancel", id)))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["applied"], false);

        let response = test_app(&state)
            .oneshot(empty_request("POST", &format!("/api/jobs/{}/retry", id)))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["applied"], true);
        assert_eq!(body["status"], "queued");
    }

    #[tokio::test]
    async fn test_retry_missing_job_is_not_an_error() {
        let state = test_state();
        let response = test_app(&state)
            .oneshot(empty_request("POST", "/api/jobs/ghost/retry"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["applied"], false);
        assert!(body["status"].is_null());
    }

    #[tokio::test]
    async fn test_queue_controls() {
        let state = test_state();
        create(&state, "one").await;

        let response = test_app(&state)
            .oneshot(json_request(
                "PUT",
                "/api/queue/concurrency",
                serde_json::json!({"max_concurrent": 15}),
            ))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["requested"], 15);
        assert_eq!(body["maxConcurrent"], 10);

        let response = test_app(&state)
            .oneshot(empty_request("POST", "/api/queue/pause"))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["paused"], true);

        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/queue"))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["queued"], 1);
        assert_eq!(body["maxConcurrent"], 10);
        assert_eq!(body["paused"], true);

        let response = test_app(&state)
            .oneshot(empty_request("POST", "/api/queue/resume"))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["paused"], false);
    }

    #[tokio::test]
    async fn test_effects_after_processing() {
        let state = test_state();
        let job = create(&state, "gold sparks").await;
        state
            .scheduler
            .tick()
            .await
            .into_batch()
            .expect("admitted")
            .settle()
            .await;

        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/effects"))
            .await
            .unwrap();
        let effects: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0]["metadata"]["jobId"], job["id"]);
        assert_eq!(effects[0]["type"], "PARTICLE");
        let effect_id = effects[0]["id"].as_str().unwrap();

        let response = test_app(&state)
            .oneshot(empty_request("GET", &format!("/api/effects/{}", effect_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = test_app(&state)
            .oneshot(empty_request("GET", "/api/effects/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_errors_map_to_status_codes() {
        let response = ApiError::from(StoreError::LockPoisoned).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError::from(StoreError::Corrupt {
            entity: "job",
            id: "abc".into(),
            message: "bad status".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response =
            ApiError::from(SchedulerError::InvalidRequest("empty".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
