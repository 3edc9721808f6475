//! API request handlers

use super::types::*;
use super::AppState;
use crate::error::Error;
use crate::meta::{JobStatus, NewMaterial, QueueCounts, QueueJob};
use crate::queue::MaterialStatusReport;
use crate::rag::{CourseStats, QueryResponse};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info};

/// Error response carrying the envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::MaterialNotFound(_) | Error::JobNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } | Error::AttemptsExhausted(_) => StatusCode::CONFLICT,
            _ => {
                error!(error = %err, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Health check handler
pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Enqueue a material (POST /api/materials)
pub async fn enqueue_material(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<EnqueueResponse> {
    info!(material_id = %req.material_id, "POST /api/materials");

    if req.material_id.trim().is_empty() {
        return Err(ApiError::bad_request("material_id must not be empty"));
    }
    if req.course_id.trim().is_empty() {
        return Err(ApiError::bad_request("course_id must not be empty"));
    }
    let file_url = url::Url::parse(&req.file_url)
        .map_err(|e| ApiError::bad_request(format!("invalid file_url: {}", e)))?;
    if file_url.scheme() == "file" && !state.allow_file_urls {
        return Err(ApiError::bad_request("file:// URLs are not accepted"));
    }

    let material = NewMaterial {
        title: req
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| req.material_id.clone()),
        id: req.material_id,
        file_url: req.file_url,
        course_id: req.course_id,
    };
    let enqueued = state.queue.add_job(&material).await?;

    ok(EnqueueResponse {
        job_id: enqueued.job.id,
        created: enqueued.created,
        status: enqueued.job.status,
    })
}

/// GET /api/materials/:material_id/status
pub async fn material_status(
    State(state): State<AppState>,
    Path(material_id): Path<String>,
) -> ApiResult<MaterialStatusReport> {
    match state.queue.get_material_status(&material_id).await? {
        Some(report) => ok(report),
        None => Err(Error::MaterialNotFound(material_id).into()),
    }
}

/// POST /api/query
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResponse> {
    info!(course_id = req.course_id.as_deref().unwrap_or("*"), "POST /api/query");

    if req.question.trim().is_empty() {
        return Err(ApiError::bad_request("question must not be empty"));
    }

    let response = state
        .engine
        .query_with_history(&req.question, &req.chat_history, req.course_id.as_deref())
        .await;
    ok(response)
}

/// GET /api/stats
pub async fn course_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> ApiResult<CourseStats> {
    ok(state
        .engine
        .get_course_stats(params.course_id.as_deref())
        .await?)
}

/// GET /api/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<QueueCounts> {
    ok(state.queue.get_queue_stats().await?)
}

/// GET /api/queue/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobsQuery>,
) -> ApiResult<Vec<QueueJob>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    ok(state.queue.list_jobs(status, params.limit.min(1000)).await?)
}

/// GET /api/queue/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<QueueJob> {
    match state.queue.get_job_status(&job_id).await? {
        Some(job) => ok(job),
        None => Err(Error::JobNotFound(job_id).into()),
    }
}

/// POST /api/queue/retry-failed
pub async fn retry_failed(State(state): State<AppState>) -> ApiResult<RetryFailedResponse> {
    let jobs = state.queue.retry_failed().await?;
    ok(RetryFailedResponse {
        requeued: jobs.len(),
        jobs,
    })
}

/// POST /api/queue/jobs/:job_id/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Option<Json<RetryJobRequest>>,
) -> ApiResult<QueueJob> {
    let reset_attempts = body.map(|Json(b)| b.reset_attempts).unwrap_or(false);
    ok(state.queue.retry_job(&job_id, reset_attempts).await?)
}

/// POST /api/queue/reclaim
pub async fn reclaim(State(state): State<AppState>) -> ApiResult<ReclaimResponse> {
    let jobs = state.queue.reclaim_expired_leases().await?;
    ok(ReclaimResponse {
        reclaimed: jobs.len(),
        jobs,
    })
}
