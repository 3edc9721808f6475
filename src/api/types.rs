//! API request and response types

use crate::meta::QueueJob;
use crate::rag::ChatTurn;
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Enqueue request sent by the upload handler
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub material_id: String,
    pub file_url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub course_id: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: String,
    /// False when the material already had a job
    pub created: bool,
    pub status: String,
}

/// RAG query request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    #[serde(default)]
    pub course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub course_id: Option<String>,
}

/// Job listing parameters
#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_jobs_limit")]
    pub limit: u32,
}

fn default_jobs_limit() -> u32 {
    50
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryJobRequest {
    #[serde(default)]
    pub reset_attempts: bool,
}

#[derive(Debug, Serialize)]
pub struct RetryFailedResponse {
    pub requeued: usize,
    pub jobs: Vec<QueueJob>,
}

#[derive(Debug, Serialize)]
pub struct ReclaimResponse {
    pub reclaimed: usize,
    pub jobs: Vec<QueueJob>,
}
