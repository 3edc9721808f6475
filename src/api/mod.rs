//! HTTP API
//!
//! Exposes enqueue, status, query and queue administration over JSON.
//! Every response uses the `{success, data, error}` envelope.

mod handlers;
mod types;

pub use handlers::*;
pub use types::*;

use crate::error::Result;
use crate::queue::{JobQueue, Worker};
use crate::rag::QueryEngine;
use crate::services::Services;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    pub engine: Arc<QueryEngine>,
    pub allow_file_urls: bool,
}

impl From<&Services> for AppState {
    fn from(services: &Services) -> Self {
        Self {
            queue: services.queue.clone(),
            engine: services.engine.clone(),
            allow_file_urls: services.allow_file_urls,
        }
    }
}

/// Routes mounted under `/api`
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Materials
        .route("/materials", post(handlers::enqueue_material))
        .route(
            "/materials/:material_id/status",
            get(handlers::material_status),
        )
        // Question answering
        .route("/query", post(handlers::query))
        .route("/stats", get(handlers::course_stats))
        // Queue administration
        .route("/queue/stats", get(handlers::queue_stats))
        .route("/queue/jobs", get(handlers::list_jobs))
        .route("/queue/jobs/:job_id", get(handlers::get_job))
        .route("/queue/jobs/:job_id/retry", post(handlers::retry_job))
        .route("/queue/retry-failed", post(handlers::retry_failed))
        .route("/queue/reclaim", post(handlers::reclaim))
        .with_state(state)
}

/// Full application router with tracing and optional CORS
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .nest("/api", api_routes(state))
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        info!("CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    app
}

/// Serve the API until Ctrl-C, optionally running the worker in-process
pub async fn serve_api(
    services: &Services,
    host: &str,
    port: u16,
    enable_cors: bool,
    run_worker: bool,
) -> Result<()> {
    let app = build_router(AppState::from(services), enable_cors);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let worker_handle = if run_worker {
        let worker = Worker::new(services.queue.clone());
        let mut stop = stop_rx.clone();
        Some(tokio::spawn(async move {
            worker
                .run(async move {
                    let _ = stop.changed().await;
                })
                .await
        }))
    } else {
        info!("Background worker disabled");
        None
    };

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}/api", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    let _ = stop_tx.send(true);
    if let Some(handle) = worker_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Worker stopped with error"),
            Err(e) => error!(error = %e, "Worker task panicked"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::DocumentExtractor;
    use crate::queue::ProcessOutcome;
    use crate::rag::FALLBACK_ANSWER;
    use crate::test_support::{
        paged_document, test_config, FakeFetcher, FakeProvider, RecordingInvalidator,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        services: Services,
        fetcher: Arc<FakeFetcher>,
        _tmp: TempDir,
    }

    async fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.queue.backoff_base_secs = 0;
        config.queue.backoff_max_secs = 0;
        let db = crate::meta::MetaDb::new(&config.paths.db_file).await.unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        let services = Services::from_parts(
            db,
            fetcher.clone(),
            Arc::new(DocumentExtractor::new()),
            Arc::new(FakeProvider::new(8)),
            Arc::new(RecordingInvalidator::default()),
            &config,
        );
        Fixture {
            app: build_router(AppState::from(&services), false),
            services,
            fetcher,
            _tmp: tmp,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn enqueue_body(id: &str, course: &str) -> Value {
        json!({
            "material_id": id,
            "file_url": format!("mem://{id}"),
            "title": format!("Week {id}"),
            "course_id": course,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture().await;
        let (status, body) = send(&fx.app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_and_reports_status() {
        let fx = fixture().await;
        let (status, first) =
            send(&fx.app, "POST", "/api/materials", Some(enqueue_body("m1", "c1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["created"], true);

        let (_, second) =
            send(&fx.app, "POST", "/api/materials", Some(enqueue_body("m1", "c1"))).await;
        assert_eq!(second["data"]["job_id"], first["data"]["job_id"]);
        assert_eq!(second["data"]["created"], false);

        let (status, report) = send(&fx.app, "GET", "/api/materials/m1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["data"]["processing_status"], "queued");
        assert_eq!(report["data"]["queue_job"]["id"], first["data"]["job_id"]);
    }

    #[tokio::test]
    async fn test_enqueue_validates_input() {
        let fx = fixture().await;
        let mut body = enqueue_body("m1", "c1");
        body["file_url"] = json!("not a url");
        let (status, response) = send(&fx.app, "POST", "/api/materials", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("file_url"));

        let (status, _) =
            send(&fx.app, "POST", "/api/materials", Some(enqueue_body(" ", "c1"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_file_urls() {
        let fx = fixture().await;
        let mut body = enqueue_body("m1", "c1");
        body["file_url"] = json!("file:///etc/passwd");
        let (status, response) = send(&fx.app, "POST", "/api/materials", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response["error"].as_str().unwrap().contains("file"));

        // Nothing was queued
        let (_, stats) = send(&fx.app, "GET", "/api/queue/stats", None).await;
        assert_eq!(stats["data"]["total"], 0);
        let (status, _) = send(&fx.app, "GET", "/api/materials/m1/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_resources_are_404() {
        let fx = fixture().await;
        let (status, body) = send(&fx.app, "GET", "/api/materials/nope/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(&fx.app, "GET", "/api/queue/jobs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&fx.app, "POST", "/api/queue/jobs/nope/retry", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_processed_material_is_queryable() {
        let fx = fixture().await;
        fx.fetcher.insert("mem://m1", paged_document(3));
        send(&fx.app, "POST", "/api/materials", Some(enqueue_body("m1", "c1"))).await;
        assert!(matches!(
            fx.services.queue.process_next().await.unwrap(),
            ProcessOutcome::Completed { .. }
        ));

        let (_, report) = send(&fx.app, "GET", "/api/materials/m1/status", None).await;
        assert_eq!(report["data"]["processing_status"], "completed");
        assert_eq!(report["data"]["chunks_count"], 3);

        let (status, answer) = send(
            &fx.app,
            "POST",
            "/api/query",
            Some(json!({
                "question": "What does page 2 cover?",
                "chat_history": [{"question": "Hi?", "answer": "Hello."}],
                "course_id": "c1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let sources = answer["data"]["source_documents"].as_array().unwrap();
        assert!(!sources.is_empty());
        assert!(sources.iter().all(|s| s["course_id"] == "c1"));
        assert!(answer["data"]["follow_up_questions"].as_array().unwrap().len() >= 2);

        let (_, stats) = send(&fx.app, "GET", "/api/stats?course_id=c1", None).await;
        assert_eq!(stats["data"]["processed_materials"], 1);
        assert_eq!(stats["data"]["total_chunks"], 3);
        assert_eq!(stats["data"]["average_chunks_per_material"], 3.0);
    }

    #[tokio::test]
    async fn test_query_other_course_returns_fallback() {
        let fx = fixture().await;
        let (status, body) = send(
            &fx.app,
            "POST",
            "/api/query",
            Some(json!({"question": "Anything?", "course_id": "c2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["answer"], FALLBACK_ANSWER);
        assert_eq!(body["data"]["source_documents"], json!([]));

        let (status, _) = send(
            &fx.app,
            "POST",
            "/api/query",
            Some(json!({"question": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_queue_administration() {
        let fx = fixture().await;
        let (_, enqueued) =
            send(&fx.app, "POST", "/api/materials", Some(enqueue_body("m1", "c1"))).await;
        let job_id = enqueued["data"]["job_id"].as_str().unwrap().to_string();

        let (_, stats) = send(&fx.app, "GET", "/api/queue/stats", None).await;
        assert_eq!(stats["data"], json!({
            "pending": 1, "processing": 0, "completed": 0, "failed": 0, "total": 1
        }));

        let (_, jobs) = send(&fx.app, "GET", "/api/queue/jobs?status=pending", None).await;
        assert_eq!(jobs["data"][0]["id"], job_id.as_str());

        let (status, _) = send(&fx.app, "GET", "/api/queue/jobs?status=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // A pending job cannot be retried
        let (status, _) = send(
            &fx.app,
            "POST",
            &format!("/api/queue/jobs/{job_id}/retry"),
            Some(json!({"reset_attempts": true})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // No document behind the URL: three fetch failures exhaust the job
        for _ in 0..3 {
            fx.services.queue.process_next().await.unwrap();
        }
        let (_, job) = send(&fx.app, "GET", &format!("/api/queue/jobs/{job_id}"), None).await;
        assert_eq!(job["data"]["status"], "failed");

        let (_, requeued) = send(&fx.app, "POST", "/api/queue/retry-failed", None).await;
        assert_eq!(requeued["data"]["requeued"], 0);

        let (status, retried) = send(
            &fx.app,
            "POST",
            &format!("/api/queue/jobs/{job_id}/retry"),
            Some(json!({"reset_attempts": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(retried["data"]["attempts"], 0);
        assert_eq!(retried["data"]["status"], "pending");

        let (_, reclaimed) = send(&fx.app, "POST", "/api/queue/reclaim", None).await;
        assert_eq!(reclaimed["data"]["reclaimed"], 0);
    }
}
