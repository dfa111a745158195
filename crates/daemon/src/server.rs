//! Status HTTP server for convertd
//!
//! Exposes the status board over HTTP for the dashboard and other pollers:
//! `GET /status` returns the full snapshot, `POST /cancel/:id` flips a
//! job's cancel flag.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::board::{SharedBoard, StatusSnapshot};

/// Default bind address for the status endpoint.
pub const STATUS_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 7879);

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /status: the current snapshot as JSON.
async fn get_status(State(board): State<SharedBoard>) -> Json<StatusSnapshot> {
    Json(board.snapshot().await)
}

/// Handler for POST /cancel/:id: request cancellation of one job.
async fn cancel_job(State(board): State<SharedBoard>, Path(id): Path<String>) -> StatusCode {
    if board.cancel(&id).await {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Creates the axum Router with the status endpoints.
pub fn create_status_router(board: SharedBoard) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/cancel/:id", post(cancel_job))
        .with_state(board)
}

/// Runs the status HTTP server on 127.0.0.1:7879.
pub async fn run_status_server(board: SharedBoard) -> Result<(), ServerError> {
    let app = create_status_router(board);
    let addr = SocketAddr::from(STATUS_ADDR);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await.map_err(ServerError::from)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{new_shared_board, JobState};
    use crate::job::JobRequest;
    use crate::status::new_shared_status;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::PathBuf;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_get_status_returns_json() {
        let board = new_shared_board();
        let status = new_shared_status();
        status.set_percentage(61.5);
        status.set_eta("00:08:20");
        status.set_action("Converting with handbrake");

        let job = JobRequest::new(PathBuf::from("/rec/show.ts"), "mp4-normal");
        board.register(&job, status).await;
        board.set_state(&job.id, JobState::Converting).await;

        let app = create_status_router(board.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .expect("should have content-type header");
        assert!(content_type.to_str().unwrap().contains("application/json"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: StatusSnapshot =
            serde_json::from_slice(&body).expect("should deserialize to StatusSnapshot");

        assert_eq!(snapshot.jobs.len(), 1);
        assert_eq!(snapshot.jobs[0].id, job.id);
        assert_eq!(snapshot.jobs[0].state, JobState::Converting);
        assert!((snapshot.jobs[0].percentage_complete - 61.5).abs() < 0.001);
        assert_eq!(snapshot.jobs[0].eta, "00:08:20");
        assert_eq!(snapshot.running_jobs, 1);
    }

    #[tokio::test]
    async fn test_get_status_empty_board() {
        let board = new_shared_board();
        let app = create_status_router(board);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();

        assert!(snapshot.jobs.is_empty());
        assert_eq!(snapshot.queue_len, 0);
        assert_eq!(snapshot.running_jobs, 0);
    }

    #[tokio::test]
    async fn test_cancel_endpoint() {
        let board = new_shared_board();
        let status = new_shared_status();
        let job = JobRequest::new(PathBuf::from("/rec/show.ts"), "mp4-normal");
        board.register(&job, status.clone()).await;

        let app = create_status_router(board.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/cancel/{}", job.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(status.is_cancelled());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cancel/unknown-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_json_field_names() {
        let board = new_shared_board();
        let app = create_status_router(board);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json_str = String::from_utf8(body.to_vec()).unwrap();

        for field in [
            "timestamp_unix_ms",
            "jobs",
            "system",
            "cpu_usage_percent",
            "queue_len",
            "running_jobs",
            "completed_jobs",
            "failed_jobs",
            "cancelled_jobs",
        ] {
            assert!(json_str.contains(field), "missing field {}", field);
        }
    }
}
