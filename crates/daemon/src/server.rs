//! HTTP server for clipperd
//!
//! Exposes the submission, progress-streaming, and artifact-download
//! endpoints. Progress is delivered as Server-Sent Events; the stream ends
//! when the job's queue closes after its terminal event.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::progress::{ClipRequest, SubmitResponse};
use crate::supervisor::{SubmitError, Supervisor};

/// Errors that can occur when running the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct AppState {
    supervisor: Arc<Supervisor>,
}

impl AppState {
    /// Create the handler state around a supervisor.
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }
}

/// Handler for POST /submit
///
/// Non-blocking: responds as soon as the pipeline is launched. Validation
/// and pre-spawn failures come back here; later failures are reported on the
/// job's progress stream instead.
async fn submit(State(state): State<AppState>, Json(request): Json<ClipRequest>) -> Response {
    match state.supervisor.submit(request).await {
        Ok(job_id) => Json(SubmitResponse::started(job_id)).into_response(),
        Err(e @ SubmitError::InvalidRequest(_)) => {
            error!(error = %e, "rejected invalid clip request");
            (StatusCode::BAD_REQUEST, Json(SubmitResponse::error())).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to start clip job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SubmitResponse::error()),
            )
                .into_response()
        }
    }
}

/// Handler for GET /progress/:job_id
///
/// Streams the job's ordered progress events as SSE; each event is one JSON
/// `data:` frame. The response ends once the terminal event has been
/// delivered and the queue closes.
async fn progress(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let Some(queue) = state
        .supervisor
        .registry()
        .lookup_progress_queue(&job_id)
        .await
    else {
        return (StatusCode::NOT_FOUND, "Process not found").into_response();
    };

    let events = stream::unfold(queue, |queue| async move {
        let event = queue.recv().await?;
        Some((Event::default().json_data(&event), queue))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Handler for GET /download/:job_id
///
/// Streams the artifact bytes with a content type derived from the file
/// extension and an attachment disposition naming the file.
async fn download(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let Some(artifact_path) = state.supervisor.registry().lookup(&job_id).await else {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };

    let file = match tokio::fs::File::open(&artifact_path).await {
        Ok(file) => file,
        Err(e) => {
            error!(%job_id, path = %artifact_path.display(), error = %e, "failed to open artifact");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error opening file").into_response();
        }
    };

    let file_name = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    let content_type = mime_guess::from_path(&artifact_path).first_or_octet_stream();

    info!(%job_id, file = %file_name, "serving artifact download");

    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// Creates the axum Router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/progress/:job_id", get(progress))
        .route("/download/:job_id", get(download))
        .with_state(state)
}

/// Runs the HTTP server on the configured address
///
/// # Arguments
/// * `state` - Handler state wrapping the supervisor and registry
/// * `bind_addr` - Address to listen on, e.g. "127.0.0.1:8080"
pub async fn run_server(state: AppState, bind_addr: &str) -> Result<(), ServerError> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
