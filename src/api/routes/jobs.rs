//! Job submission and slot status handlers.

use super::{JobAccepted, QueueStatusResponse};
use crate::api::AppState;
use crate::job::JobRequest;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /status/:session_key - Whether the session's slot is free
#[utoipa::path(
    get,
    path = "/status/{session_key}",
    tag = "jobs",
    params(
        ("session_key" = String, Path, description = "Session key of the browser session")
    ),
    responses(
        (status = 200, description = "Current slot status", body = QueueStatusResponse)
    )
)]
pub async fn queue_status(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> impl IntoResponse {
    let status = state.service.queue_status(&session_key).await;
    Json(QueueStatusResponse {
        session_key,
        queue_free: status.is_available(),
    })
}

/// POST /jobs - Submit a batch of links
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = JobRequest,
    responses(
        (status = 202, description = "Job queued", body = JobAccepted),
        (status = 409, description = "The session's slot is occupied", body = crate::error::ApiError),
        (status = 422, description = "No usable links (uncorrected input)", body = crate::error::ApiError),
        (status = 503, description = "Service is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Response {
    match state.service.submit(request).await {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(JobAccepted {
                id: handle.id,
                session_key: handle.session_key.clone(),
                queued_at: handle.queued_at,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
