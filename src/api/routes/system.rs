//! System handlers: health, events, OpenAPI.

use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "accepting_jobs": state.service.is_accepting(),
        "active_jobs": state.service.active_jobs(),
    }))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent events stream
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.service.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json_data) => {
                let event_type = match &event {
                    crate::types::Event::JobQueued { .. } => "job_queued",
                    crate::types::Event::JobStarted { .. } => "job_started",
                    crate::types::Event::JobRejected { .. } => "job_rejected",
                    crate::types::Event::FetchFinished { .. } => "fetch_finished",
                    crate::types::Event::FileUploaded { .. } => "file_uploaded",
                    crate::types::Event::FileFailed { .. } => "file_failed",
                    crate::types::Event::JobFinished { .. } => "job_finished",
                };
                Some(Ok(SseEvent::default().event(event_type).data(json_data)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                None
            }
        },
        Err(e) => {
            // Lagged subscriber: skip the missed events
            tracing::warn!(error = %e, "Event stream lagged");
            None
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
