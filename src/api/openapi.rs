//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the audio-relay REST API
///
/// Served at `/openapi.json`, and to Swagger UI at `/swagger-ui` when enabled.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "audio-relay REST API",
        version = "0.1.0",
        description = "Submit batches of media links, poll the per-session job slot and follow job events"
    ),
    paths(
        crate::api::routes::health_check,
        crate::api::routes::queue_status,
        crate::api::routes::submit_job,
        crate::api::routes::event_stream,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::job::JobRequest,
        crate::api::routes::JobAccepted,
        crate::api::routes::QueueStatusResponse,
        crate::types::JobId,
        crate::types::JobOutcome,
        crate::types::JobReport,
        crate::types::Event,
        crate::gate::GateStatus,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Job submission and slot status"),
        (name = "system", description = "Health, events and documentation")
    )
)]
pub struct ApiDoc;
