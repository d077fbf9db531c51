//! REST API server module
//!
//! A thin HTTP surface over [`RelayService`]: the browser front end polls
//! the session's slot, submits jobs and optionally follows job events.

use crate::{Config, RelayService, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `GET /status/:session_key` - Whether the session's slot is free
/// - `POST /jobs` - Submit a job
/// - `GET /events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(service: Arc<RelayService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config.clone());

    let router = Router::new()
        .route("/health", get(routes::health_check))
        .route("/status/:session_key", get(routes::queue_status))
        .route("/jobs", post(routes::submit_job))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec));

    // Swagger UI gets its own document path so it does not collide with /openapi.json
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails. See [`serve_until`] for a server that stops
/// on a signal.
///
/// # Example
///
/// ```no_run
/// use audio_relay::{Config, RelayService};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let service = Arc::new(RelayService::new((*config).clone())?);
/// service.start_worker_pool();
///
/// audio_relay::api::start_api_server(service, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(service: Arc<RelayService>, config: Arc<Config>) -> Result<()> {
    serve_until(service, config, std::future::pending()).await
}

/// Serve the API until `shutdown` completes, then stop accepting connections
pub async fn serve_until<F>(
    service: Arc<RelayService>,
    config: Arc<Config>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(service, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
