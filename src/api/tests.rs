use super::*;
use crate::fetch::YtDlpExtractor;
use crate::gate::{GateStore, MemoryGateStore};
use crate::relay::WebDavBackend;
use crate::service::Components;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tower::ServiceExt;

/// Service whose worker pool is never started, so submitted jobs stay queued
fn create_test_service(config: Config) -> (Arc<RelayService>, Arc<MemoryGateStore>) {
    let gate_store = Arc::new(MemoryGateStore::new());
    let storage = WebDavBackend::new(&config.relay).unwrap();
    let service = RelayService::with_components(
        config,
        Components {
            gate_store: gate_store.clone(),
            extractor: Arc::new(YtDlpExtractor::new(PathBuf::from("/nonexistent/yt-dlp"))),
            storage: Arc::new(storage),
        },
    );
    (Arc::new(service), gate_store)
}

fn test_router() -> (Router, Arc<MemoryGateStore>) {
    let config = Config::default();
    let (service, gate_store) = create_test_service(config.clone());
    (create_router(service, Arc::new(config)), gate_store)
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_job(payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _gate) = test_router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["accepting_jobs"], true);
    assert_eq!(json["active_jobs"], 0);
}

#[tokio::test]
async fn test_status_of_unknown_session_is_free() {
    let (app, _gate) = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status/abc_youtube_download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["session_key"], "abc_youtube_download");
    assert_eq!(json["queue_free"], true);
}

#[tokio::test]
async fn test_status_of_busy_session() {
    let (app, gate) = test_router();
    gate.set_with_ttl("abc_youtube_download", "busy", Duration::from_secs(60))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status/abc_youtube_download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["queue_free"], false);
}

#[tokio::test]
async fn test_submit_job_accepted() {
    let (app, _gate) = test_router();

    let response = app
        .oneshot(post_job(json!({
            "session_key": "abc_youtube_download",
            "links": ["https://www.youtube.com/watch?v=dQw4w9WgXcQ", ""],
            "path": "Music",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["id"], 1);
    assert_eq!(json["session_key"], "abc_youtube_download");
    assert!(json["queued_at"].is_string());
}

#[tokio::test]
async fn test_submit_job_while_busy_conflicts() {
    let (app, gate) = test_router();
    gate.set_with_ttl("abc_youtube_download", "busy", Duration::from_secs(60))
        .await
        .unwrap();

    let response = app
        .oneshot(post_job(json!({
            "session_key": "abc_youtube_download",
            "links": ["https://www.youtube.com/watch?v=dQw4w9WgXcQ"],
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "queue_busy");
}

#[tokio::test]
async fn test_submit_job_without_valid_links_is_unprocessable() {
    let (app, _gate) = test_router();

    let response = app
        .oneshot(post_job(json!({
            "session_key": "abc_youtube_download",
            "links": ["", "not a url", "ftp://example.com/a.mp3"],
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_submit_job_with_malformed_body() {
    let (app, _gate) = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_submit_after_shutdown_is_unavailable() {
    let config = Config::default();
    let (service, _gate) = create_test_service(config.clone());
    service.shutdown().await.unwrap();
    let app = create_router(service, Arc::new(config));

    let response = app
        .oneshot(post_job(json!({
            "session_key": "abc_youtube_download",
            "links": ["https://www.youtube.com/watch?v=dQw4w9WgXcQ"],
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _gate) = test_router();

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS headers should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let mut config = Config::default();
    config.api.cors_enabled = false;
    let (service, _gate) = create_test_service(config.clone());
    let app = create_router(service, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_openapi_spec_lists_routes() {
    let (app, _gate) = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let paths = json["paths"].as_object().unwrap();
    assert!(paths.contains_key("/jobs"));
    assert!(paths.contains_key("/status/{session_key}"));
    assert!(paths.contains_key("/health"));
    assert!(json["components"]["schemas"]["JobRequest"].is_object());
}

#[tokio::test]
async fn test_swagger_ui_disabled() {
    let mut config = Config::default();
    config.api.swagger_ui = false;
    let (service, _gate) = create_test_service(config.clone());
    let app = create_router(service, Arc::new(config));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/swagger-ui/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_serve_until_stops_on_signal() {
    let mut config = Config::default();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let (service, _gate) = create_test_service(config.clone());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_until(service, Arc::new(config), async move {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
