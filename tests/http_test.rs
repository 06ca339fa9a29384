//! HTTP routes driven in-process through the router

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crabstream::config::StreamSettings;
use crabstream::http::{create_router, AppState};
use crabstream::testing::SyntheticBackend;
use crabstream::{CaptureStore, FrameSource, RunState, SourceOptions};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    source: Arc<FrameSource>,
    router: Router,
    static_dir: TempDir,
    capture_dir: TempDir,
}

fn test_app() -> TestApp {
    let static_dir = tempfile::tempdir().unwrap();
    let capture_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        static_dir.path().join("index.html"),
        "<html><body><img src=\"/video_feed\"></body></html>",
    )
    .unwrap();

    let source = Arc::new(FrameSource::with_backend(
        SyntheticBackend::demo(),
        SourceOptions::default(),
    ));
    let settings = StreamSettings {
        jpeg_quality: 80,
        poll_interval_ms: 20,
    };
    let state = AppState::new(
        Arc::clone(&source),
        CaptureStore::new(capture_dir.path().join("captures")),
        settings,
    );
    let router = create_router(state, static_dir.path());

    TestApp {
        source,
        router,
        static_dir,
        capture_dir,
    }
}

async fn wait_for_frame(source: &FrameSource) {
    for _ in 0..200 {
        if source.get_frame().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no frame within 1s");
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_redirects_to_viewer() {
    let app = test_app();
    let response = app.router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"meta http-equiv="refresh""#));
    assert!(text.contains("/static/index.html"));
}

#[tokio::test]
async fn test_static_files_are_served() {
    let app = test_app();
    assert!(app.static_dir.path().join("index.html").exists());
    let response = app.router.oneshot(get("/static/index.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app();
    let response = app.router.oneshot(get("/invalid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_video_feed_streams_multipart_jpeg() {
    let app = test_app();
    app.source.start().unwrap();
    wait_for_frame(&app.source).await;

    let response = app.router.oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut parts = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), parts.next())
        .await
        .expect("stream part within 2s")
        .expect("stream not ended")
        .unwrap();

    let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    assert!(first.starts_with(header));
    assert!(first.ends_with(b"\r\n"));
    let jpeg = &first[header.len()..first.len() - 2];
    let decoded = image::load_from_memory(jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 480));

    app.source.stop();
}

#[tokio::test]
async fn test_device_listing() {
    let app = test_app();
    let response = app.router.oneshot(get("/devices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["path"], "/dev/video0");
    assert_eq!(devices[0]["name"], "Synthetic HD Camera (/dev/video0)");
}

#[tokio::test]
async fn test_select_device() {
    let app = test_app();
    app.source.start().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json("/select_device", json!({ "path": "/dev/video2" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "success" }));
    assert_eq!(app.source.device_id().to_string(), "/dev/video2");

    let response = app
        .router
        .oneshot(post_json("/select_device", json!({ "path": "/dev/video9" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("/dev/video9"));
    assert_eq!(app.source.device_id().to_string(), "/dev/video2");
    assert_eq!(app.source.run_state(), RunState::Running);

    app.source.stop();
}

#[tokio::test]
async fn test_select_device_rejects_empty_path() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_json("/select_device", json!({ "path": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], "error");
}

#[tokio::test]
async fn test_resolution_listing() {
    let app = test_app();
    let response = app.router.oneshot(get("/resolutions")).await.unwrap();
    assert_eq!(
        json_body(response).await,
        json!({
            "resolutions": [
                { "width": 640, "height": 480 },
                { "width": 1280, "height": 720 },
            ]
        })
    );
}

#[tokio::test]
async fn test_set_resolution() {
    let app = test_app();
    app.source.start().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/set_resolution",
            json!({ "width": 1280, "height": 720 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "status": "success", "width": 1280, "height": 720 })
    );

    let response = app
        .router
        .oneshot(post_json(
            "/set_resolution",
            json!({ "width": 1920, "height": 1080 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["negotiated"], json!({ "width": 1280, "height": 720 }));
    assert!(app.source.is_running());

    app.source.stop();
}

#[tokio::test]
async fn test_capture_writes_jpeg() {
    let app = test_app();
    app.source.start().unwrap();
    wait_for_frame(&app.source).await;

    let response = app
        .router
        .oneshot(Request::post("/capture").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("capture_") && filename.ends_with(".jpg"));

    let path = app.capture_dir.path().join("captures").join(filename);
    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 480));

    app.source.stop();
}

#[tokio::test]
async fn test_capture_without_frame_fails() {
    let app = test_app();
    let response = app
        .router
        .oneshot(Request::post("/capture").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["status"], "error");
}

#[tokio::test]
async fn test_status_reports_source_state() {
    let app = test_app();

    let response = app.router.clone().oneshot(get("/status")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["device"], "/dev/video0");
    assert!(body["resolution"].is_null());

    app.source.start().unwrap();
    wait_for_frame(&app.source).await;
    let response = app.router.oneshot(get("/status")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "running");
    assert_eq!(body["resolution"], json!({ "width": 640, "height": 480 }));
    assert!(body["latest_sequence"].as_u64().unwrap() >= 1);

    app.source.stop();
}
