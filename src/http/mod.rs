//! HTTP surface over a shared `FrameSource`.
//!
//! - `/` and `/video_feed`: viewer entry point and MJPEG stream (`stream`)
//! - `/devices`, `/select_device`, `/resolutions`, `/set_resolution`,
//!   `/capture`, `/status`: JSON control endpoints (`control`)
//! - `/static/*`: files from the configured static directory

mod control;
mod stream;

pub use stream::{mjpeg_part, mjpeg_stream, BOUNDARY};

use crate::config::StreamSettings;
use crate::frame_source::FrameSource;
use crate::storage::CaptureStore;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<FrameSource>,
    pub store: Arc<CaptureStore>,
    pub stream: StreamSettings,
}

impl AppState {
    pub fn new(source: Arc<FrameSource>, store: CaptureStore, stream: StreamSettings) -> Self {
        Self {
            source,
            store: Arc::new(store),
            stream,
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(stream::index))
        .route("/video_feed", get(stream::video_feed))
        .route("/devices", get(control::list_devices))
        .route("/select_device", post(control::select_device))
        .route("/resolutions", get(control::list_resolutions))
        .route("/set_resolution", post(control::set_resolution))
        .route("/capture", post(control::capture))
        .route("/status", get(control::status))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Run a blocking `FrameSource` call off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        log::error!("Blocking camera task failed: {}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "status": "error",
            "message": message.into(),
        })),
    )
        .into_response()
}
