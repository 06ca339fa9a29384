use super::AppState;
use crate::frame_source::FrameSource;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

pub const BOUNDARY: &str = "frame";

const INDEX_REDIRECT: &str = r#"<meta http-equiv="refresh" content="0; url=/static/index.html">"#;

pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_REDIRECT)
}

pub(super) async fn video_feed(State(state): State<AppState>) -> Response {
    log::debug!("MJPEG client connected");
    let parts = mjpeg_stream(
        Arc::clone(&state.source),
        state.stream.jpeg_quality,
        state.stream.poll_interval(),
    );
    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
        )],
        Body::from_stream(parts),
    )
        .into_response()
}

/// One multipart section carrying `jpeg`.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Endless MJPEG parts, polling the source every `interval`. Polls that find
/// no frame emit nothing.
pub fn mjpeg_stream(
    source: Arc<FrameSource>,
    quality: u8,
    interval: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold((source, false), move |(source, emitted)| async move {
        if emitted {
            tokio::time::sleep(interval).await;
        }
        loop {
            let reader = Arc::clone(&source);
            let jpeg = tokio::task::spawn_blocking(move || reader.get_jpeg(quality))
                .await
                .ok()
                .flatten();
            if let Some(jpeg) = jpeg {
                return Some((Ok(mjpeg_part(&jpeg)), (source, true)));
            }
            tokio::time::sleep(interval).await;
        }
    })
}
