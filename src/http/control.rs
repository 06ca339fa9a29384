use super::{blocking, error_response, AppState};
use crate::types::DeviceId;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct SelectDeviceRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct SetResolutionRequest {
    pub width: u32,
    pub height: u32,
}

pub(super) async fn list_devices(State(state): State<AppState>) -> Response {
    let source = state.source.clone();
    match blocking(move || source.list_available_devices()).await {
        Ok(devices) => {
            log::debug!("Found {} capture devices", devices.len());
            Json(json!({ "devices": devices })).into_response()
        }
        Err(response) => response,
    }
}

pub(super) async fn select_device(
    State(state): State<AppState>,
    Json(req): Json<SelectDeviceRequest>,
) -> Response {
    let device: DeviceId = match req.path.parse() {
        Ok(device) => device,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let source = state.source.clone();
    match blocking(move || source.switch_device(device)).await {
        Ok(Ok(())) => Json(json!({ "status": "success" })).into_response(),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(response) => response,
    }
}

pub(super) async fn list_resolutions(State(state): State<AppState>) -> Response {
    let source = state.source.clone();
    match blocking(move || source.list_supported_resolutions()).await {
        Ok(resolutions) => Json(json!({ "resolutions": resolutions })).into_response(),
        Err(response) => response,
    }
}

pub(super) async fn set_resolution(
    State(state): State<AppState>,
    Json(req): Json<SetResolutionRequest>,
) -> Response {
    let source = state.source.clone();
    match blocking(move || source.set_resolution(req.width, req.height)).await {
        Ok(Ok(actual)) => Json(json!({
            "status": "success",
            "width": actual.width,
            "height": actual.height,
        }))
        .into_response(),
        Ok(Err(e)) => {
            let mut body = json!({
                "status": "error",
                "message": e.to_string(),
            });
            if let Some(negotiated) = e.negotiated() {
                body["negotiated"] = json!(negotiated);
            }
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
        Err(response) => response,
    }
}

pub(super) async fn capture(State(state): State<AppState>) -> Response {
    let (filename, path) = match state.store.next_path() {
        Ok(target) => target,
        Err(e) => {
            log::error!("Capture directory unavailable: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let source = state.source.clone();
    match blocking(move || source.capture_to_file(&path)).await {
        Ok(true) => Json(json!({ "status": "success", "filename": filename })).into_response(),
        Ok(false) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "capture failed"),
        Err(response) => response,
    }
}

pub(super) async fn status(State(state): State<AppState>) -> Response {
    let source = state.source.clone();
    match blocking(move || source.status()).await {
        Ok(status) => Json(status).into_response(),
        Err(response) => response,
    }
}
