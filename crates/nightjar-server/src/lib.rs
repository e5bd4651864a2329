// nightjar-server/src/lib.rs
// ============================================================
// HTTP surface for Nightjar
// ------------------------------------------------------------
//   GET  /                          → viewer page
//   GET  /video_feed                → multipart MJPEG stream
//   GET  /frame                     → latest JPEG (503 if none)
//   GET  /api/state                 → StateReport JSON
//   POST /api/brightness            {"value": number, truncated}
//   POST /api/contrast              {"value": float}
//   POST /api/night_mode            {"enabled": bool}
//   POST /api/detection_model       {"model": "none|yolo|rfdetr"}
//   POST /api/detection_confidence  {"confidence": float}
//   POST /api/capture               {"output_dir": path}
// ============================================================

//! Nightjar – HTTP front end
//!
//! Handlers are thin: every mutation goes through [`ControlSurface`], which
//! clamps and validates, and every read is one lock acquisition on the
//! shared context.

use std::{convert::Infallible, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::error;
use nightjar_pipeline::{
    frame_stream, ControlError, ControlSurface, StateReport, MULTIPART_CONTENT_TYPE,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_stream::StreamExt;

pub mod config;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Nightjar</title></head>
<body style="margin:0;background:#111;color:#ddd;font-family:sans-serif">
<img src="/video_feed" style="display:block;max-width:100%;margin:0 auto" alt="live feed">
<p style="text-align:center">state: <a href="/api/state">/api/state</a></p>
</body>
</html>
"#;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub surface: Arc<ControlSurface>,
    /// Sleep between polls when a stream has nothing new to send
    pub stream_idle: Duration,
    /// Snapshot directory when the request names none
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("Snapshot task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Control(ControlError::ModelUnavailable(_))
            | ApiError::Control(ControlError::UnknownModel(_)) => StatusCode::BAD_REQUEST,
            ApiError::Control(ControlError::NoFrameAvailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Control(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("{self}");
        }
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/frame", get(frame))
        .route("/api/state", get(api_state))
        .route("/api/brightness", post(set_brightness))
        .route("/api/contrast", post(set_contrast))
        .route("/api/night_mode", post(set_night_mode))
        .route("/api/detection_model", post(set_detection_model))
        .route("/api/detection_confidence", post(set_detection_confidence))
        .route("/api/capture", post(capture))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed(State(st): State<AppState>) -> Response {
    let parts = frame_stream(Arc::clone(st.surface.context()), st.stream_idle)
        .map(Ok::<_, Infallible>);
    (
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn frame(State(st): State<AppState>) -> Result<Response, ApiError> {
    let jpeg = st.surface.latest_jpeg()?;
    Ok((
        [(header::CONTENT_TYPE, "image/jpeg")],
        jpeg.as_bytes().to_vec(),
    )
        .into_response())
}

async fn api_state(State(st): State<AppState>) -> Json<StateReport> {
    Json(st.surface.state())
}

#[derive(Deserialize)]
struct IntValue {
    // any JSON number; fractions are truncated toward zero
    #[serde(default)]
    value: f64,
}

#[derive(Deserialize)]
struct RealValue {
    #[serde(default = "unit")]
    value: f64,
}

fn unit() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct NightMode {
    #[serde(default)]
    enabled: bool,
}

#[derive(Deserialize)]
struct ModelChoice {
    #[serde(default = "no_model")]
    model: String,
}

fn no_model() -> String {
    "none".into()
}

#[derive(Deserialize)]
struct Confidence {
    #[serde(default = "half")]
    confidence: f64,
}

fn half() -> f64 {
    0.5
}

#[derive(Deserialize, Default)]
struct SnapshotRequest {
    #[serde(default)]
    output_dir: Option<PathBuf>,
}

async fn set_brightness(State(st): State<AppState>, Json(body): Json<IntValue>) -> Json<Value> {
    Json(json!({ "brightness": st.surface.set_brightness(body.value.trunc() as i64) }))
}

async fn set_contrast(State(st): State<AppState>, Json(body): Json<RealValue>) -> Json<Value> {
    Json(json!({ "contrast": st.surface.set_contrast(body.value) }))
}

async fn set_night_mode(State(st): State<AppState>, Json(body): Json<NightMode>) -> Json<Value> {
    Json(json!({ "night_mode": st.surface.set_night_mode(body.enabled) }))
}

async fn set_detection_model(
    State(st): State<AppState>,
    Json(body): Json<ModelChoice>,
) -> Result<Json<Value>, ApiError> {
    let model = st.surface.set_detection_model_by_name(&body.model)?;
    Ok(Json(json!({ "success": true, "model": model })))
}

async fn set_detection_confidence(
    State(st): State<AppState>,
    Json(body): Json<Confidence>,
) -> Json<Value> {
    Json(json!({ "confidence": st.surface.set_detection_confidence(body.confidence) }))
}

async fn capture(
    State(st): State<AppState>,
    body: Option<Json<SnapshotRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let dir = body.output_dir.unwrap_or(st.snapshot_dir);
    let surface = Arc::clone(&st.surface);
    let path = tokio::task::spawn_blocking(move || surface.capture_snapshot(&dir)).await??;
    Ok(Json(json!({ "success": true, "filename": path.display().to_string() })))
}
