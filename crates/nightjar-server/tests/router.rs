// Router behaviour against a context fed by hand, no camera thread.
use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use nightjar_detect::Availability;
use nightjar_pipeline::{CameraContext, ControlSurface, EncodedFrame};
use nightjar_server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(availability: Availability, snapshot_dir: PathBuf) -> (Router, Arc<CameraContext>) {
    let ctx = Arc::new(CameraContext::new(availability));
    let app = router(AppState {
        surface: Arc::new(ControlSurface::new(Arc::clone(&ctx))),
        stream_idle: Duration::from_millis(1),
        snapshot_dir,
    });
    (app, ctx)
}

async fn post(app: &Router, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?;
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, serde_json::from_slice(&bytes)?))
}

async fn get(app: &Router, uri: &str) -> Result<axum::response::Response> {
    Ok(app.clone().oneshot(Request::get(uri).body(Body::empty())?).await?)
}

#[tokio::test]
async fn setters_clamp_and_echo() -> Result<()> {
    let (app, ctx) = app(Availability::default(), PathBuf::from("unused"));

    let (status, body) = post(&app, "/api/brightness", json!({ "value": 75 })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "brightness": 50 }));

    let (_, body) = post(&app, "/api/contrast", json!({ "value": 0.1 })).await?;
    assert_eq!(body, json!({ "contrast": 0.5 }));

    let (_, body) = post(&app, "/api/night_mode", json!({ "enabled": true })).await?;
    assert_eq!(body, json!({ "night_mode": true }));

    let (_, body) = post(&app, "/api/detection_confidence", json!({ "confidence": 3 })).await?;
    assert_eq!(body, json!({ "confidence": 1.0 }));

    // fractional brightness truncates toward zero
    let (status, body) = post(&app, "/api/brightness", json!({ "value": 12.5 })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "brightness": 12 }));
    let (_, body) = post(&app, "/api/brightness", json!({ "value": -7.9 })).await?;
    assert_eq!(body, json!({ "brightness": -7 }));
    let (_, body) = post(&app, "/api/brightness", json!({ "value": 75 })).await?;
    assert_eq!(body, json!({ "brightness": 50 }));

    // missing field falls back to the default
    let (_, body) = post(&app, "/api/contrast", json!({})).await?;
    assert_eq!(body, json!({ "contrast": 1.0 }));

    let controls = ctx.controls();
    assert_eq!(controls.brightness(), 50);
    assert!(controls.night_mode());
    Ok(())
}

#[tokio::test]
async fn model_selection_respects_availability() -> Result<()> {
    let availability = Availability {
        yolo: true,
        rfdetr: false,
    };
    let (app, _ctx) = app(availability, PathBuf::from("unused"));

    let (status, body) = post(&app, "/api/detection_model", json!({ "model": "yolo" })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "model": "yolo" }));

    let (status, body) = post(&app, "/api/detection_model", json!({ "model": "rfdetr" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, _) = post(&app, "/api/detection_model", json!({ "model": "ssd" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = get(&app, "/api/state").await?;
    let bytes = response.into_body().collect().await?.to_bytes();
    let state: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(state["detection_model"], json!("yolo"));
    assert_eq!(state["yolo_available"], json!(true));
    assert_eq!(state["rfdetr_available"], json!(false));
    assert_eq!(state["fps"], json!(0));
    assert_eq!(state["detections_count"], json!(0));
    assert_eq!(state["capture_state"], json!("starting"));
    Ok(())
}

#[tokio::test]
async fn frame_and_capture_need_a_published_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let snapshots = dir.path().join("frames");
    let (app, ctx) = app(Availability::default(), snapshots.clone());

    assert_eq!(get(&app, "/frame").await?.status(), StatusCode::SERVICE_UNAVAILABLE);
    let (status, body) = post(&app, "/api/capture", json!({})).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], json!(false));
    assert!(!snapshots.exists());

    let jpeg = vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9];
    ctx.publish(EncodedFrame::new(jpeg.clone()), Vec::new(), None);

    let response = get(&app, "/frame").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.into_body().collect().await?.to_bytes().to_vec(), jpeg);

    let (status, body) = post(&app, "/api/capture", json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    let written = PathBuf::from(body["filename"].as_str().unwrap_or_default());
    assert_eq!(written, snapshots.join("frame_0000.jpg"));
    assert_eq!(std::fs::read(&written)?, jpeg);

    let elsewhere = dir.path().join("other");
    let (_, body) = post(
        &app,
        "/api/capture",
        json!({ "output_dir": elsewhere.to_string_lossy() }),
    )
    .await?;
    assert_eq!(
        PathBuf::from(body["filename"].as_str().unwrap_or_default()),
        elsewhere.join("frame_0000.jpg")
    );
    Ok(())
}

#[tokio::test]
async fn video_feed_is_multipart() -> Result<()> {
    let (app, ctx) = app(Availability::default(), PathBuf::from("unused"));
    ctx.publish(EncodedFrame::new(vec![1, 2, 3]), Vec::new(), None);

    let response = get(&app, "/video_feed").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body();
    let first = body
        .frame()
        .await
        .expect("one part")?
        .into_data()
        .map_err(|_| anyhow::anyhow!("expected a data frame"))?;
    assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\n"));
    Ok(())
}

#[tokio::test]
async fn index_embeds_the_feed() -> Result<()> {
    let (app, _ctx) = app(Availability::default(), PathBuf::from("unused"));
    let response = get(&app, "/").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.into_body().collect().await?.to_bytes();
    assert!(String::from_utf8_lossy(&html).contains("/video_feed"));
    Ok(())
}
