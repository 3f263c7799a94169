//! HTTP routes

pub mod classes;
pub mod health;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Largest accepted request body (full-resolution phone photos included)
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(health::status))
        .route("/health", get(health::health_check))
        .route("/predict", post(predict::predict))
        .route("/classes", get(classes::list_classes))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use hssan::backend::default_device;
    use hssan::{HssanConfig, InferenceEngine, LifecycleConfig, ModelState};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::{AppState, ServerConfig};

    const BOUNDARY: &str = "hssan-test-boundary";

    fn test_state(initialize: bool) -> SharedState {
        let lifecycle = LifecycleConfig::new("does/not/exist.bin")
            .with_network(HssanConfig::rgb(102).with_height(16).with_width(16));
        let model = ModelState::new(lifecycle, default_device());
        if initialize {
            model.initialize().unwrap();
        }
        let engine = InferenceEngine::new().with_image_size(16);
        Arc::new(AppState::with_model(ServerConfig::default(), model, engine))
    }

    fn png_bytes() -> Vec<u8> {
        let image: RgbImage =
            ImageBuffer::from_fn(24, 18, |x, y| Rgb([(x * 10) as u8, (y * 12) as u8, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Noisy PNG that compresses poorly, so the encoded file stays large
    fn large_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
            let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
            h ^= h >> 15;
            h = h.wrapping_mul(0xC2B2_AE3D);
            h ^= h >> 13;
            Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn upload(content_type: &str, payload: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"flower.png\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(state: SharedState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let state = test_state(true);

        let (status, body) = send(state.clone(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["total_classes"], 102);
        assert_eq!(body["model_status"], "fallback");

        let (status, body) = send(state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);
    }

    #[tokio::test]
    async fn test_classes_listing() {
        let (status, body) = send(test_state(false), get("/classes")).await;
        assert_eq!(status, StatusCode::OK);

        let body = json(&body);
        assert_eq!(body["total"], 102);
        assert_eq!(body["classes"]["0"], "pink primrose");
        assert_eq!(body["classes"].as_object().unwrap().len(), 102);
    }

    #[tokio::test]
    async fn test_predict_returns_top_three() {
        let (status, body) = send(test_state(true), upload("image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::OK);

        let body = json(&body);
        assert_eq!(body["success"], true);
        let predictions = body["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 3);
        for prediction in predictions {
            assert!(prediction["class_index"].as_u64().unwrap() < 102);
            assert!(prediction["class_name"].is_string());
            let confidence = prediction["confidence"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&confidence));
        }
    }

    #[tokio::test]
    async fn test_predict_accepts_photo_above_default_body_limit() {
        let photo = large_png_bytes(1200, 1000);
        assert!(photo.len() > 2 * 1024 * 1024);
        assert!(photo.len() < MAX_UPLOAD_BYTES);

        let (status, body) = send(test_state(true), upload("image/png", &photo)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["predictions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_predict_rejects_non_image_upload() {
        let (status, _) = send(test_state(true), upload("text/plain", b"hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_predict_rejects_undecodable_image() {
        let (status, body) = send(test_state(true), upload("image/png", b"not a png")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("decode"));
    }

    #[tokio::test]
    async fn test_predict_before_model_ready() {
        let (status, _) = send(test_state(false), upload("image/png", &png_bytes())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (_, body) = send(test_state(false), get("/health")).await;
        assert_eq!(json(&body)["model_loaded"], false);
    }
}
