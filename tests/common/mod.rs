#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use facematch::config::Config;
use facematch::server::{build_router, AppState};
use facematch::{Detection, Extractor, ExtractorPool, FaceBackend};
use image::{DynamicImage, ImageFormat};

pub const BOUNDARY: &str = "facematch-test-boundary";

/// Backend double: fixed detections, each encoded as `[score; dim]`.
pub struct Scripted {
    pub scores: Vec<f32>,
    pub dim: usize,
}

impl FaceBackend for Scripted {
    fn detect(&mut self, _img: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        Ok(self
            .scores
            .iter()
            .map(|&score| Detection {
                bbox: [0.0, 0.0, 4.0, 4.0],
                score,
                landmarks: [0.0; 10],
            })
            .collect())
    }

    fn encode(&mut self, _img: &DynamicImage, face: &Detection) -> anyhow::Result<Vec<f32>> {
        Ok(vec![face.score; self.dim])
    }
}

/// Panics on its first detection; afterwards finds one face.
pub struct PanicsOnce {
    pub panicked: bool,
}

impl FaceBackend for PanicsOnce {
    fn detect(&mut self, _img: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        if !self.panicked {
            self.panicked = true;
            panic!("inference crashed");
        }
        Ok(vec![Detection {
            bbox: [0.0, 0.0, 4.0, 4.0],
            score: 0.9,
            landmarks: [0.0; 10],
        }])
    }

    fn encode(&mut self, _img: &DynamicImage, face: &Detection) -> anyhow::Result<Vec<f32>> {
        Ok(vec![face.score; 128])
    }
}

/// Takes longer than any one-second request budget.
pub struct Stalled(pub Duration);

impl FaceBackend for Stalled {
    fn detect(&mut self, _img: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        std::thread::sleep(self.0);
        Ok(Vec::new())
    }

    fn encode(&mut self, _img: &DynamicImage, _face: &Detection) -> anyhow::Result<Vec<f32>> {
        Ok(Vec::new())
    }
}

/// Single-worker router around any backend.
pub fn router_with_backend(cfg: Config, backend: Box<dyn FaceBackend>) -> axum::Router {
    let selector = cfg.face_selection;
    let pool =
        ExtractorPool::new(vec![Extractor::new(backend).with_selector(selector.selector())])
            .unwrap();
    build_router(Arc::new(AppState::new(cfg, pool).unwrap()))
}

pub fn router_with(cfg: Config, scores: Vec<f32>) -> axum::Router {
    router_with_backend(cfg, Box::new(Scripted { scores, dim: 128 }))
}

pub fn router(scores: Vec<f32>) -> axum::Router {
    router_with(Config::default(), scores)
}

pub fn png_bytes() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(16, 16)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// One-part multipart body.
pub fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"face.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn extract_request(field: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/extract-embedding")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, bytes)))
        .unwrap()
}

pub fn compare_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/compare-embedding")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
