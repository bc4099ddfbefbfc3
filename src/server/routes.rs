//! Route handlers and their wire types.

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::comparator::{Comparison, FaceEmbedding};
use crate::extractor::Extraction;
use crate::server::error::{ServerError, ServerResult};
use crate::server::state::AppState;

pub const IMAGE_FIELD: &str = "image";
pub const NO_FACE_MESSAGE: &str = "No face found";

/// Result of `POST /extract-embedding`.
///
/// Carries either an embedding or a message, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<FaceEmbedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ExtractResponse {
    pub fn found(embedding: FaceEmbedding) -> Self {
        Self {
            success: true,
            embedding: Some(embedding),
            msg: None,
        }
    }

    pub fn no_face() -> Self {
        Self {
            success: false,
            embedding: None,
            msg: Some(NO_FACE_MESSAGE.to_string()),
        }
    }

    /// "No face" is answered with 400 but keeps this shape.
    pub fn from_extraction(extraction: Extraction) -> (StatusCode, Self) {
        match extraction {
            Extraction::Face(embedding) => (StatusCode::OK, Self::found(embedding)),
            Extraction::NoFace => (StatusCode::BAD_REQUEST, Self::no_face()),
        }
    }
}

/// Body of `POST /compare-embedding`. Any other key is rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareRequest {
    #[serde(default)]
    pub embedding1: Option<Vec<f64>>,
    #[serde(default)]
    pub embedding2: Option<Vec<f64>>,
}

impl CompareRequest {
    /// Both vectors, or the name of the first one missing.
    pub fn into_pair(self) -> ServerResult<(Vec<f64>, Vec<f64>)> {
        let a = self
            .embedding1
            .ok_or(ServerError::MissingField("embedding1"))?;
        let b = self
            .embedding2
            .ok_or(ServerError::MissingField("embedding2"))?;
        Ok((a, b))
    }
}

pub async fn extract_embedding(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<impl IntoResponse> {
    let mut multipart = multipart?;
    let limit_mb = state.config.max_upload_mb;

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::from_multipart(e, limit_mb))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::from_multipart(e, limit_mb))?;
            image = Some(bytes);
            break;
        }
    }
    let image = image.ok_or(ServerError::MissingField(IMAGE_FIELD))?;
    log::debug!("received {} byte image", image.len());

    let extraction = state.extractors.extract(image.to_vec()).await?;
    let (status, body) = ExtractResponse::from_extraction(extraction);
    Ok((status, Json(body)))
}

pub async fn compare_embedding(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> ServerResult<Json<Comparison>> {
    let Json(request) =
        payload.map_err(|e| ServerError::from_json(e, state.config.max_upload_mb))?;
    let (a, b) = request.into_pair()?;

    let comparison = state.comparator.compare(&a, &b)?;
    log::debug!(
        "compared {}-d embeddings: distance={} match={}",
        a.len(),
        comparison.distance,
        comparison.is_match
    );
    Ok(Json(comparison))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": state.extractors.workers(),
        "match_threshold": state.comparator.threshold(),
        "uptime_seconds": state.started.elapsed().as_secs(),
    }))
}

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

pub async fn method_not_allowed() -> ServerError {
    ServerError::MethodNotAllowed
}
