//! Image bytes → one face embedding.
//!
//! Decoding happens here; detection and encoding are delegated to a
//! [`FaceBackend`]. When several faces are found, a [`FaceSelector`] picks the
//! one that gets encoded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use facematch_vision::{Detection, FaceBackend};
use serde::{Deserialize, Serialize};

use crate::comparator::FaceEmbedding;

/// Either exactly one embedding or an explicit "no face".
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Face(FaceEmbedding),
    NoFace,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image is empty")]
    EmptyImage,

    #[error("face backend failed: {0:#}")]
    Backend(anyhow::Error),

    #[error("selected face index {index} out of range for {count} detection(s)")]
    Selection { index: usize, count: usize },

    #[error("extraction worker failed: {0}")]
    Worker(String),
}

impl ExtractError {
    /// Caused by the request payload rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExtractError::Decode(_) | ExtractError::EmptyImage)
    }
}

/// Chooses the primary face among a non-empty set of detections.
pub trait FaceSelector: Send + Sync {
    /// Index into `detections`; only called with at least one detection.
    fn select(&self, detections: &[Detection]) -> usize;
}

/// Whatever the backend reported first. The backend decides that order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstDetected;

impl FaceSelector for FirstDetected {
    fn select(&self, _detections: &[Detection]) -> usize {
        0
    }
}

/// Highest detector confidence; ties go to the earlier detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestScore;

impl FaceSelector for HighestScore {
    fn select(&self, detections: &[Detection]) -> usize {
        let mut best = 0;
        for (i, d) in detections.iter().enumerate().skip(1) {
            if d.score > detections[best].score {
                best = i;
            }
        }
        best
    }
}

/// Config-level name for a selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    First,
    HighestScore,
}

impl SelectionPolicy {
    pub fn selector(self) -> Box<dyn FaceSelector> {
        match self {
            SelectionPolicy::First => Box::new(FirstDetected),
            SelectionPolicy::HighestScore => Box::new(HighestScore),
        }
    }
}

pub struct Extractor {
    backend: Box<dyn FaceBackend>,
    selector: Box<dyn FaceSelector>,
}

impl Extractor {
    pub fn new(backend: Box<dyn FaceBackend>) -> Self {
        Self {
            backend,
            selector: Box::new(FirstDetected),
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn FaceSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Decode `bytes`, detect, and encode the primary face.
    pub fn extract(&mut self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::EmptyImage);
        }
        let img = image::load_from_memory(bytes)?;

        let detections = self.backend.detect(&img).map_err(ExtractError::Backend)?;
        if detections.is_empty() {
            log::debug!("no face in {}x{} image", img.width(), img.height());
            return Ok(Extraction::NoFace);
        }

        let index = self.selector.select(&detections);
        let face = detections.get(index).ok_or(ExtractError::Selection {
            index,
            count: detections.len(),
        })?;
        log::debug!(
            "{} face(s) detected, encoding #{} (score {:.3})",
            detections.len(),
            index,
            face.score
        );

        let vector = self
            .backend
            .encode(&img, face)
            .map_err(ExtractError::Backend)?;
        Ok(Extraction::Face(FaceEmbedding::from(vector)))
    }
}

/// Fixed set of extractors shared by request handlers.
///
/// Each slot is used by one request at a time. A request takes the first idle
/// slot starting from a round-robin offset, and only waits when every slot is
/// busy. The work runs on the blocking thread pool.
pub struct ExtractorPool {
    slots: Arc<[Mutex<Extractor>]>,
    next: AtomicUsize,
}

impl ExtractorPool {
    pub fn new(extractors: Vec<Extractor>) -> anyhow::Result<Self> {
        if extractors.is_empty() {
            anyhow::bail!("extractor pool needs at least one worker");
        }
        Ok(Self {
            slots: extractors.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    pub async fn extract(&self, bytes: Vec<u8>) -> Result<Extraction, ExtractError> {
        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let slots = Arc::clone(&self.slots);

        tokio::task::spawn_blocking(move || {
            let (_, mut extractor) = acquire(&slots, start);
            extractor.extract(&bytes)
        })
        .await
        .map_err(|e| ExtractError::Worker(e.to_string()))?
    }
}

/// First idle slot from `start` onwards, else wait for `start` itself.
///
/// A slot poisoned by a panicking request is taken over as is: the extractor
/// holds no per-request state, so the next request can use it.
fn acquire(slots: &[Mutex<Extractor>], start: usize) -> (usize, MutexGuard<'_, Extractor>) {
    let n = slots.len();
    for offset in 0..n {
        let i = (start + offset) % n;
        match slots[i].try_lock() {
            Ok(guard) => return (i, guard),
            Err(TryLockError::Poisoned(poisoned)) => return (i, recover(&slots[i], i, poisoned)),
            Err(TryLockError::WouldBlock) => continue,
        }
    }
    let guard = slots[start]
        .lock()
        .unwrap_or_else(|poisoned| recover(&slots[start], start, poisoned));
    (start, guard)
}

fn recover<'a>(
    slot: &'a Mutex<Extractor>,
    index: usize,
    poisoned: PoisonError<MutexGuard<'a, Extractor>>,
) -> MutexGuard<'a, Extractor> {
    log::warn!("extraction worker {} recovered after a panic", index);
    slot.clear_poison();
    poisoned.into_inner()
}
