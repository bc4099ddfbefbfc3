use anyhow::Result;
use image::DynamicImage;

use crate::face::Detection;

/// Detection and encoding as one opaque collaborator.
///
/// Implementations may hold mutable inference state, so calls take `&mut self`;
/// callers that serve concurrent requests keep one backend per worker.
pub trait FaceBackend: Send {
    /// Every face found in `img`. Order is implementation-defined.
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>>;

    /// Fixed-length embedding for one detection of `img`.
    fn encode(&mut self, img: &DynamicImage, face: &Detection) -> Result<Vec<f32>>;
}
