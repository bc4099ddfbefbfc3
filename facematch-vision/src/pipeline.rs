use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::backend::FaceBackend;
use crate::config::VisionConfig;
use crate::face::{self, Detection, ENCODER_INPUT};

/// ONNX backend: YuNet detect → align → SFace encode
pub struct Pipeline {
    detector: Session,
    encoder: Session,
    cfg: VisionConfig,
}

impl Pipeline {
    pub fn new(cfg: &VisionConfig) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(cfg)?,
            encoder: crate::model::encoder_session(cfg)?,
            cfg: cfg.clone(),
        })
    }
}

impl FaceBackend for Pipeline {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            img,
            self.cfg.score_threshold,
            self.cfg.nms_threshold,
        )
        .context("detecting faces")
    }

    fn encode(&mut self, img: &DynamicImage, detection: &Detection) -> Result<Vec<f32>> {
        let aligned = face::align_face(img, detection, ENCODER_INPUT).context("aligning face")?;
        face::encode_face(&mut self.encoder, &aligned, self.cfg.normalize).context("encoding face")
    }
}
