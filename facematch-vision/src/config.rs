use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model locations and detector tuning for the ONNX pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// YuNet detector, fixed 640x640 input.
    pub detector_model: PathBuf,
    /// SFace recognizer, 112x112 aligned input, 128-d output.
    pub encoder_model: PathBuf,
    pub score_threshold: f32,
    /// IoU above which overlapping detections are suppressed. 1.0 disables NMS.
    pub nms_threshold: f32,
    /// L2-normalize embeddings before returning them.
    pub normalize: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            detector_model: PathBuf::from(
                "/usr/local/share/facematch/models/face_detection_yunet_2023mar.onnx",
            ),
            encoder_model: PathBuf::from(
                "/usr/local/share/facematch/models/face_recognition_sface_2021dec.onnx",
            ),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            normalize: true,
        }
    }
}

impl VisionConfig {
    /// Both model files are present on disk.
    pub fn models_present(&self) -> bool {
        self.detector_model.is_file() && self.encoder_model.is_file()
    }
}
