//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) it emits four heads over
//! an `(input / stride)^2` grid:
//! - cls: `[1, N, 1]` classification score
//! - obj: `[1, N, 1]` objectness score
//! - bbox: `[1, N, 4]` center offset and log-scale size
//! - kps: `[1, N, 10]` five landmark offsets
//!
//! Session outputs come ordered by head then stride:
//! `cls_8, cls_16, cls_32, obj_8, ..., bbox_8, ..., kps_8, kps_16, kps_32`.
//!
//! Decoding, in canvas pixels:
//! ```text
//! cx = (col + dx) * stride      w = exp(dw) * stride
//! cy = (row + dy) * stride      h = exp(dh) * stride
//! score = sqrt(clamp(cls) * clamp(obj))
//! ```

use anyhow::{anyhow, Result};
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h in canvas pixels
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,...,x5,y5 in canvas pixels
}

/// One stride's worth of head outputs, one row per grid cell.
#[derive(Debug, Clone)]
pub struct StrideHead {
    pub stride: usize,
    /// Combined cls/obj score, shape `[N, 1]`.
    pub scores: Array2<f32>,
    pub boxes: Array2<f32>,
    pub landmarks: Array2<f32>,
}

impl StrideHead {
    fn columns(&self, input_size: usize) -> usize {
        input_size / self.stride
    }
}

fn head(
    outputs: &[(&[i64], &[f32])],
    slot: usize,
    cells: usize,
    width: usize,
    name: &str,
) -> Result<Array2<f32>> {
    let (shape, data) = outputs
        .get(slot)
        .ok_or_else(|| anyhow!("missing {} output at index {}", name, slot))?;
    if *shape != [1, cells as i64, width as i64] {
        anyhow::bail!(
            "unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
            name,
            slot,
            shape,
            cells,
            width
        );
    }
    Ok(Array2::from_shape_vec((cells, width), data.to_vec())?)
}

/// Split the twelve raw session outputs into per-stride heads.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<StrideHead>> {
    let n = STRIDES.len();
    if outputs.len() < 4 * n {
        anyhow::bail!(
            "expected {} YuNet outputs, got {}",
            4 * n,
            outputs.len()
        );
    }

    STRIDES
        .iter()
        .enumerate()
        .map(|(k, &stride)| {
            let side = input_size / stride;
            let cells = side * side;

            let cls = head(outputs, k, cells, 1, "cls")?;
            let obj = head(outputs, n + k, cells, 1, "obj")?;
            let mut scores = cls;
            scores.zip_mut_with(&obj, |c, &o| {
                *c = (c.clamp(0.0, 1.0) * o.clamp(0.0, 1.0)).sqrt();
            });

            Ok(StrideHead {
                stride,
                scores,
                boxes: head(outputs, 2 * n + k, cells, 4, "bbox")?,
                landmarks: head(outputs, 3 * n + k, cells, 10, "kps")?,
            })
        })
        .collect()
}

/// Decode every grid cell scoring at least `score_threshold`.
///
/// Output order follows stride then row-major grid position; callers that
/// need score order sort afterwards.
pub fn decode(heads: &[StrideHead], score_threshold: f32, input_size: usize) -> Vec<RawDetection> {
    let mut detections = Vec::new();

    for head in heads {
        let cols = head.columns(input_size);
        let stride = head.stride as f32;

        for (idx, &score) in head.scores.column(0).iter().enumerate() {
            if score < score_threshold {
                continue;
            }
            let col = (idx % cols) as f32;
            let row = (idx / cols) as f32;

            let b = head.boxes.row(idx);
            let cx = (col + b[0]) * stride;
            let cy = (row + b[1]) * stride;
            let w = b[2].exp() * stride;
            let h = b[3].exp() * stride;

            let kps = head.landmarks.row(idx);
            let mut landmarks = [0.0f32; 10];
            for p in 0..5 {
                landmarks[p * 2] = (col + kps[p * 2]) * stride;
                landmarks[p * 2 + 1] = (row + kps[p * 2 + 1]) * stride;
            }

            detections.push(RawDetection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    detections
}
