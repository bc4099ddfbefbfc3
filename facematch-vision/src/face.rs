use anyhow::Result;
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::yunet;

/// YuNet input side; the model is exported with a fixed 640x640 input.
pub const DETECTOR_INPUT: u32 = 640;
/// SFace input side.
pub const ENCODER_INPUT: u32 = 112;

/// ArcFace reference eye positions for a 112x112 crop.
const REF_LEFT_EYE: (f32, f32) = (38.2946, 51.6963);
const REF_RIGHT_EYE: (f32, f32) = (73.5318, 51.5014);

/// A detected face in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // right eye, left eye, nose, mouth right, mouth left
}

/// Where the source image sits on the square detector canvas.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

/// Resize preserving aspect ratio and pad onto a black square canvas.
fn letterbox(img: &DynamicImage, side: u32) -> (RgbImage, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = side as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale) as u32).clamp(1, side);
    let new_h = ((h as f32 * scale) as u32).clamp(1, side);

    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();
    let mut canvas = RgbImage::new(side, side);
    let offset_x = (side - new_w) / 2;
    let offset_y = (side - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Planar BGR tensor `[1, 3, H, W]` with raw 0..255 values, as both models expect.
fn bgr_planar(rgb: &RgbImage) -> Array4<f32> {
    let (w, h) = rgb.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        rgb.get_pixel(x as u32, y as u32)[2 - c] as f32
    })
}

/// Detect faces, highest score first.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (canvas, lb) = letterbox(img, DETECTOR_INPUT);
    let input = Value::from_array(bgr_planar(&canvas))?;

    let outputs = session.run(ort::inputs![input])?;
    let mut raw = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect::<Vec<i64>>(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = raw
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let heads = yunet::parse_outputs(&refs, DETECTOR_INPUT as usize)?;
    let detections: Vec<Detection> = yunet::decode(&heads, score_threshold, DETECTOR_INPUT as usize)
        .into_iter()
        .map(|d| {
            let (x, y) = lb.unmap(d.bbox[0], d.bbox[1]);
            let mut landmarks = [0.0f32; 10];
            for p in 0..5 {
                let (lx, ly) = lb.unmap(d.landmarks[p * 2], d.landmarks[p * 2 + 1]);
                landmarks[p * 2] = lx;
                landmarks[p * 2 + 1] = ly;
            }
            Detection {
                bbox: [x, y, d.bbox[2] / lb.scale, d.bbox[3] / lb.scale],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    log::debug!("detector kept {} candidate(s)", detections.len());

    if nms_threshold < 1.0 {
        Ok(nms(&detections, nms_threshold))
    } else {
        let mut sorted = detections;
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(sorted)
    }
}

/// Greedy non-maximum suppression. Output is sorted by descending score.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let corners = [
        (img.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (img.get_pixel(x1, y0), fx * (1.0 - fy)),
        (img.get_pixel(x0, y1), (1.0 - fx) * fy),
        (img.get_pixel(x1, y1), fx * fy),
    ];
    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let v: f32 = corners.iter().map(|(p, wgt)| p[c] as f32 * wgt).sum();
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}

/// Rotate and scale so the eyes land on the ArcFace reference positions, then crop.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    // YuNet lists the subject's right eye first, which is the left one in the image
    let left_eye = (detection.landmarks[0], detection.landmarks[1]);
    let right_eye = (detection.landmarks[2], detection.landmarks[3]);

    let dx = right_eye.0 - left_eye.0;
    let dy = right_eye.1 - left_eye.1;
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if !eye_dist.is_finite() || eye_dist < 1.0 {
        anyhow::bail!("degenerate landmarks: eye distance {}", eye_dist);
    }

    let ratio = size as f32 / ENCODER_INPUT as f32;
    let ref_dx = REF_RIGHT_EYE.0 - REF_LEFT_EYE.0;
    let ref_dy = REF_RIGHT_EYE.1 - REF_LEFT_EYE.1;
    let scale = ratio * (ref_dx * ref_dx + ref_dy * ref_dy).sqrt() / eye_dist;
    let angle = dy.atan2(dx);
    let (sin, cos) = angle.sin_cos();

    let src_center = ((left_eye.0 + right_eye.0) / 2.0, (left_eye.1 + right_eye.1) / 2.0);
    let dst_center = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * ratio,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * ratio,
    );

    // Inverse map: output pixel -> source pixel
    let src = img.to_rgb8();
    let mut output = RgbImage::new(size, size);
    for (ox, oy, px) in output.enumerate_pixels_mut() {
        let u = (ox as f32 - dst_center.0) / scale;
        let v = (oy as f32 - dst_center.1) / scale;
        let sx = src_center.0 + u * cos - v * sin;
        let sy = src_center.1 + u * sin + v * cos;
        if let Some(sample) = sample_bilinear(&src, sx, sy) {
            *px = sample;
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Run SFace on an aligned crop.
pub fn encode_face(session: &mut Session, face_img: &DynamicImage, normalize: bool) -> Result<Vec<f32>> {
    let face = face_img
        .resize_exact(ENCODER_INPUT, ENCODER_INPUT, FilterType::Triangle)
        .to_rgb8();
    let input = Value::from_array(bgr_planar(&face))?;

    let outputs = session.run(ort::inputs![input])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    let dim = match shape.len() {
        2 => shape[1] as usize,
        _ => data.len(),
    };
    if dim == 0 || dim > data.len() {
        anyhow::bail!("unexpected encoder output shape {:?}", shape);
    }
    let mut embedding = data[..dim].to_vec();

    if normalize {
        l2_normalize(&mut embedding);
    }
    Ok(embedding)
}

/// Scale to unit length; zero vectors are left alone.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
