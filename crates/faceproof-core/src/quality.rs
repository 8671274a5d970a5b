//! Capture quality gate: brightness, sharpness and face presence fused into
//! one acceptability score.

use crate::error::PipelineError;
use crate::face_image::{self, FaceImage};
use image::GenericImageView;
use imageproc::gradients::sobel_gradients;
use serde::Serialize;

const BRIGHTNESS_WEIGHT: f32 = 0.3;
const SHARPNESS_WEIGHT: f32 = 0.3;
const FACE_WEIGHT: f32 = 0.4;

/// Minimum overall score for an acceptable capture.
pub const ACCEPTABLE_OVERALL: f32 = 0.5;

/// Roughly this many luma samples span each axis.
const SAMPLES_PER_AXIS: u32 = 50;

/// Luma band breakpoints (0–255 scale). Above 220 the score falls by 1 per
/// 35 luma levels.
const BRIGHTNESS_BANDS: Bands = Bands {
    breaks: [40.0, 80.0, 180.0, 220.0],
    tail: 35.0,
};

/// Gradient band breakpoints. The proxy is half the mean edge intensity, so it
/// tops out at 127.5; the tail spans the 27.5 above the last breakpoint.
const SHARPNESS_BANDS: Bands = Bands {
    breaks: [5.0, 10.0, 50.0, 100.0],
    tail: 27.5,
};

const GRADIENT_SCALE: f32 = 0.5;
/// Below this size on either axis the edge operator is meaningless.
const MIN_SHARPNESS_SIDE: u32 = 10;
const SMALL_IMAGE_SHARPNESS: f32 = 0.5;

/// Five-band piecewise-linear score curve, clamped to `[0, 1]`.
///
/// - `v < b0`: `0.5·v/b0`
/// - `b0 ≤ v < b1`: `0.5 + (v−b0)/(b1−b0)`
/// - `b1 ≤ v < b2`: `1`
/// - `b2 ≤ v < b3`: `1 − 0.5·(v−b2)/(b3−b2)`
/// - `v ≥ b3`: `0.5 − (v−b3)/tail`
///
/// The outer rising and falling bands end at 0.5 so the curve has no jump at
/// `b0` or `b3`.
#[derive(Debug, Clone, Copy)]
struct Bands {
    breaks: [f32; 4],
    tail: f32,
}

impl Bands {
    fn score(&self, v: f32) -> f32 {
        let [b0, b1, b2, b3] = self.breaks;
        let score = if v < b0 {
            0.5 * v / b0
        } else if v < b1 {
            0.5 + (v - b0) / (b1 - b0)
        } else if v < b2 {
            1.0
        } else if v < b3 {
            1.0 - 0.5 * (v - b2) / (b3 - b2)
        } else {
            0.5 - (v - b3) / self.tail
        };
        score.clamp(0.0, 1.0)
    }
}

/// Outcome of the quality gate. All scores are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityResult {
    pub brightness: f32,
    pub sharpness: f32,
    pub face: f32,
    pub overall: f32,
    pub has_face: bool,
}

impl QualityResult {
    /// Fuse sub-scores. `overall` is forced to 0 without a face.
    pub fn new(brightness: f32, sharpness: f32, has_face: bool) -> Self {
        let face = if has_face { 1.0 } else { 0.0 };
        let overall = if has_face {
            (BRIGHTNESS_WEIGHT * brightness + SHARPNESS_WEIGHT * sharpness + FACE_WEIGHT * face)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            brightness,
            sharpness,
            face,
            overall,
            has_face,
        }
    }

    pub fn is_acceptable(&self) -> bool {
        self.has_face && self.overall >= ACCEPTABLE_OVERALL
    }

    /// Why the capture was rejected, if it was.
    pub fn rejection_reason(&self) -> Option<String> {
        if !self.has_face {
            Some("quality: no face detected".to_string())
        } else if self.overall < ACCEPTABLE_OVERALL {
            Some(format!(
                "quality: overall score {:.2} below {ACCEPTABLE_OVERALL}",
                self.overall
            ))
        } else {
            None
        }
    }
}

/// Score a validated image. `has_face` comes from the face detector.
pub fn assess(image: &FaceImage, has_face: bool) -> Result<QualityResult, PipelineError> {
    if !face_image::is_valid(image) {
        return Err(PipelineError::quality_check(format!(
            "cannot score a {}x{} image that failed validation",
            image.width(),
            image.height()
        )));
    }

    let luma = mean_luma(image);
    let gradient = gradient_proxy(image);
    let brightness = brightness_score(luma);
    let sharpness = gradient.map(sharpness_score).unwrap_or(SMALL_IMAGE_SHARPNESS);

    Ok(QualityResult::new(brightness, sharpness, has_face))
}

/// Map mean luma (0–255) to a score.
pub fn brightness_score(luma: f32) -> f32 {
    BRIGHTNESS_BANDS.score(luma)
}

/// Map the gradient proxy to a score.
pub fn sharpness_score(gradient: f32) -> f32 {
    SHARPNESS_BANDS.score(gradient)
}

/// Mean Rec.601 luma over a strided pixel sample, 0–255.
pub fn mean_luma(image: &FaceImage) -> f32 {
    let pixels = image.pixels();
    let (w, h) = pixels.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }

    let step_x = (w / SAMPLES_PER_AXIS).max(1) as usize;
    let step_y = (h / SAMPLES_PER_AXIS).max(1) as usize;

    let mut total = 0.0f64;
    let mut count = 0u64;
    for y in (0..h).step_by(step_y) {
        for x in (0..w).step_by(step_x) {
            let [r, g, b, _] = pixels.get_pixel(x, y).0;
            total += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            count += 1;
        }
    }

    (total / count as f64) as f32
}

/// Half the mean Sobel edge intensity, or `None` for images under 10×10.
pub fn gradient_proxy(image: &FaceImage) -> Option<f32> {
    if image.width() < MIN_SHARPNESS_SIDE || image.height() < MIN_SHARPNESS_SIDE {
        return None;
    }

    let gray = image.pixels().to_luma8();
    let edges = sobel_gradients(&gray);
    let pixel_count = edges.width() as f64 * edges.height() as f64;
    // Edge intensity saturates at full white like a rendered edge map.
    let sum: f64 = edges.pixels().map(|p| p.0[0].min(255) as f64).sum();

    Some((sum / pixel_count) as f32 * GRADIENT_SCALE)
}
