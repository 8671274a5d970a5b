//! Face-presence detection for the quality gate.
//!
//! The pipeline only needs one bit from the detector: is there at least one
//! face large enough to work with. [`ScrfdDetector`] answers it with the SCRFD
//! `det_10g` model; tests and embedders can supply their own [`FaceDetector`].

use crate::face_image::FaceImage;
use crate::inference::{InferenceError, LoadSlot, SlotState};
use faceproof_models::DETECTOR_MODEL;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::PathBuf;
use thiserror::Error;

// --- SCRFD constants ---
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [u32; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_SCORE_THRESHOLD: f32 = 0.5;
const FAST_INPUT_SIZE: u32 = 320;
const ACCURATE_INPUT_SIZE: u32 = 640;

/// Default minimum face width relative to image width.
pub const DEFAULT_MIN_FACE_SIZE: f32 = 0.2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model unavailable: {0}")]
    Model(#[from] InferenceError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
    #[error("unexpected detector output: {0}")]
    BadOutput(String),
}

/// External face-presence collaborator.
pub trait FaceDetector: Send + Sync {
    /// Whether at least one sufficiently large face is present.
    fn detect(&self, image: &FaceImage) -> Result<bool, DetectorError>;

    /// Retry acquiring any backing model once; whether the detector is ready.
    /// Detectors without one are always ready.
    fn reload(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorMode {
    /// Smaller network input; lower latency, misses small faces.
    #[default]
    Fast,
    /// Full-resolution network input.
    Accurate,
}

impl DetectorMode {
    fn input_size(self) -> u32 {
        match self {
            DetectorMode::Fast => FAST_INPUT_SIZE,
            DetectorMode::Accurate => ACCURATE_INPUT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    pub mode: DetectorMode,
    /// Minimum face width as a fraction of image width.
    pub min_face_size: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            mode: DetectorMode::Fast,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
        }
    }
}

/// Face box in network input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }
}

/// Raw outputs of one SCRFD stride head.
pub(crate) struct StrideHead {
    pub stride: u32,
    /// One score per anchor.
    pub scores: Vec<f32>,
    /// Four distances (left, top, right, bottom) per anchor, in stride units.
    pub distances: Vec<f32>,
}

/// Decode anchor-free SCRFD heads into boxes scoring at least `threshold`.
pub(crate) fn decode_faces(
    input_size: u32,
    heads: &[StrideHead],
    threshold: f32,
) -> Result<Vec<FaceBox>, DetectorError> {
    let mut faces = Vec::new();

    for head in heads {
        let grid = (input_size / head.stride) as usize;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        if head.scores.len() != anchors || head.distances.len() != anchors * 4 {
            return Err(DetectorError::BadOutput(format!(
                "stride {}: expected {anchors} anchors, got {} scores / {} distances",
                head.stride,
                head.scores.len(),
                head.distances.len()
            )));
        }

        let stride = head.stride as f32;
        for (i, &score) in head.scores.iter().enumerate() {
            if score < threshold {
                continue;
            }
            let cell = i / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * stride;
            let cy = (cell / grid) as f32 * stride;
            let d = &head.distances[i * 4..i * 4 + 4];
            faces.push(FaceBox {
                x1: cx - d[0] * stride,
                y1: cy - d[1] * stride,
                x2: cx + d[2] * stride,
                y2: cy + d[3] * stride,
                score,
            });
        }
    }

    Ok(faces)
}

/// Letterboxed network input plus the scale that maps it back to the image.
fn preprocess(image: &FaceImage, side: u32) -> (Array4<f32>, f32) {
    let rgb = image.pixels().to_rgb8();
    let scale = (side as f32 / rgb.width() as f32).min(side as f32 / rgb.height() as f32);
    let new_w = ((rgb.width() as f32 * scale).round() as u32).clamp(1, side);
    let new_h = ((rgb.height() as f32 * scale).round() as u32).clamp(1, side);
    let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

    let size = side as usize;
    // Padding is zero after normalisation.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, scale)
}

/// SCRFD-based detector, loaded on first use.
pub struct ScrfdDetector {
    model_dir: PathBuf,
    options: DetectorOptions,
    session: LoadSlot<Session>,
}

impl ScrfdDetector {
    pub fn new(model_dir: impl Into<PathBuf>, options: DetectorOptions) -> Self {
        Self {
            model_dir: model_dir.into(),
            options,
            session: LoadSlot::new(DETECTOR_MODEL.name),
        }
    }

    pub fn options(&self) -> DetectorOptions {
        self.options
    }

    pub fn state(&self) -> SlotState {
        self.session.state()
    }

    fn open(&self) -> Result<Session, DetectorError> {
        let path = faceproof_models::verify_model(&self.model_dir, &DETECTOR_MODEL)
            .map_err(InferenceError::from)?;
        let session = crate::ort_backend::open_session(&path)?;
        tracing::info!(
            path = %path.display(),
            mode = ?self.options.mode,
            "SCRFD detector loaded"
        );
        Ok(session)
    }
}

fn run_heads(session: &mut Session, input: &Array4<f32>) -> Result<Vec<StrideHead>, DetectorError> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
    if outputs.len() < SCRFD_STRIDES.len() * 2 {
        return Err(DetectorError::BadOutput(format!(
            "expected at least {} outputs, got {}",
            SCRFD_STRIDES.len() * 2,
            outputs.len()
        )));
    }

    let mut heads = Vec::with_capacity(SCRFD_STRIDES.len());
    for (idx, &stride) in SCRFD_STRIDES.iter().enumerate() {
        let (_, scores) = outputs[idx].try_extract_tensor::<f32>()?;
        let (_, distances) = outputs[idx + SCRFD_STRIDES.len()].try_extract_tensor::<f32>()?;
        heads.push(StrideHead {
            stride,
            scores: scores.to_vec(),
            distances: distances.to_vec(),
        });
    }
    Ok(heads)
}

impl FaceDetector for ScrfdDetector {
    fn detect(&self, image: &FaceImage) -> Result<bool, DetectorError> {
        let side = self.options.mode.input_size();
        let (input, scale) = preprocess(image, side);
        let heads = self
            .session
            .with_ready(|| self.open(), |session| run_heads(session, &input))?;
        let faces = decode_faces(side, &heads, SCRFD_SCORE_THRESHOLD)?;

        let min_width = self.options.min_face_size * image.width() as f32;
        Ok(faces.iter().any(|f| f.width() / scale >= min_width))
    }

    fn reload(&self) -> bool {
        self.session.reload(|| self.open())
    }
}
