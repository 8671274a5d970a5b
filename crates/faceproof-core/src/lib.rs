//! faceproof-core — Single-frame face liveness decision pipeline.
//!
//! Validates an image, gates it on capture quality and occlusion, then runs
//! a binary liveness classifier via ONNX Runtime and returns a labelled,
//! explainable verdict.

pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod face_image;
pub mod inference;
pub mod liveness;
pub mod log;
pub mod normalize;
pub mod occlusion;
pub mod ort_backend;
pub mod pipeline;
pub mod quality;

pub use config::PipelineConfig;
pub use detector::{DetectorMode, DetectorOptions, FaceDetector, ScrfdDetector};
pub use engine::{spawn_engine, EngineHandle};
pub use error::{ErrorKind, PipelineError};
pub use face_image::FaceImage;
pub use inference::{InferenceSession, LoadSlot, ModelLoader, ModelSet, ModelSlot, SlotState};
pub use liveness::{LivenessLabel, LivenessResult};
pub use log::LogContext;
pub use normalize::NormalizedTensor;
pub use occlusion::{DetectionResult, OcclusionLabel};
pub use ort_backend::OrtModelLoader;
pub use pipeline::{Pipeline, ReloadStatus, Stage};
pub use quality::QualityResult;

/// Library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
