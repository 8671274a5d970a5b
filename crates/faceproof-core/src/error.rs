//! Typed failure reasons shared by every pipeline stage.
//!
//! Only infrastructure failures are errors. A blurry photo, a masked face or
//! a spoof verdict is a successful [`crate::LivenessResult`] with a negative
//! label, never a [`PipelineError`].

use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which stage (or collaborator) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The image failed validation.
    InvalidImage,
    /// The inference engine could not initialise a model session.
    ModelLoading,
    /// The face detector collaborator failed.
    FaceDetection,
    /// The quality gate could not run (not a poor-quality verdict).
    QualityCheck,
    /// The occlusion stage could not run.
    OcclusionDetection,
    /// The liveness stage could not run.
    Liveness,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidImage => "invalid image",
            ErrorKind::ModelLoading => "model loading",
            ErrorKind::FaceDetection => "face detection",
            ErrorKind::QualityCheck => "quality check",
            ErrorKind::OcclusionDetection => "occlusion detection",
            ErrorKind::Liveness => "liveness",
        };
        f.write_str(s)
    }
}

/// Pipeline failure: a kind, a human-readable message and an optional cause.
#[derive(Error, Debug)]
#[error("{kind} error: {message}")]
pub struct PipelineError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether retrying after a model reload may succeed.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::ModelLoading
    }

    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidImage, message)
    }

    pub fn model_loading(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelLoading, message)
    }

    pub fn face_detection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FaceDetection, message)
    }

    pub fn quality_check(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QualityCheck, message)
    }

    pub fn occlusion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OcclusionDetection, message)
    }

    pub fn liveness(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Liveness, message)
    }
}
