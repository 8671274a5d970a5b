//! Request orchestration.
//!
//! ```text
//! Validating → QualityGate → OcclusionGate → LivenessGate → Done
//!      └────────────┴──────────────┴──────────────┴──→ Error
//! ```
//!
//! Gates run strictly in order on the calling thread. A gate that rejects the
//! image ends the request with a negative [`LivenessResult`]; only
//! infrastructure failures end it with a [`PipelineError`].

use crate::config::PipelineConfig;
use crate::detector::FaceDetector;
use crate::error::{ErrorKind, PipelineError};
use crate::face_image::{self, FaceImage};
use crate::inference::{InferenceError, ModelSet};
use crate::liveness::{self, LivenessResult};
use crate::log::LogContext;
use crate::normalize::{self, LIVENESS_INPUT_SIZE, OCCLUSION_INPUT_SIZE};
use crate::occlusion::{self, DetectionResult};
use crate::quality::{self, QualityResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const TAG: &str = "pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    QualityGate,
    OcclusionGate,
    LivenessGate,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validating => "validating",
            Stage::QualityGate => "quality gate",
            Stage::OcclusionGate => "occlusion gate",
            Stage::LivenessGate => "liveness gate",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Which collaborators are ready after a reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadStatus {
    pub liveness: bool,
    pub occlusion: bool,
    pub detector: bool,
}

/// Intermediate results carried between gates of one request.
#[derive(Default)]
struct Evidence {
    quality: Option<QualityResult>,
    occlusion: Option<DetectionResult>,
    verdict: Option<LivenessResult>,
}

/// The decision pipeline. Cheap to share behind an `Arc`.
pub struct Pipeline {
    models: Arc<ModelSet>,
    detector: Arc<dyn FaceDetector>,
    log: LogContext,
}

impl Pipeline {
    pub fn new(models: Arc<ModelSet>, detector: Arc<dyn FaceDetector>, log: LogContext) -> Self {
        Self {
            models,
            detector,
            log,
        }
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    /// Run every enabled gate against `image`.
    pub fn detect_liveness(
        &self,
        image: &FaceImage,
        config: &PipelineConfig,
    ) -> Result<LivenessResult, PipelineError> {
        let log = self.log.with_debug(config.debug_logging());
        let result = self.run_stages(image, config, &log);

        match &result {
            Ok(verdict) => log.debug(
                TAG,
                format_args!(
                    "verdict {} ({:.3}) from {}",
                    verdict.label, verdict.confidence, verdict.decided_by
                ),
            ),
            Err(e) => log.error(TAG, e),
        }
        result
    }

    /// Retry loading both classifier models and the face detector. Ready
    /// ones are left alone.
    pub fn reload_models(&self) -> ReloadStatus {
        ReloadStatus {
            liveness: self.models.liveness.reload(),
            occlusion: self.models.occlusion.reload(),
            detector: self.detector.reload(),
        }
    }

    fn run_stages(
        &self,
        image: &FaceImage,
        config: &PipelineConfig,
        log: &LogContext,
    ) -> Result<LivenessResult, PipelineError> {
        let mut evidence = Evidence::default();
        let mut stage = Stage::Validating;

        while stage != Stage::Done {
            let next = match stage {
                Stage::Validating => {
                    face_image::validate(image)?;
                    Stage::QualityGate
                }
                Stage::QualityGate if config.skip_quality_check() => {
                    log.debug(TAG, "quality gate skipped");
                    Stage::OcclusionGate
                }
                Stage::QualityGate => self.quality_gate(image, &mut evidence, log)?,
                Stage::OcclusionGate if config.skip_occlusion_check() => {
                    log.debug(TAG, "occlusion gate skipped");
                    Stage::LivenessGate
                }
                Stage::OcclusionGate => self.occlusion_gate(image, &mut evidence, log)?,
                Stage::LivenessGate => self.liveness_gate(image, &mut evidence, log)?,
                Stage::Done => Stage::Done,
            };
            log.debug(TAG, format_args!("{stage} -> {next}"));
            stage = next;
        }

        evidence.verdict.take().ok_or_else(|| {
            PipelineError::liveness("pipeline finished without a verdict")
        })
    }

    fn quality_gate(
        &self,
        image: &FaceImage,
        evidence: &mut Evidence,
        log: &LogContext,
    ) -> Result<Stage, PipelineError> {
        let has_face = self.detector.detect(image).map_err(|e| {
            PipelineError::face_detection("face detector failed").with_source(e)
        })?;
        log.debug(TAG, format_args!("face detector found a face: {has_face}"));
        let quality = quality::assess(image, has_face)?;
        log.debug(
            TAG,
            format_args!(
                "quality brightness={:.3} sharpness={:.3} face={} overall={:.3}",
                quality.brightness, quality.sharpness, quality.face, quality.overall
            ),
        );
        evidence.quality = Some(quality);

        match quality.rejection_reason() {
            Some(reason) => {
                evidence.verdict = Some(LivenessResult::rejected(
                    Stage::QualityGate,
                    1.0 - quality.overall,
                    reason,
                    evidence.quality,
                    None,
                ));
                Ok(Stage::Done)
            }
            None => Ok(Stage::OcclusionGate),
        }
    }

    fn occlusion_gate(
        &self,
        image: &FaceImage,
        evidence: &mut Evidence,
        log: &LogContext,
    ) -> Result<Stage, PipelineError> {
        let tensor = normalize::normalize(image, OCCLUSION_INPUT_SIZE).ok_or_else(|| {
            PipelineError::occlusion("failed to prepare occlusion model input")
        })?;

        let detection = match self.models.occlusion.run(&tensor) {
            Ok(probs) => {
                log.debug(TAG, format_args!("occlusion probabilities {probs:?}"));
                occlusion::classify(&probs)
            }
            Err(e) => {
                log.warn(TAG, format_args!("occlusion model unavailable, assuming normal: {e}"));
                DetectionResult::model_not_ready()
            }
        };
        log.debug(
            TAG,
            format_args!("occlusion {} ({:.3})", detection.label, detection.confidence),
        );
        evidence.occlusion = Some(detection);

        if detection.is_occluded() {
            evidence.verdict = Some(LivenessResult::rejected(
                Stage::OcclusionGate,
                detection.confidence,
                format!("occlusion: {}", detection.label),
                evidence.quality,
                Some(detection),
            ));
            return Ok(Stage::Done);
        }
        Ok(Stage::LivenessGate)
    }

    fn liveness_gate(
        &self,
        image: &FaceImage,
        evidence: &mut Evidence,
        log: &LogContext,
    ) -> Result<Stage, PipelineError> {
        let tensor = normalize::normalize(image, LIVENESS_INPUT_SIZE).ok_or_else(|| {
            PipelineError::liveness("failed to prepare liveness model input")
        })?;

        let output = self
            .models
            .liveness
            .run(&tensor)
            .map_err(liveness_inference_error)?;
        let score = liveness::interpret(&output)
            .ok_or_else(|| PipelineError::liveness("liveness model returned no logit"))?;
        log.debug(
            TAG,
            format_args!("liveness p(live)={:.4}", score.live_probability),
        );

        evidence.verdict = Some(LivenessResult::from_score(
            score,
            evidence.quality,
            evidence.occlusion,
        ));
        Ok(Stage::Done)
    }
}

fn liveness_inference_error(e: InferenceError) -> PipelineError {
    let kind = match e {
        InferenceError::NotLoaded { .. } | InferenceError::Integrity(_) => ErrorKind::ModelLoading,
        _ => ErrorKind::Liveness,
    };
    PipelineError::new(kind, "liveness model inference failed").with_source(e)
}
