//! Single-frame liveness verdicts.
//!
//! The liveness model emits one raw logit per image. A sigmoid turns it into
//! the probability that the subject is live; the verdict is `Live` strictly
//! above 0.5. Confidence is always reported in favour of the chosen label, so
//! a logit of -3 reads as "Spoof, 0.95" rather than "Spoof, 0.05".
//!
//! # Threat Coverage
//!
//! - **Blocks:** printed photographs, screen replays and masks the model was
//!   trained on, plus hands and masks via the occlusion gate.
//! - **Does not block:** anything requiring temporal evidence. There is no
//!   motion or challenge-response analysis; one frame in, one verdict out.

use crate::occlusion::DetectionResult;
use crate::pipeline::Stage;
use crate::quality::QualityResult;
use serde::Serialize;
use std::fmt;

/// Live iff `sigmoid(logit)` is strictly greater than this.
pub const LIVE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LivenessLabel {
    Live,
    Spoof,
}

impl fmt::Display for LivenessLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessLabel::Live => f.write_str("live"),
            LivenessLabel::Spoof => f.write_str("spoof"),
        }
    }
}

/// Logistic function.
pub fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Label and label-oriented confidence for one logit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivenessScore {
    pub label: LivenessLabel,
    pub confidence: f32,
    /// Raw `sigmoid(logit)`, the probability of `Live`.
    pub live_probability: f32,
}

impl LivenessScore {
    pub fn from_logit(logit: f32) -> Self {
        let p = sigmoid(logit);
        let (label, confidence) = if p > LIVE_THRESHOLD {
            (LivenessLabel::Live, p)
        } else {
            (LivenessLabel::Spoof, 1.0 - p)
        };

        Self {
            label,
            confidence,
            live_probability: p,
        }
    }
}

/// Interpret the liveness model output. `None` for an empty or non-finite output.
pub fn interpret(output: &[f32]) -> Option<LivenessScore> {
    let logit = *output.first()?;
    if !logit.is_finite() {
        return None;
    }
    Some(LivenessScore::from_logit(logit))
}

/// Final decision record for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessResult {
    pub label: LivenessLabel,
    /// Confidence in favour of `label`, in `[0, 1]`.
    pub confidence: f32,
    /// Set for every negative verdict: `quality: ...`, `occlusion: <label>`
    /// or `liveness: spoof detected`.
    pub failure_reason: Option<String>,
    /// Gate that produced the verdict.
    pub decided_by: Stage,
    /// Quality scores, if the quality gate ran.
    pub quality: Option<QualityResult>,
    /// Occlusion verdict, if the occlusion gate ran.
    pub occlusion: Option<DetectionResult>,
}

impl LivenessResult {
    pub fn is_live(&self) -> bool {
        self.label == LivenessLabel::Live
    }

    /// Negative verdict issued by a gate before the liveness model ran.
    pub(crate) fn rejected(
        decided_by: Stage,
        confidence: f32,
        reason: String,
        quality: Option<QualityResult>,
        occlusion: Option<DetectionResult>,
    ) -> Self {
        Self {
            label: LivenessLabel::Spoof,
            confidence: confidence.clamp(0.0, 1.0),
            failure_reason: Some(reason),
            decided_by,
            quality,
            occlusion,
        }
    }

    pub(crate) fn from_score(
        score: LivenessScore,
        quality: Option<QualityResult>,
        occlusion: Option<DetectionResult>,
    ) -> Self {
        let failure_reason = match score.label {
            LivenessLabel::Live => None,
            LivenessLabel::Spoof => Some("liveness: spoof detected".to_string()),
        };

        Self {
            label: score.label,
            confidence: score.confidence,
            failure_reason,
            decided_by: Stage::LivenessGate,
            quality,
            occlusion,
        }
    }
}
