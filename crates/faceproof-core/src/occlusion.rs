//! Occlusion classifier: interprets the 3-class probability vector.

use serde::Serialize;
use std::fmt;

/// Below this probability a `normal` argmax is treated as ambiguous.
// Downgrades the model's own argmax. Kept as calibrated; pending review by
// whoever owns the occlusion model.
pub const NORMAL_MIN_CONFIDENCE: f32 = 0.7;

/// Confidence reported when the model is unavailable or its output is malformed.
pub const MODEL_NOT_READY_CONFIDENCE: f32 = 0.7;

/// Number of classes the occlusion model emits.
pub const CLASS_COUNT: usize = faceproof_models::OCCLUSION_MODEL.output_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OcclusionLabel {
    HandOverFace,
    Normal,
    WithMask,
}

impl OcclusionLabel {
    /// Model output order.
    pub const ALL: [OcclusionLabel; CLASS_COUNT] = [
        OcclusionLabel::HandOverFace,
        OcclusionLabel::Normal,
        OcclusionLabel::WithMask,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OcclusionLabel::HandOverFace => "hand_over_face",
            OcclusionLabel::Normal => "normal",
            OcclusionLabel::WithMask => "with_mask",
        }
    }

    fn index(self) -> usize {
        match self {
            OcclusionLabel::HandOverFace => 0,
            OcclusionLabel::Normal => 1,
            OcclusionLabel::WithMask => 2,
        }
    }
}

impl fmt::Display for OcclusionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occlusion verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionResult {
    pub label: OcclusionLabel,
    pub confidence: f32,
    /// False when the verdict is the degraded fallback for an unavailable model.
    pub model_ready: bool,
}

impl DetectionResult {
    /// Fallback used when the model cannot be reached or emits the wrong arity.
    pub fn model_not_ready() -> Self {
        Self {
            label: OcclusionLabel::Normal,
            confidence: MODEL_NOT_READY_CONFIDENCE,
            model_ready: false,
        }
    }

    pub fn is_occluded(&self) -> bool {
        self.label != OcclusionLabel::Normal
    }
}

/// Classify `[p_hand, p_normal, p_mask]`.
///
/// Falls back to [`DetectionResult::model_not_ready`] unless exactly three
/// values are supplied.
pub fn classify(probs: &[f32]) -> DetectionResult {
    let Ok(probs) = <[f32; CLASS_COUNT]>::try_from(probs) else {
        return DetectionResult::model_not_ready();
    };

    // First maximum wins ties.
    let mut best = 0;
    for i in 1..CLASS_COUNT {
        if probs[i] > probs[best] {
            best = i;
        }
    }
    let mut label = OcclusionLabel::ALL[best];

    if label == OcclusionLabel::Normal && probs[best] < NORMAL_MIN_CONFIDENCE {
        let hand = probs[OcclusionLabel::HandOverFace.index()];
        let mask = probs[OcclusionLabel::WithMask.index()];
        label = if mask > hand {
            OcclusionLabel::WithMask
        } else {
            OcclusionLabel::HandOverFace
        };
    }

    DetectionResult {
        label,
        confidence: probs[label.index()],
        model_ready: true,
    }
}
