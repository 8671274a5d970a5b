use faceproof_core::{DetectorMode, DetectorOptions, PipelineConfig};
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Emit per-stage debug diagnostics.
    pub debug: bool,
    /// Skip the brightness/sharpness/face-presence gate.
    pub skip_quality: bool,
    /// Skip the hand/mask occlusion gate.
    pub skip_occlusion: bool,
    /// Face detector speed/accuracy trade-off.
    pub detector_mode: DetectorMode,
    /// Minimum face width as a fraction of image width.
    pub min_face_size: f32,
}

impl Config {
    /// Load configuration from `FACEPROOF_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEPROOF_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| faceproof_models::default_model_dir());

        Self {
            model_dir,
            debug: env_flag("FACEPROOF_DEBUG", false),
            skip_quality: env_flag("FACEPROOF_SKIP_QUALITY", false),
            skip_occlusion: env_flag("FACEPROOF_SKIP_OCCLUSION", false),
            detector_mode: std::env::var("FACEPROOF_DETECTOR_MODE")
                .ok()
                .and_then(|v| parse_detector_mode(&v))
                .unwrap_or_default(),
            min_face_size: env_f32(
                "FACEPROOF_MIN_FACE_SIZE",
                faceproof_core::detector::DEFAULT_MIN_FACE_SIZE,
            ),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::builder()
            .skip_quality_check(self.skip_quality)
            .skip_occlusion_check(self.skip_occlusion)
            .debug_logging(self.debug)
            .build()
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            mode: self.detector_mode,
            min_face_size: self.min_face_size,
        }
    }
}

/// `detect` flags given on the command line. `None` keeps the environment value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub skip_quality: Option<bool>,
    pub skip_occlusion: Option<bool>,
    pub debug: Option<bool>,
    pub detector_mode: Option<DetectorMode>,
    pub min_face_size: Option<f32>,
}

impl Config {
    /// Apply command-line flags on top of the environment.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(v) = overrides.skip_quality {
            self.skip_quality = v;
        }
        if let Some(v) = overrides.skip_occlusion {
            self.skip_occlusion = v;
        }
        if let Some(v) = overrides.debug {
            self.debug = v;
        }
        if let Some(mode) = overrides.detector_mode {
            self.detector_mode = mode;
        }
        if let Some(size) = overrides.min_face_size {
            self.min_face_size = size;
        }
    }
}

pub fn parse_detector_mode(value: &str) -> Option<DetectorMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "fast" => Some(DetectorMode::Fast),
        "accurate" => Some(DetectorMode::Accurate),
        _ => None,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
