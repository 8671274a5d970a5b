use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceproof_core::{
    spawn_engine, FaceImage, LogContext, ModelSet, OrtModelLoader, Pipeline, ScrfdDetector,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod models;

use config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "faceproof", version, about = "Single-frame face liveness check")]
struct Cli {
    /// Directory containing ONNX models (overrides FACEPROOF_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decide whether an image shows a live face; prints a JSON decision record
    Detect {
        /// Image file to check
        image: PathBuf,
        /// Skip the capture quality gate; `=false` overrides FACEPROOF_SKIP_QUALITY
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        skip_quality: Option<bool>,
        /// Skip the hand/mask occlusion gate; `=false` overrides FACEPROOF_SKIP_OCCLUSION
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        skip_occlusion: Option<bool>,
        /// Log every pipeline stage; `=false` overrides FACEPROOF_DEBUG
        #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
        debug: Option<bool>,
        /// Face detector mode: fast or accurate
        #[arg(long, value_parser = parse_mode)]
        detector_mode: Option<faceproof_core::DetectorMode>,
        /// Minimum face width as a fraction of image width
        #[arg(long)]
        min_face_size: Option<f32>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Check that every model file is present and matches its pinned checksum
    Models,
    /// Print the library version
    Version,
}

fn parse_mode(value: &str) -> Result<faceproof_core::DetectorMode, String> {
    config::parse_detector_mode(value).ok_or_else(|| format!("unknown detector mode: {value}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    match cli.command {
        Command::Detect {
            image,
            skip_quality,
            skip_occlusion,
            debug,
            detector_mode,
            min_face_size,
            pretty,
        } => {
            config.apply(Overrides {
                skip_quality,
                skip_occlusion,
                debug,
                detector_mode,
                min_face_size,
            });
            detect(&config, &image, pretty).await
        }
        Command::Models => models::run(&config.model_dir),
        Command::Version => {
            println!("faceproof {}", faceproof_core::version());
            Ok(())
        }
    }
}

async fn detect(config: &Config, image_path: &Path, pretty: bool) -> Result<()> {
    let image = FaceImage::open(image_path)
        .with_context(|| format!("failed to load {}", image_path.display()))?;

    let loader = Arc::new(OrtModelLoader::new(&config.model_dir));
    let models = Arc::new(ModelSet::new(loader));
    let detector = Arc::new(ScrfdDetector::new(
        &config.model_dir,
        config.detector_options(),
    ));
    let pipeline = Pipeline::new(models, detector, LogContext::new(config.debug));

    tracing::info!(
        image = %image_path.display(),
        width = image.width(),
        height = image.height(),
        model_dir = %config.model_dir.display(),
        "running liveness check"
    );

    let engine = spawn_engine(pipeline)?;
    let mut outcome = engine.detect(image.clone(), config.pipeline_config()).await;

    if matches!(&outcome, Err(e) if e.is_recoverable()) {
        let status = engine.reload_models().await?;
        tracing::warn!(?status, "model load failed, retrying after reload");
        outcome = engine.detect(image, config.pipeline_config()).await;
    }
    let result = outcome.context("liveness check failed")?;

    let json = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_flags(args: &[&str]) -> (Option<bool>, Option<bool>, PathBuf) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Detect {
                skip_quality,
                debug,
                image,
                ..
            } => (skip_quality, debug, image),
            _ => panic!("expected detect"),
        }
    }

    #[test]
    fn bool_flags_accept_explicit_false() {
        let (skip, debug, image) =
            detect_flags(&["faceproof", "detect", "--skip-quality=false", "--debug", "a.png"]);
        assert_eq!(skip, Some(false));
        assert_eq!(debug, Some(true));
        assert_eq!(image, PathBuf::from("a.png"));

        let (skip, debug, _) = detect_flags(&["faceproof", "detect", "a.png"]);
        assert_eq!((skip, debug), (None, None));
    }
}
