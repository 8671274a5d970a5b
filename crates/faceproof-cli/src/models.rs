//! `faceproof models` — checks the ONNX models the pipeline loads.

use anyhow::{bail, Result};
use faceproof_models::{sha256_file_hex, verify_model, ModelIntegrityError, MODELS};
use std::path::Path;

/// Report every bundled model's status and digest. Fails if any is unusable.
pub fn run(model_dir: &Path) -> Result<()> {
    println!("Model directory: {}", model_dir.display());

    let mut problems = 0;
    for model in MODELS {
        match verify_model(model_dir, model) {
            Ok(path) => {
                let digest = sha256_file_hex(&path)?;
                println!("  {:<16} ok       sha256:{digest}  ({})", model.name, model.purpose);
            }
            Err(ModelIntegrityError::MissingModel { .. }) => {
                println!("  {:<16} missing  ({})", model.name, model.purpose);
                problems += 1;
            }
            Err(e) => {
                println!("  {:<16} invalid  {e}", model.name);
                problems += 1;
            }
        }
    }

    println!();
    if problems > 0 {
        bail!("{problems} model(s) missing or invalid in {}", model_dir.display());
    }
    println!("All models present.");

    Ok(())
}
