use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bundled model artifact: file name, tensor geometry, human-readable purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFile {
    pub name: &'static str,
    /// Square input side in pixels (input tensor is `[1, 3, N, N]`).
    pub input_size: u32,
    /// Number of f32 values the model emits for one image. Classifier runs
    /// reject any other length.
    pub output_len: usize,
    pub purpose: &'static str,
}

/// Binary live/spoof classifier. Emits a single raw logit.
pub const LIVENESS_MODEL: ModelFile = ModelFile {
    name: "liveness.onnx",
    input_size: 224,
    output_len: 1,
    purpose: "live/spoof logit",
};

/// Three-class occlusion classifier: `[p_hand_over_face, p_normal, p_with_mask]`.
pub const OCCLUSION_MODEL: ModelFile = ModelFile {
    name: "occlusion.onnx",
    input_size: 224,
    output_len: 3,
    purpose: "hand/normal/mask probabilities",
};

/// SCRFD face detector used for the face-presence signal of the quality gate.
/// Emits six stride heads rather than one fixed-length vector.
pub const DETECTOR_MODEL: ModelFile = ModelFile {
    name: "det_10g.onnx",
    input_size: 640,
    output_len: 0,
    purpose: "face detection",
};

pub const MODELS: &[ModelFile] = &[LIVENESS_MODEL, OCCLUSION_MODEL, DETECTOR_MODEL];

/// Extension of the optional checksum sidecar (`liveness.onnx.sha256`).
const CHECKSUM_SIDECAR_EXT: &str = "sha256";

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: &'static str, path: PathBuf },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: &'static str,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Determine the model directory.
///
/// When running as root (UID 0), defaults to `/var/lib/faceproof/models` (system-wide).
/// Otherwise defaults to `$XDG_DATA_HOME/faceproof/models` (~/.local/share/faceproof/models).
pub fn default_model_dir() -> PathBuf {
    if is_root() {
        PathBuf::from("/var/lib/faceproof/models")
    } else {
        let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.local/share")
        });
        PathBuf::from(data_home).join("faceproof/models")
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid is always safe to call.
    unsafe { libc::geteuid() == 0 }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let mut file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ModelIntegrityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn verify_file_sha256(
    name: &'static str,
    path: &Path,
    expected_sha256: &str,
) -> Result<(), ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name,
            path: path.to_path_buf(),
        });
    }

    let digest = sha256_file_hex(path)?;
    if !digest.eq_ignore_ascii_case(expected_sha256) {
        return Err(ModelIntegrityError::ChecksumMismatch {
            name,
            path: path.to_path_buf(),
            expected: expected_sha256.to_string(),
            got: digest,
        });
    }

    Ok(())
}

/// Read the pinned checksum for `model_path` from its `.sha256` sidecar, if any.
///
/// Accepts both a bare digest and `sha256sum` output (`<digest>  <file>`).
pub fn pinned_checksum(model_path: &Path) -> Result<Option<String>, ModelIntegrityError> {
    let mut sidecar = model_path.as_os_str().to_owned();
    sidecar.push(".");
    sidecar.push(CHECKSUM_SIDECAR_EXT);
    let sidecar = PathBuf::from(sidecar);

    if !sidecar.exists() {
        return Ok(None);
    }

    let text = fs::read_to_string(&sidecar).map_err(|source| ModelIntegrityError::Read {
        path: sidecar.clone(),
        source,
    })?;
    Ok(text.split_whitespace().next().map(str::to_string))
}

/// Check a single bundled model: it must exist, and match its sidecar checksum if pinned.
/// Returns the path of the verified file.
pub fn verify_model(model_dir: &Path, model: &ModelFile) -> Result<PathBuf, ModelIntegrityError> {
    let path = model_dir.join(model.name);
    match pinned_checksum(&path)? {
        Some(expected) => verify_file_sha256(model.name, &path, &expected)?,
        None if !path.exists() => {
            return Err(ModelIntegrityError::MissingModel {
                name: model.name,
                path,
            })
        }
        None => {}
    }
    Ok(path)
}

pub fn verify_models_dir(model_dir: &Path) -> Result<(), ModelIntegrityError> {
    for model in MODELS {
        verify_model(model_dir, model)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "faceproof-models-test-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn verify_file_sha256_rejects_missing() {
        let path = scratch_dir("missing").join("nope.onnx");

        let err = verify_file_sha256("nope.onnx", &path, "00").unwrap_err();
        assert!(matches!(err, ModelIntegrityError::MissingModel { .. }));
    }

    #[test]
    fn verify_file_sha256_rejects_mismatch() {
        let dir = scratch_dir("mismatch");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.onnx");
        fs::write(&path, b"hello").unwrap();

        let err = verify_file_sha256("model.onnx", &path, "00").unwrap_err();
        assert!(matches!(err, ModelIntegrityError::ChecksumMismatch { .. }));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn verify_file_sha256_accepts_match() {
        let dir = scratch_dir("match");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.onnx");
        fs::write(&path, b"hello").unwrap();

        let digest = sha256_file_hex(&path).unwrap();
        verify_file_sha256("model.onnx", &path, &digest).unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn verify_models_dir_reports_missing() {
        let err = verify_models_dir(&scratch_dir("dir-missing")).unwrap_err();
        assert!(matches!(err, ModelIntegrityError::MissingModel { .. }));
    }

    #[test]
    fn verify_model_honours_sidecar() {
        let dir = scratch_dir("sidecar");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(LIVENESS_MODEL.name);
        fs::write(&path, b"weights").unwrap();

        // No sidecar: presence is enough
        assert_eq!(verify_model(&dir, &LIVENESS_MODEL).unwrap(), path);

        // Pinned to the wrong digest
        fs::write(dir.join("liveness.onnx.sha256"), "deadbeef  liveness.onnx\n").unwrap();
        let err = verify_model(&dir, &LIVENESS_MODEL).unwrap_err();
        assert!(matches!(err, ModelIntegrityError::ChecksumMismatch { .. }));

        // Pinned to the right digest
        let digest = sha256_file_hex(&path).unwrap();
        fs::write(dir.join("liveness.onnx.sha256"), format!("{digest}\n")).unwrap();
        verify_model(&dir, &LIVENESS_MODEL).unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn manifest_geometry() {
        assert_eq!(MODELS.len(), 3);
        assert_eq!(LIVENESS_MODEL.output_len, 1);
        assert_eq!(OCCLUSION_MODEL.output_len, 3);
        assert!(MODELS.iter().all(|m| m.name.ends_with(".onnx")));
    }
}
