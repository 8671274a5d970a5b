//! ONNX Runtime implementation of the inference engine.

use crate::inference::{InferenceError, InferenceSession, ModelLoader};
use crate::normalize::NormalizedTensor;
use faceproof_models::ModelFile;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};

/// Sessions run single-threaded; callers serialise access per session.
const INTRA_THREADS: usize = 1;

/// Loads bundled models from a model directory.
pub struct OrtModelLoader {
    model_dir: PathBuf,
}

impl OrtModelLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}

impl ModelLoader for OrtModelLoader {
    fn load(&self, model: &'static ModelFile) -> Result<Box<dyn InferenceSession>, InferenceError> {
        let path = faceproof_models::verify_model(&self.model_dir, model)?;
        let session = open_session(&path)?;

        tracing::info!(
            path = %path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded {} model",
            model.purpose
        );

        Ok(Box::new(OrtSession {
            session,
            expected_side: model.input_size as usize,
        }))
    }
}

/// Build a single-threaded session from an ONNX file.
pub(crate) fn open_session(path: &Path) -> Result<Session, InferenceError> {
    Ok(Session::builder()?
        .with_intra_threads(INTRA_THREADS)?
        .commit_from_file(path)?)
}

struct OrtSession {
    session: Session,
    expected_side: usize,
}

impl InferenceSession for OrtSession {
    fn input_names(&self) -> Vec<String> {
        self.session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    fn output_names(&self) -> Vec<String> {
        self.session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect()
    }

    fn run(&mut self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
        if input.side() != self.expected_side {
            return Err(InferenceError::InferenceFailed(format!(
                "expected {0}x{0} input, got {1}x{1}",
                self.expected_side,
                input.side()
            )));
        }

        let array = input
            .to_array()
            .map_err(|e| InferenceError::InferenceFailed(format!("input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(array.view())?])?;

        let Some((_, first)) = outputs.iter().next() else {
            return Err(InferenceError::InferenceFailed("model produced no outputs".to_string()));
        };
        let (_, data) = first
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(format!("output extraction: {e}")))?;

        Ok(data.to_vec())
    }
}
