use faceproof_core::detector::DetectorError;
use faceproof_core::inference::InferenceError;
use faceproof_core::{
    spawn_engine, ErrorKind, FaceDetector, FaceImage, InferenceSession, LogContext, ModelLoader,
    ModelSet, NormalizedTensor, Pipeline, PipelineConfig,
};
use faceproof_models::{ModelFile, LIVENESS_MODEL};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

struct Logit(f32);

impl InferenceSession for Logit {
    fn input_names(&self) -> Vec<String> {
        vec!["input".into()]
    }

    fn output_names(&self) -> Vec<String> {
        vec!["logit".into()]
    }

    fn run(&mut self, _input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
        Ok(vec![self.0])
    }
}

/// Liveness model only; the occlusion model never loads.
struct LivenessOnly(f32);

impl ModelLoader for LivenessOnly {
    fn load(&self, model: &'static ModelFile) -> Result<Box<dyn InferenceSession>, InferenceError> {
        if model.name == LIVENESS_MODEL.name {
            Ok(Box::new(Logit(self.0)))
        } else {
            Err(InferenceError::InferenceFailed("not bundled".into()))
        }
    }
}

struct AlwaysFace;

impl FaceDetector for AlwaysFace {
    fn detect(&self, _image: &FaceImage) -> Result<bool, DetectorError> {
        Ok(true)
    }
}

fn pipeline(logit: f32) -> Pipeline {
    let models = Arc::new(ModelSet::new(Arc::new(LivenessOnly(logit))));
    Pipeline::new(models, Arc::new(AlwaysFace), LogContext::default())
}

fn gray(w: u32, h: u32) -> FaceImage {
    FaceImage::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        w,
        h,
        Rgba([128, 128, 128, 255]),
    )))
}

#[tokio::test]
async fn engine_replies_once_per_request() {
    let engine = spawn_engine(pipeline(1.0)).unwrap();
    let config = PipelineConfig::builder().skip_occlusion_check(true).build();

    let first = engine.detect(gray(120, 120), config).await.unwrap();
    assert!(first.is_live());

    let err = engine.detect(gray(20, 120), config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidImage);
}

#[tokio::test]
async fn concurrent_callers_share_one_engine() {
    let engine = spawn_engine(pipeline(-2.0)).unwrap();
    let config = PipelineConfig::builder().skip_occlusion_check(true).build();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.detect(gray(100, 100), config).await
        }));
    }

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert!(!result.is_live());
    }
}

#[tokio::test]
async fn reload_reports_model_readiness() {
    let engine = spawn_engine(pipeline(1.0)).unwrap();
    let status = engine.reload_models().await.unwrap();
    assert!(status.liveness);
    assert!(!status.occlusion);
    assert!(status.detector);
}
