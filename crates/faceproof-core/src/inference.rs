//! Inference engine seam and lazily-loaded model sessions.
//!
//! A [`LoadSlot`] owns one external resource behind a mutex and walks the
//! lifecycle `Unloaded → Loading → Ready | Failed`. The first call loads it;
//! a failed load stays failed until `reload` is called. Every call holds the
//! slot lock for its duration, so one session never runs two requests
//! concurrently. [`ModelSlot`] is the slot for a classifier model.

use crate::normalize::NormalizedTensor;
use faceproof_models::{ModelFile, ModelIntegrityError, LIVENESS_MODEL, OCCLUSION_MODEL};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model integrity: {0}")]
    Integrity(#[from] ModelIntegrityError),
    #[error("model {model} is not loaded: {reason}")]
    NotLoaded { model: &'static str, reason: String },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One loaded model, able to run a single normalised image.
pub trait InferenceSession: Send {
    fn input_names(&self) -> Vec<String>;
    fn output_names(&self) -> Vec<String>;
    /// Run the model and return its first output, flattened.
    fn run(&mut self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Creates sessions for bundled models.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: &'static ModelFile) -> Result<Box<dyn InferenceSession>, InferenceError>;
}

/// Observable lifecycle state of a [`LoadSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

enum SlotInner<T> {
    Unloaded,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> SlotInner<T> {
    fn state(&self) -> SlotState {
        match self {
            SlotInner::Unloaded => SlotState::Unloaded,
            SlotInner::Loading => SlotState::Loading,
            SlotInner::Ready(_) => SlotState::Ready,
            SlotInner::Failed(_) => SlotState::Failed,
        }
    }
}

/// Mutex-guarded, load-once holder for an external resource.
///
/// The caller supplies the load step on each access; it only runs from
/// `Unloaded` or from an explicit [`LoadSlot::reload`].
pub struct LoadSlot<T> {
    name: &'static str,
    inner: Mutex<SlotInner<T>>,
}

impl<T> LoadSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(SlotInner::Unloaded),
        }
    }

    pub fn state(&self) -> SlotState {
        self.lock().state()
    }

    /// Run `f` on the loaded value, calling `load` first if nothing was ever loaded.
    pub fn with_ready<R, E>(
        &self,
        load: impl FnOnce() -> Result<T, E>,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: fmt::Display + From<InferenceError>,
    {
        let mut inner = self.lock();
        if matches!(*inner, SlotInner::Unloaded) {
            self.load_locked(&mut inner, load);
        }

        match &mut *inner {
            SlotInner::Ready(value) => f(value),
            SlotInner::Failed(reason) => Err(InferenceError::NotLoaded {
                model: self.name,
                reason: reason.clone(),
            }
            .into()),
            SlotInner::Unloaded | SlotInner::Loading => Err(InferenceError::NotLoaded {
                model: self.name,
                reason: "load was interrupted".to_string(),
            }
            .into()),
        }
    }

    /// Retry acquisition once. No-op when already ready.
    /// Returns whether the slot is ready afterwards.
    pub fn reload<E: fmt::Display>(&self, load: impl FnOnce() -> Result<T, E>) -> bool {
        let mut inner = self.lock();
        if !matches!(*inner, SlotInner::Ready(_)) {
            tracing::info!(model = self.name, "reloading model");
            self.load_locked(&mut inner, load);
        }
        matches!(*inner, SlotInner::Ready(_))
    }

    fn load_locked<E: fmt::Display>(
        &self,
        inner: &mut SlotInner<T>,
        load: impl FnOnce() -> Result<T, E>,
    ) {
        *inner = SlotInner::Loading;
        *inner = match load() {
            Ok(value) => SlotInner::Ready(value),
            Err(e) => {
                tracing::warn!(model = self.name, error = %e, "model load failed");
                SlotInner::Failed(e.to_string())
            }
        };
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<T>> {
        // A panic inside a session leaves the state as it was; keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Lazily-loaded session for one classifier model.
pub struct ModelSlot {
    model: &'static ModelFile,
    loader: Arc<dyn ModelLoader>,
    session: LoadSlot<Box<dyn InferenceSession>>,
}

impl ModelSlot {
    pub fn new(model: &'static ModelFile, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model,
            loader,
            session: LoadSlot::new(model.name),
        }
    }

    pub fn model(&self) -> &'static ModelFile {
        self.model
    }

    pub fn state(&self) -> SlotState {
        self.session.state()
    }

    /// Run inference, loading the model first if it was never loaded.
    ///
    /// Output of any length other than the model's `output_len` is an error.
    pub fn run(&self, input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
        let output = self.session.with_ready(|| self.load(), |session| session.run(input))?;
        if output.len() != self.model.output_len {
            return Err(InferenceError::InferenceFailed(format!(
                "{} emitted {} values, expected {}",
                self.model.name,
                output.len(),
                self.model.output_len
            )));
        }
        Ok(output)
    }

    /// Retry model acquisition once. No-op when already ready.
    /// Returns whether the slot is ready afterwards.
    pub fn reload(&self) -> bool {
        self.session.reload(|| self.load())
    }

    fn load(&self) -> Result<Box<dyn InferenceSession>, InferenceError> {
        let session = self.loader.load(self.model)?;
        tracing::info!(
            model = self.model.name,
            inputs = ?session.input_names(),
            outputs = ?session.output_names(),
            "model ready"
        );
        Ok(session)
    }
}

/// The two classifier sessions, shared by every pipeline using one engine.
pub struct ModelSet {
    pub liveness: ModelSlot,
    pub occlusion: ModelSlot,
}

impl ModelSet {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            liveness: ModelSlot::new(&LIVENESS_MODEL, Arc::clone(&loader)),
            occlusion: ModelSlot::new(&OCCLUSION_MODEL, loader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstSession(Vec<f32>);

    struct Unavailable;

    impl fmt::Display for Unavailable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("no runtime")
        }
    }

    impl InferenceSession for ConstSession {
        fn input_names(&self) -> Vec<String> {
            vec!["input".into()]
        }
        fn output_names(&self) -> Vec<String> {
            vec!["output".into()]
        }
        fn run(&mut self, _input: &NormalizedTensor) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    /// Fails the first `failures` loads, then succeeds.
    struct FlakyLoader {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl ModelLoader for FlakyLoader {
        fn load(
            &self,
            _model: &'static ModelFile,
        ) -> Result<Box<dyn InferenceSession>, InferenceError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(InferenceError::InferenceFailed("no runtime".into()))
            } else {
                Ok(Box::new(ConstSession(vec![1.0])))
            }
        }
    }

    fn tensor() -> NormalizedTensor {
        crate::normalize::normalize_rgba(&image::RgbaImage::new(2, 2), 2).unwrap()
    }

    fn slot(failures: usize) -> (ModelSlot, Arc<FlakyLoader>) {
        let loader = Arc::new(FlakyLoader {
            failures,
            attempts: AtomicUsize::new(0),
        });
        (ModelSlot::new(&LIVENESS_MODEL, loader.clone()), loader)
    }

    #[test]
    fn loads_lazily_on_first_run() {
        let (slot, loader) = slot(0);
        assert_eq!(slot.state(), SlotState::Unloaded);
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 0);

        assert_eq!(slot.run(&tensor()).unwrap(), vec![1.0]);
        assert_eq!(slot.state(), SlotState::Ready);
        slot.run(&tensor()).unwrap();
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_sticks_until_reload() {
        let (slot, loader) = slot(1);
        let err = slot.run(&tensor()).unwrap_err();
        assert!(matches!(err, InferenceError::NotLoaded { .. }));
        assert_eq!(slot.state(), SlotState::Failed);

        // No implicit retry
        assert!(slot.run(&tensor()).is_err());
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);

        assert!(slot.reload());
        assert_eq!(slot.state(), SlotState::Ready);
        assert!(slot.run(&tensor()).is_ok());
    }

    #[test]
    fn reload_retries_exactly_once() {
        let (slot, loader) = slot(5);
        assert!(!slot.reload());
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(slot.state(), SlotState::Failed);
    }

    #[test]
    fn reload_is_noop_when_ready() {
        let (slot, loader) = slot(0);
        assert!(slot.reload());
        assert!(slot.reload());
        assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wrong_output_length_is_rejected() {
        struct TwoLogits;
        impl ModelLoader for TwoLogits {
            fn load(
                &self,
                _model: &'static ModelFile,
            ) -> Result<Box<dyn InferenceSession>, InferenceError> {
                Ok(Box::new(ConstSession(vec![1.0, -1.0])))
            }
        }

        let slot = ModelSlot::new(&LIVENESS_MODEL, Arc::new(TwoLogits));
        let err = slot.run(&tensor()).unwrap_err();
        assert!(matches!(err, InferenceError::InferenceFailed(_)));
        assert_eq!(slot.state(), SlotState::Ready);
    }

    #[test]
    fn load_slot_does_not_retry_on_access() {
        let slot: LoadSlot<u32> = LoadSlot::new("detector");
        let attempts = AtomicUsize::new(0);
        let failing = || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(InferenceError::InferenceFailed("no runtime".into()))
        };

        for _ in 0..3 {
            let err = slot.with_ready(failing, |v| Ok::<_, InferenceError>(*v)).unwrap_err();
            assert!(matches!(err, InferenceError::NotLoaded { model: "detector", .. }));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(slot.state(), SlotState::Failed);

        assert!(!slot.reload(|| Err::<u32, _>(Unavailable)));
        assert_eq!(slot.state(), SlotState::Failed);

        assert!(slot.reload(|| Ok::<_, Unavailable>(7)));
        assert_eq!(slot.with_ready(failing, |v| Ok::<_, InferenceError>(*v)).unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
