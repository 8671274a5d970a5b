use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::face_image::FaceImage;
use crate::liveness::LivenessResult;
use crate::pipeline::{Pipeline, ReloadStatus};
use tokio::sync::{mpsc, oneshot};

/// Pending requests before `detect` callers start waiting on the channel.
const QUEUE_DEPTH: usize = 4;

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Detect {
        image: FaceImage,
        config: PipelineConfig,
        reply: oneshot::Sender<Result<LivenessResult, PipelineError>>,
    },
    Reload {
        reply: oneshot::Sender<ReloadStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the pipeline on the engine thread. Resolves exactly once, with
    /// either the verdict or the error.
    pub async fn detect(
        &self,
        image: FaceImage,
        config: PipelineConfig,
    ) -> Result<LivenessResult, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                image,
                config,
                reply: reply_tx,
            })
            .await
            .map_err(|_| channel_closed())?;
        reply_rx.await.map_err(|_| channel_closed())?
    }

    /// Retry loading any model that is not ready.
    pub async fn reload_models(&self) -> Result<ReloadStatus, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Reload { reply: reply_tx })
            .await
            .map_err(|_| channel_closed())?;
        reply_rx.await.map_err(|_| channel_closed())
    }
}

fn channel_closed() -> PipelineError {
    PipelineError::liveness("engine thread exited")
}

/// Spawn the pipeline on a dedicated OS thread.
///
/// Requests are handled one at a time in arrival order. The thread exits
/// once every [`EngineHandle`] is dropped.
pub fn spawn_engine(pipeline: Pipeline) -> Result<EngineHandle, PipelineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("faceproof-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect {
                        image,
                        config,
                        reply,
                    } => {
                        let result = pipeline.detect_liveness(&image, &config);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Reload { reply } => {
                        let _ = reply.send(pipeline.reload_models());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| PipelineError::liveness("failed to spawn engine thread").with_source(e))?;

    Ok(EngineHandle { tx })
}
