use rollcall_core::{decode_image, load_gallery, DetectedFace, ExtractError, FeatureExtractor, Gallery};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("feature extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("feature extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Extract {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, EngineError>>,
    },
    LoadGallery {
        dir: PathBuf,
        reply: oneshot::Sender<Gallery>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Decode an encoded image and extract every face in it.
    ///
    /// The timeout covers queueing as well as the extraction itself. A
    /// caller that times out drops its reply channel and the engine skips
    /// the request instead of running it for nobody.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Vec<DetectedFace>, EngineError> {
        let request = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.tx
                .send(EngineRequest::Extract {
                    image,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }

    /// Scan an enrollment directory on the engine thread.
    ///
    /// Not bounded by the extraction timeout: a full directory scan is
    /// expected to take longer than a single photo.
    pub async fn load_gallery(&self, dir: PathBuf) -> Result<Gallery, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::LoadGallery {
                dir,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Move `extractor` onto a dedicated OS thread and return a handle to it.
///
/// The extractor is only ever touched from that thread, so model sessions
/// need no locking and requests are served one at a time in arrival order.
pub fn spawn_engine<E>(mut extractor: E, timeout: Duration) -> Result<EngineHandle, EngineError>
where
    E: FeatureExtractor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        if reply.is_closed() {
                            tracing::debug!("skipping extraction abandoned by its caller");
                            continue;
                        }
                        let result = run_extract(&mut extractor, &image);
                        if let Err(e) = &result {
                            tracing::debug!(error = %e, "extraction failed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::LoadGallery { dir, reply } => {
                        let gallery = load_gallery(&dir, &mut extractor);
                        let _ = reply.send(gallery);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, timeout })
}

fn run_extract<E: FeatureExtractor>(
    extractor: &mut E,
    bytes: &[u8],
) -> Result<Vec<DetectedFace>, EngineError> {
    let image = decode_image(bytes)?;
    Ok(extractor.extract(&image)?)
}
