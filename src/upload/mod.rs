/// Image upload module
///
/// This module handles:
/// - Deriving a collision-free destination key for a picked file
/// - Streaming the file to an object store (see `s3.rs`)
/// - Turning the transfer into a stream of progress and terminal events
mod error;
pub mod s3;

use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::stream::{self, Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::data::SelectedImage;

pub use error::{UploadError, UploadResult};
pub use s3::S3ObjectStore;

/// One event of an upload's event stream.
///
/// A stream yields any number of `Progress` events followed by exactly one
/// terminal `Success` or `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Percentage of bytes transferred so far (0-100)
    Progress(f32),
    /// Remote URL of the stored object
    Success(String),
    /// Reason the upload failed
    Failure(String),
}

/// A remote object store that accepts whole files
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the file at `source` under `key`, reporting transfer ticks to
    /// `progress`. Returns the URL the object can be fetched from.
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        progress: ProgressReporter,
    ) -> UploadResult<String>;
}

/// Converts byte counts into non-decreasing percentages on a channel
#[derive(Debug)]
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<f32>,
    last: f32,
}

impl ProgressReporter {
    fn new(sender: mpsc::UnboundedSender<f32>) -> Self {
        Self { sender, last: 0.0 }
    }

    /// Report that `transferred` of `total` bytes have been sent
    pub fn report(&mut self, transferred: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (transferred as f64 / total as f64 * 100.0).clamp(0.0, 100.0) as f32;
        self.last = self.last.max(percent);
        let _ = self.sender.unbounded_send(self.last);
    }
}

/// Build the destination key `<prefix><uuid>.<ext>`.
///
/// The extension is everything after the last `.` of the reference. A
/// reference without a dot contributes the whole reference.
pub fn destination_key(prefix: &str, reference: &str, id: Uuid) -> String {
    let ext = reference.rsplit('.').next().unwrap_or(reference);
    format!("{prefix}{id}.{ext}")
}

enum Phase {
    Starting {
        store: Arc<dyn ObjectStore>,
        source: SelectedImage,
        key: String,
    },
    ReceivingProgress {
        progress_rx: mpsc::UnboundedReceiver<f32>,
        result_rx: oneshot::Receiver<UploadResult<String>>,
    },
    Completed,
}

/// Upload `source` to `store` and return its event stream.
///
/// The transfer is spawned when the stream is first polled. There is no way
/// to cancel it once started and no retry on failure.
pub fn upload(
    store: Arc<dyn ObjectStore>,
    source: SelectedImage,
    key_prefix: &str,
) -> impl Stream<Item = UploadEvent> + Send + 'static {
    let key = destination_key(key_prefix, &source.reference(), Uuid::new_v4());

    stream::unfold(Phase::Starting { store, source, key }, |phase| async move {
        match phase {
            Phase::Starting { store, source, key } => {
                let (progress_rx, result_rx) = spawn_transfer(store, source, key);
                // Every transfer reports its start at zero
                Some((
                    UploadEvent::Progress(0.0),
                    Phase::ReceivingProgress {
                        progress_rx,
                        result_rx,
                    },
                ))
            }
            Phase::ReceivingProgress {
                mut progress_rx,
                result_rx,
            } => match progress_rx.next().await {
                Some(percent) => Some((
                    UploadEvent::Progress(percent),
                    Phase::ReceivingProgress {
                        progress_rx,
                        result_rx,
                    },
                )),
                // Reporter dropped: the transfer is over, wait for its result
                None => terminal(result_rx).await,
            },
            Phase::Completed => None,
        }
    })
}

/// Run `put_file` on its own task, returning its progress and result channels
fn spawn_transfer(
    store: Arc<dyn ObjectStore>,
    source: SelectedImage,
    key: String,
) -> (
    mpsc::UnboundedReceiver<f32>,
    oneshot::Receiver<UploadResult<String>>,
) {
    let (progress_tx, progress_rx) = mpsc::unbounded::<f32>();
    let (result_tx, result_rx) = oneshot::channel::<UploadResult<String>>();

    tokio::spawn(async move {
        info!("⬆️  Uploading {} as {}", source.path().display(), key);
        let result = store
            .put_file(&key, source.path(), ProgressReporter::new(progress_tx))
            .await;
        let _ = result_tx.send(result);
    });

    (progress_rx, result_rx)
}

async fn terminal(
    result_rx: oneshot::Receiver<UploadResult<String>>,
) -> Option<(UploadEvent, Phase)> {
    let event = match result_rx.await {
        Ok(Ok(url)) => {
            info!("✅ Upload complete: {}", url);
            UploadEvent::Success(url)
        }
        Ok(Err(e)) => {
            warn!("Upload failed: {}", e);
            UploadEvent::Failure(e.to_string())
        }
        Err(_) => {
            warn!("Upload task ended without a result");
            UploadEvent::Failure("Upload task cancelled".to_string())
        }
    };
    Some((event, Phase::Completed))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store that replays scripted byte counts, then succeeds or fails
    struct ScriptedStore {
        ticks: Vec<(u64, u64)>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn put_file(
            &self,
            key: &str,
            _source: &Path,
            mut progress: ProgressReporter,
        ) -> UploadResult<String> {
            for &(sent, total) in &self.ticks {
                progress.report(sent, total);
            }
            if self.fail {
                Err(UploadError::Status(503))
            } else {
                Ok(format!("https://bucket.example/{key}"))
            }
        }
    }

    async fn run(store: ScriptedStore, reference: &str) -> Vec<UploadEvent> {
        upload(Arc::new(store), SelectedImage::new(reference), "images/")
            .collect()
            .await
    }

    #[test]
    fn test_destination_key_uses_last_extension() {
        let id = Uuid::nil();
        assert_eq!(
            destination_key("images/", "/tmp/my.photo.jpg", id),
            format!("images/{id}.jpg")
        );
    }

    #[test]
    fn test_destination_key_without_extension_is_kept_naive() {
        let id = Uuid::nil();
        assert_eq!(
            destination_key("", "/tmp/photo", id),
            format!("{id}./tmp/photo")
        );
    }

    #[test]
    fn test_reporter_is_monotonic() {
        let (tx, mut rx) = mpsc::unbounded();
        let mut reporter = ProgressReporter::new(tx);

        reporter.report(50, 100);
        reporter.report(25, 100);
        reporter.report(0, 0);
        reporter.report(100, 100);
        drop(reporter);

        let mut values = Vec::new();
        while let Ok(Some(v)) = rx.try_next() {
            values.push(v);
        }
        assert_eq!(values, vec![50.0, 50.0, 100.0]);
    }

    #[tokio::test]
    async fn test_successful_upload_stream() {
        let store = ScriptedStore {
            ticks: vec![(10, 40), (20, 40), (40, 40)],
            fail: false,
        };

        let events = run(store, "/tmp/photo.jpg").await;

        assert_eq!(
            &events[..4],
            &[
                UploadEvent::Progress(0.0),
                UploadEvent::Progress(25.0),
                UploadEvent::Progress(50.0),
                UploadEvent::Progress(100.0),
            ]
        );
        assert_eq!(events.len(), 5);
        match &events[4] {
            UploadEvent::Success(url) => {
                assert!(url.starts_with("https://bucket.example/images/"));
                assert!(url.ends_with(".jpg"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_upload_stream_has_one_terminal_event() {
        let store = ScriptedStore {
            ticks: vec![(40, 100)],
            fail: true,
        };

        let events = run(store, "/tmp/photo.jpg").await;

        assert_eq!(
            &events[..2],
            &[UploadEvent::Progress(0.0), UploadEvent::Progress(40.0)]
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| !matches!(e, UploadEvent::Progress(_)))
                .count(),
            1
        );
        assert!(matches!(events.last(), Some(UploadEvent::Failure(_))));
    }
}
