use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Queued,
    Started,
    Progress,
    CacheHit,
    Completed,
    Failed,
}

/// Payload delivered to progress observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub artifact_id: String,
    pub kind: ProgressKind,
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
}

/// Receives download progress. Implementations must return promptly: they are
/// called from download workers.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &DownloadProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, event: &DownloadProgress) {
        self(event)
    }
}

/// Forwards events into a bounded channel, dropping them when the
/// subscriber falls behind.
pub struct ChannelObserver {
    tx: mpsc::Sender<DownloadProgress>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<DownloadProgress>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self { tx }), rx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, event: &DownloadProgress) {
        let _ = self.tx.try_send(event.clone());
    }
}
