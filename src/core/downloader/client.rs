use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::{discard, ContentCache};
use super::cancel::{CancellationToken, InFlightPolicy};
use super::hash::Checksum;
use super::progress::{DownloadProgress, ProgressKind, ProgressObserver};
use super::retry::RetryPolicy;
use super::task::{ArtifactFailure, DownloadTask, LocalArtifact, MaterializeReport};
use crate::core::error::{ArtifactError, IntegrityError, LauncherError, NetworkError};
use crate::core::http::{FetchResponse, Fetcher, DEFAULT_READ_TIMEOUT};

/// Tasks that resolve to the same cache path. Fetched once, reported per id.
type TaskGroup = Vec<DownloadTask>;

enum Outcome {
    Done(LocalArtifact),
    Failed { error: ArtifactError, attempts: u32 },
    /// Stopped mid-transfer by cancellation; counts as never started.
    Aborted,
}

enum TransferError {
    Failed(ArtifactError),
    Aborted,
}

impl From<LauncherError> for TransferError {
    fn from(error: LauncherError) -> Self {
        TransferError::Failed(error.into())
    }
}

/// Concurrent, verifying downloader that populates a content-addressed cache.
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    cache: ContentCache,
    /// Number of worker tasks pulling from the queue.
    concurrency: usize,
    retry: RetryPolicy,
    in_flight: InFlightPolicy,
    /// Longest silence tolerated from the server, per request and per chunk.
    read_timeout: Duration,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: ContentCache) -> Self {
        Self {
            fetcher,
            cache,
            concurrency: 8,
            retry: RetryPolicy::default(),
            in_flight: InFlightPolicy::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            observer: None,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_in_flight_policy(mut self, policy: InFlightPolicy) -> Self {
        self.in_flight = policy;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    // ── Batch ───────────────────────────────────────────

    /// Bring every task into the cache.
    ///
    /// Failures are collected per artifact and never abort siblings. When
    /// `cancel` fires, workers stop taking new tasks and the report carries
    /// whatever finished.
    pub async fn materialize(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: &CancellationToken,
    ) -> MaterializeReport {
        let mut groups: BTreeMap<Checksum, TaskGroup> = BTreeMap::new();
        for task in tasks {
            self.emit(&task.id, ProgressKind::Queued, 0, task.size);
            groups.entry(task.checksum.clone()).or_default().push(task);
        }

        let total_groups = groups.len();
        let workers_count = self.concurrency.min(total_groups).max(1);
        info!(
            "Materializing {} artifacts ({} unique), workers={}",
            groups.values().map(Vec::len).sum::<usize>(),
            total_groups,
            workers_count
        );

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<TaskGroup>();
        for group in groups.into_values() {
            // The receiver is alive until the workers finish.
            let _ = queue_tx.send(group);
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(TaskGroup, Outcome)>();
        let mut workers = JoinSet::new();
        for _ in 0..workers_count {
            let this = self.clone();
            let queue = Arc::clone(&queue);
            let results = result_tx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.recv().await;
                    let Some(group) = next else { break };
                    let outcome = this.process(&group, &cancel).await;
                    if results.send((group, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut report = MaterializeReport::default();
        let mut processed = 0usize;
        while let Some((group, outcome)) = result_rx.recv().await {
            match outcome {
                Outcome::Done(artifact) => {
                    processed += 1;
                    for task in group {
                        report.artifacts.insert(task.id, artifact.clone());
                    }
                }
                Outcome::Failed { error, attempts } => {
                    processed += 1;
                    for mut task in group {
                        task.attempts += attempts;
                        report.failures.push(ArtifactFailure {
                            task,
                            error: error.clone(),
                        });
                    }
                }
                Outcome::Aborted => {}
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Download worker ended abnormally: {}", e);
            }
        }

        report.failures.sort_by(|a, b| a.task.id.cmp(&b.task.id));
        report.cancelled = cancel.is_cancelled() && processed < total_groups;

        info!(
            "Materialized {} artifacts, {} failed{}",
            report.artifacts.len(),
            report.failures.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    /// Materialize a single artifact.
    pub async fn fetch_one(&self, task: DownloadTask) -> Result<LocalArtifact, ArtifactError> {
        let id = task.id.clone();
        let mut report = self.materialize(vec![task], &CancellationToken::new()).await;
        if let Some(failure) = report.failures.pop() {
            return Err(failure.error);
        }
        report.artifacts.remove(&id).ok_or_else(|| {
            ArtifactError::Io(format!("artifact {id} was not materialized"))
        })
    }

    // ── Single group ────────────────────────────────────

    async fn process(&self, group: &[DownloadTask], cancel: &CancellationToken) -> Outcome {
        let Some(primary) = group.first() else {
            return Outcome::Aborted;
        };
        let expected_size = group.iter().find_map(|t| t.size);
        let path = self.cache.path_for(&primary.checksum);
        let _claim = self.cache.claim(&path).await;

        match self.cache.lookup(&primary.checksum, expected_size).await {
            Ok(Some(found)) => {
                let size = tokio::fs::metadata(&found)
                    .await
                    .map(|m| m.len())
                    .unwrap_or_default();
                for task in group {
                    self.emit(&task.id, ProgressKind::CacheHit, size, Some(size));
                }
                debug!("Cache hit: {} -> {:?}", primary.id, found);
                return Outcome::Done(LocalArtifact {
                    path: found,
                    checksum: primary.checksum.clone(),
                    size,
                    from_cache: true,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed, refetching: {}", primary.id, e),
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            self.emit(&primary.id, ProgressKind::Started, 0, expected_size);

            match self.transfer(primary, expected_size, cancel).await {
                Ok(artifact) => {
                    for task in group {
                        self.emit(
                            &task.id,
                            ProgressKind::Completed,
                            artifact.size,
                            Some(artifact.size),
                        );
                    }
                    debug!("Downloaded: {} -> {:?}", primary.url, artifact.path);
                    return Outcome::Done(artifact);
                }
                Err(TransferError::Aborted) => {
                    debug!("Transfer of {} aborted by cancellation", primary.id);
                    return Outcome::Aborted;
                }
                Err(TransferError::Failed(error)) => {
                    let transient =
                        matches!(&error, ArtifactError::Network(e) if e.is_transient());
                    let stopping =
                        self.in_flight == InFlightPolicy::Abort && cancel.is_cancelled();
                    if transient && !stopping && self.retry.allows_another(attempts) {
                        let delay = self.retry.delay_after(attempts);
                        warn!(
                            "Attempt {} for {} failed ({}), retrying in {:?}",
                            attempts, primary.id, error, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    warn!("Giving up on {} after {} attempts: {}", primary.id, attempts, error);
                    for task in group {
                        self.emit(&task.id, ProgressKind::Failed, 0, expected_size);
                    }
                    return Outcome::Failed { error, attempts };
                }
            }
        }
    }

    async fn transfer(
        &self,
        task: &DownloadTask,
        expected_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<LocalArtifact, TransferError> {
        let response = tokio::time::timeout(self.read_timeout, self.fetcher.get(&task.url))
            .await
            .map_err(|_| stalled(task))?
            .map_err(|e| TransferError::Failed(e.into()))?;

        let (temp, file) = self.cache.create_temp().await?;
        let written = self
            .write_verified(task, expected_size, response, file, &temp, cancel)
            .await;

        let size = match written {
            Ok(size) => size,
            Err(e) => {
                discard(&temp).await;
                return Err(e);
            }
        };

        let path = self.cache.promote(&temp, &task.checksum).await?;
        Ok(LocalArtifact {
            path,
            checksum: task.checksum.clone(),
            size,
            from_cache: false,
        })
    }

    /// Stream the body into `file`, hashing as it goes. Returns the byte
    /// count once size and digest both match.
    async fn write_verified(
        &self,
        task: &DownloadTask,
        expected_size: Option<u64>,
        mut response: FetchResponse,
        mut file: tokio::fs::File,
        temp: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let total = expected_size.or(response.content_length);
        let mut hasher = task.checksum.algorithm.hasher();
        let mut transferred = 0u64;

        loop {
            let next = tokio::time::timeout(self.read_timeout, response.body.next())
                .await
                .map_err(|_| stalled(task))?;
            let Some(chunk) = next else { break };
            if self.in_flight == InFlightPolicy::Abort && cancel.is_cancelled() {
                return Err(TransferError::Aborted);
            }
            let chunk = chunk.map_err(|e| TransferError::Failed(e.into()))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io(temp, e))?;
            transferred += chunk.len() as u64;
            self.emit(&task.id, ProgressKind::Progress, transferred, total);
        }
        file.flush().await.map_err(|e| LauncherError::io(temp, e))?;
        drop(file);

        if let Some(expected) = expected_size {
            if expected != transferred {
                return Err(TransferError::Failed(
                    IntegrityError::SizeMismatch {
                        id: task.id.clone(),
                        expected,
                        actual: transferred,
                    }
                    .into(),
                ));
            }
        }

        let actual = hasher.finish();
        if actual != task.checksum {
            return Err(TransferError::Failed(
                IntegrityError::HashMismatch {
                    id: task.id.clone(),
                    algorithm: task.checksum.algorithm.to_string(),
                    expected: task.checksum.hex.clone(),
                    actual: actual.hex,
                }
                .into(),
            ));
        }

        Ok(transferred)
    }

    fn emit(&self, id: &str, kind: ProgressKind, bytes: u64, total: Option<u64>) {
        if let Some(observer) = &self.observer {
            observer.on_progress(&DownloadProgress {
                artifact_id: id.to_string(),
                kind,
                bytes_transferred: bytes,
                total_bytes: total,
            });
        }
    }
}

fn stalled(task: &DownloadTask) -> TransferError {
    TransferError::Failed(ArtifactError::Network(NetworkError::Timeout {
        url: task.url.clone(),
    }))
}
