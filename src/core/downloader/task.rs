use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::hash::Checksum;
use crate::core::error::ArtifactError;

/// One artifact to materialize into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Stable identifier used for reporting and for the local artifact map
    /// (library coordinate, `client:<version>`, `asset:<path>`, ...).
    pub id: String,
    pub url: String,
    pub checksum: Checksum,
    pub size: Option<u64>,
    /// Attempts spent on this task so far, across retries.
    pub attempts: u32,
}

impl DownloadTask {
    pub fn new(id: impl Into<String>, url: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            checksum,
            size: None,
            attempts: 0,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// An artifact present in the cache after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub checksum: Checksum,
    pub size: u64,
    /// Served from the cache without network access.
    pub from_cache: bool,
}

/// Materialized artifacts keyed by task id. Several ids may point at the
/// same file when their content hashes are equal.
pub type LocalArtifactSet = BTreeMap<String, LocalArtifact>;

/// An artifact that could not be materialized, with the task that can be
/// queued again to retry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub task: DownloadTask,
    pub error: ArtifactError,
}

impl ArtifactFailure {
    pub fn id(&self) -> &str {
        &self.task.id
    }
}

/// Outcome of one `materialize` call.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub artifacts: LocalArtifactSet,
    pub failures: Vec<ArtifactFailure>,
    /// Cancellation was observed before the queue drained.
    pub cancelled: bool,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}
