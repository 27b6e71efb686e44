use std::path::PathBuf;
use thiserror::Error;

use crate::core::downloader::LocalArtifactSet;

/// Central error type for the entire engine.
/// Every module returns `Result<T, LauncherError>` or one of the component
/// errors below, which convert into it.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Components ──────────────────────────────────────
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    // ── Cancellation ────────────────────────────────────
    /// Carries whatever was materialized before the signal was observed.
    #[error("preparation cancelled after {} artifacts were materialized", .0.len())]
    Cancelled(LocalArtifactSet),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

/// Malformed or cyclic version documents. Never retried.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed version document {id}: {message}")]
    Malformed { id: String, message: String },

    #[error("version {id} is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    #[error("inheritance cycle detected: {}", .chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },

    #[error("inheritance chain starting at {id} exceeds {max_depth} levels")]
    ChainTooDeep { id: String, max_depth: usize },

    #[error("version {0} not found")]
    VersionNotFound(String),

    #[error("invalid Maven coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("failed to load version document {id}: {reason}")]
    Unavailable { id: String, reason: String },
}

/// No viable artifact for a dependency under the given context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("library {library} declares native classifier `{classifier}` but provides no download for it")]
    MissingNativeClassifier { library: String, classifier: String },

    #[error("library {library} has no downloadable artifact")]
    NoViableArtifact { library: String },

    #[error("version {0} has no client download")]
    MissingClientJar(String),
}

/// Network failures. Transient ones are retried by the downloader.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("download failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("body of {url} was interrupted: {message}")]
    Body { url: String, message: String },

    #[error("invalid request for {url}: {message}")]
    Request { url: String, message: String },
}

impl NetworkError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Timeout { .. }
            | NetworkError::Connection { .. }
            | NetworkError::Body { .. } => true,
            NetworkError::Status { status, .. } => *status >= 500 || *status == 429,
            NetworkError::Request { .. } => false,
        }
    }

    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            NetworkError::Timeout { url }
        } else if let Some(status) = error.status() {
            NetworkError::Status {
                url,
                status: status.as_u16(),
            }
        } else if error.is_connect() {
            NetworkError::Connection {
                url,
                message: error.to_string(),
            }
        } else if error.is_body() || error.is_decode() {
            NetworkError::Body {
                url,
                message: error.to_string(),
            }
        } else if error.is_builder() {
            NetworkError::Request {
                url,
                message: error.to_string(),
            }
        } else {
            NetworkError::Connection {
                url,
                message: error.to_string(),
            }
        }
    }
}

/// Downloaded bytes did not match what the manifest promised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("{algorithm} mismatch for {id}: expected {expected}, got {actual}")]
    HashMismatch {
        id: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("size mismatch for {id}: expected {expected} bytes, got {actual}")]
    SizeMismatch { id: String, expected: u64, actual: u64 },
}

/// The launch command could not be assembled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("unresolved placeholder `${{{placeholder}}}` in argument `{argument}`")]
    UnresolvedPlaceholder { placeholder: String, argument: String },

    #[error("classpath is empty")]
    EmptyClasspath,

    #[error("native archive {path:?} could not be extracted: {message}")]
    NativeExtraction { path: PathBuf, message: String },
}

/// Why one artifact could not be materialized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("cache IO failed: {0}")]
    Io(String),
}

impl From<LauncherError> for ArtifactError {
    fn from(error: LauncherError) -> Self {
        match error {
            LauncherError::Network(e) => ArtifactError::Network(e),
            LauncherError::Integrity(e) => ArtifactError::Integrity(e),
            other => ArtifactError::Io(other.to_string()),
        }
    }
}
