mod cache;
mod cancel;
mod client;
mod hash;
mod progress;
mod retry;
mod task;

pub use cache::{CacheVerification, ContentCache};
pub use cancel::{CancellationToken, InFlightPolicy};
pub use client::Downloader;
pub use hash::{hash_file, Checksum, HashAlgorithm};
pub use progress::{ChannelObserver, DownloadProgress, ProgressKind, ProgressObserver};
pub use retry::RetryPolicy;
pub use task::{ArtifactFailure, DownloadTask, LocalArtifact, LocalArtifactSet, MaterializeReport};
