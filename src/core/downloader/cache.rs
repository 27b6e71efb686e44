// ─── Content-Addressed Cache ───
// Layout: <root>/<algorithm>/<hash[0..2]>/<hash>, temp files in <root>/tmp.
// Writers always go through a temp file and an atomic rename, so readers in
// this or any other process never observe a half-written artifact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use super::hash::{hash_file, Checksum};
use crate::core::error::{LauncherError, LauncherResult};

/// How much work a cache hit has to prove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheVerification {
    /// Re-hash the cached file.
    #[default]
    Hash,
    /// Trust a file whose size matches the expected size.
    Size,
}

#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
    verification: CacheVerification,
}

type ClaimRegistry = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

static CLAIMS: OnceLock<ClaimRegistry> = OnceLock::new();

fn claims() -> &'static ClaimRegistry {
    CLAIMS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Exclusive right to populate one cache path inside this process.
pub struct Claim {
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut registry = claims().lock().unwrap_or_else(|e| e.into_inner());
        if registry
            .get(&self.path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            registry.remove(&self.path);
        }
    }
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            verification: CacheVerification::default(),
        }
    }

    pub fn with_verification(mut self, verification: CacheVerification) -> Self {
        self.verification = verification;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of an artifact. Depends on nothing but its checksum.
    pub fn path_for(&self, checksum: &Checksum) -> PathBuf {
        self.root
            .join(checksum.algorithm.as_str())
            .join(checksum.prefix())
            .join(&checksum.hex)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Wait for exclusive ownership of `path` within this process.
    pub async fn claim(&self, path: &Path) -> Claim {
        let lock = {
            let mut registry = claims().lock().unwrap_or_else(|e| e.into_inner());
            registry
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        Claim {
            path: path.to_path_buf(),
            guard: Some(guard),
        }
    }

    /// Return the cached path if a valid copy of the artifact is present.
    pub async fn lookup(
        &self,
        checksum: &Checksum,
        expected_size: Option<u64>,
    ) -> LauncherResult<Option<PathBuf>> {
        let path = self.path_for(checksum);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LauncherError::io(&path, e)),
        };

        if let Some(size) = expected_size {
            if metadata.len() != size {
                warn!(
                    "Cached {} has {} bytes, expected {}; refetching",
                    checksum,
                    metadata.len(),
                    size
                );
                return Ok(None);
            }
        }

        match self.verification {
            CacheVerification::Size if expected_size.is_some() => Ok(Some(path)),
            _ => {
                let actual = hash_file(&path, checksum.algorithm).await?;
                if &actual == checksum {
                    Ok(Some(path))
                } else {
                    warn!("Cached {} is corrupt (got {}); refetching", checksum, actual.hex);
                    Ok(None)
                }
            }
        }
    }

    /// Create a uniquely named temp file next to the cache tree.
    pub async fn create_temp(&self) -> LauncherResult<(PathBuf, tokio::fs::File)> {
        let dir = self.temp_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;
        let path = dir.join(format!("{}.part", Uuid::new_v4()));
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        Ok((path, file))
    }

    /// Atomically move a verified temp file to its final cache path.
    pub async fn promote(&self, temp: &Path, checksum: &Checksum) -> LauncherResult<PathBuf> {
        let dest = self.path_for(checksum);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        if let Err(e) = tokio::fs::rename(temp, &dest).await {
            // Another process may have won the race (rename onto an existing
            // file fails on Windows). Its copy has the same content.
            let already_present = tokio::fs::metadata(&dest).await.is_ok();
            discard(temp).await;
            if !already_present {
                return Err(LauncherError::io(&dest, e));
            }
        }

        debug!("Promoted {} -> {:?}", checksum, dest);
        Ok(dest)
    }
}

/// Remove a temp file, ignoring a file that is already gone.
pub async fn discard(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove temp file {:?}: {}", temp, e);
        }
    }
}
