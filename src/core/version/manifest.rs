// ─── Version Manifest ───
// The remote index of published versions (version_manifest_v2.json).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult, ManifestError};
use crate::core::http::Fetcher;

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level version manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub latest: LatestVersions,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
    #[serde(alias = "release_time")]
    pub release_time: DateTime<Utc>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        serde_json::from_slice(bytes).map_err(|e| ManifestError::Malformed {
            id: "version manifest".into(),
            message: e.to_string(),
        })
    }

    /// Fetch the version manifest through the injected fetcher.
    pub async fn fetch(fetcher: &dyn Fetcher, url: &str) -> LauncherResult<Self> {
        info!("Fetching version manifest from {}", url);
        let body = fetcher.get(url).await?.collect().await?;
        let manifest = Self::parse(&body).map_err(LauncherError::from)?;
        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn latest_release(&self) -> Option<&VersionEntry> {
        self.find_version(&self.latest.release)
    }

    /// Stable releases, newest first.
    pub fn releases(&self) -> Vec<&VersionEntry> {
        let mut releases: Vec<_> = self
            .versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect();
        releases.sort_by(|a, b| b.release_time.cmp(&a.release_time));
        releases
    }
}
