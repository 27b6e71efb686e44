use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::downloader::{Checksum, DownloadTask, LocalArtifact, LocalArtifactSet};
use crate::core::error::{LauncherError, LauncherResult, ManifestError};

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Top-level asset index JSON structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIndex {
    /// Logical path -> object. Many paths may share one hash.
    pub objects: BTreeMap<String, AssetObject>,
    /// Pre-1.7 layout: objects are also exposed under their logical names.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
    /// Alternative download base for the objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    pub fn url(&self, resources_base: &str) -> String {
        format!(
            "{}/{}/{}",
            resources_base.trim_end_matches('/'),
            self.hash.get(..2).unwrap_or_default(),
            self.hash
        )
    }
}

impl AssetIndex {
    pub fn parse(index_id: &str, bytes: &[u8]) -> Result<Self, ManifestError> {
        let index: Self = serde_json::from_slice(bytes).map_err(|e| ManifestError::Malformed {
            id: format!("asset index {index_id}"),
            message: e.to_string(),
        })?;
        index.check_names(index_id)?;
        Ok(index)
    }

    /// Every logical path must stay inside the directory it is laid out in.
    pub fn check_names(&self, index_id: &str) -> Result<(), ManifestError> {
        match self.objects.keys().find(|name| !is_enclosed(name)) {
            Some(name) => Err(ManifestError::Malformed {
                id: format!("asset index {index_id}"),
                message: format!("object path `{name}` escapes the asset tree"),
            }),
            None => Ok(()),
        }
    }

    /// Whether objects must also be laid out by their logical paths.
    pub fn needs_named_layout(&self) -> bool {
        self.is_virtual || self.map_to_resources
    }

    /// One download task per logical path, ids of the form `asset:<path>`.
    /// Paths sharing a hash collapse into a single transfer downstream.
    pub fn download_tasks(&self, resources_base: &str) -> Result<Vec<DownloadTask>, ManifestError> {
        self.check_names("<in memory>")?;
        let base = self.origin.as_deref().unwrap_or(resources_base);
        self.objects
            .iter()
            .map(|(name, object)| {
                let checksum =
                    Checksum::sha1(&object.hash).ok_or_else(|| ManifestError::Malformed {
                        id: format!("asset {name}"),
                        message: format!("invalid hash `{}`", object.hash),
                    })?;
                Ok(DownloadTask::new(asset_id(name), object.url(base), checksum)
                    .with_size(object.size))
            })
            .collect()
    }
}

/// Relative path made only of plain segments.
fn is_enclosed(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

pub(crate) fn asset_id(name: &str) -> String {
    format!("asset:{name}")
}

/// Where the game expects its assets, once linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    /// `${assets_root}`
    pub assets_root: PathBuf,
    /// `${game_assets}`: the named tree for legacy indexes, else the root.
    pub game_assets: PathBuf,
    pub objects_linked: usize,
}

/// Expose cached asset objects in the layout the game reads:
/// `objects/<hh>/<hash>`, `indexes/<id>.json`, and for legacy indexes
/// `virtual/<id>/<logical path>`. Objects missing from `local` are skipped
/// (they are reported as deficiencies by the caller).
pub async fn link_assets(
    assets_dir: &Path,
    index_id: &str,
    index_artifact: &LocalArtifact,
    index: &AssetIndex,
    local: &LocalArtifactSet,
) -> LauncherResult<AssetLayout> {
    index.check_names(index_id)?;
    let index_dest = assets_dir.join("indexes").join(format!("{index_id}.json"));
    link_or_copy(&index_artifact.path, &index_dest).await?;

    let virtual_root = assets_dir.join("virtual").join(index_id);
    let mut linked = 0usize;
    for (name, object) in &index.objects {
        let Some(artifact) = local.get(&asset_id(name)) else {
            continue;
        };
        let object_dest = assets_dir
            .join("objects")
            .join(object.hash.get(..2).unwrap_or_default())
            .join(&object.hash);
        link_or_copy(&artifact.path, &object_dest).await?;

        if index.needs_named_layout() {
            link_or_copy(&artifact.path, &virtual_root.join(name)).await?;
        }
        linked += 1;
    }

    info!(
        "Linked {} of {} asset objects for index {}",
        linked,
        index.objects.len(),
        index_id
    );

    Ok(AssetLayout {
        assets_root: assets_dir.to_path_buf(),
        game_assets: if index.needs_named_layout() {
            virtual_root
        } else {
            assets_dir.to_path_buf()
        },
        objects_linked: linked,
    })
}

/// Hard-link `src` to `dest`, falling back to a copy across filesystems.
/// An existing `dest` of the same size is left alone.
pub(crate) async fn link_or_copy(src: &Path, dest: &Path) -> LauncherResult<()> {
    if let (Ok(existing), Ok(source)) = (
        tokio::fs::metadata(dest).await,
        tokio::fs::metadata(src).await,
    ) {
        if existing.len() == source.len() {
            return Ok(());
        }
        tokio::fs::remove_file(dest)
            .await
            .map_err(|e| LauncherError::io(dest, e))?;
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }

    match tokio::fs::hard_link(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Hard link {:?} failed ({}), copying", dest, e);
            tokio::fs::copy(src, dest).await.map_err(|e| {
                warn!("Could not place {:?}: {}", dest, e);
                LauncherError::io(dest, e)
            })?;
            Ok(())
        }
    }
}
