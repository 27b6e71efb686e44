// ─── Dependency Resolver ───
// Turns a merged version descriptor and a runtime context into the ordered,
// deduplicated set of artifacts a launch needs. Pure and synchronous.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::context::RuntimeContext;
use crate::core::downloader::{Checksum, DownloadTask};
use crate::core::error::{LauncherResult, ResolutionError};
use crate::core::maven::{LibraryKey, MavenArtifact};
use crate::core::version::{evaluate, AssetIndexRef, LibraryRef, VersionDescriptor};

/// Which entry survives when several libraries share a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The numerically highest version.
    #[default]
    HighestVersion,
    /// The entry declared last.
    LastDeclared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub coordinate: MavenArtifact,
    pub task: DownloadTask,
}

/// A native archive to unpack into the natives directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNative {
    pub coordinate: MavenArtifact,
    pub task: DownloadTask,
    /// Entry prefixes that must not be extracted.
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSet {
    pub version_id: String,
    /// Classpath libraries in declaration order.
    pub libraries: Vec<ResolvedLibrary>,
    pub natives: Vec<ResolvedNative>,
    pub client_jar: DownloadTask,
    pub asset_index: Option<AssetIndexRef>,
}

impl ResolvedSet {
    /// Every artifact of the set: libraries, native archives, client jar.
    pub fn download_tasks(&self) -> Vec<DownloadTask> {
        self.libraries
            .iter()
            .map(|l| l.task.clone())
            .chain(self.natives.iter().map(|n| n.task.clone()))
            .chain(std::iter::once(self.client_jar.clone()))
            .collect()
    }
}

pub fn client_jar_id(version_id: &str) -> String {
    format!("client:{version_id}")
}

/// Resolve `descriptor` (already merged with its ancestors) under `ctx`.
pub fn resolve(
    descriptor: &VersionDescriptor,
    ctx: &RuntimeContext,
    policy: DuplicatePolicy,
) -> LauncherResult<ResolvedSet> {
    let included = select_libraries(descriptor, ctx, policy)?;

    let mut libraries = Vec::new();
    let mut natives = Vec::new();
    for (coordinate, lib) in included {
        let main = main_artifact(&coordinate, lib)?;

        let native = match lib.native_classifier(ctx) {
            Some(classifier) => Some(native_artifact(&coordinate, lib, &classifier)?),
            None => None,
        };

        if main.is_none() && native.is_none() {
            return Err(ResolutionError::NoViableArtifact {
                library: coordinate.to_string(),
            }
            .into());
        }

        if let Some(task) = main {
            libraries.push(ResolvedLibrary {
                coordinate: coordinate.clone(),
                task,
            });
        }
        if let Some(native) = native {
            natives.push(native);
        }
    }

    let client_jar = descriptor
        .downloads
        .as_ref()
        .and_then(|d| d.client.as_ref())
        .ok_or_else(|| ResolutionError::MissingClientJar(descriptor.id.clone()))?
        .to_task(client_jar_id(&descriptor.id))?;

    info!(
        "Resolved {}: {} libraries, {} native archives",
        descriptor.id,
        libraries.len(),
        natives.len()
    );

    Ok(ResolvedSet {
        version_id: descriptor.id.clone(),
        libraries,
        natives,
        client_jar,
        asset_index: descriptor.asset_index.clone(),
    })
}

/// Rule filtering followed by deduplication. The survivor of a key takes the
/// position of the key's first occurrence.
fn select_libraries<'a>(
    descriptor: &'a VersionDescriptor,
    ctx: &RuntimeContext,
    policy: DuplicatePolicy,
) -> LauncherResult<Vec<(MavenArtifact, &'a LibraryRef)>> {
    let mut selected: Vec<(MavenArtifact, &LibraryRef)> = Vec::new();
    let mut positions: HashMap<LibraryKey, usize> = HashMap::new();

    for lib in &descriptor.libraries {
        if !evaluate(&lib.rules, ctx) {
            debug!("Skipping library (rules): {}", lib.name);
            continue;
        }

        let coordinate = lib.coordinate()?;
        match positions.get(&coordinate.key()) {
            Some(&idx) => {
                let existing = &selected[idx].0;
                let replace = match policy {
                    DuplicatePolicy::LastDeclared => true,
                    DuplicatePolicy::HighestVersion => {
                        coordinate.cmp_version(existing).is_gt()
                    }
                };
                debug!(
                    "Duplicate library {}: keeping {}",
                    coordinate.key(),
                    if replace { &coordinate } else { existing }
                );
                if replace {
                    selected[idx] = (coordinate, lib);
                }
            }
            None => {
                positions.insert(coordinate.key(), selected.len());
                selected.push((coordinate, lib));
            }
        }
    }

    Ok(selected)
}

fn main_artifact(
    coordinate: &MavenArtifact,
    lib: &LibraryRef,
) -> LauncherResult<Option<DownloadTask>> {
    let id = coordinate.to_string();

    if let Some(downloads) = &lib.downloads {
        return match &downloads.artifact {
            Some(artifact) if !artifact.url.is_empty() => Ok(Some(artifact.to_task(id)?)),
            _ => Ok(None),
        };
    }

    // Loader-style entry: repository base plus digest.
    let (Some(repo), Some(sha1)) = (&lib.url, &lib.sha1) else {
        return Ok(None);
    };
    let Some(checksum) = Checksum::sha1(sha1) else {
        return Ok(None);
    };
    let task = DownloadTask::new(id, coordinate.url(repo), checksum);
    Ok(Some(match lib.size {
        Some(size) => task.with_size(size),
        None => task,
    }))
}

fn native_artifact(
    coordinate: &MavenArtifact,
    lib: &LibraryRef,
    classifier: &str,
) -> LauncherResult<ResolvedNative> {
    let native_coordinate = coordinate.with_classifier(classifier);
    let download = lib
        .downloads
        .as_ref()
        .and_then(|d| d.classifiers.get(classifier))
        .ok_or_else(|| ResolutionError::MissingNativeClassifier {
            library: coordinate.to_string(),
            classifier: classifier.to_string(),
        })?;

    Ok(ResolvedNative {
        task: download.to_task(native_coordinate.to_string())?,
        coordinate: native_coordinate,
        excludes: lib.excludes(),
    })
}
