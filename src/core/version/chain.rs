// ─── Inheritance Chain ───
// Loads a version and its ancestors, then folds them into one descriptor.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::manifest::VersionManifest;
use super::version_file::{LibraryRef, VersionDescriptor};
use crate::core::downloader::{Checksum, HashAlgorithm};
use crate::core::error::{LauncherError, LauncherResult, ManifestError};
use crate::core::http::Fetcher;

/// Loads version documents by id.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn load(&self, id: &str) -> LauncherResult<VersionDescriptor>;
}

/// Documents held in memory, for tests and embedders that ship their own.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    documents: HashMap<String, VersionDescriptor>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: VersionDescriptor) -> &mut Self {
        self.documents.insert(descriptor.id.clone(), descriptor);
        self
    }
}

#[async_trait]
impl DescriptorSource for InMemorySource {
    async fn load(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        self.documents
            .get(id)
            .cloned()
            .ok_or_else(|| ManifestError::VersionNotFound(id.to_string()).into())
    }
}

/// Reads `<versions_dir>/<id>/<id>.json`.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    versions_dir: PathBuf,
}

impl LocalDirSource {
    pub fn new(versions_dir: impl Into<PathBuf>) -> Self {
        Self {
            versions_dir: versions_dir.into(),
        }
    }

    pub fn document_path(&self, id: &str) -> PathBuf {
        self.versions_dir.join(id).join(format!("{id}.json"))
    }

    /// Persist a raw document where `load` will find it.
    pub async fn save(&self, id: &str, raw: &[u8]) -> LauncherResult<()> {
        let path = self.document_path(id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }
}

#[async_trait]
impl DescriptorSource for LocalDirSource {
    async fn load(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        let path = self.document_path(id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::VersionNotFound(id.to_string()).into())
            }
            Err(e) => return Err(LauncherError::io(&path, e)),
        };
        Ok(VersionDescriptor::parse(id, &raw)?)
    }
}

/// Local documents first, then the remote version manifest. Fetched
/// documents are written to the versions directory.
pub struct RemoteSource {
    fetcher: Arc<dyn Fetcher>,
    manifest_url: String,
    local: LocalDirSource,
    manifest: OnceCell<VersionManifest>,
}

impl RemoteSource {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        manifest_url: impl Into<String>,
        versions_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            manifest_url: manifest_url.into(),
            local: LocalDirSource::new(versions_dir),
            manifest: OnceCell::new(),
        }
    }

    pub async fn manifest(&self) -> LauncherResult<&VersionManifest> {
        self.manifest
            .get_or_try_init(|| VersionManifest::fetch(self.fetcher.as_ref(), &self.manifest_url))
            .await
    }
}

#[async_trait]
impl DescriptorSource for RemoteSource {
    async fn load(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        match self.local.load(id).await {
            Ok(doc) => return Ok(doc),
            Err(LauncherError::Manifest(ManifestError::VersionNotFound(_))) => {}
            Err(e) => warn!("Local copy of {} unusable, refetching: {}", id, e),
        }

        let entry = self
            .manifest()
            .await?
            .find_version(id)
            .cloned()
            .ok_or_else(|| ManifestError::VersionNotFound(id.to_string()))?;

        debug!("Fetching version document {} from {}", id, entry.url);
        let raw = self.fetcher.get(&entry.url).await?.collect().await?;

        if let Some(expected) = entry.sha1.as_deref().and_then(Checksum::sha1) {
            let actual = Checksum::of_bytes(HashAlgorithm::Sha1, &raw);
            if actual != expected {
                return Err(ManifestError::Unavailable {
                    id: id.to_string(),
                    reason: format!("sha1 mismatch: expected {}, got {}", expected.hex, actual.hex),
                }
                .into());
            }
        }

        let doc = VersionDescriptor::parse(id, &raw)?;
        self.local.save(id, &raw).await?;
        Ok(doc)
    }
}

// ─── Chain walking ───

/// Load `id` and every ancestor named through `inheritsFrom`, root first.
pub async fn load_chain(
    source: &dyn DescriptorSource,
    id: &str,
    max_depth: usize,
) -> LauncherResult<Vec<VersionDescriptor>> {
    let mut chain = Vec::new();
    let mut visited_order: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = Some(id.to_string());

    while let Some(current) = next.take() {
        if visited.contains(&current) {
            visited_order.push(current);
            return Err(ManifestError::InheritanceCycle {
                chain: visited_order,
            }
            .into());
        }
        if chain.len() >= max_depth {
            return Err(ManifestError::ChainTooDeep {
                id: id.to_string(),
                max_depth,
            }
            .into());
        }

        let doc = source.load(&current).await?;
        next = doc.inherits_from.clone();
        visited.insert(current.clone());
        visited_order.push(current);
        chain.push(doc);
    }

    chain.reverse();
    info!(
        "Loaded inheritance chain for {}: {}",
        id,
        visited_order.join(" -> ")
    );
    Ok(chain)
}

/// Fold a root-first chain into a single descriptor.
pub fn merge_chain(chain: Vec<VersionDescriptor>) -> Result<VersionDescriptor, ManifestError> {
    let mut docs = chain.into_iter();
    let mut merged = docs
        .next()
        .ok_or_else(|| ManifestError::VersionNotFound(String::new()))?;

    for child in docs {
        merged = merge_pair(merged, child);
    }
    merged.inherits_from = None;

    if merged.main_class.is_none() {
        return Err(ManifestError::MissingField {
            id: merged.id,
            field: "mainClass",
        });
    }
    Ok(merged)
}

fn merge_pair(parent: VersionDescriptor, child: VersionDescriptor) -> VersionDescriptor {
    let child_keys: HashSet<String> = child.libraries.iter().map(library_key).collect();
    let mut libraries: Vec<LibraryRef> = parent
        .libraries
        .into_iter()
        .filter(|lib| !child_keys.contains(&library_key(lib)))
        .collect();
    libraries.extend(child.libraries);

    let arguments = match (parent.arguments, child.arguments) {
        (Some(mut base), Some(over)) => {
            base.game.extend(over.game);
            base.jvm.extend(over.jvm);
            Some(base)
        }
        (base, over) => over.or(base),
    };

    VersionDescriptor {
        id: child.id,
        inherits_from: child.inherits_from,
        main_class: child.main_class.or(parent.main_class),
        libraries,
        asset_index: child.asset_index.or(parent.asset_index),
        assets: child.assets.or(parent.assets),
        arguments,
        minecraft_arguments: child.minecraft_arguments.or(parent.minecraft_arguments),
        downloads: child.downloads.or(parent.downloads),
        java_version: child.java_version.or(parent.java_version),
        version_type: child.version_type.or(parent.version_type),
    }
}

/// `group:artifact[:classifier]`; unparsable names key on themselves.
fn library_key(lib: &LibraryRef) -> String {
    lib.coordinate()
        .map(|c| c.key().to_string())
        .unwrap_or_else(|_| lib.name.clone())
}

/// Resolve a version through `source` and merge its chain.
pub async fn load_merged(
    source: &dyn DescriptorSource,
    id: &str,
    max_depth: usize,
) -> LauncherResult<VersionDescriptor> {
    let chain = load_chain(source, id, max_depth).await?;
    Ok(merge_chain(chain)?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::http::testing::FixtureFetcher;
    use crate::core::version::ArgumentEntry;

    fn doc(json: serde_json::Value) -> VersionDescriptor {
        serde_json::from_value(json).unwrap()
    }

    fn names(doc: &VersionDescriptor) -> Vec<&str> {
        doc.libraries.iter().map(|l| l.name.as_str()).collect()
    }

    #[tokio::test]
    async fn cycle_is_detected() {
        let mut source = InMemorySource::new();
        source
            .insert(doc(serde_json::json!({"id": "a", "inheritsFrom": "b"})))
            .insert(doc(serde_json::json!({"id": "b", "inheritsFrom": "a"})));

        let err = load_chain(&source, "a", 16).await.unwrap_err();
        match err {
            LauncherError::Manifest(ManifestError::InheritanceCycle { chain }) => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn depth_is_bounded() {
        let mut source = InMemorySource::new();
        for i in 0..5 {
            source.insert(doc(serde_json::json!({"id": format!("v{i}"), "inheritsFrom": format!("v{}", i + 1)})));
        }
        source.insert(doc(serde_json::json!({"id": "v5"})));

        assert!(matches!(
            load_chain(&source, "v0", 3).await,
            Err(LauncherError::Manifest(ManifestError::ChainTooDeep { max_depth: 3, .. }))
        ));
        assert_eq!(load_chain(&source, "v0", 6).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn missing_parent_is_not_found() {
        let mut source = InMemorySource::new();
        source.insert(doc(serde_json::json!({"id": "fabric", "inheritsFrom": "1.20.4"})));
        assert!(matches!(
            load_chain(&source, "fabric", 16).await,
            Err(LauncherError::Manifest(ManifestError::VersionNotFound(id))) if id == "1.20.4"
        ));
    }

    #[test]
    fn child_overrides_parent_library_at_child_position() {
        let base = doc(serde_json::json!({
            "id": "base",
            "mainClass": "net.minecraft.client.main.Main",
            "type": "release",
            "libraries": [
                {"name": "com.example:a:1.0"},
                {"name": "com.example:b:1.0"}
            ],
            "arguments": {"game": ["--parent"], "jvm": ["-Dparent"]}
        }));
        let child = doc(serde_json::json!({
            "id": "1.20",
            "inheritsFrom": "base",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "libraries": [
                {"name": "com.example:c:1.0"},
                {"name": "com.example:a:2.0"}
            ],
            "arguments": {"game": ["--child"]}
        }));

        let merged = merge_chain(vec![base, child]).unwrap();

        assert_eq!(merged.id, "1.20");
        assert_eq!(merged.inherits_from, None);
        assert_eq!(
            names(&merged),
            vec!["com.example:b:1.0", "com.example:c:1.0", "com.example:a:2.0"]
        );
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert_eq!(merged.version_type.as_deref(), Some("release"));
        let args = merged.arguments.unwrap();
        assert_eq!(
            args.game,
            vec![
                ArgumentEntry::Plain("--parent".into()),
                ArgumentEntry::Plain("--child".into())
            ]
        );
        assert_eq!(args.jvm, vec![ArgumentEntry::Plain("-Dparent".into())]);
    }

    #[test]
    fn classifier_variants_are_distinct_keys() {
        let base = doc(serde_json::json!({
            "id": "base",
            "mainClass": "Main",
            "libraries": [
                {"name": "org.lwjgl:lwjgl:3.3.1"},
                {"name": "org.lwjgl:lwjgl:3.3.1:natives-linux"}
            ]
        }));
        let child = doc(serde_json::json!({
            "id": "child",
            "inheritsFrom": "base",
            "libraries": [{"name": "org.lwjgl:lwjgl:3.3.3"}]
        }));

        let merged = merge_chain(vec![base, child]).unwrap();
        assert_eq!(
            names(&merged),
            vec!["org.lwjgl:lwjgl:3.3.1:natives-linux", "org.lwjgl:lwjgl:3.3.3"]
        );
    }

    #[test]
    fn merged_document_needs_main_class() {
        let err = merge_chain(vec![doc(serde_json::json!({"id": "bare"}))]).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField { field: "mainClass", .. }));
    }

    #[tokio::test]
    async fn local_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalDirSource::new(dir.path());
        source
            .save("1.20.4", br#"{"id":"1.20.4","mainClass":"Main"}"#)
            .await
            .unwrap();

        let loaded = source.load("1.20.4").await.unwrap();
        assert_eq!(loaded.main_class.as_deref(), Some("Main"));
        assert!(dir.path().join("1.20.4/1.20.4.json").exists());
        assert!(matches!(
            source.load("1.8.9").await,
            Err(LauncherError::Manifest(ManifestError::VersionNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn remote_source_fetches_verifies_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let doc_body = br#"{"id":"1.20.4","mainClass":"Main"}"#;
        let doc_sha1 = Checksum::of_bytes(HashAlgorithm::Sha1, doc_body).hex;
        let manifest = format!(
            r#"{{"latest":{{"release":"1.20.4","snapshot":"1.20.4"}},
                "versions":[{{"id":"1.20.4","type":"release","url":"https://meta.example/1.20.4.json",
                "releaseTime":"2023-12-07T08:00:00+00:00","sha1":"{doc_sha1}"}}]}}"#
        );

        let fetcher = Arc::new(FixtureFetcher::new());
        fetcher
            .serve("https://meta.example/manifest.json", manifest)
            .serve("https://meta.example/1.20.4.json", &doc_body[..]);
        let source = RemoteSource::new(
            fetcher.clone(),
            "https://meta.example/manifest.json",
            dir.path(),
        );

        let loaded = source.load("1.20.4").await.unwrap();
        assert_eq!(loaded.id, "1.20.4");
        assert!(dir.path().join("1.20.4/1.20.4.json").exists());

        // Second load is served from disk.
        source.load("1.20.4").await.unwrap();
        assert_eq!(fetcher.request_count(), 2);

        assert!(matches!(
            source.load("0.0.1").await,
            Err(LauncherError::Manifest(ManifestError::VersionNotFound(_)))
        ));
    }
}
