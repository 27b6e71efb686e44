// ─── Classpath Builder ───
// Orders cached jars into a classpath and unpacks native archives.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::downloader::LocalArtifactSet;
use crate::core::error::{CompositionError, LauncherError, LauncherResult};
use crate::core::resolver::{ResolvedNative, ResolvedSet};

/// Classpath entries plus the ids that had no local artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    pub entries: Vec<PathBuf>,
    pub missing: Vec<String>,
}

impl Classpath {
    pub fn join(&self, separator: &str) -> String {
        self.entries
            .iter()
            .map(|p| safe_path_str(p))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Libraries in resolver order, then the client jar. Entries point straight
/// at the content-addressed cache.
pub fn build_classpath(
    resolved: &ResolvedSet,
    local: &LocalArtifactSet,
) -> Result<Classpath, CompositionError> {
    let mut classpath = Classpath::default();

    let ids = resolved
        .libraries
        .iter()
        .map(|l| &l.task.id)
        .chain(std::iter::once(&resolved.client_jar.id));
    for id in ids {
        match local.get(id) {
            Some(artifact) => classpath.entries.push(artifact.path.clone()),
            None => {
                debug!("Classpath entry {} is not available locally", id);
                classpath.missing.push(id.clone());
            }
        }
    }

    dedup_preserving_order(&mut classpath.entries);
    if classpath.entries.is_empty() {
        return Err(CompositionError::EmptyClasspath);
    }
    Ok(classpath)
}

fn dedup_preserving_order(entries: &mut Vec<PathBuf>) {
    let mut seen = std::collections::HashSet::new();
    entries.retain(|entry| {
        let key = if cfg!(target_os = "windows") {
            entry.to_string_lossy().to_lowercase()
        } else {
            entry.to_string_lossy().to_string()
        };
        seen.insert(key)
    });
}

/// Unpack every native archive into `natives_dir`, honouring excludes and
/// skipping `META-INF/`. Files already present with identical content are
/// left untouched. Returns the number of files written.
pub async fn extract_natives(
    natives: &[ResolvedNative],
    local: &LocalArtifactSet,
    natives_dir: &Path,
) -> LauncherResult<usize> {
    tokio::fs::create_dir_all(natives_dir)
        .await
        .map_err(|e| LauncherError::io(natives_dir, e))?;

    let mut written = 0usize;
    for native in natives {
        let Some(artifact) = local.get(&native.task.id) else {
            debug!("Native archive {} not available, skipping", native.task.id);
            continue;
        };

        let archive = artifact.path.clone();
        let dest_dir = natives_dir.to_path_buf();
        let excludes = native.excludes.clone();
        written += tokio::task::spawn_blocking(move || {
            extract_archive(&archive, &dest_dir, &excludes)
        })
        .await??;
    }

    info!("Natives ready in {:?} ({} files written)", natives_dir, written);
    Ok(written)
}

fn extract_archive(archive: &Path, dest_dir: &Path, excludes: &[String]) -> LauncherResult<usize> {
    let extraction_error = |message: String| CompositionError::NativeExtraction {
        path: archive.to_path_buf(),
        message,
    };

    let file = std::fs::File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| extraction_error(e.to_string()))?;

    let mut written = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| extraction_error(e.to_string()))?;
        let name = entry.name().to_string();

        if entry.is_dir()
            || name.starts_with("META-INF/")
            || excludes.iter().any(|prefix| name.starts_with(prefix.as_str()))
        {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            return Err(extraction_error(format!("unsafe entry name `{name}`")).into());
        };
        let dest = dest_dir.join(relative);

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|e| extraction_error(format!("{name}: {e}")))?;

        if let Ok(existing) = std::fs::read(&dest) {
            if existing == contents {
                continue;
            }
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        std::fs::write(&dest, &contents).map_err(|e| LauncherError::io(&dest, e))?;
        debug!("Extracted native: {}", name);
        written += 1;
    }

    Ok(written)
}

/// Convert path to string, stripping the `\\?\` prefix on Windows.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java classpath handling can fail for extended-length paths.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::downloader::{Checksum, DownloadTask, HashAlgorithm, LocalArtifact};
    use crate::core::maven::MavenArtifact;
    use crate::core::resolver::ResolvedLibrary;

    fn task(id: &str) -> DownloadTask {
        DownloadTask::new(
            id,
            format!("https://example.com/{id}"),
            Checksum::of_bytes(HashAlgorithm::Sha1, id.as_bytes()),
        )
    }

    fn local(id: &str, path: &str) -> (String, LocalArtifact) {
        (
            id.to_string(),
            LocalArtifact {
                path: PathBuf::from(path),
                checksum: Checksum::of_bytes(HashAlgorithm::Sha1, id.as_bytes()),
                size: 1,
                from_cache: true,
            },
        )
    }

    fn resolved(library_ids: &[&str]) -> ResolvedSet {
        ResolvedSet {
            version_id: "1.20".into(),
            libraries: library_ids
                .iter()
                .map(|id| ResolvedLibrary {
                    coordinate: MavenArtifact::parse(id).unwrap(),
                    task: task(id),
                })
                .collect(),
            natives: Vec::new(),
            client_jar: task("client:1.20"),
            asset_index: None,
        }
    }

    #[test]
    fn client_jar_comes_last_and_missing_entries_are_reported() {
        let set = resolved(&["com.example:a:1.0", "com.example:b:1.0", "com.example:c:1.0"]);
        let artifacts: LocalArtifactSet = [
            local("com.example:a:1.0", "/cache/sha1/aa/a"),
            local("com.example:c:1.0", "/cache/sha1/cc/c"),
            local("client:1.20", "/cache/sha1/dd/client"),
        ]
        .into_iter()
        .collect();

        let classpath = build_classpath(&set, &artifacts).unwrap();
        assert_eq!(
            classpath.entries,
            vec![
                PathBuf::from("/cache/sha1/aa/a"),
                PathBuf::from("/cache/sha1/cc/c"),
                PathBuf::from("/cache/sha1/dd/client"),
            ]
        );
        assert_eq!(classpath.missing, vec!["com.example:b:1.0".to_string()]);
        assert_eq!(
            classpath.join(":"),
            "/cache/sha1/aa/a:/cache/sha1/cc/c:/cache/sha1/dd/client"
        );
    }

    #[test]
    fn identical_content_appears_once() {
        let set = resolved(&["com.example:a:1.0", "com.example:a:1.0:alias"]);
        let artifacts: LocalArtifactSet = [
            local("com.example:a:1.0", "/cache/sha1/aa/same"),
            local("com.example:a:1.0:alias", "/cache/sha1/aa/same"),
            local("client:1.20", "/cache/sha1/dd/client"),
        ]
        .into_iter()
        .collect();

        assert_eq!(build_classpath(&set, &artifacts).unwrap().entries.len(), 2);
    }

    #[test]
    fn nothing_local_is_an_empty_classpath() {
        let set = resolved(&[]);
        assert_eq!(
            build_classpath(&set, &LocalArtifactSet::new()),
            Err(CompositionError::EmptyClasspath)
        );
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn natives_extraction_is_idempotent_and_honours_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("natives.jar");
        write_jar(
            &jar,
            &[
                ("liblwjgl.so", b"elf"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
                ("linux/x64/org/lwjgl/liblwjgl_opengl.so", b"elf2"),
                ("skipme/readme.txt", b"no"),
            ],
        );

        let native = ResolvedNative {
            coordinate: MavenArtifact::parse("org.lwjgl:lwjgl:3.3.3:natives-linux").unwrap(),
            task: task("org.lwjgl:lwjgl:3.3.3:natives-linux"),
            excludes: vec!["skipme/".into()],
        };
        let mut artifacts = LocalArtifactSet::new();
        artifacts.insert(
            native.task.id.clone(),
            LocalArtifact {
                path: jar.clone(),
                checksum: native.task.checksum.clone(),
                size: 0,
                from_cache: true,
            },
        );
        let natives_dir = dir.path().join("versions/1.20/natives");

        let first = extract_natives(std::slice::from_ref(&native), &artifacts, &natives_dir)
            .await
            .unwrap();
        assert_eq!(first, 2);
        assert!(natives_dir.join("liblwjgl.so").exists());
        assert!(natives_dir.join("linux/x64/org/lwjgl/liblwjgl_opengl.so").exists());
        assert!(!natives_dir.join("META-INF").exists());
        assert!(!natives_dir.join("skipme").exists());

        let second = extract_natives(std::slice::from_ref(&native), &artifacts, &natives_dir)
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn corrupt_archive_is_a_composition_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("broken.jar");
        std::fs::write(&jar, b"not a zip").unwrap();
        let native = ResolvedNative {
            coordinate: MavenArtifact::parse("org.lwjgl:lwjgl:3.3.3:natives-linux").unwrap(),
            task: task("broken"),
            excludes: Vec::new(),
        };
        let mut artifacts = LocalArtifactSet::new();
        artifacts.insert(
            "broken".into(),
            LocalArtifact {
                path: jar,
                checksum: native.task.checksum.clone(),
                size: 9,
                from_cache: true,
            },
        );

        let err = extract_natives(&[native], &artifacts, &dir.path().join("natives"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LauncherError::Composition(CompositionError::NativeExtraction { .. })
        ));
    }
}
