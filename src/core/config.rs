// ─── Engine Configuration ───
// Tunables persisted as JSON next to the installation. Every field has a
// default, so partial or missing files are fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::assets::RESOURCES_URL;
use crate::core::downloader::{CacheVerification, InFlightPolicy, RetryPolicy};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::DEFAULT_READ_TIMEOUT;
use crate::core::launch::ComposeOptions;
use crate::core::resolver::DuplicatePolicy;
use crate::core::version::VERSION_MANIFEST_URL;

const APP_DIR_NAME: &str = "InterfaceOficial";
const BOOTSTRAP_FILE: &str = "launcher_bootstrap.json";
pub const CONFIG_FILE: &str = "engine_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Download workers.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub duplicate_policy: DuplicatePolicy,
    pub cache_verification: CacheVerification,
    /// Content-addressed cache root. Defaults to `<install_root>/cache`.
    pub cache_dir: Option<PathBuf>,
    pub manifest_url: String,
    pub resources_url: String,
    pub launcher_name: String,
    pub launcher_version: String,
    pub max_inheritance_depth: usize,
    pub in_flight: InFlightPolicy,
    /// Seconds a transfer may go without receiving data.
    pub read_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
            duplicate_policy: DuplicatePolicy::default(),
            cache_verification: CacheVerification::default(),
            cache_dir: None,
            manifest_url: VERSION_MANIFEST_URL.to_string(),
            resources_url: RESOURCES_URL.to_string(),
            launcher_name: APP_DIR_NAME.to_string(),
            launcher_version: env!("CARGO_PKG_VERSION").to_string(),
            max_inheritance_depth: 16,
            in_flight: InFlightPolicy::default(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BootstrapConfig {
    data_dir: PathBuf,
}

impl EngineConfig {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> LauncherResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(LauncherError::io(path, e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| LauncherError::io(path, e))
    }

    pub fn cache_root(&self, install_root: &Path) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| install_root.join("cache"))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            launcher_name: self.launcher_name.clone(),
            launcher_version: self.launcher_version.clone(),
            assets: None,
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `<data dir>/InterfaceOficial`, unless a bootstrap file in the data dir
/// redirects the installation elsewhere.
pub fn default_install_root() -> PathBuf {
    let base = default_base_dir();
    let bootstrap_path = base.join(BOOTSTRAP_FILE);

    if let Ok(raw) = std::fs::read_to_string(&bootstrap_path) {
        if let Ok(cfg) = serde_json::from_str::<BootstrapConfig>(&raw) {
            return cfg.data_dir;
        }
    }

    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.concurrency, 8);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{"concurrency": 2, "duplicate_policy": "last_declared", "retry": {"max_attempts": 1}}"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::LastDeclared);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.max_inheritance_depth, 16);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = EngineConfig {
            cache_verification: CacheVerification::Size,
            cache_dir: Some(dir.path().join("cache")),
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(LauncherError::Json(_))));
    }

    #[test]
    fn cache_root_defaults_under_install_root() {
        let config = EngineConfig::default();
        assert_eq!(
            config.cache_root(Path::new("/games")),
            PathBuf::from("/games/cache")
        );
    }
}
