// ─── Runtime Context ───
// Caller-supplied description of the platform a version is resolved for.
// Passed explicitly into every rule evaluation; never read from globals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::core::auth::AccountProfile;

/// Operating system family as named in version documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    Osx,
}

impl OsFamily {
    /// The family this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::Osx
        } else {
            OsFamily::Linux
        }
    }

    /// Name used in rule predicates and `natives` maps.
    pub fn mojang_name(self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Osx => "osx",
        }
    }

    /// Family match, accepting the `macos` spelling used by newer documents.
    pub fn matches_name(self, name: &str) -> bool {
        let name = name.trim().to_ascii_lowercase();
        match self {
            OsFamily::Osx => name == "osx" || name == "macos",
            other => name == other.mojang_name(),
        }
    }

    pub fn classpath_separator(self) -> &'static str {
        match self {
            OsFamily::Windows => ";",
            _ => ":",
        }
    }
}

/// JVM heap limits in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub min_mb: u32,
    pub max_mb: u32,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            min_mb: 512,
            max_mb: 2048,
        }
    }
}

impl MemoryLimits {
    /// A quarter of physical memory, clamped to 1-8 GiB.
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let total_mb = system.total_memory() / (1024 * 1024);
        if total_mb == 0 {
            return Self::default();
        }
        let max_mb = (total_mb / 4).clamp(1024, 8192) as u32;
        Self {
            min_mb: 512.min(max_mb),
            max_mb,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Everything resolution and composition need to know about the target
/// machine. Immutable for the duration of one preparation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeContext {
    pub os: OsFamily,
    /// Architecture name, e.g. `x86_64`, `x86`, `aarch64`.
    pub arch: String,
    pub os_version: Option<String>,
    pub features: BTreeMap<String, bool>,
    pub java_path: PathBuf,
    /// Root of the game installation (`libraries/`, `versions/`, `assets/`).
    pub install_root: PathBuf,
    pub memory: MemoryLimits,
    pub resolution: Option<Resolution>,
    pub account: AccountProfile,
    /// Caller JVM flags, passed to the command as given.
    pub extra_jvm_args: Vec<String>,
}

impl RuntimeContext {
    pub fn new(
        os: OsFamily,
        arch: impl Into<String>,
        install_root: impl Into<PathBuf>,
        java_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            os,
            arch: arch.into(),
            os_version: None,
            features: BTreeMap::new(),
            java_path: java_path.into(),
            install_root: install_root.into(),
            memory: MemoryLimits::default(),
            resolution: None,
            account: AccountProfile::default(),
            extra_jvm_args: Vec::new(),
        }
    }

    /// Context describing the machine we are running on.
    pub fn current(install_root: impl Into<PathBuf>, java_path: impl Into<PathBuf>) -> Self {
        let mut ctx = Self::new(
            OsFamily::current(),
            std::env::consts::ARCH,
            install_root,
            java_path,
        );
        ctx.os_version = System::os_version();
        ctx.memory = MemoryLimits::detect();
        ctx
    }

    pub fn with_feature(mut self, name: &str, enabled: bool) -> Self {
        self.features.insert(name.to_string(), enabled);
        self
    }

    pub fn with_account(mut self, account: AccountProfile) -> Self {
        self.account = account.sanitized();
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some(Resolution { width, height });
        self.features
            .insert("has_custom_resolution".to_string(), true);
        self
    }

    /// Feature flag value; unknown flags are off.
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Spellings of the architecture a rule pattern may use.
    pub fn arch_names(&self) -> Vec<&str> {
        let arch = self.arch.as_str();
        let alias = match arch {
            "x86_64" | "amd64" => Some("x64"),
            "aarch64" => Some("arm64"),
            "arm64" => Some("aarch64"),
            "x86" | "i386" | "i686" => Some("x86"),
            _ => None,
        };
        let mut names = vec![arch];
        if let Some(alias) = alias {
            if alias != arch {
                names.push(alias);
            }
        }
        names
    }

    /// Value substituted for `${arch}` in native classifiers.
    pub fn arch_bits(&self) -> &'static str {
        if self.arch.contains("64") {
            "64"
        } else {
            "32"
        }
    }

    pub fn game_dir(&self) -> &Path {
        &self.install_root
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.install_root.join("libraries")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.install_root.join("versions")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.install_root.join("assets")
    }

    /// Directory native archives of `version_id` are extracted into.
    pub fn natives_dir(&self, version_id: &str) -> PathBuf {
        self.versions_dir().join(version_id).join("natives")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osx_accepts_macos_spelling() {
        assert!(OsFamily::Osx.matches_name("macos"));
        assert!(OsFamily::Osx.matches_name("osx"));
        assert!(!OsFamily::Linux.matches_name("osx"));
    }

    #[test]
    fn unknown_feature_is_disabled() {
        let ctx = RuntimeContext::new(OsFamily::Linux, "x86_64", "/tmp/game", "java")
            .with_feature("is_demo_user", true);
        assert!(ctx.feature("is_demo_user"));
        assert!(!ctx.feature("has_quick_plays_support"));
    }

    #[test]
    fn arch_bits_and_aliases() {
        let ctx = RuntimeContext::new(OsFamily::Osx, "aarch64", "/tmp/game", "java");
        assert_eq!(ctx.arch_bits(), "64");
        assert_eq!(ctx.arch_names(), vec!["aarch64", "arm64"]);

        let ctx = RuntimeContext::new(OsFamily::Windows, "x86", "/tmp/game", "java");
        assert_eq!(ctx.arch_bits(), "32");
        assert_eq!(ctx.arch_names(), vec!["x86"]);
    }

    #[test]
    fn custom_resolution_enables_feature() {
        let ctx = RuntimeContext::new(OsFamily::Linux, "x86_64", "/tmp/game", "java")
            .with_resolution(854, 480);
        assert!(ctx.feature("has_custom_resolution"));
        assert_eq!(ctx.natives_dir("1.20"), PathBuf::from("/tmp/game/versions/1.20/natives"));
    }
}
