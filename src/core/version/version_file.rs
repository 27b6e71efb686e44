// ─── Version File ───
// Typed model of one version document (`versions/<id>/<id>.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rules::{evaluate, Rule};
use crate::core::context::RuntimeContext;
use crate::core::downloader::{Checksum, DownloadTask};
use crate::core::error::ManifestError;
use crate::core::maven::MavenArtifact;

/// A parsed version document. Documents that inherit from a parent may leave
/// most fields empty until merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,
    /// Asset index id for documents that predate `assetIndex`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13), space separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionInfo>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub major_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<FileDownload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<FileDownload>,
}

/// A downloadable file with its expected digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownload {
    /// Maven-layout path, present on library downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub url: String,
}

impl FileDownload {
    pub fn to_task(&self, id: impl Into<String>) -> Result<DownloadTask, ManifestError> {
        let id = id.into();
        let checksum = Checksum::sha1(&self.sha1).ok_or_else(|| ManifestError::Malformed {
            id: id.clone(),
            message: format!("invalid sha1 `{}`", self.sha1),
        })?;
        let task = DownloadTask::new(id, &self.url, checksum);
        Ok(match self.size {
            Some(size) => task.with_size(size),
            None => task,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    pub url: String,
}

impl AssetIndexRef {
    pub fn to_task(&self) -> Result<DownloadTask, ManifestError> {
        FileDownload {
            path: None,
            sha1: self.sha1.clone(),
            size: self.size,
            url: self.url.clone(),
        }
        .to_task(format!("asset-index:{}", self.id))
    }
}

// ─── Arguments ───

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<ArgumentEntry>,
    #[serde(default)]
    pub jvm: Vec<ArgumentEntry>,
}

/// One argument template, optionally gated by rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentEntry {
    Plain(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Many(Vec<String>),
}

impl ArgumentEntry {
    /// Templates this entry contributes under `ctx`.
    pub fn values(&self, ctx: &RuntimeContext) -> Vec<String> {
        match self {
            ArgumentEntry::Plain(arg) => vec![arg.clone()],
            ArgumentEntry::Conditional { rules, value } => {
                if !evaluate(rules, ctx) {
                    return Vec::new();
                }
                match value {
                    ArgumentValue::Single(arg) => vec![arg.clone()],
                    ArgumentValue::Many(args) => args.clone(),
                }
            }
        }
    }
}

// ─── Library Entry ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRef {
    /// Maven coordinate `group:name:version[:classifier][@ext]`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    /// OS name -> native classifier, may contain `${arch}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub natives: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
    /// Maven repository base for libraries without a `downloads` block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<FileDownload>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub classifiers: BTreeMap<String, FileDownload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl LibraryRef {
    pub fn coordinate(&self) -> Result<MavenArtifact, ManifestError> {
        MavenArtifact::parse(&self.name)
    }

    /// Native classifier declared for the context's OS, with `${arch}`
    /// expanded to the pointer width.
    pub fn native_classifier(&self, ctx: &RuntimeContext) -> Option<String> {
        self.natives
            .iter()
            .find(|(os, _)| ctx.os.matches_name(os))
            .map(|(_, classifier)| classifier.replace("${arch}", ctx.arch_bits()))
    }

    pub fn excludes(&self) -> Vec<String> {
        self.extract
            .as_ref()
            .map(|e| e.exclude.clone())
            .unwrap_or_default()
    }
}

impl VersionDescriptor {
    /// Parse one version document. `source_id` names the document in errors.
    pub fn parse(source_id: &str, bytes: &[u8]) -> Result<Self, ManifestError> {
        let malformed = |message: String| ManifestError::Malformed {
            id: source_id.to_string(),
            message,
        };

        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
        let Some(object) = value.as_object() else {
            return Err(malformed("document is not a JSON object".into()));
        };
        if !object.get("id").is_some_and(|id| id.is_string()) {
            return Err(ManifestError::MissingField {
                id: source_id.to_string(),
                field: "id",
            });
        }

        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
    }

    /// Pre-1.13 documents carry a single `minecraftArguments` string.
    pub fn is_legacy(&self) -> bool {
        self.arguments.is_none() && self.minecraft_arguments.is_some()
    }

    pub fn game_argument_templates(&self, ctx: &RuntimeContext) -> Vec<String> {
        match (&self.arguments, &self.minecraft_arguments) {
            (Some(args), _) => args.game.iter().flat_map(|a| a.values(ctx)).collect(),
            (None, Some(legacy)) => legacy.split_whitespace().map(str::to_string).collect(),
            (None, None) => Vec::new(),
        }
    }

    /// JVM argument templates, or `None` when the document declares none.
    pub fn jvm_argument_templates(&self, ctx: &RuntimeContext) -> Option<Vec<String>> {
        let args = self.arguments.as_ref()?;
        if args.jvm.is_empty() {
            return None;
        }
        Some(args.jvm.iter().flat_map(|a| a.values(ctx)).collect())
    }

    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }

    pub fn required_java_major(&self) -> Option<u32> {
        self.java_version.as_ref().map(|j| j.major_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::OsFamily;

    fn ctx(os: OsFamily) -> RuntimeContext {
        RuntimeContext::new(os, "x86_64", "/games", "/usr/bin/java")
    }

    const MODERN: &str = r#"{
        "id": "1.20.4",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assetIndex": {
            "id": "12",
            "sha1": "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d",
            "size": 5,
            "totalSize": 100,
            "url": "https://piston-meta.example/12.json"
        },
        "downloads": {
            "client": {
                "sha1": "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d",
                "size": 5,
                "url": "https://piston-data.example/client.jar"
            }
        },
        "javaVersion": { "component": "java-runtime-gamma", "majorVersion": 17 },
        "arguments": {
            "game": [
                "--username", "${auth_player_name}",
                {
                    "rules": [{ "action": "allow", "features": { "has_custom_resolution": true } }],
                    "value": ["--width", "${resolution_width}"]
                }
            ],
            "jvm": [
                { "rules": [{ "action": "allow", "os": { "name": "osx" } }], "value": "-XstartOnFirstThread" },
                "-cp", "${classpath}"
            ]
        },
        "libraries": [
            {
                "name": "org.lwjgl:lwjgl:3.3.3",
                "downloads": {
                    "artifact": {
                        "path": "org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3.jar",
                        "sha1": "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d",
                        "size": 5,
                        "url": "https://libraries.example/lwjgl-3.3.3.jar"
                    }
                },
                "rules": [{ "action": "allow" }, { "action": "disallow", "os": { "name": "osx" } }]
            },
            {
                "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
                "natives": { "linux": "natives-linux", "windows": "natives-windows-${arch}" },
                "extract": { "exclude": ["META-INF/"] }
            }
        ]
    }"#;

    #[test]
    fn parses_modern_document() {
        let doc = VersionDescriptor::parse("1.20.4", MODERN.as_bytes()).unwrap();
        assert_eq!(doc.main_class.as_deref(), Some("net.minecraft.client.main.Main"));
        assert_eq!(doc.required_java_major(), Some(17));
        assert_eq!(doc.asset_index_id(), Some("12"));
        assert_eq!(doc.libraries.len(), 2);
        assert_eq!(doc.libraries[1].excludes(), vec!["META-INF/".to_string()]);
        assert!(!doc.is_legacy());
    }

    #[test]
    fn argument_rules_follow_context() {
        let doc = VersionDescriptor::parse("1.20.4", MODERN.as_bytes()).unwrap();

        let linux = ctx(OsFamily::Linux);
        assert_eq!(
            doc.game_argument_templates(&linux),
            vec!["--username", "${auth_player_name}"]
        );
        assert_eq!(
            doc.jvm_argument_templates(&linux).unwrap(),
            vec!["-cp", "${classpath}"]
        );

        let mac = ctx(OsFamily::Osx).with_resolution(854, 480);
        assert_eq!(doc.game_argument_templates(&mac).len(), 4);
        assert_eq!(
            doc.jvm_argument_templates(&mac).unwrap()[0],
            "-XstartOnFirstThread"
        );
    }

    #[test]
    fn native_classifier_expands_arch() {
        let doc = VersionDescriptor::parse("1.20.4", MODERN.as_bytes()).unwrap();
        let lib = &doc.libraries[1];
        assert_eq!(
            lib.native_classifier(&ctx(OsFamily::Windows)).as_deref(),
            Some("natives-windows-64")
        );
        assert_eq!(lib.native_classifier(&ctx(OsFamily::Osx)), None);
    }

    #[test]
    fn legacy_arguments_are_split_on_whitespace() {
        let doc = VersionDescriptor::parse(
            "1.7.10",
            br#"{"id":"1.7.10","mainClass":"net.minecraft.client.main.Main",
                "minecraftArguments":"--username ${auth_player_name}  --session ${auth_session}",
                "assets":"1.7.10"}"#,
        )
        .unwrap();
        assert!(doc.is_legacy());
        assert_eq!(doc.asset_index_id(), Some("1.7.10"));
        assert_eq!(doc.game_argument_templates(&ctx(OsFamily::Linux)).len(), 4);
        assert_eq!(doc.jvm_argument_templates(&ctx(OsFamily::Linux)), None);
    }

    #[test]
    fn missing_id_and_bad_json_are_reported() {
        assert!(matches!(
            VersionDescriptor::parse("x", br#"{"mainClass":"a.B"}"#),
            Err(ManifestError::MissingField { field: "id", .. })
        ));
        assert!(matches!(
            VersionDescriptor::parse("x", b"{not json"),
            Err(ManifestError::Malformed { .. })
        ));
        assert!(matches!(
            VersionDescriptor::parse("x", br#"{"id":"x","libraries":"nope"}"#),
            Err(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn file_download_rejects_bad_digest() {
        let download = FileDownload {
            path: None,
            sha1: "nothex".into(),
            size: None,
            url: "https://example.com/x.jar".into(),
        };
        assert!(download.to_task("x").is_err());
    }
}
