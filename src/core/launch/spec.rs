// ─── Launch Spec ───
// Everything needed to start the game, with every placeholder resolved.
// Building the command never spawns it.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info};

use super::args::{legacy_jvm_arguments, substitute_all, PlaceholderValues};
use super::classpath::{build_classpath, safe_path_str};
use crate::core::assets::AssetLayout;
use crate::core::context::RuntimeContext;
use crate::core::downloader::LocalArtifactSet;
use crate::core::error::CompositionError;
use crate::core::resolver::ResolvedSet;
use crate::core::version::VersionDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub version_id: String,
    pub java_path: PathBuf,
    pub game_dir: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub natives_dir: PathBuf,
    pub main_class: String,
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
    pub required_java_major: Option<u32>,
}

/// Inputs to composition that are not part of the runtime context.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub launcher_name: String,
    pub launcher_version: String,
    /// Linked asset tree, when assets were prepared.
    pub assets: Option<AssetLayout>,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            launcher_name: "InterfaceOficial".into(),
            launcher_version: env!("CARGO_PKG_VERSION").into(),
            assets: None,
        }
    }
}

/// Result of composition: the spec plus classpath ids that were not local.
#[derive(Debug, Clone)]
pub struct Composition {
    pub spec: LaunchSpec,
    pub missing: Vec<String>,
}

/// Assemble the launch spec for `descriptor` from what is in `local`.
pub fn compose(
    resolved: &ResolvedSet,
    local: &LocalArtifactSet,
    descriptor: &VersionDescriptor,
    ctx: &RuntimeContext,
    options: &ComposeOptions,
) -> Result<Composition, CompositionError> {
    let classpath = build_classpath(resolved, local)?;
    let separator = ctx.os.classpath_separator();
    let natives_dir = ctx.natives_dir(&descriptor.id);
    let main_class = descriptor.main_class.clone().unwrap_or_default();

    let values = placeholder_values(
        descriptor,
        ctx,
        options,
        &classpath.join(separator),
        &natives_dir,
    );

    let jvm_templates = descriptor.jvm_argument_templates(ctx).unwrap_or_else(|| {
        legacy_jvm_arguments()
            .iter()
            .flat_map(|a| a.values(ctx))
            .collect()
    });

    let mut jvm_args = vec![
        format!("-Xms{}M", ctx.memory.min_mb),
        format!("-Xmx{}M", ctx.memory.max_mb),
    ];
    jvm_args.extend(ctx.extra_jvm_args.iter().cloned());
    jvm_args.extend(substitute_all(&jvm_templates, &values)?);

    let game_args = substitute_all(&descriptor.game_argument_templates(ctx), &values)?;

    if !classpath.missing.is_empty() {
        debug!("Composed with {} missing classpath entries", classpath.missing.len());
    }
    info!(
        "Composed launch for {}: {} classpath entries, {} JVM args, {} game args",
        descriptor.id,
        classpath.entries.len(),
        jvm_args.len(),
        game_args.len()
    );

    Ok(Composition {
        spec: LaunchSpec {
            version_id: descriptor.id.clone(),
            java_path: ctx.java_path.clone(),
            game_dir: ctx.game_dir().to_path_buf(),
            classpath: classpath.entries,
            natives_dir,
            main_class,
            jvm_args,
            game_args,
            required_java_major: descriptor.required_java_major(),
        },
        missing: classpath.missing,
    })
}

fn placeholder_values(
    descriptor: &VersionDescriptor,
    ctx: &RuntimeContext,
    options: &ComposeOptions,
    classpath: &str,
    natives_dir: &Path,
) -> PlaceholderValues {
    let account = &ctx.account;
    let assets_root = options
        .assets
        .as_ref()
        .map(|a| a.assets_root.clone())
        .unwrap_or_else(|| ctx.assets_dir());
    let game_assets = options
        .assets
        .as_ref()
        .map(|a| a.game_assets.clone())
        .unwrap_or_else(|| assets_root.clone());

    let mut values = PlaceholderValues::new();
    values
        .insert("classpath", classpath)
        .insert("classpath_separator", ctx.os.classpath_separator())
        .insert("natives_directory", safe_path_str(natives_dir))
        .insert("library_directory", safe_path_str(&ctx.libraries_dir()))
        .insert("launcher_name", options.launcher_name.as_str())
        .insert("launcher_version", options.launcher_version.as_str())
        .insert("version_name", descriptor.id.as_str())
        .insert(
            "version_type",
            descriptor.version_type.as_deref().unwrap_or("release"),
        )
        .insert("game_directory", safe_path_str(ctx.game_dir()))
        .insert("assets_root", safe_path_str(&assets_root))
        .insert("game_assets", safe_path_str(&game_assets))
        .insert("auth_player_name", account.username.as_str())
        .insert("auth_uuid", account.uuid.as_str())
        .insert("auth_access_token", account.access_token.as_str())
        .insert("auth_session", account.session())
        .insert("auth_xuid", account.xuid.as_str())
        .insert("clientid", account.client_id.as_str())
        .insert("user_type", account.user_type.as_str())
        .insert("user_properties", "{}");

    if let Some(index) = descriptor.asset_index_id() {
        values.insert("assets_index_name", index);
    }
    if let Some(resolution) = ctx.resolution {
        values
            .insert("resolution_width", resolution.width.to_string())
            .insert("resolution_height", resolution.height.to_string());
    }
    values
}

impl LaunchSpec {
    /// The launch command, configured but not spawned.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.java_path);
        cmd.args(&self.jvm_args)
            .arg(&self.main_class)
            .args(&self.game_args)
            .current_dir(&self.game_dir);
        configure_native_library_env(&mut cmd, &self.natives_dir);
        cmd
    }

    /// Copy/paste-able rendering of the command for logs.
    pub fn command_line_for_logs(&self) -> String {
        format_command_for_logs(&self.to_command())
    }
}

fn configure_native_library_env(cmd: &mut Command, natives_dir: &Path) {
    let native_path = safe_path_str(natives_dir);

    if cfg!(target_os = "windows") {
        cmd.env("PATH", append_env_path("PATH", &native_path));
    } else if cfg!(target_os = "linux") {
        cmd.env("LD_LIBRARY_PATH", append_env_path("LD_LIBRARY_PATH", &native_path));
    } else if cfg!(target_os = "macos") {
        cmd.env(
            "DYLD_LIBRARY_PATH",
            append_env_path("DYLD_LIBRARY_PATH", &native_path),
        );
    }
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") { ";" } else { ":" };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", value, separator, existing)
        }
        _ => value.to_string(),
    }
}

fn format_command_for_logs(cmd: &Command) -> String {
    let program = shell_escape(&cmd.get_program().to_string_lossy());
    let args = cmd
        .get_args()
        .map(|arg| shell_escape(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::auth::AccountProfile;
    use crate::core::context::OsFamily;
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

    fn fixture() -> (ResolvedSet, LocalArtifactSet) {
        let lib = "com.example:a:1.0";
        let resolved = ResolvedSet {
            version_id: "1.20".into(),
            libraries: vec![ResolvedLibrary {
                coordinate: MavenArtifact::parse(lib).unwrap(),
                task: task(lib),
            }],
            natives: Vec::new(),
            client_jar: task("client:1.20"),
            asset_index: None,
        };
        let mut local = LocalArtifactSet::new();
        for (id, path) in [(lib, "/cache/a.jar"), ("client:1.20", "/cache/client.jar")] {
            local.insert(
                id.to_string(),
                LocalArtifact {
                    path: PathBuf::from(path),
                    checksum: task(id).checksum,
                    size: 1,
                    from_cache: false,
                },
            );
        }
        (resolved, local)
    }

    fn descriptor(json: serde_json::Value) -> VersionDescriptor {
        serde_json::from_value(json).unwrap()
    }

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(OsFamily::Linux, "x86_64", "/games", "/usr/bin/java")
            .with_account(AccountProfile::with_bearer_token(
                "Steve",
                "069a79f4-44e9-4726-a5be-fca90e38aaf5",
                "token123",
            ))
    }

    #[test]
    fn modern_arguments_are_fully_substituted() {
        let (resolved, local) = fixture();
        let doc = descriptor(serde_json::json!({
            "id": "1.20",
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": { "id": "5", "sha1": "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d", "url": "https://x/5.json" },
            "arguments": {
                "jvm": ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"],
                "game": [
                    "--username", "${auth_player_name}",
                    "--assetIndex", "${assets_index_name}",
                    "--accessToken", "${auth_access_token}",
                    { "rules": [{ "action": "allow", "features": { "has_custom_resolution": true } }],
                      "value": ["--width", "${resolution_width}"] }
                ]
            }
        }));

        let composed = compose(&resolved, &local, &doc, &ctx(), &ComposeOptions::default()).unwrap();
        let spec = composed.spec;

        assert!(composed.missing.is_empty());
        assert_eq!(
            spec.jvm_args,
            vec![
                "-Xms512M",
                "-Xmx2048M",
                "-Djava.library.path=/games/versions/1.20/natives",
                "-cp",
                "/cache/a.jar:/cache/client.jar",
            ]
        );
        assert_eq!(
            spec.game_args,
            vec!["--username", "Steve", "--assetIndex", "5", "--accessToken", "token123"]
        );
        assert_eq!(spec.main_class, "net.minecraft.client.main.Main");
        assert_eq!(spec.classpath.last().unwrap(), &PathBuf::from("/cache/client.jar"));
    }

    #[test]
    fn legacy_documents_get_default_jvm_arguments() {
        let (resolved, local) = fixture();
        let doc = descriptor(serde_json::json!({
            "id": "1.7.10",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--session ${auth_session} --gameDir ${game_directory}"
        }));

        let spec = compose(&resolved, &local, &doc, &ctx(), &ComposeOptions::default())
            .unwrap()
            .spec;
        assert!(spec.jvm_args.contains(&"-cp".to_string()));
        assert!(spec
            .jvm_args
            .contains(&"-Dminecraft.launcher.brand=InterfaceOficial".to_string()));
        assert_eq!(
            spec.game_args,
            vec![
                "--session",
                "token:token123:069a79f444e94726a5befca90e38aaf5",
                "--gameDir",
                "/games",
            ]
        );
    }

    #[test]
    fn unknown_placeholder_fails_composition() {
        let (resolved, local) = fixture();
        let doc = descriptor(serde_json::json!({
            "id": "1.20",
            "mainClass": "Main",
            "arguments": { "game": ["--quickPlayPath", "${quickPlayPath}"], "jvm": ["-cp", "${classpath}"] }
        }));

        let err = compose(&resolved, &local, &doc, &ctx(), &ComposeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            CompositionError::UnresolvedPlaceholder { ref placeholder, .. } if placeholder == "quickPlayPath"
        ));
    }

    #[test]
    fn extra_jvm_args_pass_through_verbatim() {
        let (resolved, local) = fixture();
        let doc = descriptor(serde_json::json!({
            "id": "1.20",
            "mainClass": "Main",
            "arguments": { "jvm": ["-cp", "${classpath}"] }
        }));
        let mut ctx = ctx();
        ctx.extra_jvm_args = vec!["-Dlog.pattern=${date}".into(), "-XX:+UseG1GC".into()];

        let spec = compose(&resolved, &local, &doc, &ctx, &ComposeOptions::default())
            .unwrap()
            .spec;
        assert_eq!(
            spec.jvm_args[..4],
            ["-Xms512M", "-Xmx2048M", "-Dlog.pattern=${date}", "-XX:+UseG1GC"]
        );
    }

    #[test]
    fn command_is_built_not_spawned() {
        let (resolved, local) = fixture();
        let doc = descriptor(serde_json::json!({
            "id": "1.20", "mainClass": "Main", "minecraftArguments": "--demo"
        }));
        let spec = compose(&resolved, &local, &doc, &ctx(), &ComposeOptions::default())
            .unwrap()
            .spec;

        let cmd = spec.to_command();
        assert_eq!(cmd.get_program(), "/usr/bin/java");
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/games")));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args.last().unwrap(), "--demo");
        assert!(args.contains(&"Main".to_string()));
        assert!(spec.command_line_for_logs().starts_with("/usr/bin/java -Xms512M"));
    }
}
