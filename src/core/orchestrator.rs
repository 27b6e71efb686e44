// ─── Orchestrator ───
// Drives one preparation run: resolve, fetch, compose. Progress of the run
// is published as a state machine on a watch channel:
//
//   Idle -> Resolving -> Fetching -> Composing -> Ready
//                 \            \           \
//                  +------------+-----------+--> Failed(message)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::assets::{link_assets, AssetIndex, AssetLayout};
use crate::core::config::{default_install_root, EngineConfig, CONFIG_FILE};
use crate::core::context::RuntimeContext;
use crate::core::downloader::{
    ArtifactFailure, CancellationToken, ContentCache, DownloadTask, Downloader, LocalArtifactSet,
    ProgressObserver,
};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::{Fetcher, ReqwestFetcher};
use crate::core::launch::{compose, extract_natives, LaunchSpec};
use crate::core::resolver::{resolve, ResolvedSet};
use crate::core::version::{load_merged, DescriptorSource, RemoteSource, VersionDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum PreparationState {
    Idle,
    Resolving,
    Fetching,
    Composing,
    Ready,
    Failed(String),
}

/// Outcome of a preparation run that got as far as composing.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub spec: LaunchSpec,
    /// Artifacts that could not be materialized. Empty for a complete launch.
    pub deficiencies: Vec<ArtifactFailure>,
    pub artifacts: LocalArtifactSet,
    descriptor: VersionDescriptor,
    resolved: ResolvedSet,
    asset_index: Option<AssetIndex>,
}

impl Prepared {
    pub fn is_complete(&self) -> bool {
        self.deficiencies.is_empty()
    }

    pub fn descriptor(&self) -> &VersionDescriptor {
        &self.descriptor
    }
}

pub struct Orchestrator {
    config: EngineConfig,
    source: Arc<dyn DescriptorSource>,
    downloader: Downloader,
    state: watch::Sender<PreparationState>,
    cancel: Mutex<CancellationToken>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
        source: Arc<dyn DescriptorSource>,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        let cache = ContentCache::new(cache_root).with_verification(config.cache_verification);
        let downloader = Downloader::new(fetcher, cache)
            .with_concurrency(config.concurrency)
            .with_retry(config.retry.clone())
            .with_in_flight_policy(config.in_flight)
            .with_read_timeout(config.read_timeout());
        let (state, _) = watch::channel(PreparationState::Idle);

        Self {
            config,
            source,
            downloader,
            state,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Orchestrator reading version documents from the remote manifest,
    /// persisting them under `<install_root>/versions`.
    pub fn remote(config: EngineConfig, fetcher: Arc<dyn Fetcher>, install_root: &Path) -> Self {
        let source = RemoteSource::new(
            Arc::clone(&fetcher),
            config.manifest_url.clone(),
            install_root.join("versions"),
        );
        let cache_root = config.cache_root(install_root);
        Self::new(config, fetcher, Arc::new(source), cache_root)
    }

    /// Production setup: configuration read from the installation, network
    /// through `ReqwestFetcher`. `None` selects the default installation.
    pub fn open(install_root: Option<&Path>) -> LauncherResult<Self> {
        let install_root = install_root
            .map(Path::to_path_buf)
            .unwrap_or_else(default_install_root);
        let config = EngineConfig::load(&install_root.join(CONFIG_FILE))?;
        let fetcher = Arc::new(ReqwestFetcher::new(config.read_timeout())?);
        info!("Opening installation at {:?}", install_root);
        Ok(Self::remote(config, fetcher, &install_root))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.downloader = self.downloader.with_observer(observer);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<PreparationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PreparationState {
        self.state.borrow().clone()
    }

    /// Token observed by the current (or next) run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, next: PreparationState) {
        info!("Preparation state: {:?}", next);
        self.state.send_replace(next);
    }

    /// Resolve, fetch and compose `version_id` for `ctx`.
    pub async fn prepare(&self, version_id: &str, ctx: &RuntimeContext) -> LauncherResult<Prepared> {
        let cancel = self.cancellation_token();
        let result = self.run_prepare(version_id, ctx, &cancel).await;
        self.finish(result, &cancel)
    }

    /// Re-fetch only the deficient artifacts of `prepared` and recompose.
    pub async fn retry_failed(
        &self,
        prepared: Prepared,
        ctx: &RuntimeContext,
    ) -> LauncherResult<Prepared> {
        if prepared.is_complete() {
            return Ok(prepared);
        }
        let cancel = self.cancellation_token();
        let result = self.run_retry(prepared, ctx, &cancel).await;
        self.finish(result, &cancel)
    }

    fn finish(
        &self,
        result: LauncherResult<Prepared>,
        cancel: &CancellationToken,
    ) -> LauncherResult<Prepared> {
        if cancel.is_cancelled() {
            // The next run starts with a fresh token.
            *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
        }
        match result {
            Ok(prepared) => {
                if !prepared.is_complete() {
                    warn!(
                        "{} prepared with {} deficiencies",
                        prepared.spec.version_id,
                        prepared.deficiencies.len()
                    );
                }
                self.set_state(PreparationState::Ready);
                Ok(prepared)
            }
            Err(e) => {
                self.set_state(PreparationState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_prepare(
        &self,
        version_id: &str,
        ctx: &RuntimeContext,
        cancel: &CancellationToken,
    ) -> LauncherResult<Prepared> {
        self.set_state(PreparationState::Resolving);
        let descriptor =
            load_merged(self.source.as_ref(), version_id, self.config.max_inheritance_depth).await?;
        let resolved = resolve(&descriptor, ctx, self.config.duplicate_policy)?;
        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled(LocalArtifactSet::new()));
        }

        self.set_state(PreparationState::Fetching);
        let mut tasks = resolved.download_tasks();
        if let Some(index) = &resolved.asset_index {
            tasks.push(index.to_task()?);
        }

        let mut artifacts = LocalArtifactSet::new();
        let mut failures = Vec::new();
        self.fetch(tasks, &mut artifacts, &mut failures, cancel).await?;
        let asset_index = self
            .fetch_assets(&resolved, &mut artifacts, &mut failures, cancel)
            .await?;

        self.compose_run(descriptor, resolved, asset_index, artifacts, failures, ctx)
            .await
    }

    async fn run_retry(
        &self,
        prepared: Prepared,
        ctx: &RuntimeContext,
        cancel: &CancellationToken,
    ) -> LauncherResult<Prepared> {
        let Prepared {
            descriptor,
            resolved,
            deficiencies,
            mut artifacts,
            asset_index,
            ..
        } = prepared;

        self.set_state(PreparationState::Fetching);
        info!("Retrying {} failed artifacts", deficiencies.len());
        let tasks: Vec<DownloadTask> = deficiencies.into_iter().map(|f| f.task).collect();
        let mut failures = Vec::new();
        self.fetch(tasks, &mut artifacts, &mut failures, cancel).await?;

        let asset_index = match asset_index {
            Some(index) => Some(index),
            None => {
                self.fetch_assets(&resolved, &mut artifacts, &mut failures, cancel)
                    .await?
            }
        };

        self.compose_run(descriptor, resolved, asset_index, artifacts, failures, ctx)
            .await
    }

    /// Materialize `tasks` into `artifacts`. A cancelled batch ends the run.
    async fn fetch(
        &self,
        tasks: Vec<DownloadTask>,
        artifacts: &mut LocalArtifactSet,
        failures: &mut Vec<ArtifactFailure>,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let report = self.downloader.materialize(tasks, cancel).await;
        artifacts.extend(report.artifacts);
        failures.extend(report.failures);

        if report.cancelled {
            return Err(LauncherError::Cancelled(artifacts.clone()));
        }
        Ok(())
    }

    /// Once the asset index itself is cached, queue its objects.
    async fn fetch_assets(
        &self,
        resolved: &ResolvedSet,
        artifacts: &mut LocalArtifactSet,
        failures: &mut Vec<ArtifactFailure>,
        cancel: &CancellationToken,
    ) -> LauncherResult<Option<AssetIndex>> {
        let Some(index_ref) = &resolved.asset_index else {
            return Ok(None);
        };
        let index_task = index_ref.to_task()?;
        let Some(index_artifact) = artifacts.get(&index_task.id) else {
            return Ok(None);
        };

        let raw = tokio::fs::read(&index_artifact.path)
            .await
            .map_err(|e| LauncherError::io(&index_artifact.path, e))?;
        let index = AssetIndex::parse(&index_ref.id, &raw)?;

        let tasks: Vec<DownloadTask> = index
            .download_tasks(&self.config.resources_url)?
            .into_iter()
            .filter(|t| !artifacts.contains_key(&t.id))
            .collect();
        info!("Asset index {} lists {} objects", index_ref.id, index.objects.len());
        self.fetch(tasks, artifacts, failures, cancel).await?;

        Ok(Some(index))
    }

    async fn compose_run(
        &self,
        descriptor: VersionDescriptor,
        resolved: ResolvedSet,
        asset_index: Option<AssetIndex>,
        artifacts: LocalArtifactSet,
        mut failures: Vec<ArtifactFailure>,
        ctx: &RuntimeContext,
    ) -> LauncherResult<Prepared> {
        self.set_state(PreparationState::Composing);

        extract_natives(&resolved.natives, &artifacts, &ctx.natives_dir(&descriptor.id)).await?;
        let layout = self
            .link_asset_tree(&resolved, asset_index.as_ref(), &artifacts, ctx)
            .await?;

        let mut options = self.config.compose_options();
        options.assets = layout;
        let composition = compose(&resolved, &artifacts, &descriptor, ctx, &options)?;
        if !composition.missing.is_empty() {
            warn!(
                "Classpath is missing {} artifacts: {}",
                composition.missing.len(),
                composition.missing.join(", ")
            );
        }

        failures.sort_by(|a, b| a.task.id.cmp(&b.task.id));
        Ok(Prepared {
            spec: composition.spec,
            deficiencies: failures,
            artifacts,
            descriptor,
            resolved,
            asset_index,
        })
    }

    async fn link_asset_tree(
        &self,
        resolved: &ResolvedSet,
        index: Option<&AssetIndex>,
        artifacts: &LocalArtifactSet,
        ctx: &RuntimeContext,
    ) -> LauncherResult<Option<AssetLayout>> {
        let (Some(index_ref), Some(index)) = (&resolved.asset_index, index) else {
            return Ok(None);
        };
        let index_id = index_ref.to_task()?.id;
        let Some(index_artifact) = artifacts.get(&index_id) else {
            return Ok(None);
        };
        let layout =
            link_assets(&ctx.assets_dir(), &index_ref.id, index_artifact, index, artifacts).await?;
        Ok(Some(layout))
    }
}
