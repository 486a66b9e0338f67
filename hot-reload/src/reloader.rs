//! Activation: ties the watched set, compile hook, debouncer and watcher together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, info, warn};

use crate::config::{HotReloadConfig, is_production_environment};
use crate::debouncer::Debouncer;
use crate::error::{HotReloadError, Result};
use crate::event::ReloadEvent;
use crate::hook::HotCompile;
use crate::invalidator::CacheInvalidator;
use crate::runtime::ModuleRuntime;
use crate::watched::WatchedFileSet;
use crate::watcher::{FileWatcher, WatchBackend};

/// Hot reload installed on a [`ModuleRuntime`].
///
/// Activate it before loading the modules that should be reloadable: only
/// modules compiled after activation get live bindings.
pub struct HotReload {
    runtime: Arc<ModuleRuntime>,
    watched: Arc<WatchedFileSet>,
    invalidator: Arc<CacheInvalidator>,
    debouncer: Arc<Debouncer>,
    watcher: Option<FileWatcher>,
    pump: Option<JoinHandle<()>>,
}

impl HotReload {
    /// Compute the watched set from `config`, install the compile hook and
    /// start watching. Must be called from within a Tokio runtime.
    ///
    /// The runtime is only claimed once the watcher is running, so a failed
    /// activation can be retried.
    pub fn activate(runtime: Arc<ModuleRuntime>, config: &HotReloadConfig) -> Result<Self> {
        if is_production_environment() {
            warn!("Hot reload should not be used in a production environment");
        }
        if runtime.is_hot_reload_claimed() {
            return Err(HotReloadError::AlreadyActive);
        }

        let watched = Arc::new(WatchedFileSet::from_config(config)?);
        let backend = if config.use_polling {
            WatchBackend::Polling(config.poll_interval())
        } else {
            WatchBackend::Native
        };
        let (watcher, mut events) = FileWatcher::start(watched.clone(), backend)?;
        let mut hot_reload = Self::install_shared(runtime, watched, config.timeout())?;

        let debouncer = hot_reload.debouncer.clone();
        let pump = tokio::spawn(
            async move {
                while let Some(event) = events.recv().await {
                    debouncer.on_change(event.path).await;
                }
            }
            .instrument(Span::current()),
        );

        hot_reload.watcher = Some(watcher);
        hot_reload.pump = Some(pump);
        Ok(hot_reload)
    }

    /// Install the compile hook and debouncer without a filesystem watcher.
    ///
    /// Changes are then reported through [`HotReload::on_change`]. Fails if
    /// hot reload is already installed on `runtime`.
    pub fn install(
        runtime: Arc<ModuleRuntime>,
        watched: WatchedFileSet,
        timeout: Duration,
    ) -> Result<Self> {
        Self::install_shared(runtime, Arc::new(watched), timeout)
    }

    fn install_shared(
        runtime: Arc<ModuleRuntime>,
        watched: Arc<WatchedFileSet>,
        timeout: Duration,
    ) -> Result<Self> {
        if !runtime.claim_hot_reload() {
            return Err(HotReloadError::AlreadyActive);
        }

        let cache = Arc::downgrade(runtime.cache());
        let hook_watched = watched.clone();
        runtime.wrap_compiler(move |inner| Arc::new(HotCompile::new(inner, hook_watched, cache)));

        let invalidator = Arc::new(CacheInvalidator::new(runtime.clone()));
        let debouncer = Arc::new(Debouncer::new(timeout, invalidator.clone()));
        info!("Hot reload installed for {} files", watched.len());

        Ok(Self {
            runtime,
            watched,
            invalidator,
            debouncer,
            watcher: None,
            pump: None,
        })
    }

    /// The runtime hot reload is installed on.
    pub fn runtime(&self) -> &Arc<ModuleRuntime> {
        &self.runtime
    }

    /// Files eligible for hot reload.
    pub fn watched_files(&self) -> &WatchedFileSet {
        &self.watched
    }

    /// Whether a filesystem watcher is running.
    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(FileWatcher::is_running)
    }

    /// Report a change to `path`; the reload runs after the quiet period.
    pub async fn on_change(&self, path: impl Into<PathBuf>) {
        self.debouncer.on_change(path.into()).await;
    }

    /// Invalidate `path` immediately, skipping the debounce. Still waits for
    /// a reload that is already running.
    pub async fn invalidate_now(&self, path: impl Into<PathBuf>) -> Result<Vec<PathBuf>> {
        self.debouncer.invalidate_now(path.into()).await
    }

    /// Paths waiting for their quiet period to end.
    pub async fn pending(&self) -> Vec<PathBuf> {
        self.debouncer.pending_paths().await
    }

    /// Receive an event after every completed reload pass.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.invalidator.subscribe()
    }

    /// Stop watching and cancel pending reloads. The compile hook stays
    /// installed, so existing live bindings keep following the cache.
    pub async fn shutdown(mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.debouncer.cancel_all().await;
        info!("Hot reload stopped");
    }
}

impl Drop for HotReload {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
