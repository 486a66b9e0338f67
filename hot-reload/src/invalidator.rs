//! Cache invalidation with upward propagation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;
use crate::event::ReloadEvent;
use crate::runtime::ModuleRuntime;

/// Something that can react to a changed file.
pub trait Invalidate: Send + Sync + 'static {
    /// Invalidate `path`, returning every module that was reloaded.
    fn invalidate(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Reloads a changed module in place and walks up through its parents.
pub struct CacheInvalidator {
    runtime: Arc<ModuleRuntime>,
    events: broadcast::Sender<ReloadEvent>,
}

impl CacheInvalidator {
    /// Create an invalidator for `runtime`.
    pub fn new(runtime: Arc<ModuleRuntime>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { runtime, events }
    }

    /// Receive a [`ReloadEvent`] after every pass that reloaded something.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }
}

impl Invalidate for CacheInvalidator {
    /// A path that is not cached is a no-op. Each module is reloaded at most
    /// once per pass, so a cycle in the parent chain stops the walk instead
    /// of recursing forever. Propagation stops below the root module.
    fn invalidate(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let cache = self.runtime.cache();
        let mut visited = HashSet::new();
        let mut reloaded = Vec::new();
        let mut next = Some(path.to_path_buf());

        while let Some(path) = next.take() {
            if !visited.insert(path.clone()) {
                debug!("Skip {}: already reloaded in this pass", path.display());
                break;
            }
            let Some(entry) = cache.entry(&path) else {
                debug!("Skip {}: not cached", path.display());
                break;
            };

            // The entry is replaced rather than removed so that live bindings
            // keep serving the previous exports while the module recompiles.
            let parent = cache.detach_from_parent(&path);
            self.runtime.reload(entry.module.id().clone())?;

            cache.set_parent(&path, parent.clone());
            if let Some(parent) = &parent {
                cache.add_child(parent.path(), &path);
            }
            info!("Reload file: {}", path.display());
            reloaded.push(path);

            next = parent
                .filter(|parent| !parent.is_root())
                .map(|parent| parent.path().to_path_buf());
        }

        if !reloaded.is_empty() {
            // No subscribers is fine.
            let _ = self.events.send(ReloadEvent::new(path, reloaded.clone()));
        }
        Ok(reloaded)
    }
}
