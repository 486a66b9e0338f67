//! Compile interception: wraps the exports of watched modules in live bindings.

use std::sync::{Arc, Weak};

use tracing::{debug, error};

use crate::binding::{Exports, LiveBinding};
use crate::cache::ModuleCache;
use crate::error::Result;
use crate::runtime::{Compile, PendingModule, RequireContext};
use crate::watched::WatchedFileSet;

/// Compiler decorator installed by hot reload.
///
/// Modules outside the watched set compile exactly as they would without it.
/// Watched modules get their compiled exports captured in
/// `original_exports` and their public exports replaced by a [`LiveBinding`].
pub struct HotCompile {
    inner: Arc<dyn Compile>,
    watched: Arc<WatchedFileSet>,
    cache: Weak<ModuleCache>,
}

impl HotCompile {
    /// Wrap `inner` for the given watched set.
    pub fn new(
        inner: Arc<dyn Compile>,
        watched: Arc<WatchedFileSet>,
        cache: Weak<ModuleCache>,
    ) -> Self {
        Self {
            inner,
            watched,
            cache,
        }
    }
}

impl Compile for HotCompile {
    fn compile(
        &self,
        module: &mut PendingModule,
        source: &str,
        require: &mut RequireContext<'_>,
    ) -> Result<()> {
        let filename = module.filename().to_path_buf();
        if let Err(e) = self.inner.compile(module, source, require) {
            error!("Cannot compile file {}: {e}", filename.display());
            return Err(e);
        }

        if !self.watched.contains(&filename) {
            return Ok(());
        }

        if let Exports::Plain(original) = &module.exports {
            module.original_exports = Some(original.clone());
        }
        // Wrapping is best-effort: on failure the module keeps its plain exports.
        match LiveBinding::wrap(&filename, &module.exports, self.cache.clone()) {
            Ok(binding) => {
                debug!("Wrapped {} in a live binding", filename.display());
                module.exports = Exports::Live(binding);
            }
            Err(e) => error!("Wrap {} with live binding error: {e}", filename.display()),
        }
        Ok(())
    }
}
