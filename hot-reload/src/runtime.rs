//! Module loading: load-or-get from cache, plus the compile hook point.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::binding::Exports;
use crate::cache::{CacheEntry, Module, ModuleCache, ModuleId};
use crate::error::{HotReloadError, Result};

/// Turns module source into exports.
///
/// This is the compile hook point: the runtime calls the installed compiler
/// once per module load, and interceptors wrap the compiler with
/// [`ModuleRuntime::wrap_compiler`].
pub trait Compile: Send + Sync {
    /// Compile and execute `source`, storing the result in `module`.
    fn compile(
        &self,
        module: &mut PendingModule,
        source: &str,
        require: &mut RequireContext<'_>,
    ) -> Result<()>;
}

/// A module record under construction.
#[derive(Debug)]
pub struct PendingModule {
    id: ModuleId,

    /// Public exports. Compilers set this; interceptors may replace it.
    pub exports: Exports,

    /// Exports captured before an interceptor replaced `exports`.
    pub original_exports: Option<Arc<Value>>,
}

impl PendingModule {
    fn new(id: ModuleId) -> Self {
        Self {
            id,
            exports: Exports::empty(),
            original_exports: None,
        }
    }

    /// Module identifier.
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Absolute path of the module source.
    pub fn filename(&self) -> &Path {
        self.id.path()
    }

    /// Replace the public exports with a plain value.
    pub fn set_exports(&mut self, value: Value) {
        self.exports = Exports::new(value);
    }

    fn finish(self) -> Module {
        Module::new(self.id, self.exports, self.original_exports)
    }
}

/// Lets a compiling module load its dependencies.
pub struct RequireContext<'a> {
    runtime: &'a ModuleRuntime,
    parent: ModuleId,
}

impl RequireContext<'_> {
    /// The module doing the requiring.
    pub fn parent(&self) -> &ModuleId {
        &self.parent
    }

    /// Load `specifier`, resolved relative to the requiring module.
    pub fn require(&mut self, specifier: &str) -> Result<Exports> {
        let base = self.parent.path().parent().unwrap_or_else(|| Path::new("/"));
        let path = resolve(&base.join(specifier))?;
        self.runtime.require(&path, Some(&self.parent))
    }
}

/// Loads modules through the installed compiler and caches them by path.
pub struct ModuleRuntime {
    cache: Arc<ModuleCache>,
    compiler: RwLock<Arc<dyn Compile>>,
    hot_reload: AtomicBool,
}

impl ModuleRuntime {
    /// Create a runtime with an empty cache.
    pub fn new(compiler: impl Compile + 'static) -> Self {
        Self::with_cache(Arc::new(ModuleCache::new()), compiler)
    }

    /// Create a runtime over an existing cache.
    pub fn with_cache(cache: Arc<ModuleCache>, compiler: impl Compile + 'static) -> Self {
        let compiler: Arc<dyn Compile> = Arc::new(compiler);
        Self {
            cache,
            compiler: RwLock::new(compiler),
            hot_reload: AtomicBool::new(false),
        }
    }

    /// The module cache.
    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Replace the installed compiler with `wrap(current)`.
    pub fn wrap_compiler<F>(&self, wrap: F)
    where
        F: FnOnce(Arc<dyn Compile>) -> Arc<dyn Compile>,
    {
        let mut compiler = self.compiler.write().unwrap_or_else(PoisonError::into_inner);
        *compiler = wrap(compiler.clone());
    }

    /// Mark hot reload as installed. Returns false if it already was.
    pub(crate) fn claim_hot_reload(&self) -> bool {
        self.hot_reload
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether hot reload has been installed on this runtime.
    pub fn is_hot_reload_claimed(&self) -> bool {
        self.hot_reload.load(Ordering::Acquire)
    }

    /// Load the process entry point.
    pub fn load_main(&self, path: &Path) -> Result<Exports> {
        let path = resolve(path)?;
        if let Some(module) = self.cache.get(&path) {
            return Ok(module.exports().clone());
        }
        self.load(ModuleId::Root(path), None)
    }

    /// Return the cached exports for `path`, loading it on a miss.
    ///
    /// `path` must be absolute. When `parent` is given the module is recorded
    /// as one of its children, even on a cache hit.
    pub fn require(&self, path: &Path, parent: Option<&ModuleId>) -> Result<Exports> {
        if let Some(module) = self.cache.get(path) {
            if let Some(parent) = parent {
                self.cache.add_child(parent.path(), path);
            }
            debug!("Require {} from cache", path.display());
            return Ok(module.exports().clone());
        }
        self.load(ModuleId::File(path.to_path_buf()), parent.cloned())
    }

    /// Load `id` afresh, ignoring and overwriting any cached entry.
    ///
    /// The new entry has no parent; callers restore graph edges themselves.
    pub fn reload(&self, id: ModuleId) -> Result<Exports> {
        self.load(id, None)
    }

    fn load(&self, id: ModuleId, parent: Option<ModuleId>) -> Result<Exports> {
        let path = id.path().to_path_buf();
        let source = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HotReloadError::ModuleNotFound(path.clone()),
            _ => HotReloadError::Io(e),
        })?;

        // Registered before compiling so cyclic requires see the loading module.
        // A reload replaces the entry in place, so the last compiled exports
        // stay readable until the new version is ready.
        let previous = self
            .cache
            .get(&path)
            .and_then(|module| module.original_exports().cloned());
        let loading = Arc::new(Module::loading(id.clone(), previous));
        self.cache
            .insert(path.clone(), CacheEntry::new(loading, parent.clone()));
        if let Some(parent) = &parent {
            self.cache.add_child(parent.path(), &path);
        }

        let compiler = self
            .compiler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut pending = PendingModule::new(id.clone());
        let mut require = RequireContext {
            runtime: self,
            parent: id,
        };

        match compiler.compile(&mut pending, &source, &mut require) {
            Ok(()) => {
                let module = Arc::new(pending.finish());
                let exports = module.exports().clone();
                self.cache.replace_module(&path, module);
                debug!("Loaded {}", path.display());
                Ok(exports)
            }
            Err(e) => {
                self.cache.detach_from_parent(&path);
                self.cache.remove(&path);
                Err(e)
            }
        }
    }
}

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => HotReloadError::ModuleNotFound(path.to_path_buf()),
        _ => HotReloadError::Io(e),
    })
}
