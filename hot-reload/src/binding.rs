//! Exported bindings and the live binding that follows reloads.
//!
//! A [`LiveBinding`] is handed out instead of a module's plain exports when
//! the module is hot-reloadable. It keeps no state of its own beyond the path
//! it was created for: every read looks the path up in the [`ModuleCache`]
//! and serves the newest compiled exports, so references obtained before a
//! reload observe the reloaded module.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::cache::ModuleCache;
use crate::error::{HotReloadError, Result};

/// The value a module makes available to its importers.
#[derive(Clone)]
pub enum Exports {
    /// A fixed snapshot.
    Plain(Arc<Value>),

    /// A read-through binding to whatever the cache currently holds.
    Live(LiveBinding),
}

impl Exports {
    /// Wrap a plain value.
    pub fn new(value: Value) -> Self {
        Self::Plain(Arc::new(value))
    }

    /// An empty object, used while a module is still compiling.
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Read a single exported property. Missing keys yield `None`.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        match self {
            Self::Plain(value) => Ok(value.get(key).cloned()),
            Self::Live(binding) => binding.get(key),
        }
    }

    /// The whole exported value as currently visible through this handle.
    pub fn snapshot(&self) -> Result<Arc<Value>> {
        match self {
            Self::Plain(value) => Ok(value.clone()),
            Self::Live(binding) => binding.current(None),
        }
    }

    /// Whether reads follow reloads.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Live(binding) => f.debug_tuple("Live").field(binding).finish(),
        }
    }
}

/// Read-through wrapper over a module's exports.
///
/// Only reads are redirected. The wrapped target is never mutated.
#[derive(Clone)]
pub struct LiveBinding {
    path: Arc<PathBuf>,
    target: Arc<Value>,
    cache: Weak<ModuleCache>,
}

impl LiveBinding {
    /// Wrap `exports` for the module at `path`.
    ///
    /// Fails if `exports` is already live, so bindings never chain.
    pub fn wrap(
        path: impl Into<PathBuf>,
        exports: &Exports,
        cache: Weak<ModuleCache>,
    ) -> Result<Self> {
        let path = path.into();
        match exports {
            Exports::Plain(target) => Ok(Self {
                path: Arc::new(path),
                target: target.clone(),
                cache,
            }),
            Exports::Live(_) => Err(HotReloadError::compile(
                path,
                "exports are already a live binding",
            )),
        }
    }

    /// Path of the module this binding follows.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The exports captured when this binding was created.
    pub fn target(&self) -> &Arc<Value> {
        &self.target
    }

    /// Read `key` from the newest version of the module.
    ///
    /// Falls back to the captured target when the cache has no entry for the
    /// path. Errors when the entry exists but holds no captured exports.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let current = self.current(Some(key))?;
        Ok(current.get(key).cloned())
    }

    pub(crate) fn current(&self, key: Option<&str>) -> Result<Arc<Value>> {
        let key = key.unwrap_or("*");
        let Some(module) = self.cache.upgrade().and_then(|cache| cache.get(&self.path)) else {
            debug!("Get {key} from original {}", self.path.display());
            return Ok(self.target.clone());
        };

        match module.original_exports() {
            Some(exports) => {
                debug!("Get {key} from cache[{}]", self.path.display());
                Ok(exports.clone())
            }
            None => {
                let err = HotReloadError::CapturedExportsMissing {
                    path: self.path.to_path_buf(),
                    key: key.to_string(),
                };
                error!("Get {key} from {} error: {err}", self.path.display());
                Err(err)
            }
        }
    }
}

impl fmt::Debug for LiveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveBinding")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, Module, ModuleId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PATH: &str = "/app/a.json";

    fn hot_module(value: Value) -> Arc<Module> {
        let original = Arc::new(value);
        Arc::new(Module::new(
            ModuleId::File(PathBuf::from(PATH)),
            Exports::Plain(original.clone()),
            Some(original),
        ))
    }

    #[test]
    fn test_plain_exports() {
        let exports = Exports::new(json!({ "port": 8080 }));

        assert_eq!(exports.get("port").unwrap(), Some(json!(8080)));
        assert_eq!(exports.get("host").unwrap(), None);
        assert!(!exports.is_live());
    }

    #[test]
    fn test_reads_newest_cached_version() {
        let cache = Arc::new(ModuleCache::new());
        let first = Exports::new(json!({ "greeting": "hello" }));
        let binding = LiveBinding::wrap(PATH, &first, Arc::downgrade(&cache)).unwrap();

        cache.insert(PATH, CacheEntry::new(hot_module(json!({ "greeting": "hi" })), None));

        assert_eq!(binding.get("greeting").unwrap(), Some(json!("hi")));
        assert_eq!(binding.target().get("greeting"), Some(&json!("hello")));
    }

    #[test]
    fn test_falls_back_to_target_without_cache_entry() {
        let cache = Arc::new(ModuleCache::new());
        let exports = Exports::new(json!({ "greeting": "hello" }));
        let binding = LiveBinding::wrap(PATH, &exports, Arc::downgrade(&cache)).unwrap();

        assert_eq!(binding.get("greeting").unwrap(), Some(json!("hello")));

        drop(cache);
        assert_eq!(binding.get("greeting").unwrap(), Some(json!("hello")));
    }

    #[test]
    fn test_missing_captured_exports_is_an_error() {
        let cache = Arc::new(ModuleCache::new());
        let exports = Exports::new(json!({ "greeting": "hello" }));
        let binding = LiveBinding::wrap(PATH, &exports, Arc::downgrade(&cache)).unwrap();

        let loading = Arc::new(Module::loading(ModuleId::File(PathBuf::from(PATH)), None));
        cache.insert(PATH, CacheEntry::new(loading, None));

        let err = binding.get("greeting").unwrap_err();
        assert!(matches!(
            err,
            HotReloadError::CapturedExportsMissing { ref key, .. } if key == "greeting"
        ));
    }

    #[test]
    fn test_refuses_to_wrap_live_exports() {
        let cache = Arc::new(ModuleCache::new());
        let exports = Exports::new(json!({}));
        let binding = LiveBinding::wrap(PATH, &exports, Arc::downgrade(&cache)).unwrap();

        let nested = LiveBinding::wrap(PATH, &Exports::Live(binding), Arc::downgrade(&cache));
        assert!(nested.is_err());
    }
}
