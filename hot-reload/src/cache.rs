//! The module cache and the dependency graph recorded in it.
//!
//! Entries are keyed by absolute path. Each entry remembers the module that
//! first required it (`parent`) and the modules it required (`children`).
//! The graph is a tree along parent edges but `children` may form cycles, so
//! callers walking it must guard against revisiting a node.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::binding::Exports;

/// Identifies a loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleId {
    /// The process entry point. Invalidation never propagates into it.
    Root(PathBuf),

    /// Any module loaded through `require`.
    File(PathBuf),
}

impl ModuleId {
    /// Absolute path of the module source.
    pub fn path(&self) -> &Path {
        match self {
            Self::Root(path) | Self::File(path) => path,
        }
    }

    /// Whether this is the synthetic root entry.
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root(_))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(_) => f.write_str("."),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A loaded module record.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    exports: Exports,
    original_exports: Option<Arc<Value>>,
}

impl Module {
    pub(crate) fn new(
        id: ModuleId,
        exports: Exports,
        original_exports: Option<Arc<Value>>,
    ) -> Self {
        Self {
            id,
            exports,
            original_exports,
        }
    }

    /// Record registered while the module is still compiling.
    ///
    /// `previous` keeps the exports of the version being replaced readable
    /// through live bindings until the new version is in place.
    pub(crate) fn loading(id: ModuleId, previous: Option<Arc<Value>>) -> Self {
        Self::new(id, Exports::empty(), previous)
    }

    /// Module identifier.
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Absolute path of the module source.
    pub fn filename(&self) -> &Path {
        self.id.path()
    }

    /// Public exports handed to anything that requires this module.
    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    /// Exports as produced by the compiler, before any live binding wrapped
    /// them. Only set for hot-reloadable modules.
    pub fn original_exports(&self) -> Option<&Arc<Value>> {
        self.original_exports.as_ref()
    }
}

/// A cache slot: the module plus its place in the dependency graph.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The current module record.
    pub module: Arc<Module>,

    /// The module that first required this one.
    pub parent: Option<ModuleId>,

    /// Paths of modules this one required, in first-require order.
    pub children: Vec<PathBuf>,
}

impl CacheEntry {
    /// Create an entry with no children.
    pub fn new(module: Arc<Module>, parent: Option<ModuleId>) -> Self {
        Self {
            module,
            parent,
            children: Vec::new(),
        }
    }
}

/// Process-wide store of loaded modules.
///
/// Written by the runtime while loading and by the invalidator while
/// reloading; live bindings only read from it.
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl ModuleCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current module for `path`.
    pub fn get(&self, path: &Path) -> Option<Arc<Module>> {
        self.read().get(path).map(|entry| entry.module.clone())
    }

    /// Get a copy of the whole entry for `path`.
    pub fn entry(&self, path: &Path) -> Option<CacheEntry> {
        self.read().get(path).cloned()
    }

    /// Check if `path` is cached.
    pub fn contains(&self, path: &Path) -> bool {
        self.read().contains_key(path)
    }

    /// Insert or overwrite the entry for `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, entry: CacheEntry) {
        self.write().insert(path.into(), entry);
    }

    /// Swap the module record of an existing entry, keeping its graph edges.
    /// Returns false if `path` is not cached.
    pub fn replace_module(&self, path: &Path, module: Arc<Module>) -> bool {
        match self.write().get_mut(path) {
            Some(entry) => {
                entry.module = module;
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `path`.
    pub fn remove(&self, path: &Path) -> Option<CacheEntry> {
        self.write().remove(path)
    }

    /// Parent recorded for `path`.
    pub fn parent_of(&self, path: &Path) -> Option<ModuleId> {
        self.read().get(path).and_then(|entry| entry.parent.clone())
    }

    /// Overwrite the parent pointer of `path`.
    pub fn set_parent(&self, path: &Path, parent: Option<ModuleId>) {
        if let Some(entry) = self.write().get_mut(path) {
            entry.parent = parent;
        }
    }

    /// Children recorded for `path`.
    pub fn children_of(&self, path: &Path) -> Vec<PathBuf> {
        self.read()
            .get(path)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    /// Record `child` under `parent`, once.
    pub fn add_child(&self, parent: &Path, child: &Path) {
        if let Some(entry) = self.write().get_mut(parent) {
            if !entry.children.iter().any(|existing| existing == child) {
                entry.children.push(child.to_path_buf());
            }
        }
    }

    /// Remove `path` from its parent's child list and return the parent.
    pub fn detach_from_parent(&self, path: &Path) -> Option<ModuleId> {
        let mut entries = self.write();
        let parent = entries.get(path)?.parent.clone()?;
        if let Some(parent_entry) = entries.get_mut(parent.path()) {
            parent_entry.children.retain(|child| child != path);
        }
        Some(parent)
    }

    /// All cached paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.read().keys().cloned().collect()
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn module(id: ModuleId) -> Arc<Module> {
        Arc::new(Module::new(id, Exports::new(json!({})), None))
    }

    fn cache_with_chain() -> ModuleCache {
        let cache = ModuleCache::new();
        let main = ModuleId::Root(PathBuf::from("/app/main.json"));
        let b = ModuleId::File(PathBuf::from("/app/b.json"));
        let a = ModuleId::File(PathBuf::from("/app/a.json"));

        cache.insert("/app/main.json", CacheEntry::new(module(main.clone()), None));
        cache.insert("/app/b.json", CacheEntry::new(module(b.clone()), Some(main)));
        cache.insert("/app/a.json", CacheEntry::new(module(a), Some(b)));
        cache.add_child(Path::new("/app/main.json"), Path::new("/app/b.json"));
        cache.add_child(Path::new("/app/b.json"), Path::new("/app/a.json"));
        cache
    }

    #[test]
    fn test_module_id_display() {
        assert_eq!(ModuleId::Root(PathBuf::from("/app/main.json")).to_string(), ".");
        assert_eq!(
            ModuleId::File(PathBuf::from("/app/a.json")).to_string(),
            "/app/a.json"
        );
    }

    #[test]
    fn test_add_child_is_idempotent() {
        let cache = cache_with_chain();
        cache.add_child(Path::new("/app/b.json"), Path::new("/app/a.json"));

        assert_eq!(
            cache.children_of(Path::new("/app/b.json")),
            vec![PathBuf::from("/app/a.json")]
        );
    }

    #[test]
    fn test_detach_from_parent() {
        let cache = cache_with_chain();
        let parent = cache.detach_from_parent(Path::new("/app/a.json"));

        assert_eq!(parent, Some(ModuleId::File(PathBuf::from("/app/b.json"))));
        assert!(cache.children_of(Path::new("/app/b.json")).is_empty());
        // The detached entry itself keeps its parent pointer.
        assert!(cache.parent_of(Path::new("/app/a.json")).is_some());
    }

    #[test]
    fn test_detach_root_has_no_parent() {
        let cache = cache_with_chain();
        assert_eq!(cache.detach_from_parent(Path::new("/app/main.json")), None);
        assert_eq!(cache.detach_from_parent(Path::new("/app/missing.json")), None);
    }

    #[test]
    fn test_replace_module_keeps_edges() {
        let cache = cache_with_chain();
        let fresh = module(ModuleId::File(PathBuf::from("/app/b.json")));

        assert!(cache.replace_module(Path::new("/app/b.json"), fresh.clone()));
        let entry = cache.entry(Path::new("/app/b.json")).unwrap();
        assert!(Arc::ptr_eq(&entry.module, &fresh));
        assert_eq!(entry.children, vec![PathBuf::from("/app/a.json")]);
        assert!(!cache.replace_module(Path::new("/app/missing.json"), fresh));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = cache_with_chain();
        assert_eq!(cache.len(), 3);

        assert!(cache.remove(Path::new("/app/a.json")).is_some());
        assert!(!cache.contains(Path::new("/app/a.json")));

        cache.clear();
        assert!(cache.is_empty());
    }
}
