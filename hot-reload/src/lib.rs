//! # Hot Reload
//!
//! Development-time hot reload for a module runtime. Watched source files are
//! reloaded when they change, the reload propagates to every module that
//! (transitively) required them, and exports handed out before the reload keep
//! working: they are live bindings that read from the newest cached version.
//!
//! Not meant for production use.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Hot Reload                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  FileWatcher ──► Debouncer ──► CacheInvalidator                 │
//! │                                   │  evict, reload, walk up     │
//! │                                   ▼                             │
//! │  ModuleRuntime ──► HotCompile ──► LiveBinding                   │
//! │        │                              │                         │
//! │        └────────── ModuleCache ◄──────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hot_reload::{HotReload, HotReloadConfig, JsonModuleCompiler, ModuleRuntime};
//!
//! let runtime = Arc::new(ModuleRuntime::new(JsonModuleCompiler));
//! let _hot = HotReload::activate(runtime.clone(), &HotReloadConfig::new("app"))?;
//!
//! let exports = runtime.load_main(Path::new("app/main.json"))?;
//! // Later reads observe reloaded modules.
//! let port = exports.get("port")?;
//! ```

pub mod binding;
pub mod cache;
pub mod config;
pub mod debouncer;
pub mod error;
pub mod event;
pub mod hook;
pub mod invalidator;
pub mod json_module;
pub mod reloader;
pub mod runtime;
pub mod watched;
pub mod watcher;

pub use binding::{Exports, LiveBinding};
pub use cache::{CacheEntry, Module, ModuleCache, ModuleId};
pub use config::HotReloadConfig;
pub use debouncer::Debouncer;
pub use error::{HotReloadError, Result};
pub use event::{FileEvent, FileEventKind, ReloadEvent};
pub use hook::HotCompile;
pub use invalidator::{CacheInvalidator, Invalidate};
pub use json_module::JsonModuleCompiler;
pub use reloader::HotReload;
pub use runtime::{Compile, ModuleRuntime, PendingModule, RequireContext};
pub use watched::WatchedFileSet;
pub use watcher::{FileWatcher, WatchBackend};
