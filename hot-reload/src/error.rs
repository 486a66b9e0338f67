//! Error types for hot reload.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for hot reload operations.
pub type Result<T> = std::result::Result<T, HotReloadError>;

/// Errors that can occur while loading, watching or reloading modules.
#[derive(Error, Debug)]
pub enum HotReloadError {
    /// Module source could not be found on disk.
    #[error("module not found: {}", .0.display())]
    ModuleNotFound(PathBuf),

    /// Module failed to compile or execute.
    #[error("cannot compile {}: {message}", path.display())]
    Compile { path: PathBuf, message: String },

    /// A cache entry exists for the path but holds no captured exports.
    #[error("no captured exports for {} while reading `{key}`", path.display())]
    CapturedExportsMissing { path: PathBuf, key: String },

    /// Hot reload is already installed on this runtime.
    #[error("hot reload is already active on this runtime")]
    AlreadyActive,

    /// Invalid include or exclude pattern.
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The blocking reload task panicked or was cancelled.
    #[error("reload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HotReloadError {
    /// Build a compile error for `path`.
    pub fn compile(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Compile {
            path: path.into(),
            message: message.into(),
        }
    }
}
