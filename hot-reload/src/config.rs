//! Configuration for hot reload activation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default debounce quiet period in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Environment variables consulted to detect a production deployment.
pub const ENVIRONMENT_VARS: [&str; 2] = ["HOT_RELOAD_ENV", "APP_ENV"];

/// Options supplied once at activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    /// Directory the include and exclude globs are evaluated against.
    pub root: PathBuf,

    /// Glob patterns selecting files eligible for hot reload.
    pub includes: Vec<String>,

    /// Glob patterns removed from the include set.
    pub excludes: Vec<String>,

    /// Debounce quiet period before an invalidation runs.
    pub timeout_ms: u64,

    /// Poll the filesystem instead of relying on native notifications.
    pub use_polling: bool,

    /// Interval between polls when `use_polling` is set.
    pub poll_interval_ms: u64,
}

impl HotReloadConfig {
    /// Create a config rooted at `root` with default patterns.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            includes: Self::default_includes(),
            excludes: Self::default_excludes(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            use_polling: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Replace the include patterns.
    pub fn with_includes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the exclude patterns.
    pub fn with_excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    /// Set the debounce quiet period.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Use native filesystem notifications instead of polling.
    pub fn native_watching(mut self) -> Self {
        self.use_polling = false;
        self
    }

    /// Debounce quiet period as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn default_includes() -> Vec<String> {
        vec!["**/*.json".to_string()]
    }

    fn default_excludes() -> Vec<String> {
        vec![
            "**/node_modules/**".to_string(),
            "**/vendor/**".to_string(),
        ]
    }
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Whether the process looks like a production deployment.
pub fn is_production_environment() -> bool {
    ENVIRONMENT_VARS.iter().any(|var| {
        std::env::var(var)
            .map(|value| value.eq_ignore_ascii_case("production"))
            .unwrap_or(false)
    })
}
