//! The set of files eligible for hot reload.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::HotReloadConfig;
use crate::error::Result;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Absolute paths selected by the include patterns minus the exclude patterns.
///
/// Computed once at activation and never updated afterwards. Files created
/// later are not picked up until the process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedFileSet {
    files: BTreeSet<PathBuf>,
}

impl WatchedFileSet {
    /// Walk `config.root` and collect every matching file.
    pub fn from_config(config: &HotReloadConfig) -> Result<Self> {
        let root = config.root.canonicalize()?;
        let includes = compile_patterns(&config.includes)?;
        let excludes = compile_patterns(&config.excludes)?;

        let mut files = BTreeSet::new();
        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&root).unwrap_or(path);
            let matches = |patterns: &[Pattern]| {
                patterns.iter().any(|pattern| {
                    if Path::new(pattern.as_str()).is_absolute() {
                        pattern.matches_path_with(path, MATCH_OPTIONS)
                    } else {
                        pattern.matches_path_with(relative, MATCH_OPTIONS)
                    }
                })
            };

            // Excludes always win over includes.
            if matches(&includes) && !matches(&excludes) {
                files.insert(path.to_path_buf());
            }
        }

        debug!("Watch files: {files:?}");
        Ok(Self { files })
    }

    /// Build a set from explicit paths.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `path` is eligible for hot reload.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Iterate over the watched paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    /// Number of watched files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file matched.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| Pattern::new(pattern).map_err(Into::into))
        .collect()
}
