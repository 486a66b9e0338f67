use std::path::PathBuf;

use clap::Parser;
use hot_reload::HotReloadConfig;

/// Run a JSON module graph and reload it as files change
#[derive(Parser, Debug)]
#[command(name = "hot-reload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Entry module
    pub entry: PathBuf,

    /// Directory the include and exclude globs are evaluated against
    /// (defaults to the entry module's directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// TOML file with hot reload options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Glob selecting reloadable files (repeatable)
    #[arg(short, long = "include")]
    pub includes: Vec<String>,

    /// Glob removed from the reloadable files (repeatable)
    #[arg(short, long = "exclude")]
    pub excludes: Vec<String>,

    /// Quiet period in milliseconds before a change is reloaded
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Use native filesystem notifications instead of polling
    #[arg(long)]
    pub native: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Build the activation config: file values first, flags on top.
    pub fn hot_reload_config(&self) -> hot_reload::Result<HotReloadConfig> {
        let mut config = match &self.config {
            Some(path) => HotReloadConfig::from_file(path)?,
            None => HotReloadConfig::new(self.default_root()),
        };

        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if !self.includes.is_empty() {
            config.includes = self.includes.clone();
        }
        if !self.excludes.is_empty() {
            config.excludes = self.excludes.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout;
        }
        if self.native {
            config.use_polling = false;
        }
        Ok(config)
    }

    fn default_root(&self) -> PathBuf {
        match self.entry.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Log filter derived from the verbosity flags.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "hot_reload=info",
            1 => "hot_reload=debug",
            _ => "hot_reload=trace",
        }
    }
}
