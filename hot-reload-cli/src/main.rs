//! hot-reload - run a JSON module graph with hot reload enabled
//!
//! Usage: hot-reload [OPTIONS] <ENTRY>
//!
//! Loads the entry module, then prints the exports of every module that is
//! reloaded after a change on disk. Stop with Ctrl-C.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hot_reload::{HotReload, JsonModuleCompiler, ModuleRuntime};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.hot_reload_config()?;
    let runtime = Arc::new(ModuleRuntime::new(JsonModuleCompiler));
    let hot_reload = HotReload::activate(runtime.clone(), &config)
        .with_context(|| format!("failed to activate hot reload under {}", config.root.display()))?;
    info!("Watching {} files", hot_reload.watched_files().len());

    let exports = runtime
        .load_main(&cli.entry)
        .with_context(|| format!("failed to load {}", cli.entry.display()))?;
    println!("{}", serde_json::to_string_pretty(exports.snapshot()?.as_ref())?);

    let mut reloads = hot_reload.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = reloads.recv() => match event {
                Ok(event) => {
                    for path in &event.reloaded {
                        let Some(module) = runtime.cache().get(path) else {
                            continue;
                        };
                        match module.exports().snapshot() {
                            Ok(value) => println!(
                                "# {}\n{}",
                                path.display(),
                                serde_json::to_string_pretty(value.as_ref())?
                            ),
                            Err(e) => warn!("Cannot read exports of {}: {e}", path.display()),
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {skipped} reload events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    hot_reload.shutdown().await;
    Ok(())
}
