//! File watching for the watched file set.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::event::{FileEvent, FileEventKind};
use crate::watched::WatchedFileSet;

/// How the filesystem is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    /// Poll file metadata on an interval. Works on network mounts and
    /// filesystems without native notifications.
    Polling(Duration),

    /// Native notifications (inotify, FSEvents, ...).
    Native,
}

/// Watches individual files and forwards change events.
pub struct FileWatcher {
    watcher: Option<Box<dyn Watcher + Send>>,
    watched: Arc<WatchedFileSet>,
}

impl FileWatcher {
    /// Start watching every file in `watched`.
    ///
    /// Change events for watched files arrive on the returned receiver. Watch
    /// errors are logged and do not stop the watcher.
    pub fn start(
        watched: Arc<WatchedFileSet>,
        backend: WatchBackend,
    ) -> Result<(Self, mpsc::Receiver<FileEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(1000);
        let filter = watched.clone();

        let handler = move |res: std::result::Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                let kind = FileEventKind::from(event.kind);
                if !kind.is_change() {
                    return;
                }
                for path in event.paths {
                    if !filter.contains(&path) {
                        continue;
                    }
                    if let Err(e) = event_tx.blocking_send(FileEvent::new(kind, path)) {
                        error!("Failed to send file event: {e}");
                    }
                }
            }
            Err(e) => {
                error!("Watch error: {e}");
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = match backend {
            // Polled mtimes only have second resolution, so edits within the
            // same second are detected by content.
            WatchBackend::Polling(interval) => Box::new(PollWatcher::new(
                handler,
                notify::Config::default()
                    .with_poll_interval(interval)
                    .with_compare_contents(true),
            )?),
            WatchBackend::Native => Box::new(RecommendedWatcher::new(
                handler,
                notify::Config::default(),
            )?),
        };

        for path in watched.iter() {
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => debug!("Started watching: {}", path.display()),
                Err(e) => warn!("Failed to watch {}: {e}", path.display()),
            }
        }
        info!("File watcher started for {} files ({backend:?})", watched.len());

        Ok((
            Self {
                watcher: Some(watcher),
                watched,
            },
            event_rx,
        ))
    }

    /// Check if the watcher is running.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching. Pending events already sent stay in the channel.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            for path in self.watched.iter() {
                let _ = watcher.unwatch(path);
            }
            info!("File watcher stopped");
        }
    }

    /// Whether `path` is one of the watched files.
    pub fn watches(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
