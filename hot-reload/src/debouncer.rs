//! Per-path debouncing of change notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error};

use crate::error::Result;
use crate::invalidator::Invalidate;

struct PendingReload {
    token: u64,
    handle: JoinHandle<()>,
}

/// Collapses bursts of change events for the same path into one invalidation.
///
/// Every event for a pending path restarts its quiet period, so the
/// invalidation runs `timeout` after the last event of a burst. Invalidations
/// never overlap, even for different paths.
pub struct Debouncer {
    timeout: Duration,
    invalidator: Arc<dyn Invalidate>,
    pending: Arc<Mutex<HashMap<PathBuf, PendingReload>>>,
    reload_lock: Arc<Mutex<()>>,
    next_token: AtomicU64,
}

impl Debouncer {
    /// Create a debouncer that calls `invalidator` after `timeout` of quiet.
    pub fn new(timeout: Duration, invalidator: Arc<dyn Invalidate>) -> Self {
        Self {
            timeout,
            invalidator,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reload_lock: Arc::new(Mutex::new(())),
            next_token: AtomicU64::new(0),
        }
    }

    /// The quiet period.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a raw change event for `path`. Must run inside a Tokio runtime.
    pub async fn on_change(&self, path: PathBuf) {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(&path) {
            previous.handle.abort();
            debug!("Restart reload timer for {}", path.display());
        } else {
            debug!("Schedule reload for {}", path.display());
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(fire(
            self.timeout,
            self.pending.clone(),
            self.reload_lock.clone(),
            self.invalidator.clone(),
            path.clone(),
            token,
        )
        .instrument(Span::current()));
        pending.insert(path, PendingReload { token, handle });
    }

    /// Invalidate `path` without waiting for a quiet period.
    ///
    /// Waits for any reload already in progress, so manual and debounced
    /// invalidations never overlap.
    pub async fn invalidate_now(&self, path: PathBuf) -> Result<Vec<PathBuf>> {
        let _guard = self.reload_lock.lock().await;
        run_invalidation(self.invalidator.clone(), path).await
    }

    /// Whether `path` has a timer that has not fired yet.
    pub async fn is_pending(&self, path: &Path) -> bool {
        self.pending.lock().await.contains_key(path)
    }

    /// Paths with a timer that has not fired yet.
    pub async fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.lock().await.keys().cloned().collect()
    }

    /// Cancel every pending timer.
    pub async fn cancel_all(&self) {
        for (path, reload) in self.pending.lock().await.drain() {
            reload.handle.abort();
            debug!("Cancelled reload for {}", path.display());
        }
    }
}

async fn fire(
    timeout: Duration,
    pending: Arc<Mutex<HashMap<PathBuf, PendingReload>>>,
    reload_lock: Arc<Mutex<()>>,
    invalidator: Arc<dyn Invalidate>,
    path: PathBuf,
    token: u64,
) {
    tokio::time::sleep(timeout).await;

    {
        let mut pending = pending.lock().await;
        // Superseded by a newer event.
        if pending.get(&path).map(|reload| reload.token) != Some(token) {
            return;
        }
        pending.remove(&path);
    }

    let _guard = reload_lock.lock().await;
    if let Err(e) = run_invalidation(invalidator, path.clone()).await {
        error!("Reload {} error: {e:?}", path.display());
    }
}

/// Reloading reads files and compiles modules, so it runs on the blocking pool.
async fn run_invalidation(
    invalidator: Arc<dyn Invalidate>,
    path: PathBuf,
) -> Result<Vec<PathBuf>> {
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(|| invalidator.invalidate(&path))).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HotReloadError;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<(PathBuf, Instant)>>,
        fail: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<(PathBuf, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Invalidate for Recorder {
        fn invalidate(&self, path: &Path) -> Result<Vec<PathBuf>> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_path_buf(), Instant::now()));
            if self.fail {
                return Err(HotReloadError::compile(path, "reload failed"));
            }
            Ok(vec![path.to_path_buf()])
        }
    }

    fn debouncer(timeout_ms: u64, fail: bool) -> (Debouncer, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            fail,
            ..Default::default()
        });
        let debouncer = Debouncer::new(Duration::from_millis(timeout_ms), recorder.clone());
        (debouncer, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_change_fires_after_timeout() {
        let (debouncer, recorder) = debouncer(2000, false);
        let start = Instant::now();

        debouncer.on_change(PathBuf::from("/app/a.json")).await;
        assert!(debouncer.is_pending(Path::new("/app/a.json")).await);

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(recorder.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        let elapsed = calls[0].1 - start;
        assert!(elapsed >= Duration::from_millis(2000) && elapsed <= Duration::from_millis(2001));
        assert!(!debouncer.is_pending(Path::new("/app/a.json")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_reload_after_last_event() {
        let (debouncer, recorder) = debouncer(100, false);
        let path = PathBuf::from("/app/a.json");

        for i in 0..5 {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            debouncer.on_change(path.clone()).await;
        }
        let last_change = Instant::now();

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(recorder.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, path);
        let elapsed = calls[0].1 - last_change;
        assert!(elapsed >= Duration::from_millis(100) && elapsed <= Duration::from_millis(101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_are_debounced_independently() {
        let (debouncer, recorder) = debouncer(100, false);

        debouncer.on_change(PathBuf::from("/app/a.json")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.on_change(PathBuf::from("/app/b.json")).await;
        assert_eq!(debouncer.pending_paths().await.len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let paths: Vec<_> = recorder.calls().into_iter().map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/app/a.json"), PathBuf::from("/app/b.json")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (debouncer, recorder) = debouncer(100, false);

        debouncer.on_change(PathBuf::from("/app/a.json")).await;
        debouncer.cancel_all().await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(recorder.calls().is_empty());
        assert!(debouncer.pending_paths().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_failed_reload_is_logged_and_later_changes_still_reload() {
        let (debouncer, recorder) = debouncer(100, true);
        let path = PathBuf::from("/app/a.json");

        debouncer.on_change(path.clone()).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        debouncer.on_change(path.clone()).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(recorder.calls().len(), 2);
        assert!(logs_contain("Reload /app/a.json error"));
    }

    /// Sleeps inside every invalidation and records how many overlapped.
    #[derive(Default)]
    struct SlowInvalidator {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        done: AtomicUsize,
    }

    impl Invalidate for SlowInvalidator {
        fn invalidate(&self, path: &Path) -> Result<Vec<PathBuf>> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(vec![path.to_path_buf()])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_manual_invalidation_waits_for_debounced_reload() {
        let invalidator = Arc::new(SlowInvalidator::default());
        let debouncer = Debouncer::new(Duration::ZERO, invalidator.clone());

        debouncer.on_change(PathBuf::from("/app/a.json")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let reloaded = debouncer
            .invalidate_now(PathBuf::from("/app/b.json"))
            .await
            .unwrap();

        assert_eq!(reloaded, vec![PathBuf::from("/app/b.json")]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(invalidator.done.load(Ordering::SeqCst), 2);
        assert_eq!(invalidator.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
