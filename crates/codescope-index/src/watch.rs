//! Filesystem watching with debounced batches.
//!
//! Raw notify events are reduced to root-relative paths and fed into
//! [`debounce_loop`], which collects them for a fixed window starting at the
//! first event and then hands the whole batch to a handler. Batches are
//! handled one at a time; events that arrive while a batch is being handled
//! start the next window.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use codescope_core::CodescopeError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codemap::CODEMAP_FILE_NAME;

/// Collect paths from `rx` into batches and pass each batch to `handler`.
///
/// Returns when `stop` fires (or its sender is dropped) or when `rx` closes.
/// Paths already received at that point are flushed as a final batch.
pub async fn debounce_loop<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    mut stop: oneshot::Receiver<()>,
    window: Duration,
    mut handler: F,
) where
    F: FnMut(BTreeSet<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut running = true;

    while running {
        tokio::select! {
            biased;
            _ = &mut stop => running = false,
            received = rx.recv() => match received {
                Some(path) => {
                    pending.insert(path);
                }
                None => running = false,
            },
        }
        if !running {
            break;
        }

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    running = false;
                    break;
                }
                _ = &mut deadline => break,
                received = rx.recv() => match received {
                    Some(path) => {
                        pending.insert(path);
                    }
                    None => {
                        running = false;
                        break;
                    }
                },
            }
        }

        if running {
            debug!(paths = pending.len(), "flushing debounced batch");
            handler(std::mem::take(&mut pending)).await;
        }
    }

    while let Ok(path) = rx.try_recv() {
        pending.insert(path);
    }
    if !pending.is_empty() {
        debug!(paths = pending.len(), "flushing final batch");
        handler(pending).await;
    }
}

/// A running watcher. Dropping it stops event delivery; [`WatchHandle::stop`]
/// also waits for the in-flight batch to finish.
pub struct WatchHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    watcher: RecommendedWatcher,
}

impl WatchHandle {
    /// Stop watching, flush pending paths, and wait for the loop to exit.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] if the debounce task panicked.
    pub async fn stop(self) -> Result<(), CodescopeError> {
        let Self {
            stop_tx,
            task,
            watcher,
        } = self;
        drop(watcher);
        let _ = stop_tx.send(());
        task.await.map_err(|e| CodescopeError::Io(std::io::Error::other(e)))?;
        info!("stopped watching");
        Ok(())
    }
}

/// Watch `root` recursively and call `handler` with debounced batches of
/// root-relative paths.
///
/// Hidden entries (including the data directory) and the codemap are
/// ignored, so writes made by indexing never trigger another batch.
///
/// # Errors
///
/// Returns [`CodescopeError::Io`] if the root cannot be resolved or the
/// platform watcher cannot be started.
pub fn spawn_watcher<F, Fut>(
    root: &Path,
    window: Duration,
    handler: F,
) -> Result<WatchHandle, CodescopeError>
where
    F: FnMut(BTreeSet<PathBuf>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let root = std::fs::canonicalize(root)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let event_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in event.paths {
                if let Some(relative) = relevant_path(&event_root, &path) {
                    let _ = tx.send(relative);
                }
            }
        }
        Err(e) => warn!(error = %e, "watcher error"),
    })
    .map_err(notify_error)?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(notify_error)?;
    info!(root = %root.display(), window_ms = window.as_millis() as u64, "watching for changes");

    let task = tokio::spawn(debounce_loop(rx, stop_rx, window, handler));
    Ok(WatchHandle {
        stop_tx,
        task,
        watcher,
    })
}

/// Root-relative form of `path`, or `None` if it should not trigger indexing.
fn relevant_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    let first = relative.components().next()?;
    if first.as_os_str().to_string_lossy().starts_with('.') {
        return None;
    }
    if relative == Path::new(CODEMAP_FILE_NAME) {
        return None;
    }
    Some(relative.to_path_buf())
}

fn notify_error(e: notify::Error) -> CodescopeError {
    CodescopeError::Io(std::io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Batches = Arc<Mutex<Vec<BTreeSet<PathBuf>>>>;

    fn recorder() -> (Batches, impl FnMut(BTreeSet<PathBuf>) -> std::future::Ready<()>) {
        let batches: Batches = Arc::default();
        let sink = batches.clone();
        let handler = move |batch| {
            sink.lock().unwrap().push(batch);
            std::future::ready(())
        };
        (batches, handler)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_batch() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (batches, handler) = recorder();
        let task = tokio::spawn(debounce_loop(rx, stop_rx, Duration::from_millis(500), handler));

        for i in 0..20 {
            tx.send(PathBuf::from(format!("src/f{}.rs", i % 5))).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        {
            let seen = batches.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].len(), 5);
        }

        stop_tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(batches.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_events_start_a_new_window() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (batches, handler) = recorder();
        let task = tokio::spawn(debounce_loop(rx, stop_rx, Duration::from_millis(100), handler));

        tx.send(PathBuf::from("a.rs")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(PathBuf::from("b.rs")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        stop_tx.send(()).unwrap();
        task.await.unwrap();
        let seen = batches.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains(Path::new("a.rs")));
        assert!(seen[1].contains(Path::new("b.rs")));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flushes_pending_paths() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (batches, handler) = recorder();
        let task = tokio::spawn(debounce_loop(rx, stop_rx, Duration::from_secs(60), handler));

        tx.send(PathBuf::from("late.rs")).unwrap();
        stop_tx.send(()).unwrap();
        task.await.unwrap();

        let seen = batches.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains(Path::new("late.rs")));
    }

    #[test]
    fn hidden_entries_and_codemap_are_ignored() {
        let root = Path::new("/repo");
        assert_eq!(
            relevant_path(root, Path::new("/repo/src/lib.rs")),
            Some(PathBuf::from("src/lib.rs"))
        );
        assert!(relevant_path(root, Path::new("/repo/.codescope/index.db")).is_none());
        assert!(relevant_path(root, Path::new("/repo/.git/HEAD")).is_none());
        assert!(relevant_path(root, Path::new("/repo/codescope.codemap.json")).is_none());
        assert!(relevant_path(root, Path::new("/elsewhere/a.rs")).is_none());
    }
}
