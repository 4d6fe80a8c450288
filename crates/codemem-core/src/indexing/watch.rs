//! Watch mode (§4.3): a file-system change stream drives the same per-file
//! indexing pipeline, debounced so a burst of writes to one file collapses
//! into a single re-index. No `notify-debouncer`-style crate is in the
//! dependency stack, so the coalescing window is hand-rolled here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Default coalescing window: writes to the same path within this interval
/// collapse into one notification.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A debounced, coalesced file change ready for re-indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncedChange {
    pub path: PathBuf,
}

/// Watches `root` for file-system events and emits debounced changes on
/// `tx`. Runs until the channel's receiver is dropped; cooperative shutdown
/// means an in-progress file (handled by the consumer, not this watcher)
/// completes before termination.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `root`. Raw events are coalesced using `debounce` and
    /// forwarded to `tx`.
    pub fn start(root: &std::path::Path, debounce: Duration, tx: mpsc::UnboundedSender<DebouncedChange>) -> crate::Result<Self> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    for path in event.paths {
                        let _ = raw_tx.send(path);
                    }
                }
            }
        })
        .map_err(|e| crate::Error::Storage(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        tokio::spawn(async move {
            let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
            let mut interval = tokio::time::interval(debounce / 2 + Duration::from_millis(1));

            loop {
                tokio::select! {
                    maybe_path = raw_rx.recv() => {
                        match maybe_path {
                            Some(path) => { pending.insert(path, Instant::now()); }
                            None => break,
                        }
                    }
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let ready: Vec<PathBuf> = pending
                            .iter()
                            .filter(|(_, last_seen)| now.duration_since(**last_seen) >= debounce)
                            .map(|(path, _)| path.clone())
                            .collect();
                        for path in ready {
                            pending.remove(&path);
                            if tx.send(DebouncedChange { path }).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watcher_emits_debounced_change_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("watched.rs");
        tokio::fs::write(&file_path, "fn a() {}").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = DirectoryWatcher::start(dir.path(), Duration::from_millis(50), tx).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(&file_path, "fn a() { }").await.unwrap();

        let change = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(change.is_ok(), "expected a debounced change within timeout");
    }
}
