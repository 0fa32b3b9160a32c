//! Debounced change notifications for the log directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::Error;

/// What a settled batch of notifications means for the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The log was written to or (re)created.
    Changed,
    /// The log is gone.
    Removed,
}

/// Watches a single directory, non-recursively, and yields batches of
/// changed paths once they settle for the debounce window.
pub struct FileWatcher {
    // Dropping the debouncer stops the watch.
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<Vec<PathBuf>>,
}

impl FileWatcher {
    pub fn new(dir: &Path, debounce: Duration) -> Result<Self, Error> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    debug!(count = paths.len(), "Filesystem events settled");
                    if tx.send(paths).is_err() {
                        debug!("Watcher receiver dropped");
                    }
                }
                Err(e) => {
                    error!(error = %e, "File watcher error");
                }
            },
        )?;

        debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
        })
    }

    /// Wait for the next settled batch. `None` once the watcher has stopped.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        self.rx.recv().await
    }
}

/// Interpret a batch for `log_path`. Batches that do not mention the log are
/// ignored. Deletion is decided by whether the file exists once the batch has
/// settled, so a delete followed by a rewrite inside one window counts as a
/// change.
pub fn classify(batch: &[PathBuf], log_path: &Path) -> Option<WatchEvent> {
    let name = log_path.file_name()?;
    if !batch.iter().any(|p| p.file_name() == Some(name)) {
        return None;
    }
    if log_path.exists() {
        Some(WatchEvent::Changed)
    } else {
        Some(WatchEvent::Removed)
    }
}
