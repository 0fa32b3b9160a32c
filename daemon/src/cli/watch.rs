//! Watch the telemetry log and route new records as they arrive.

use std::fs;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::watcher::{classify, FileWatcher, LogProcessor, WatchEvent};

/// Catch up on the log, then process every settled change until the process
/// is stopped.
pub async fn run(config: &Config) -> Result<(), Error> {
    let processor = LogProcessor::new(config);

    let state = processor.store().load();
    info!(
        processed = state.processed_count,
        session = state.current_sid.as_deref().unwrap_or("-"),
        "Loaded watcher state"
    );
    let (mut state, stats) = processor.process(state)?;
    debug!(?stats, "Catch-up pass finished");

    let dir = config
        .log_dir()
        .ok_or_else(|| Error::InvalidDir(config.log_path.clone()))?;
    fs::create_dir_all(dir)?;
    let mut watcher = FileWatcher::new(dir, config.debounce)?;
    info!(
        dir = %dir.display(),
        debounce_ms = config.debounce.as_millis() as u64,
        "Watching for telemetry"
    );

    loop {
        let batch = tokio::select! {
            batch = watcher.next_batch() => batch,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watcher");
                return Ok(());
            }
        };
        let Some(batch) = batch else {
            warn!("File watcher stopped");
            return Ok(());
        };

        match classify(&batch, &config.log_path) {
            Some(WatchEvent::Changed) => {
                let (next, stats) = processor.process(state)?;
                if !stats.end.is_complete() {
                    debug!("Pass stopped early, waiting for the next change");
                }
                state = next;
            }
            Some(WatchEvent::Removed) => {
                info!(path = %config.log_path.display(), "Log removed, waiting for it to reappear");
                state = processor.store().reset()?;
            }
            None => {
                debug!(count = batch.len(), "Ignoring unrelated changes");
            }
        }
    }
}
