//! Paths and timings shared by every component.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default logging directory, relative to the working directory.
pub const DEFAULT_DIR: &str = ".logging";

/// Default debounce window for filesystem notifications.
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

const LOG_FILE: &str = "log.jsonl";
const STATE_FILE: &str = ".state.json";
const SESSIONS_DIR: &str = "sessions";

/// Locations of the watched log, the state file and the session folders.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telemetry stream written by the external tool.
    pub log_path: PathBuf,
    /// Persisted watcher state.
    pub state_path: PathBuf,
    /// Parent of all session folders.
    pub sessions_dir: PathBuf,
    pub debounce: Duration,
}

impl Config {
    /// Build a config rooted at `dir` using the standard file names.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            log_path: dir.join(LOG_FILE),
            state_path: dir.join(STATE_FILE),
            sessions_dir: dir.join(SESSIONS_DIR),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Directory holding the log file, which is what gets watched.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_path
            .parent()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_DIR)
    }
}
