//! Persisted read position and session pointer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;

/// Watcher state carried between passes and across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchState {
    /// Number of records already routed.
    pub processed_count: usize,
    /// Byte length of the log at the last pass.
    pub last_size: u64,
    /// Session id of the open session folder.
    pub current_sid: Option<String>,
    pub session_folder: Option<PathBuf>,
}

/// Reads and writes the state file.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state, falling back to the initial state when the file is
    /// missing or unreadable.
    pub fn load(&self) -> WatchState {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting fresh");
                return WatchState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read state file");
                return WatchState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed state file, starting fresh");
                WatchState::default()
            }
        }
    }

    /// Overwrite the state file. The new content lands in a sibling file
    /// first and is renamed into place.
    pub fn save(&self, state: &WatchState) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            processed = state.processed_count,
            size = state.last_size,
            "Saved watcher state"
        );
        Ok(())
    }

    /// Persist and return the initial state.
    pub fn reset(&self) -> Result<WatchState, Error> {
        let state = WatchState::default();
        self.save(&state)?;
        Ok(state)
    }
}
