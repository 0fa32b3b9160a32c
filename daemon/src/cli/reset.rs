//! Start a fresh session by emptying the log and the watcher state.

use std::fs;

use tracing::info;

use crate::config::Config;
use crate::error::Error;
use crate::watcher::PositionStore;

/// Run the reset command.
pub fn run(config: &Config) -> Result<(), Error> {
    if let Some(dir) = config.log_dir() {
        fs::create_dir_all(dir)?;
    }

    fs::write(&config.log_path, "")?;
    PositionStore::new(&config.state_path).reset()?;

    info!(log = %config.log_path.display(), "Reset log and watcher state");
    println!("Log and state reset. The next watch starts a new session.");
    Ok(())
}
