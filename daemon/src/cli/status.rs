//! Show watcher status for a logging directory.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::Error;
use crate::watcher::PositionStore;

/// Exit codes for status command.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const NOT_INITIALIZED: i32 = 1;
}

/// Run the status command.
pub fn run(config: &Config) -> Result<i32, Error> {
    println!("telesplit status");

    let Some(dir) = config.log_dir().filter(|d| d.is_dir()) else {
        println!("  Log: {} (directory missing)", config.log_path.display());
        println!();
        println!("Run 'telesplit reset' to create it.");
        return Ok(exit_code::NOT_INITIALIZED);
    };
    println!("  Directory: {}", dir.display());

    match fs::metadata(&config.log_path) {
        Ok(meta) => println!(
            "  Log: {} ({} bytes)",
            config.log_path.display(),
            meta.len()
        ),
        Err(_) => println!("  Log: {} (missing)", config.log_path.display()),
    }

    let store = PositionStore::new(&config.state_path);
    let state = store.load();
    println!("  State: {}", store.path().display());
    println!("  Processed: {} records", state.processed_count);
    println!(
        "  Session: {}",
        state.current_sid.as_deref().unwrap_or("(none)")
    );
    if let Some(folder) = &state.session_folder {
        println!("  Folder: {}", folder.display());
    }
    println!(
        "  Session folders: {}",
        count_session_folders(&config.sessions_dir)
    );

    Ok(exit_code::OK)
}

fn count_session_folders(sessions_dir: &Path) -> usize {
    fs::read_dir(sessions_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}
