//! Log watching, parsing and session routing.

pub mod file_watcher;
pub mod history;
pub mod log_parser;
pub mod position_store;
pub mod record;
pub mod session_tracker;

pub use file_watcher::{classify, FileWatcher, WatchEvent};
pub use history::LogProcessor;
pub use position_store::PositionStore;
