//! Incremental processing of the telemetry log.
//!
//! Each pass re-parses the whole log, skips the records already routed and
//! routes the rest. The record count persisted in [`WatchState`] is the only
//! resume point, so a pass interrupted before saving is simply repeated.

use std::fs;
use std::io;

use tracing::{debug, error, info, warn};

use super::log_parser::{LogParser, StreamEnd};
use super::position_store::{PositionStore, WatchState};
use super::session_tracker::SessionTracker;
use crate::config::Config;
use crate::error::Error;

/// Counters for a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    /// Records seen for the first time.
    pub new_records: usize,
    /// New records written to a session log.
    pub routed: usize,
    /// New records of kinds that are not kept.
    pub dropped: usize,
    pub folders_opened: usize,
    /// The log shrank since the previous pass.
    pub truncated: bool,
    pub end: StreamEnd,
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self {
            new_records: 0,
            routed: 0,
            dropped: 0,
            folders_opened: 0,
            truncated: false,
            end: StreamEnd::Complete,
        }
    }
}

/// Routes new log records into session folders.
#[derive(Debug, Clone)]
pub struct LogProcessor {
    config: Config,
    store: PositionStore,
    parser: LogParser,
}

impl LogProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            store: PositionStore::new(&config.state_path),
            parser: LogParser::new(),
        }
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Run one pass starting from `state` and return the updated state.
    ///
    /// State is saved only when new records were processed. Parse stops are
    /// reported in the stats; write failures are returned as errors.
    pub fn process(&self, state: WatchState) -> Result<(WatchState, ProcessingStats), Error> {
        let bytes = match fs::read(&self.config.log_path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.config.log_path.display(), "Log file missing, nothing to do");
                return Ok((state, ProcessingStats::default()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = bytes.len() as u64;

        let mut state = state;
        let mut stats = ProcessingStats::default();
        if size < state.last_size {
            info!(
                previous = state.last_size,
                current = size,
                "Log truncated, starting a new session"
            );
            state.processed_count = 0;
            state.current_sid = None;
            state.session_folder = None;
            stats.truncated = true;
        }

        let parsed = self.parser.parse(&bytes);
        let mut tracker = SessionTracker::from_state(&self.config.sessions_dir, &state);

        for (position, record) in (1..).zip(parsed.records.iter()) {
            if position <= state.processed_count {
                continue;
            }
            stats.new_records += 1;
            let event = record.to_event();
            match tracker.route(&event)? {
                Some(log) => {
                    debug!(position, event = %event.name, log = log.file_name(), "Routed record");
                    stats.routed += 1;
                }
                None => {
                    debug!(position, event = %event.name, "Dropped record");
                    stats.dropped += 1;
                }
            }
        }

        match &parsed.end {
            StreamEnd::Complete => {}
            StreamEnd::Incomplete { offset, message } => {
                warn!(offset, error = %message, "Log ends mid-record, will retry on next change");
            }
            StreamEnd::Malformed { offset, message } => {
                error!(offset, error = %message, "Malformed record in log, processing stalled");
            }
        }

        // Only truncation lowers the count; a rewrite that parses fewer records
        // must not make already-routed ones look new.
        state.processed_count = state.processed_count.max(parsed.records.len());
        state.last_size = size;
        tracker.store_into(&mut state);
        stats.folders_opened = tracker.opened();
        stats.end = parsed.end;

        if stats.new_records > 0 {
            self.store.save(&state)?;
            info!(
                new = stats.new_records,
                routed = stats.routed,
                dropped = stats.dropped,
                folders = stats.folders_opened,
                truncated = stats.truncated,
                total = state.processed_count,
                session = tracker.current_sid().unwrap_or("-"),
                folder = ?tracker.folder(),
                "Processed telemetry records"
            );
        }

        Ok((state, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn prompt(sid: &str, ts: &str, text: &str) -> String {
        format!(
            "{{\n  \"attributes\": {{\n    \"event.name\": \"gemini_cli.user_prompt\",\n    \"event.timestamp\": \"{ts}\",\n    \"session.id\": \"{sid}\",\n    \"prompt\": \"{text}\"\n  }}\n}}"
        )
    }

    fn other(sid: &str, ts: &str) -> String {
        format!(
            "{{\n  \"attributes\": {{\n    \"event.name\": \"gemini_cli.config\",\n    \"event.timestamp\": \"{ts}\",\n    \"session.id\": \"{sid}\"\n  }}\n}}"
        )
    }

    fn setup() -> (TempDir, Config, LogProcessor) {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path());
        let processor = LogProcessor::new(&config);
        (dir, config, processor)
    }

    fn write_log(config: &Config, records: &[String]) {
        fs::write(&config.log_path, records.concat()).unwrap();
    }

    fn session_folders(config: &Config) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&config.sessions_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn missing_log_is_noop() {
        let (_dir, config, processor) = setup();
        let (state, stats) = processor.process(WatchState::default()).unwrap();
        assert_eq!(state, WatchState::default());
        assert_eq!(stats.new_records, 0);
        assert!(!config.state_path.exists());
    }

    #[test]
    fn empty_log_leaves_state_unchanged() {
        let (_dir, config, processor) = setup();
        fs::write(&config.log_path, "").unwrap();
        let (state, _) = processor.process(WatchState::default()).unwrap();
        assert_eq!(state, WatchState::default());
        assert!(session_folders(&config).is_empty());
        assert!(!config.state_path.exists());
    }

    #[test]
    fn single_prompt_scenario() {
        let (_dir, config, processor) = setup();
        write_log(&config, &[prompt("s1", "2024-01-01T00:00:00Z", "hello")]);

        let (state, stats) = processor.process(WatchState::default()).unwrap();
        assert_eq!(stats.routed, 1);
        assert_eq!(state.processed_count, 1);
        assert_eq!(state.current_sid.as_deref(), Some("s1"));

        let log = config
            .sessions_dir
            .join("2024-01-01_00-00-00")
            .join("prompts.log");
        assert!(read(&log).starts_with("[2024-01-01_00-00-00] session=s1\nhello\n"));
        assert_eq!(processor.store().load(), state);
    }

    #[test]
    fn second_pass_is_idempotent() {
        let (_dir, config, processor) = setup();
        write_log(
            &config,
            &[
                prompt("s1", "2024-01-01T00:00:00Z", "one"),
                prompt("s1", "2024-01-01T00:00:01Z", "two"),
            ],
        );
        let (state, _) = processor.process(WatchState::default()).unwrap();
        let log = config
            .sessions_dir
            .join("2024-01-01_00-00-00")
            .join("prompts.log");
        let before = read(&log);

        let (again, stats) = processor.process(state.clone()).unwrap();
        assert_eq!(again, state);
        assert_eq!(stats.new_records, 0);
        assert_eq!(read(&log), before);
        assert_eq!(session_folders(&config).len(), 1);
    }

    #[test]
    fn resumes_from_persisted_state() {
        let (_dir, config, processor) = setup();
        let first = prompt("s1", "2024-01-01T00:00:00Z", "one");
        write_log(&config, &[first.clone()]);
        processor.process(WatchState::default()).unwrap();

        write_log(&config, &[first, prompt("s1", "2024-01-01T00:00:09Z", "two")]);
        let reloaded = LogProcessor::new(&config);
        let (state, stats) = reloaded.process(reloaded.store().load()).unwrap();
        assert_eq!(stats.new_records, 1);
        assert_eq!(state.processed_count, 2);

        let content = read(
            &config
                .sessions_dir
                .join("2024-01-01_00-00-00")
                .join("prompts.log"),
        );
        assert_eq!(content.matches("session=s1").count(), 2);
        assert_eq!(session_folders(&config).len(), 1);
    }

    #[test]
    fn truncation_opens_new_folder_for_same_session() {
        let (_dir, config, processor) = setup();
        write_log(
            &config,
            &[
                prompt("s1", "2024-01-01T00:00:00Z", "a long first prompt"),
                prompt("s1", "2024-01-01T00:00:01Z", "second"),
            ],
        );
        let (state, _) = processor.process(WatchState::default()).unwrap();

        write_log(&config, &[prompt("s1", "2024-01-01T00:00:00Z", "x")]);
        let (state, stats) = processor.process(state).unwrap();
        assert!(stats.truncated);
        assert_eq!(stats.folders_opened, 1);
        assert_eq!(state.processed_count, 1);
        assert_eq!(
            session_folders(&config),
            vec!["2024-01-01_00-00-00", "2024-01-01_00-00-00__1"]
        );
        assert!(read(
            &config
                .sessions_dir
                .join("2024-01-01_00-00-00__1")
                .join("prompts.log")
        )
        .contains("\nx\n"));
    }

    #[test]
    fn session_change_splits_folders() {
        let (_dir, config, processor) = setup();
        write_log(
            &config,
            &[
                prompt("s1", "2024-01-01T00:00:00Z", "a"),
                prompt("s2", "2024-01-01T00:01:00Z", "b"),
                prompt("s2", "2024-01-01T00:02:00Z", "c"),
            ],
        );
        let (state, stats) = processor.process(WatchState::default()).unwrap();
        assert_eq!(stats.folders_opened, 2);
        assert_eq!(state.current_sid.as_deref(), Some("s2"));
        assert_eq!(
            session_folders(&config),
            vec!["2024-01-01_00-00-00", "2024-01-01_00-01-00"]
        );
        let second = read(
            &config
                .sessions_dir
                .join("2024-01-01_00-01-00")
                .join("prompts.log"),
        );
        assert_eq!(second.matches("session=s2").count(), 2);
    }

    #[test]
    fn same_second_sessions_get_suffix() {
        let (_dir, config, processor) = setup();
        write_log(
            &config,
            &[
                prompt("s1", "2024-01-01T00:00:00Z", "a"),
                prompt("s2", "2024-01-01T00:00:00Z", "b"),
            ],
        );
        processor.process(WatchState::default()).unwrap();
        assert_eq!(
            session_folders(&config),
            vec!["2024-01-01_00-00-00", "2024-01-01_00-00-00__1"]
        );
    }

    #[test]
    fn unknown_kind_advances_count_without_output() {
        let (_dir, config, processor) = setup();
        write_log(&config, &[other("s1", "2024-01-01T00:00:00Z")]);
        let (state, stats) = processor.process(WatchState::default()).unwrap();
        assert_eq!(state.processed_count, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.routed, 0);
        let folder = config.sessions_dir.join("2024-01-01_00-00-00");
        assert_eq!(fs::read_dir(folder).unwrap().count(), 0);
        assert!(config.state_path.exists());
    }

    #[test]
    fn incomplete_tail_is_retried() {
        let (_dir, config, processor) = setup();
        let complete = [
            prompt("s1", "2024-01-01T00:00:00Z", "one"),
            prompt("s1", "2024-01-01T00:00:01Z", "two"),
        ];
        let last = prompt("s1", "2024-01-01T00:00:02Z", "three");

        let mut partial = complete.concat();
        partial.push_str(&last[..last.len() / 2]);
        fs::write(&config.log_path, &partial).unwrap();

        let (state, stats) = processor.process(WatchState::default()).unwrap();
        assert!(matches!(stats.end, StreamEnd::Incomplete { .. }));
        assert_eq!(state.processed_count, 2);
        assert_eq!(processor.store().load().processed_count, 2);

        let mut full = complete.concat();
        full.push_str(&last);
        fs::write(&config.log_path, &full).unwrap();

        let (state, stats) = processor.process(state).unwrap();
        assert!(stats.end.is_complete());
        assert_eq!(stats.new_records, 1);
        assert_eq!(state.processed_count, 3);

        let content = read(
            &config
                .sessions_dir
                .join("2024-01-01_00-00-00")
                .join("prompts.log"),
        );
        assert_eq!(content.matches("\none\n").count(), 1);
        assert_eq!(content.matches("\ntwo\n").count(), 1);
        assert_eq!(content.matches("\nthree\n").count(), 1);
    }

    #[test]
    fn in_place_corruption_does_not_rewind_count() {
        let (_dir, config, processor) = setup();
        let records = [
            prompt("s1", "2024-01-01T00:00:00Z", "one"),
            prompt("s1", "2024-01-01T00:00:01Z", "two"),
        ];
        write_log(&config, &records);
        let (state, _) = processor.process(WatchState::default()).unwrap();
        assert_eq!(state.processed_count, 2);

        // Same length, first byte broken: nothing parses.
        let mut broken = records.concat();
        broken.replace_range(0..1, "x");
        fs::write(&config.log_path, &broken).unwrap();
        let (state, stats) = processor.process(state).unwrap();
        assert!(!stats.truncated);
        assert!(matches!(stats.end, StreamEnd::Malformed { .. }));
        assert_eq!(state.processed_count, 2);

        write_log(&config, &records);
        let (state, stats) = processor.process(state).unwrap();
        assert_eq!(stats.new_records, 0);
        assert_eq!(state.processed_count, 2);
        let content = read(
            &config
                .sessions_dir
                .join("2024-01-01_00-00-00")
                .join("prompts.log"),
        );
        assert_eq!(content.matches("\none\n").count(), 1);
        assert_eq!(content.matches("\ntwo\n").count(), 1);
    }

    #[test]
    fn routing_failure_is_fatal() {
        let (_dir, config, processor) = setup();
        fs::write(&config.sessions_dir, "not a directory").unwrap();
        write_log(&config, &[prompt("s1", "2024-01-01T00:00:00Z", "a")]);
        assert!(processor.process(WatchState::default()).is_err());
        assert!(!config.state_path.exists());
    }
}
