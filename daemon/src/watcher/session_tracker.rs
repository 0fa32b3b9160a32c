//! Session folder routing and per-kind log appends.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::position_store::WatchState;
use super::record::{EventPayload, TelemetryEvent};
use crate::error::Error;

const SEPARATOR: &str = "---";

/// The three logs inside a session folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLog {
    Prompts,
    Responses,
    Tools,
}

impl SessionLog {
    pub fn file_name(self) -> &'static str {
        match self {
            SessionLog::Prompts => "prompts.log",
            SessionLog::Responses => "responses.log",
            SessionLog::Tools => "tools.log",
        }
    }
}

/// Tracks the open session folder and appends event blocks to it.
#[derive(Debug)]
pub struct SessionTracker {
    sessions_dir: PathBuf,
    current_sid: Option<String>,
    folder: Option<PathBuf>,
    opened: usize,
}

impl SessionTracker {
    /// Resume from the session pointer stored in `state`.
    pub fn from_state(sessions_dir: impl Into<PathBuf>, state: &WatchState) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            current_sid: state.current_sid.clone(),
            folder: state.session_folder.clone(),
            opened: 0,
        }
    }

    pub fn current_sid(&self) -> Option<&str> {
        self.current_sid.as_deref()
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Folders created since this tracker was built.
    pub fn opened(&self) -> usize {
        self.opened
    }

    /// Write the session pointer back into `state`.
    pub fn store_into(&self, state: &mut WatchState) {
        state.current_sid = self.current_sid.clone();
        state.session_folder = self.folder.clone();
    }

    /// Route one event, opening a new folder when the session changes.
    /// Returns the log written to, or `None` for kinds that are not kept.
    pub fn route(&mut self, event: &TelemetryEvent) -> Result<Option<SessionLog>, Error> {
        let folder = self.ensure_folder(event)?;

        let stamp = event.stamp();
        let sid = &event.session_id;
        let (log, header, body) = match &event.payload {
            EventPayload::UserPrompt { prompt } => (
                SessionLog::Prompts,
                format!("[{stamp}] session={sid}"),
                prompt.clone(),
            ),
            EventPayload::ApiResponse {
                model,
                input_tokens,
                output_tokens,
                response_text,
            } => (
                SessionLog::Responses,
                format!(
                    "[{stamp}] session={sid} model={model} tokens(in={},out={})",
                    blank_if_none(input_tokens),
                    blank_if_none(output_tokens),
                ),
                response_text.clone(),
            ),
            EventPayload::ToolCall {
                function_name,
                args,
                success,
                duration_ms,
            } => (
                SessionLog::Tools,
                format!(
                    "[{stamp}] session={sid} tool={function_name} success={} duration_ms={}",
                    blank_if_none(success),
                    blank_if_none(duration_ms),
                ),
                format!("args={args}"),
            ),
            EventPayload::Other => return Ok(None),
        };

        append_block(&folder.join(log.file_name()), &header, &body)?;
        Ok(Some(log))
    }

    fn ensure_folder(&mut self, event: &TelemetryEvent) -> Result<PathBuf, Error> {
        if let (Some(sid), Some(folder)) = (&self.current_sid, &self.folder) {
            if *sid == event.session_id {
                return Ok(folder.clone());
            }
        }

        let folder = create_session_folder(&self.sessions_dir, &event.stamp())?;
        info!(
            session = %event.session_id,
            folder = %folder.display(),
            "Opened session folder"
        );
        self.current_sid = Some(event.session_id.clone());
        self.folder = Some(folder.clone());
        self.opened += 1;
        Ok(folder)
    }
}

/// Create `<base>/<stamp>`, or `<base>/<stamp>__<n>` with the first free
/// `n` starting at 1.
pub fn create_session_folder(base: &Path, stamp: &str) -> Result<PathBuf, Error> {
    fs::create_dir_all(base)?;

    let mut suffix = 0usize;
    loop {
        let name = if suffix == 0 {
            stamp.to_string()
        } else {
            format!("{stamp}__{suffix}")
        };
        let candidate = base.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Absent fields render as nothing rather than a made-up default.
fn blank_if_none<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn append_block(path: &Path, header: &str, body: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let body = body.trim_end();
    let mut block = String::with_capacity(header.len() + body.len() + SEPARATOR.len() + 3);
    block.push_str(header);
    block.push('\n');
    block.push_str(body);
    block.push('\n');
    block.push_str(SEPARATOR);
    block.push('\n');

    file.write_all(block.as_bytes())?;
    Ok(())
}
