//! Append-only `events.jsonl` — the source of truth for one run.

use std::io::Write;
use std::path::{Path, PathBuf};

use wp_domain::{Error, Event, Result};

pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Opens in append mode on every call rather than
    /// holding a long-lived handle, so a crash mid-write leaves at most one
    /// torn line rather than corrupting the whole file.
    pub fn append(&self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{json}")?;
        file.sync_data()?;
        Ok(())
    }

    /// Replay every well-formed line in the log, in order. A torn final line
    /// (partial write from a crash mid-append) is dropped rather than
    /// treated as a fatal error.
    pub fn replay(&self) -> Result<Vec<Event>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::Io(err)),
        };

        let lines: Vec<&str> = content.lines().collect();
        let mut events = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(err) if i == lines.len() - 1 => {
                    tracing::warn!(path = %self.path.display(), %err, "dropping torn final event line");
                }
                Err(err) => return Err(Error::Json(err)),
            }
        }
        Ok(events)
    }
}
