// SPDX-License-Identifier: Apache-2.0 OR MIT
// Append-only spill file for events that could not be buffered

use super::LogEvent;
use chrono::{SecondsFormat, TimeZone, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverflowError {
    #[error("failed to open overflow file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write overflow file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes one line per spilled event, flushing after every line
///
/// The file is opened lazily on first use, so a pipeline whose policy never
/// spills never touches the filesystem.
pub struct OverflowWriter {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl OverflowWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the event as a single line
    pub fn write(&self, event: &LogEvent) -> Result<(), OverflowError> {
        let line = format_overflow_line(event);
        let mut slot = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let writer = match slot.as_mut() {
            Some(writer) => writer,
            None => slot.insert(self.open()?),
        };

        let result = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush());

        result.map_err(|source| {
            // Reopen on the next attempt rather than reuse a broken handle
            *slot = None;
            OverflowError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Flush and release the file handle (reopened on the next write)
    pub fn close(&self) {
        let mut slot = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut writer) = slot.take() {
            let _ = writer.flush();
        }
    }

    fn open(&self) -> Result<BufWriter<File>, OverflowError> {
        let to_open_error = |source| OverflowError::Open {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(to_open_error)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(to_open_error)?;
        Ok(BufWriter::new(file))
    }
}

impl std::fmt::Debug for OverflowWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowWriter")
            .field("path", &self.path)
            .finish()
    }
}

/// `<ISO-8601 timestamp> [<LEVEL>] <thread> <logger> - <message>\n`
///
/// Timestamps are rendered in UTC with millisecond precision so the line is
/// identical regardless of the host's time zone.
pub fn format_overflow_line(event: &LogEvent) -> String {
    let timestamp = Utc
        .timestamp_millis_opt(event.timestamp_millis())
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    format!(
        "{} [{}] {} {} - {}\n",
        timestamp,
        event.level(),
        event.thread_name(),
        event.logger_name(),
        event.message()
    )
}
