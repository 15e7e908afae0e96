//! Human-readable activity log.
//!
//! Every entry is one line, `[YYYY-MM-DD HH:MM:SS] message`, in local time.
//! The file is opened in append mode so runs accumulate; entries can also
//! be mirrored to stdout.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ActivityLog<W: Write> {
    writer: W,
    mirror_stdout: bool,
}

impl ActivityLog<File> {
    /// Open (or create) a log file for appending.
    pub fn open<P: AsRef<Path>>(path: P, mirror_stdout: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {:?}", parent))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open activity log {:?}", path))?;
        Ok(Self::new(file, mirror_stdout))
    }
}

impl<W: Write> ActivityLog<W> {
    pub fn new(writer: W, mirror_stdout: bool) -> Self {
        Self {
            writer,
            mirror_stdout,
        }
    }

    /// Append one timestamped entry.
    ///
    /// A write failure is reported through tracing and otherwise ignored;
    /// losing a log line never aborts a run.
    pub fn record(&mut self, message: impl AsRef<str>) {
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let line = format_entry(&stamp, message.as_ref());
        if let Err(e) = self.writer.write_all(line.as_bytes()) {
            warn!("Failed to write activity log: {}", e);
        }
        if self.mirror_stdout {
            print!("{}", line);
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn format_entry(timestamp: &str, message: &str) -> String {
    // Tool output can span lines; keep one entry per line.
    let flat = message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{}] {}\n", timestamp, flat)
}
