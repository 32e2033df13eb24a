//! Persistent, line-oriented log of control channel traffic.
//!
//! Unlike `tracing` output this is meant to be kept next to the captured
//! images as a record of exactly what was exchanged with the telescope.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

/// Origin of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[allow(missing_docs)]
pub enum Direction {
    #[display("SYSTEM")]
    System,
    #[display("SEND")]
    Send,
    #[display("RECV")]
    Recv,
    #[display("PING")]
    Ping,
    #[display("PONG")]
    Pong,
    #[display("ERROR")]
    Error,
}

/// `yyyyMMdd_HHmmss`, used in file and directory names.
pub(crate) fn file_timestamp(now: OffsetDateTime) -> String {
    now.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default()
}

fn line_timestamp(now: OffsetDateTime) -> String {
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ))
    .unwrap_or_default()
}

/// Session log sink.
///
/// A disabled journal silently discards everything.
#[derive(derive_more::Debug, Default)]
pub struct Journal {
    #[debug(skip)]
    sink: Option<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
}

impl Journal {
    /// Journal that writes nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open `websocket_log_<timestamp>.txt` in `dir`, creating the directory
    /// if needed.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "websocket_log_{}.txt",
            file_timestamp(OffsetDateTime::now_utc())
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "Session journal opened");

        let mut journal = Self::from_writer(file);
        journal.path = Some(path);
        Ok(journal)
    }

    /// Journal into an arbitrary writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        let mut journal = Self {
            sink: Some(Box::new(writer)),
            path: None,
        };
        journal.record(Direction::System, "=== WebSocket Logging Started ===");
        journal
    }

    /// File backing this journal, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether entries are being written anywhere.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Append one timestamped entry.
    ///
    /// A write failure disables the journal rather than interrupting the
    /// session.
    pub fn record(&mut self, direction: Direction, message: impl Display) {
        let Some(sink) = &mut self.sink else {
            return;
        };
        let line = format!(
            "[{}] {direction}: {message}",
            line_timestamp(OffsetDateTime::now_utc())
        );
        if let Err(err) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
            tracing::warn!(%err, "Session journal write failed, disabling it");
            self.sink = None;
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.record(Direction::System, "=== WebSocket Logging Ended ===");
    }
}
