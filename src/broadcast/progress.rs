//! Progress sinks for human-readable broadcast status lines.

use std::io::{self, Write};
use std::sync::Mutex;

use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tracing::{debug, warn};

/// Append-only, ordered status log. Never read by the dispatcher.
pub trait ProgressSink: Send + Sync {
    /// Appends a line.
    fn append(&self, line: &str);

    /// Replaces the most recently appended line.
    fn replace_last(&self, line: &str);
}

/// Prints status lines to stdout with a local timestamp.
#[derive(Debug, Default)]
pub struct TerminalSink {
    /// Serializes writes so a replace never interleaves with an append.
    lock: Mutex<()>,
}

impl TerminalSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write_line(out: &mut impl Write, line: &str) -> io::Result<()> {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        writeln!(out, "[{stamp}] {line}")?;
        out.flush()
    }

    fn rewrite_last_line(out: &mut impl Write, line: &str) -> io::Result<()> {
        queue!(out, MoveToPreviousLine(1), Clear(ClearType::CurrentLine))?;
        Self::write_line(out, line)
    }
}

impl ProgressSink for TerminalSink {
    fn append(&self, line: &str) {
        debug!(progress = line);
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = Self::write_line(&mut io::stdout().lock(), line) {
            warn!("Failed to write progress line: {}", e);
        }
    }

    // No debug event here: a log line on the terminal would become the line the cursor moves back to.
    fn replace_last(&self, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = Self::rewrite_last_line(&mut io::stdout().lock(), line) {
            warn!("Failed to rewrite progress line: {}", e);
        }
    }
}

/// Keeps status lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every line currently held.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for MemorySink {
    fn append(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(line.to_owned());
    }

    fn replace_last(&self, line: &str) {
        let mut lines = self
            .lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match lines.last_mut() {
            Some(last) => line.clone_into(last),
            None => lines.push(line.to_owned()),
        }
    }
}
