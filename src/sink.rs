//! Where captured text and user feedback go.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Receives the committed capture result.
pub trait ResultSink {
    fn deliver(&mut self, text: &str) -> Result<()>;
}

impl<T: ResultSink + ?Sized> ResultSink for Box<T> {
    fn deliver(&mut self, text: &str) -> Result<()> {
        (**self).deliver(text)
    }
}

/// A cursor position in a line-based text target. Both fields are zero-based;
/// `ch` counts characters, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.ch)
    }
}

/// A text cursor that can take inserted text.
pub trait InsertionTarget {
    /// Current cursor position.
    fn cursor(&self) -> Position;

    /// Insert `text` at `pos` and return the position just past it.
    fn insert_at(&mut self, pos: Position, text: &str) -> Position;

    fn set_cursor(&mut self, pos: Position);
}

/// Delivers results by inserting them at the cursor of an [`InsertionTarget`]
/// and moving the cursor past the inserted text.
#[derive(Debug)]
pub struct CursorSink<T> {
    target: T,
}

impl<T: InsertionTarget> CursorSink<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T: InsertionTarget> ResultSink for CursorSink<T> {
    fn deliver(&mut self, text: &str) -> Result<()> {
        let cursor = self.target.cursor();
        let end = self.target.insert_at(cursor, text);
        self.target.set_cursor(end);
        log::debug!("Inserted {} chars at {}", text.chars().count(), cursor);
        Ok(())
    }
}

/// Line-based in-memory text with a cursor, optionally backed by a file.
///
/// Lines are stored without their terminator. A buffer whose text uses
/// `\r\n` is written back with `\r\n`.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    lines: Vec<String>,
    line_ending: &'static str,
    cursor: Position,
    path: Option<PathBuf>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self {
            lines: vec![String::new()],
            line_ending: "\n",
            cursor: Position::default(),
            path: None,
        }
    }
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding `text`, cursor at the start.
    pub fn from_text(text: &str) -> Self {
        let line_ending = if text.contains("\r\n") { "\r\n" } else { "\n" };
        Self {
            lines: split_lines(text, line_ending),
            line_ending,
            ..Self::default()
        }
    }

    /// Load a file. A missing file opens as an empty buffer that will be
    /// created on [`save`](Self::save).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let mut buffer = Self::from_text(&text);
        buffer.path = Some(path.to_path_buf());
        Ok(buffer)
    }

    /// Write the buffer back to the file it was opened from.
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .context("Buffer is not backed by a file")?;
        std::fs::write(path, self.text())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn text(&self) -> String {
        self.lines.join(self.line_ending)
    }

    /// The terminator used when joining lines, `"\n"` or `"\r\n"`.
    pub fn line_ending(&self) -> &str {
        self.line_ending
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Clamp a position to the buffer contents.
    pub fn clamp(&self, pos: Position) -> Position {
        let line = pos.line.min(self.lines.len() - 1);
        let ch = pos.ch.min(self.lines[line].chars().count());
        Position { line, ch }
    }
}

fn split_lines(text: &str, line_ending: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| match line_ending {
            "\r\n" => line.strip_suffix('\r').unwrap_or(line).to_string(),
            _ => line.to_string(),
        })
        .collect()
}

fn byte_offset(line: &str, ch: usize) -> usize {
    line.char_indices()
        .nth(ch)
        .map(|(i, _)| i)
        .unwrap_or(line.len())
}

impl InsertionTarget for TextBuffer {
    fn cursor(&self) -> Position {
        self.cursor
    }

    fn insert_at(&mut self, pos: Position, text: &str) -> Position {
        let pos = self.clamp(pos);
        let line = &self.lines[pos.line];
        let split = byte_offset(line, pos.ch);
        let tail = line[split..].to_string();
        let head = line[..split].to_string();

        let mut inserted = split_lines(text, self.line_ending);
        let last = inserted.len() - 1;
        let end = if last == 0 {
            Position::new(pos.line, pos.ch + inserted[0].chars().count())
        } else {
            Position::new(pos.line + last, inserted[last].chars().count())
        };

        inserted[0] = format!("{}{}", head, inserted[0]);
        inserted[last].push_str(&tail);
        self.lines.splice(pos.line..=pos.line, inserted);
        end
    }

    fn set_cursor(&mut self, pos: Position) {
        self.cursor = self.clamp(pos);
    }
}

/// Prints each result on its own line on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ResultSink for StdoutSink {
    fn deliver(&mut self, text: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", text).context("Failed to write result to stdout")?;
        out.flush().context("Failed to flush stdout")
    }
}

/// A single line of status text.
pub trait StatusDisplay {
    fn set_text(&mut self, text: &str);
}

/// Fire-and-forget user-visible messages.
pub trait Notifier {
    fn notice(&mut self, message: &str);
}

/// Status line drawn in place on stderr.
#[derive(Debug, Default)]
pub struct TerminalStatus;

impl StatusDisplay for TerminalStatus {
    fn set_text(&mut self, text: &str) {
        let mut err = std::io::stderr().lock();
        // Clear the line and redraw; errors on a closed stderr are not actionable.
        let _ = write!(err, "\r\x1b[2K{}", text);
        let _ = err.flush();
    }
}

/// Notices printed on their own stderr line and mirrored to the log.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notice(&mut self, message: &str) {
        log::info!("{}", message);
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "\r\x1b[2K{}", message);
    }
}
