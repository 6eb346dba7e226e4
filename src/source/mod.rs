//! Agent stream input sources.
//!
//! The stream is JSONL read one line at a time, either from a file given on
//! the command line or from piped stdin:
//! - File: a recorded stream, read to the end
//! - Stdin: a live stream, e.g. `agent --output-format stream-json | agent-watch watch`
//!
//! Reads block; the pipeline is a single sequential consumer.

use crate::model::error::InputError;
use std::io::{self, BufRead};
use std::path::PathBuf;

pub mod file;
pub mod stdin;

pub use file::FileSource;
pub use stdin::StdinSource;

/// Anything that yields stream lines one at a time.
pub trait LineSource {
    /// Next line without its terminator, or `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>, InputError>;

    /// Lines handed out so far.
    fn line_number(&self) -> usize;
}

/// Unified input source for the agent stream.
///
/// Sum type enforces exactly one variant.
#[derive(Debug)]
pub enum InputSource {
    File(FileSource),
    Stdin(StdinSource<io::Stdin>),
}

impl InputSource {
    /// Next line without its line terminator, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns `InputError::Io` when the underlying read fails.
    pub fn next_line(&mut self) -> Result<Option<String>, InputError> {
        match self {
            InputSource::File(f) => f.next_line(),
            InputSource::Stdin(s) => s.next_line(),
        }
    }

    /// Lines handed out so far.
    pub fn line_number(&self) -> usize {
        match self {
            InputSource::File(f) => f.line_number(),
            InputSource::Stdin(s) => s.line_number(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            InputSource::File(f) => f.path().display().to_string(),
            InputSource::Stdin(_) => "<stdin>".to_string(),
        }
    }
}

impl LineSource for InputSource {
    fn next_line(&mut self) -> Result<Option<String>, InputError> {
        InputSource::next_line(self)
    }

    fn line_number(&self) -> usize {
        InputSource::line_number(self)
    }
}

impl LineSource for FileSource {
    fn next_line(&mut self) -> Result<Option<String>, InputError> {
        FileSource::next_line(self)
    }

    fn line_number(&self) -> usize {
        FileSource::line_number(self)
    }
}

impl<R: io::Read> LineSource for StdinSource<R> {
    fn next_line(&mut self) -> Result<Option<String>, InputError> {
        StdinSource::next_line(self)
    }

    fn line_number(&self) -> usize {
        StdinSource::line_number(self)
    }
}

/// Detect and create the appropriate input source.
///
/// 1. If a file path is provided: open it
/// 2. If stdin is piped: read stdin
/// 3. Else: `InputError::NoInput`
///
/// # Errors
///
/// Returns `InputError::FileNotFound` if the file does not exist and
/// `InputError::NoInput` if no file is given and stdin is a terminal.
pub fn detect_input_source(file: Option<PathBuf>) -> Result<InputSource, InputError> {
    match file {
        Some(path) => Ok(InputSource::File(FileSource::open(path)?)),
        None => Ok(InputSource::Stdin(StdinSource::new()?)),
    }
}

/// Read one line, decoding invalid UTF-8 lossily so a bad byte only spoils
/// its own line. Strips `\n` and `\r\n`.
pub(crate) fn read_line_lossy<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
