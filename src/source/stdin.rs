//! Stdin-based stream source for piped input.

use super::read_line_lossy;
use crate::model::error::InputError;
use std::io::{BufReader, IsTerminal, Read};

/// Piped agent stream.
///
/// Supports both a live pipe (`agent ... | agent-watch watch`) and a
/// complete one (`cat stream.jsonl | agent-watch watch`). `complete` is set
/// once EOF has been seen.
pub struct StdinSource<R: Read> {
    reader: BufReader<R>,
    complete: bool,
    line_number: usize,
}

impl<R: Read> std::fmt::Debug for StdinSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinSource")
            .field("complete", &self.complete)
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl StdinSource<std::io::Stdin> {
    /// Wrap the process's stdin.
    ///
    /// # Errors
    ///
    /// Returns `InputError::NoInput` if stdin is an interactive terminal, so
    /// the watcher never sits waiting for keyboard input.
    pub fn new() -> Result<Self, InputError> {
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(InputError::NoInput);
        }
        Ok(Self::from_reader(stdin))
    }
}

impl<R: Read> StdinSource<R> {
    /// Create a source from any reader.
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            complete: false,
            line_number: 0,
        }
    }

    /// Next line, blocking until one is available. `None` at EOF.
    pub fn next_line(&mut self) -> Result<Option<String>, InputError> {
        if self.complete {
            return Ok(None);
        }
        match read_line_lossy(&mut self.reader)? {
            Some(line) => {
                self.line_number += 1;
                Ok(Some(line))
            }
            None => {
                self.complete = true;
                Ok(None)
            }
        }
    }

    /// Whether EOF has been reached.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }
}
