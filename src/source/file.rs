//! File-based stream source.

use super::read_line_lossy;
use crate::model::error::InputError;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A recorded agent stream on disk, read once front to back.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
    line_number: usize,
}

impl FileSource {
    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns `InputError::FileNotFound` if the file does not exist.
    /// Returns `InputError::Io` for other I/O errors.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, InputError> {
        let path = path.into();
        if !path.exists() {
            return Err(InputError::FileNotFound { path });
        }
        let file = File::open(&path)?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            line_number: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn next_line(&mut self) -> Result<Option<String>, InputError> {
        let line = read_line_lossy(&mut self.reader)?;
        if line.is_some() {
            self.line_number += 1;
        }
        Ok(line)
    }
}
