//! Process standard input with an optionally known size.

use std::fs::File;
use std::io::{Cursor, Read};

/// The stdin source for one process, carrying a size when the source can
/// report one up front (in-memory buffers and regular files; character
/// devices cannot).
pub struct ProcessInput {
    reader: Box<dyn Read + Send>,
    size: Option<u64>,
}

impl ProcessInput {
    /// A reader of unknown size.
    pub fn reader(reader: Box<dyn Read + Send>) -> Self {
        Self { reader, size: None }
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            reader: Box::new(Cursor::new(data)),
            size: Some(size),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::bytes(s.into().into_bytes())
    }

    /// A file, reporting its size when it is a regular file.
    pub fn file(file: File) -> Self {
        let size = file.metadata().ok().and_then(|meta| {
            if meta.is_file() {
                Some(meta.len())
            } else {
                None
            }
        });
        Self {
            reader: Box::new(file),
            size,
        }
    }

    /// Size in bytes, when known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }
}
