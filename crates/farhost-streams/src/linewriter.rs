//! A writer that turns a byte stream into whole lines for a callback.

use std::io::{self, Write};

/// Lines longer than this are flushed early rather than buffered further.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Buffers bytes up to a newline (or [`MAX_LINE_LEN`]) and hands each
/// completed line to the callback, without the line terminator.
///
/// Remaining bytes are flushed as a final line when the writer is dropped.
/// The callback never allocates per byte; scanning happens per chunk.
pub struct LineWriter<F: FnMut(&str) + Send> {
    buf: Vec<u8>,
    callback: F,
}

impl<F: FnMut(&str) + Send> LineWriter<F> {
    pub fn new(callback: F) -> Self {
        Self {
            buf: Vec::new(),
            callback,
        }
    }

    fn emit(&mut self, upto: usize) {
        let line: Vec<u8> = self.buf.drain(..upto).collect();
        // Skip the newline itself, tolerate CRLF.
        let line = match line.strip_suffix(b"\r") {
            Some(stripped) => stripped,
            None => &line,
        };
        (self.callback)(&String::from_utf8_lossy(line));
    }

    /// Flushes any buffered bytes as a final line. Idempotent; also runs on
    /// drop.
    pub fn close(&mut self) {
        if !self.buf.is_empty() {
            let upto = self.buf.len();
            self.emit(upto);
        }
    }
}

impl<F: FnMut(&str) + Send> Write for LineWriter<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while let Some(nl) = rest.iter().position(|&b| b == b'\n') {
            self.buf.extend_from_slice(&rest[..nl]);
            let upto = self.buf.len();
            self.emit(upto);
            rest = &rest[nl + 1..];
        }
        self.buf.extend_from_slice(rest);
        while self.buf.len() >= MAX_LINE_LEN {
            self.emit(MAX_LINE_LEN);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F: FnMut(&str) + Send> Drop for LineWriter<F> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str) + Send) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        (lines, move |line: &str| {
            sink.lock().unwrap().push(line.to_string())
        })
    }

    #[test]
    fn test_lines_split_on_newline() {
        let (lines, callback) = collecting();
        let mut w = LineWriter::new(callback);
        w.write_all(b"one\ntwo\nthr").unwrap();
        w.write_all(b"ee\n").unwrap();
        drop(w);
        assert_eq!(*lines.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_trailing_bytes_flush_on_drop() {
        let (lines, callback) = collecting();
        let mut w = LineWriter::new(callback);
        w.write_all(b"no newline").unwrap();
        drop(w);
        assert_eq!(*lines.lock().unwrap(), vec!["no newline"]);
    }

    #[test]
    fn test_crlf_stripped() {
        let (lines, callback) = collecting();
        let mut w = LineWriter::new(callback);
        w.write_all(b"windows line\r\n").unwrap();
        drop(w);
        assert_eq!(*lines.lock().unwrap(), vec!["windows line"]);
    }

    #[test]
    fn test_oversized_line_flushes_early() {
        let (lines, callback) = collecting();
        let mut w = LineWriter::new(callback);
        let big = vec![b'x'; MAX_LINE_LEN + 10];
        w.write_all(&big).unwrap();
        drop(w);
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_LEN);
        assert_eq!(lines[1].len(), 10);
    }

    #[test]
    fn test_empty_lines_preserved() {
        let (lines, callback) = collecting();
        let mut w = LineWriter::new(callback);
        w.write_all(b"a\n\nb\n").unwrap();
        drop(w);
        assert_eq!(*lines.lock().unwrap(), vec!["a", "", "b"]);
    }
}
