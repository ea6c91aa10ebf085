//! Streaming replacement of secret byte patterns with a mask.
//!
//! The reader and writer variants produce output byte-exact equal to a
//! single replace-all over the concatenated input, independent of how the
//! input was chunked. Bytes that could still be the head of a match
//! straddling a chunk boundary are retained in a staging buffer until they
//! either complete a match or are proven not to.

use std::io::{self, Read, Write};

use crate::byteseq::partial_index;

/// A set of byte patterns and the mask that replaces each occurrence.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    patterns: Vec<Vec<u8>>,
    mask: Vec<u8>,
}

impl Redactor {
    pub fn new(mask: impl Into<Vec<u8>>) -> Self {
        Self {
            patterns: Vec::new(),
            mask: mask.into(),
        }
    }

    /// Adds a pattern. Empty patterns are ignored.
    pub fn add_pattern(&mut self, pattern: impl Into<Vec<u8>>) {
        let pattern = pattern.into();
        if !pattern.is_empty() {
            self.patterns.push(pattern);
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<Vec<u8>>) -> Self {
        self.add_pattern(pattern);
        self
    }

    /// True when no patterns are configured; the stream wrappers behave as
    /// identity streams in that case.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Single-shot replace-all over a complete buffer.
    pub fn redact(&self, input: &[u8]) -> Vec<u8> {
        let mut engine = Engine::new(self.clone());
        let mut out = engine.feed(input);
        out.extend(engine.finish());
        out
    }

    /// Single-shot replace-all over a string, lossy on the mask side only
    /// if the configured mask is not UTF-8.
    pub fn redact_str(&self, input: &str) -> String {
        String::from_utf8_lossy(&self.redact(input.as_bytes())).into_owned()
    }

    fn find_match(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        // Earliest start wins; on equal starts the longest pattern wins.
        let mut best: Option<(usize, usize)> = None;
        for pattern in &self.patterns {
            if pattern.len() > haystack.len() {
                continue;
            }
            let hit = haystack
                .windows(pattern.len())
                .position(|w| w == pattern.as_slice());
            if let Some(start) = hit {
                let better = match best {
                    None => true,
                    Some((s, l)) => start < s || (start == s && pattern.len() > l),
                };
                if better {
                    best = Some((start, pattern.len()));
                }
            }
        }
        best
    }

    fn find_partial(&self, haystack: &[u8]) -> Option<usize> {
        self.patterns
            .iter()
            .filter_map(|p| partial_index(haystack, p))
            .min()
    }
}

/// The chunking-independent core shared by [`RedactReader`] and
/// [`RedactWriter`].
#[derive(Debug)]
struct Engine {
    redactor: Redactor,
    staging: Vec<u8>,
}

impl Engine {
    fn new(redactor: Redactor) -> Self {
        Self {
            redactor,
            staging: Vec::new(),
        }
    }

    /// Appends a chunk and returns every byte that is safe to emit.
    fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        if self.redactor.is_empty() {
            return chunk.to_vec();
        }
        self.staging.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Resolves the staging buffer at end of stream: remaining full matches
    /// are still rewritten, incomplete partial matches flush verbatim.
    fn finish(&mut self) -> Vec<u8> {
        self.drain(true)
    }

    fn drain(&mut self, at_eof: bool) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let full = self.redactor.find_match(&self.staging);
            let partial = if at_eof {
                None
            } else {
                self.redactor.find_partial(&self.staging)
            };
            match (full, partial) {
                (Some((start, len)), None) => {
                    out.extend_from_slice(&self.staging[..start]);
                    out.extend_from_slice(&self.redactor.mask);
                    self.staging.drain(..start + len);
                }
                (Some((start, len)), Some(p)) if start <= p => {
                    out.extend_from_slice(&self.staging[..start]);
                    out.extend_from_slice(&self.redactor.mask);
                    self.staging.drain(..start + len);
                }
                (_, Some(partial_start)) => {
                    out.extend_from_slice(&self.staging[..partial_start]);
                    self.staging.drain(..partial_start);
                    return out;
                }
                (None, None) => {
                    out.append(&mut self.staging);
                    return out;
                }
            }
        }
    }
}

/// A writer that redacts before forwarding to the wrapped writer.
///
/// [`RedactWriter::close`] must be called (or the value dropped) to flush
/// bytes retained for a partial match that never completed.
pub struct RedactWriter<W: Write> {
    inner: W,
    engine: Engine,
    closed: bool,
}

impl<W: Write> RedactWriter<W> {
    pub fn new(inner: W, redactor: Redactor) -> Self {
        Self {
            inner,
            engine: Engine::new(redactor),
            closed: false,
        }
    }

    /// Flushes retained bytes and the wrapped writer. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let out = self.engine.finish();
        self.inner.write_all(&out)?;
        self.inner.flush()
    }
}

impl<W: Write> Write for RedactWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write to closed redact writer",
            ));
        }
        let out = self.engine.feed(buf);
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactWriter<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A reader that redacts the bytes read from the wrapped reader.
pub struct RedactReader<R: Read> {
    inner: R,
    engine: Engine,
    pending: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> RedactReader<R> {
    pub fn new(inner: R, redactor: Redactor) -> Self {
        Self {
            inner,
            engine: Engine::new(redactor),
            pending: Vec::new(),
            pos: 0,
            eof: false,
        }
    }
}

impl<R: Read> Read for RedactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.pending.len() {
                let n = (self.pending.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                if self.pos == self.pending.len() {
                    self.pending.clear();
                    self.pos = 0;
                }
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }
            let mut chunk = [0u8; 8192];
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                self.pending = self.engine.finish();
            } else {
                self.pending = self.engine.feed(&chunk[..n]);
            }
            self.pos = 0;
        }
    }
}
