//! Reader adapters: mirror-to-writer tee and byte counting.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Mirrors every byte read from the inner reader into the given writer.
/// Used to echo command stdin into a log sink.
pub struct TeeReader<R: Read, W: Write> {
    inner: R,
    mirror: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(inner: R, mirror: W) -> Self {
        Self { inner, mirror }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.mirror.write_all(&buf[..n])?;
        }
        Ok(n)
    }
}

/// Counts bytes on the way through from the inner reader.
pub struct CountingReader<R: Read> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        self.count.clone()
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tee_mirrors_reads() {
        let mut out = Vec::new();
        {
            let mut tee = TeeReader::new(&b"payload"[..], &mut out);
            let mut sink = Vec::new();
            tee.read_to_end(&mut sink).unwrap();
            assert_eq!(sink, b"payload");
        }
        assert_eq!(out, b"payload");
    }

    #[test]
    fn test_counting_reader() {
        let mut r = CountingReader::new(&b"12345"[..]);
        let counter = r.counter();
        let mut sink = Vec::new();
        r.read_to_end(&mut sink).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 5);
    }
}
