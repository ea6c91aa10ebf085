//! Fan-out, mutex-serialised, shared-buffer and null writers.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Fans every write out to all wrapped writers. The reported length is the
/// input length; the first writer error aborts the fan-out.
pub struct MultiWriter {
    writers: Vec<Box<dyn Write + Send>>,
}

impl MultiWriter {
    pub fn new(writers: Vec<Box<dyn Write + Send>>) -> Self {
        Self { writers }
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    pub fn push(&mut self, writer: Box<dyn Write + Send>) {
        self.writers.push(writer);
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for w in &mut self.writers {
            w.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for w in &mut self.writers {
            w.flush()?;
        }
        Ok(())
    }
}

/// Serialises whole `write` calls on a shared writer so that writes from
/// different threads never interleave within one underlying call.
pub struct MutexWriter<W: Write + Send> {
    inner: Arc<Mutex<W>>,
}

impl<W: Write + Send> MutexWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl<W: Write + Send> Clone for MutexWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W: Write + Send> Write for MutexWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("writer mutex poisoned"))?;
        inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("writer mutex poisoned"))?;
        inner.flush()
    }
}

/// An in-memory buffer that can be written to from a stream-forwarding task
/// while another owner reads the collected bytes afterwards.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the collected bytes, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock().expect("buffer mutex poisoned"))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("buffer mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("buffer mutex poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

impl Write for NullWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
