//! A writer whose only effect is flipping a flag on the first
//! non-whitespace byte. Used to detect Windows commands that report
//! success but still wrote to stderr.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Default)]
pub struct TripwireWriter {
    tripped: Arc<AtomicBool>,
}

impl TripwireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that stays readable after the writer has been moved into a
    /// stream pipeline.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.tripped.clone()
    }

    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }
}

impl Write for TripwireWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.iter().any(|b| !b.is_ascii_whitespace()) {
            self.tripped.store(true, Ordering::Relaxed);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
