//! Byte-slice primitives and stream plumbing used by the `farhost` exec
//! pipeline: all-occurrences and trailing-partial-match search, streaming
//! secret redaction, line-scanning log sinks, fan-out and mutex-serialised
//! writers, and small single-purpose writers (tripwire, counting, null).
//!
//! Everything here is synchronous and in-memory; the async layers above
//! drive these sinks from their stream-forwarding tasks.

pub mod byteseq;
pub mod counting;
pub mod linewriter;
pub mod multiwriter;
pub mod redact;
pub mod tee;
pub mod tripwire;

pub use byteseq::{index_all, partial_index};
pub use counting::CountingWriter;
pub use linewriter::{LineWriter, MAX_LINE_LEN};
pub use multiwriter::{MultiWriter, MutexWriter, NullWriter, SharedBuffer};
pub use redact::{RedactReader, RedactWriter, Redactor};
pub use tee::{CountingReader, TeeReader};
pub use tripwire::TripwireWriter;
