//! The transport contract consumed by the `farhost` runner.
//!
//! A transport knows which OS family is on the far end, can render itself
//! for logs, and can start one remote process with its three standard
//! streams wired to caller-supplied endpoints. Connection setup,
//! authentication and host-key handling all live behind implementations of
//! [`Transport`]; the runner only borrows a connected value and never
//! closes it.

pub mod error;
pub mod input;
pub mod local;

pub use error::TransportError;
pub use input::ProcessInput;
pub use local::LocalTransport;

use std::io::Write;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Where process output goes. Sinks are in-memory pipeline stages
/// (redaction, line scanning, buffers) and must never block on I/O.
pub type StreamSink = Box<dyn Write + Send>;

/// A connected target capable of starting processes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// True when the remote OS family is Windows.
    fn is_windows(&self) -> bool;

    /// A short identity for log messages, e.g. `localhost` or
    /// `ssh:alice@example.com:22`.
    fn describe(&self) -> String;

    /// Starts `cmd` on the target.
    ///
    /// Output streams are forwarded to the sinks on dedicated tasks; the
    /// returned waiter joins them, so when [`Waiter::wait`] returns, both
    /// sinks have seen every byte and been dropped. Cancelling `ctx` kills
    /// the process and surfaces [`TransportError::Cancelled`].
    async fn start_process(
        &self,
        ctx: CancellationToken,
        cmd: &str,
        stdin: Option<ProcessInput>,
        stdout: StreamSink,
        stderr: StreamSink,
    ) -> Result<Box<dyn Waiter>, TransportError>;
}

/// An opaque handle to a started process.
#[async_trait]
pub trait Waiter: Send {
    /// Awaits process exit and stream-forwarding completion. A non-zero
    /// exit status is an error.
    async fn wait(self: Box<Self>) -> Result<(), TransportError>;
}
