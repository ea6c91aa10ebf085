//! Uniform command execution and remote filesystem access for POSIX and
//! Windows hosts.
//!
//! Construct a transport (anything implementing
//! [`Transport`](farhost_transport::Transport)), wrap it in a [`Host`],
//! and issue commands, file transfers, service-manager operations and
//! OS-introspection queries without caring which OS family is on the far
//! end.
//!
//! The three core subsystems:
//!
//! - the command execution pipeline ([`exec`]): per-command options,
//!   decorators (sudo, PowerShell wrapping), stream plumbing with
//!   line-scoped logging and streaming secret redaction, and the Windows
//!   "stderr means failure" classification;
//! - the POSIX filesystem ([`fs::posix`]): an `fs`-style API implemented
//!   purely with shell commands (`stat`, `dd`, `find`, `install`, …);
//! - the Windows filesystem ([`fs::windows`]): the same API over a
//!   long-running PowerShell agent speaking a line-framed JSON protocol
//!   with embedded raw byte payloads.

pub mod error;
pub mod exec;
pub mod fs;
pub mod host;
pub mod os;
pub mod pkg;
pub mod service;
pub mod sudo;

pub use error::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

pub use exec::{
    Decorator, ExecOpts, ExecOptsBuilder, ExecWaiter, FmtArg, NoopDecorator, PsCompressedDecorator,
    PsDecorator, Runner, SudoDecorator,
};
pub use fs::{
    DirEntryBuffer, FileInfo, FileMode, OpenFlags, PosixFs, RemoteFile, RemoteFs, WinFs,
};
pub use host::Host;
pub use os::OsRelease;
pub use pkg::{PackageManager, PackageManagers};
pub use service::{ServiceManager, ServiceManagers};
pub use sudo::{SudoProvider, SudoProviders};

// The transport contract and the loop-back transport, re-exported so most
// callers need only this crate.
pub use farhost_transport::{
    LocalTransport, ProcessInput, StreamSink, Transport, TransportError, Waiter,
};

// The "context" type used for cancellation throughout the crate.
pub use tokio_util::sync::CancellationToken;
