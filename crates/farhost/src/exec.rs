//! The command execution pipeline: per-command options, command
//! decorators, runtime command formatting, and the runner that ties a
//! transport to a decorator chain.

pub mod decorate;
pub mod fmt;
pub mod options;
pub mod runner;

pub use decorate::{Decorator, NoopDecorator, PsCompressedDecorator, PsDecorator, SudoDecorator};
pub use fmt::FmtArg;
pub use options::{ExecOpts, ExecOptsBuilder, REDACT_MASK};
pub use runner::{ExecWaiter, Runner};
