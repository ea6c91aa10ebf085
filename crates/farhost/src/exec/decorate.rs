//! Command decorators: pure rewrites applied to the final command string
//! before it is handed to the transport.

use farhost_shell::{force_quote, ps};

/// A pure function from command string to command string.
pub trait Decorator: Send + Sync {
    fn decorate(&self, cmd: &str) -> String;
}

/// Leaves the command untouched. Returned by sudo providers on hosts that
/// already run with sufficient privilege.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDecorator;

impl Decorator for NoopDecorator {
    fn decorate(&self, cmd: &str) -> String {
        cmd.to_string()
    }
}

/// Wraps commands in a non-interactive privilege-escalation invocation:
/// `sudo -n -- "${SHELL-sh}" -c '<cmd>'`.
#[derive(Debug, Clone, Copy)]
pub struct SudoDecorator {
    bin: &'static str,
}

impl SudoDecorator {
    pub fn sudo() -> Self {
        Self { bin: "sudo" }
    }

    pub fn doas() -> Self {
        Self { bin: "doas" }
    }

    /// The probe command a provider runs to test this escalation path.
    pub fn probe_command(&self) -> String {
        format!("{} -n -- \"${{SHELL-sh}}\" -c true", self.bin)
    }
}

impl Decorator for SudoDecorator {
    fn decorate(&self, cmd: &str) -> String {
        format!("{} -n -- \"${{SHELL-sh}}\" -c {}", self.bin, force_quote(cmd))
    }
}

/// Wraps the command in a `powershell.exe -EncodedCommand` invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsDecorator;

impl Decorator for PsDecorator {
    fn decorate(&self, cmd: &str) -> String {
        ps::encoded_command(cmd)
    }
}

/// Gzip-compresses the script before encoding; pays off for scripts the
/// size of the Windows filesystem agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsCompressedDecorator;

impl Decorator for PsCompressedDecorator {
    fn decorate(&self, cmd: &str) -> String {
        ps::compressed(cmd)
    }
}
