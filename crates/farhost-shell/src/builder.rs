//! Assembling piped shell command strings.

use std::fmt;

use crate::quote;

/// An opaque wrapper over a growing command string.
///
/// Arguments appended via [`arg`](CommandBuilder::arg) are quoted; pipes
/// and redirections insert the shell operators with quoted operands.
///
/// ```
/// use farhost_shell::CommandBuilder;
///
/// let cmd = CommandBuilder::new("echo")
///     .arg("foo")
///     .pipe("grep", &["-q"])
///     .arg("foo");
/// assert_eq!(cmd.to_string(), "echo foo | grep -q foo");
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    cmd: String,
}

impl CommandBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: quote(cmd).into_owned(),
        }
    }

    /// Appends a quoted argument.
    pub fn arg(mut self, arg: &str) -> Self {
        self.cmd.push(' ');
        self.cmd.push_str(&quote(arg));
        self
    }

    /// Appends several quoted arguments.
    pub fn args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        for arg in args {
            self = self.arg(arg.as_ref());
        }
        self
    }

    /// Appends ` | ` followed by the quoted subcommand and its arguments.
    pub fn pipe<S: AsRef<str>>(mut self, cmd: &str, args: &[S]) -> Self {
        self.cmd.push_str(" | ");
        self.cmd.push_str(&quote(cmd));
        self.args(args)
    }

    /// Appends raw text without quoting.
    pub fn raw(mut self, s: &str) -> Self {
        self.cmd.push_str(s);
        self
    }

    /// Redirects stdout to a file (`> path`).
    pub fn out_to(self, path: &str) -> Self {
        let path = quote(path).into_owned();
        self.raw(" > ").raw(&path)
    }

    /// Appends stdout to a file (`>> path`).
    pub fn append_out_to(self, path: &str) -> Self {
        let path = quote(path).into_owned();
        self.raw(" >> ").raw(&path)
    }

    /// Redirects stderr to a file (`2> path`).
    pub fn err_to(self, path: &str) -> Self {
        let path = quote(path).into_owned();
        self.raw(" 2> ").raw(&path)
    }

    /// Appends stderr to a file (`2>> path`).
    pub fn append_err_to(self, path: &str) -> Self {
        let path = quote(path).into_owned();
        self.raw(" 2>> ").raw(&path)
    }

    /// Merges stderr into stdout (`2>&1`).
    pub fn err_to_out(self) -> Self {
        self.raw(" 2>&1")
    }

    /// Discards stdout (`>/dev/null`).
    pub fn out_to_null(self) -> Self {
        self.raw(" >/dev/null")
    }

    /// Discards stderr (`2>/dev/null`).
    pub fn err_to_null(self) -> Self {
        self.raw(" 2>/dev/null")
    }
}

impl fmt::Display for CommandBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cmd)
    }
}

impl From<CommandBuilder> for String {
    fn from(b: CommandBuilder) -> String {
        b.cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe() {
        let cmd = CommandBuilder::new("echo")
            .arg("foo")
            .pipe("grep", &["-q"])
            .arg("foo");
        assert_eq!(cmd.to_string(), "echo foo | grep -q foo");
    }

    #[test]
    fn test_args_are_quoted() {
        let cmd = CommandBuilder::new("rm").arg("-f").arg("a file");
        assert_eq!(cmd.to_string(), "rm -f 'a file'");
    }

    #[test]
    fn test_redirections() {
        let cmd = CommandBuilder::new("ls")
            .arg("/tmp")
            .out_to("/var/log/out log")
            .err_to_null();
        assert_eq!(cmd.to_string(), "ls /tmp > '/var/log/out log' 2>/dev/null");
    }

    #[test]
    fn test_err_to_out() {
        let cmd = CommandBuilder::new("stat").raw(" --help").err_to_out();
        assert_eq!(cmd.to_string(), "stat --help 2>&1");
    }

    #[test]
    fn test_raw_is_unquoted() {
        let cmd = CommandBuilder::new("true").raw(" && echo ok");
        assert_eq!(cmd.to_string(), "true && echo ok");
    }
}
