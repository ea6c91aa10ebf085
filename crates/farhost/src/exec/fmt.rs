//! Runtime command formatting.
//!
//! Command templates use printf-style verbs filled at runtime, so that a
//! malformed template or a wrong argument count is caught before anything
//! reaches the transport, surfacing as [`Error::InvalidCommand`] instead
//! of a garbled command string.
//!
//! Supported verbs: `%s` (any argument), `%d` (integers only), `%v` (any
//! argument), `%q` (shell-quoted string), `%%` (literal percent).

use farhost_shell::force_quote;

use crate::Error;

/// One runtime argument for [`format_command`].
#[derive(Debug, Clone)]
pub enum FmtArg {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl FmtArg {
    fn render(&self) -> String {
        match self {
            FmtArg::Str(s) => s.clone(),
            FmtArg::Int(i) => i.to_string(),
            FmtArg::Uint(u) => u.to_string(),
            FmtArg::Float(f) => f.to_string(),
            FmtArg::Bool(b) => b.to_string(),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(self, FmtArg::Int(_) | FmtArg::Uint(_))
    }
}

impl From<&str> for FmtArg {
    fn from(s: &str) -> Self {
        FmtArg::Str(s.to_string())
    }
}

impl From<String> for FmtArg {
    fn from(s: String) -> Self {
        FmtArg::Str(s)
    }
}

impl From<i32> for FmtArg {
    fn from(i: i32) -> Self {
        FmtArg::Int(i.into())
    }
}

impl From<i64> for FmtArg {
    fn from(i: i64) -> Self {
        FmtArg::Int(i)
    }
}

impl From<u32> for FmtArg {
    fn from(u: u32) -> Self {
        FmtArg::Uint(u.into())
    }
}

impl From<u64> for FmtArg {
    fn from(u: u64) -> Self {
        FmtArg::Uint(u)
    }
}

impl From<usize> for FmtArg {
    fn from(u: usize) -> Self {
        FmtArg::Uint(u as u64)
    }
}

impl From<f64> for FmtArg {
    fn from(f: f64) -> Self {
        FmtArg::Float(f)
    }
}

impl From<bool> for FmtArg {
    fn from(b: bool) -> Self {
        FmtArg::Bool(b)
    }
}

/// Substitutes `args` into `fmt`. Arity or verb mismatches are an
/// [`Error::InvalidCommand`].
pub fn format_command(fmt: &str, args: &[FmtArg]) -> crate::Result<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut next = 0usize;
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = chars.next().ok_or_else(|| {
            Error::InvalidCommand(format!("dangling %% at end of format string {fmt:?}"))
        })?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = args.get(next).ok_or_else(|| {
            Error::InvalidCommand(format!(
                "too few arguments for format string {fmt:?}: got {}",
                args.len()
            ))
        })?;
        next += 1;
        match verb {
            's' | 'v' => out.push_str(&arg.render()),
            'd' => {
                if !arg.is_integer() {
                    return Err(Error::InvalidCommand(format!(
                        "%d expects an integer argument, got {arg:?}"
                    )));
                }
                out.push_str(&arg.render());
            }
            'q' => out.push_str(&force_quote(&arg.render())),
            other => {
                return Err(Error::InvalidCommand(format!(
                    "unsupported verb %{other} in format string {fmt:?}"
                )));
            }
        }
    }
    if next != args.len() {
        return Err(Error::InvalidCommand(format!(
            "too many arguments for format string {fmt:?}: got {}, used {next}",
            args.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution() {
        let out = format_command(
            "echo %s %d",
            &[FmtArg::from("hello"), FmtArg::from(42)],
        )
        .unwrap();
        assert_eq!(out, "echo hello 42");
    }

    #[test]
    fn test_quoted_verb() {
        let out = format_command("touch %q", &[FmtArg::from("a file")]).unwrap();
        assert_eq!(out, "touch 'a file'");
    }

    #[test]
    fn test_too_few_arguments() {
        let err = format_command("echo %s %d", &[FmtArg::from("hello")]).unwrap_err();
        assert!(err.is_invalid_command());
    }

    #[test]
    fn test_too_many_arguments() {
        let err =
            format_command("echo %s", &[FmtArg::from("a"), FmtArg::from("b")]).unwrap_err();
        assert!(err.is_invalid_command());
    }

    #[test]
    fn test_integer_verb_rejects_strings() {
        let err = format_command("kill -9 %d", &[FmtArg::from("pid")]).unwrap_err();
        assert!(err.is_invalid_command());
    }

    #[test]
    fn test_literal_percent() {
        let out = format_command("df --output=pcent | grep 100%%", &[]).unwrap();
        assert_eq!(out, "df --output=pcent | grep 100%");
    }
}
