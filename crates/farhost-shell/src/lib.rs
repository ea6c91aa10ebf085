//! Shell quoting and command assembly.
//!
//! Everything the runner sends to a remote host is a single shell command
//! line; this crate owns the quoting rules that make that safe, the
//! [`CommandBuilder`] used to assemble piped commands, and the PowerShell
//! encodings used to ship scripts to Windows hosts.

pub mod builder;
pub mod ps;

pub use builder::CommandBuilder;

use std::borrow::Cow;

/// Quotes a string for a POSIX shell.
///
/// Strings made of safe characters are returned unchanged; everything else
/// is wrapped in single quotes with embedded single quotes escaped as
/// `'"'"'`. The empty string quotes to `''`.
pub fn quote(s: &str) -> Cow<'_, str> {
    if s.is_empty() {
        return Cow::Borrowed("''");
    }
    if s.chars().all(is_safe_char) {
        return Cow::Borrowed(s);
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str("'\"'\"'");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Quotes a command and its arguments independently and joins them with
/// spaces. With no arguments the command itself is quoted.
pub fn quote_command<S: AsRef<str>>(cmd: &str, args: &[S]) -> String {
    let mut out = quote(cmd).into_owned();
    for arg in args {
        out.push(' ');
        out.push_str(&quote(arg.as_ref()));
    }
    out
}

/// Quotes a string as a single `cmd.exe` argument.
///
/// Safe strings are returned unchanged; everything else is wrapped in
/// double quotes with embedded `"` doubled, which both `cmd.exe` and the
/// Windows argv parser accept. Double quotes also neutralise `&`, `|`,
/// `^`, `<` and `>`; `%VAR%` expansion cannot be suppressed by quoting,
/// so callers must not build arguments from uncontrolled `%` sequences.
pub fn cmd_quote(s: &str) -> Cow<'_, str> {
    if !s.is_empty() && s.chars().all(is_cmd_safe_char) {
        return Cow::Borrowed(s);
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' {
            quoted.push_str("\"\"");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Quotes unconditionally, even when the string contains only safe
/// characters. Used where the surrounding syntax expects a quoted word,
/// e.g. the argument of `sh -c`.
pub fn force_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str("'\"'\"'");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

fn is_cmd_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '+' | '=' | ':' | ',' | '.' | '-' | '_' | '\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_empty() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_space() {
        assert_eq!(quote("foo bar"), "'foo bar'");
    }

    #[test]
    fn test_quote_single_quotes() {
        assert_eq!(quote("'single quoted'"), "''\"'\"'single quoted'\"'\"''");
    }

    #[test]
    fn test_quote_safe_passthrough() {
        assert_eq!(quote("foo.example.com"), "foo.example.com");
        assert_eq!(quote("/usr/local/bin/x-y+z@1,2:3=4%5"), "/usr/local/bin/x-y+z@1,2:3=4%5");
    }

    #[test]
    fn test_quote_metacharacters() {
        assert_eq!(quote("a;b"), "'a;b'");
        assert_eq!(quote("$(reboot)"), "'$(reboot)'");
        assert_eq!(quote("a\"b"), "'a\"b'");
    }

    #[test]
    fn test_cmd_quote_safe_passthrough() {
        assert_eq!(cmd_quote("MyService"), "MyService");
        assert_eq!(cmd_quote("C:\\Tools\\agent.exe"), "C:\\Tools\\agent.exe");
    }

    #[test]
    fn test_cmd_quote_wraps_and_doubles_quotes() {
        assert_eq!(cmd_quote(""), "\"\"");
        assert_eq!(cmd_quote("My Service"), "\"My Service\"");
        assert_eq!(cmd_quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            cmd_quote("svc\" & del C:\\x | echo"),
            "\"svc\"\" & del C:\\x | echo\""
        );
    }

    #[test]
    fn test_cmd_quote_metacharacters_are_quoted() {
        for s in ["a&b", "a|b", "a^b", "a<b", "a>b", "a%b"] {
            let quoted = cmd_quote(s).into_owned();
            assert!(quoted.starts_with('"') && quoted.ends_with('"'), "{s} not quoted: {quoted}");
        }
    }

    #[test]
    fn test_force_quote() {
        assert_eq!(force_quote("reboot"), "'reboot'");
        assert_eq!(force_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_quote_command() {
        assert_eq!(quote_command::<&str>("ls", &[]), "ls");
        assert_eq!(quote_command("echo", &["foo bar"]), "echo 'foo bar'");
        assert_eq!(quote_command::<&str>("a b", &[]), "'a b'");
    }
}
