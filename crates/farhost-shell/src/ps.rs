//! PowerShell command encoding.
//!
//! Windows hosts receive scripts through `powershell.exe -EncodedCommand`,
//! which takes base64 over UTF-16LE text. Larger scripts are additionally
//! gzip-compressed and shipped inside a small self-expanding stub.

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;

/// The fixed invocation prefix for encoded commands.
const PS_EXE: &str = "powershell.exe -NonInteractive -ExecutionPolicy Unrestricted -NoProfile";

/// Wraps a script in a `powershell.exe -EncodedCommand` invocation.
///
/// Progress output is silenced up front; PowerShell renders progress bars
/// to stderr, which the runner treats as failure on Windows.
pub fn encoded_command(script: &str) -> String {
    let script = format!("$ProgressPreference='SilentlyContinue'; {script}");
    let utf16: Vec<u8> = script
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    format!("{PS_EXE} -EncodedCommand {}", BASE64.encode(utf16))
}

/// Compresses a script (blank and comment lines stripped, gzip at best
/// compression, base64) and wraps it in a stub that decodes, decompresses
/// and invokes it, itself shipped through [`encoded_command`].
pub fn compressed(script: &str) -> String {
    let trimmed: Vec<&str> = script
        .lines()
        .filter(|line| {
            let t = line.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .collect();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(trimmed.join("\n").as_bytes())
        .expect("gzip to memory cannot fail");
    let gzipped = encoder.finish().expect("gzip to memory cannot fail");

    let stub = format!(
        concat!(
            "$compressed = '{}'\n",
            "$bytes = [System.Convert]::FromBase64String($compressed)\n",
            "$stream = New-Object System.IO.MemoryStream(,$bytes)\n",
            "$gzip = New-Object System.IO.Compression.GzipStream($stream, [System.IO.Compression.CompressionMode]::Decompress)\n",
            "$reader = New-Object System.IO.StreamReader($gzip)\n",
            "$expanded = $reader.ReadToEnd()\n",
            "$reader.Close()\n",
            "$block = [ScriptBlock]::Create($expanded)\n",
            "& $block"
        ),
        BASE64.encode(&gzipped)
    );
    encoded_command(&stub)
}

/// Replaces the base64 payload of an `-EncodedCommand` flag with the
/// decoded script so logged commands stay readable. Returns `None` when
/// the command carries no decodable payload.
pub fn decode_encoded_command(cmd: &str) -> Option<String> {
    let flag = "-EncodedCommand";
    let at = cmd.find(flag)?;
    let after = &cmd[at + flag.len()..];
    let payload = after.split_whitespace().next()?;
    let bytes = BASE64.decode(payload).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let script = String::from_utf16_lossy(&units);
    Some(cmd.replacen(payload, &script, 1))
}

/// PowerShell single-quoted string literal; embedded quotes are doubled.
pub fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Converts forward slashes to the backslash form Windows tools expect.
pub fn to_windows_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Double-quotes a Windows path, escaping embedded `"` as `` `" ``.
/// Already-quoted paths are retained as-is.
pub fn double_quote_path(path: &str) -> String {
    if path.len() >= 2 && path.starts_with('"') && path.ends_with('"') {
        return path.to_string();
    }
    format!("\"{}\"", path.replace('"', "`\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_command_shape() {
        let cmd = encoded_command("Get-ChildItem");
        assert!(cmd.starts_with(
            "powershell.exe -NonInteractive -ExecutionPolicy Unrestricted -NoProfile -EncodedCommand "
        ));
        let payload = cmd.rsplit(' ').next().unwrap();
        let bytes = BASE64.decode(payload).unwrap();
        // UTF-16LE: every other byte of an ASCII script is zero.
        assert_eq!(bytes[1], 0);
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let script = String::from_utf16(&units).unwrap();
        assert_eq!(
            script,
            "$ProgressPreference='SilentlyContinue'; Get-ChildItem"
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let cmd = encoded_command("Write-Output 'hello'");
        let decoded = decode_encoded_command(&cmd).unwrap();
        assert!(decoded.contains("Write-Output 'hello'"));
        assert!(!decoded.contains("JABQAHIA"));
    }

    #[test]
    fn test_decode_non_encoded_command() {
        assert_eq!(decode_encoded_command("echo hello"), None);
    }

    #[test]
    fn test_compressed_strips_comments() {
        let cmd = compressed("# a comment\n\nWrite-Output 1\n  # another\nWrite-Output 2\n");
        // The stub itself is encoded; decoding it must reveal the gzip
        // boilerplate but not the stripped comments.
        let decoded = decode_encoded_command(&cmd).unwrap();
        assert!(decoded.contains("FromBase64String"));
        assert!(decoded.contains("GzipStream"));
        assert!(!decoded.contains("a comment"));
    }

    #[test]
    fn test_single_quote() {
        assert_eq!(single_quote("plain"), "'plain'");
        assert_eq!(single_quote("it's"), "'it''s'");
    }

    #[test]
    fn test_to_windows_path() {
        assert_eq!(
            to_windows_path("C:/Users/Public/Documents/foo.txt"),
            "C:\\Users\\Public\\Documents\\foo.txt"
        );
    }

    #[test]
    fn test_double_quote_path() {
        assert_eq!(double_quote_path(r"C:\temp"), "\"C:\\temp\"");
        assert_eq!(double_quote_path("\"C:\\already quoted\""), "\"C:\\already quoted\"");
        assert_eq!(double_quote_path(r#"C:\odd"name"#), "\"C:\\odd`\"name\"");
    }
}
