//! Remote OS identification.

use serde::Deserialize;

use crate::Error;
use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;

/// The identity of the remote operating system, in `/etc/os-release`
/// terms. Windows hosts are mapped into the same shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
    pub pretty_name: String,
    pub id_like: Option<String>,
    pub windows: bool,
}

impl OsRelease {
    /// Detects the remote OS through the runner.
    pub async fn detect(runner: &Runner) -> crate::Result<OsRelease> {
        if runner.is_windows() {
            detect_windows(runner).await
        } else {
            detect_posix(runner).await
        }
    }
}

async fn detect_posix(runner: &Runner) -> crate::Result<OsRelease> {
    let out = runner
        .exec_output(
            "cat /etc/os-release 2>/dev/null || cat /usr/lib/os-release",
            ExecOpts::builder().build(),
        )
        .await;
    if let Ok(contents) = out {
        if !contents.is_empty() {
            return Ok(parse_os_release(&contents));
        }
    }
    // No os-release file; macOS is the common case.
    let uname = runner
        .exec_output("uname", ExecOpts::builder().build())
        .await?;
    if uname.trim() == "Darwin" {
        let version = runner
            .exec_output("sw_vers -productVersion", ExecOpts::builder().build())
            .await
            .unwrap_or_default();
        return Ok(OsRelease {
            id: "darwin".to_string(),
            version_id: version.trim().to_string(),
            pretty_name: format!("macOS {}", version.trim()),
            id_like: None,
            windows: false,
        });
    }
    Err(Error::parse("os-release", uname))
}

#[derive(Debug, Deserialize)]
struct WinOsInfo {
    #[serde(rename = "Caption", default)]
    caption: String,
    #[serde(rename = "Version", default)]
    version: String,
}

async fn detect_windows(runner: &Runner) -> crate::Result<OsRelease> {
    let out = runner
        .exec_output(
            "Get-CimInstance Win32_OperatingSystem | Select-Object Caption,Version | ConvertTo-Json -Compress",
            ExecOpts::builder().ps().build(),
        )
        .await?;
    let info: WinOsInfo =
        serde_json::from_str(&out).map_err(|_| Error::parse("Win32_OperatingSystem", out))?;
    Ok(OsRelease {
        id: "windows".to_string(),
        version_id: info.version,
        pretty_name: info.caption,
        id_like: None,
        windows: true,
    })
}

/// Parses `key=value` lines, tolerating quoted values and comments.
fn parse_os_release(contents: &str) -> OsRelease {
    let mut release = OsRelease::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "ID" => release.id = value.to_string(),
            "VERSION_ID" => release.version_id = value.to_string(),
            "PRETTY_NAME" => release.pretty_name = value.to_string(),
            "ID_LIKE" => release.id_like = Some(value.to_string()),
            _ => {}
        }
    }
    release
}
