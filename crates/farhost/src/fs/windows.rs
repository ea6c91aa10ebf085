//! The Windows remote filesystem.
//!
//! Random-access file I/O goes through a long-running PowerShell agent
//! (see [`agent`]). Everything else (stat, listing, hashing, directory
//! manipulation) runs out of band as fresh PowerShell one-liners so it
//! never contends with an in-flight file transfer.

pub mod agent;
pub mod file;

pub use file::WinFile;

use std::sync::Arc;

use async_trait::async_trait;
use farhost_shell::ps;
use farhost_streams::SharedBuffer;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::OnceCell;

use crate::Error;
use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;
use crate::fs::direntry::DirEntryBuffer;
use crate::fs::flags::OpenFlags;
use crate::fs::info::FileInfo;
use crate::fs::mode::FileMode;
use crate::fs::{RemoteFile, RemoteFs};
use self::agent::Agent;

const SELECT_FIELDS: &str = "Name,FullName,LastWriteTime,Attributes,Mode,Length,IsReadOnly";

struct Inner {
    runner: Runner,
    agent: OnceCell<Arc<Agent>>,
}

/// Filesystem access to a Windows host through PowerShell.
#[derive(Clone)]
pub struct WinFs {
    inner: Arc<Inner>,
}

impl WinFs {
    pub fn new(runner: Runner) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                agent: OnceCell::new(),
            }),
        }
    }

    pub fn runner(&self) -> &Runner {
        &self.inner.runner
    }

    /// The lazily started agent co-process.
    pub(crate) async fn agent(&self) -> crate::Result<Arc<Agent>> {
        let agent = self
            .inner
            .agent
            .get_or_try_init(|| async { Agent::start(&self.inner.runner).await.map(Arc::new) })
            .await?;
        if agent.is_ended() {
            return Err(Error::AgentEnded);
        }
        Ok(agent.clone())
    }

    /// Shuts the agent down if it was ever started.
    pub async fn close(&self) {
        if let Some(agent) = self.inner.agent.get() {
            agent.shutdown().await;
        }
    }

    /// Runs a PowerShell snippet out of band, returning trimmed stdout.
    /// Well-known failure phrases on stderr map to sentinels.
    async fn run_ps(&self, op: &'static str, path: &str, script: &str) -> crate::Result<String> {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let opts = ExecOpts::builder()
            .stdout(Box::new(stdout.clone()))
            .stderr(Box::new(stderr.clone()))
            .hide_output()
            .ps()
            .build();
        let result = self.inner.runner.exec(script, opts).await;
        let out = String::from_utf8_lossy(&stdout.take()).trim().to_string();
        match result {
            Ok(()) => Ok(out),
            Err(err) => {
                let stderr = String::from_utf8_lossy(&stderr.take()).into_owned();
                let message = if stderr.is_empty() {
                    err.to_string()
                } else {
                    stderr
                };
                Err(Error::op(op, path, agent::map_agent_error(path, &message)))
            }
        }
    }

    fn quoted(&self, path: &str) -> String {
        ps::single_quote(&ps::to_windows_path(path))
    }
}

/// One `Get-Item`/`Get-ChildItem` row, or the error marker emitted by the
/// `Test-Path` guards.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WinItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    last_write_time: Option<serde_json::Value>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    is_read_only: Option<bool>,
    #[serde(default)]
    err: Option<String>,
}

impl WinItem {
    fn into_info(self) -> crate::Result<FileInfo> {
        let is_dir = self.mode.as_deref().is_some_and(|m| m.contains('d'));
        let mode = if is_dir {
            FileMode::new(FileMode::DIR | 0o777)
        } else if self.is_read_only.unwrap_or(false) {
            FileMode::new(FileMode::REGULAR | 0o444)
        } else {
            FileMode::new(FileMode::REGULAR | 0o666)
        };
        let modified = match &self.last_write_time {
            Some(value) => parse_ps_date(value)?,
            None => OffsetDateTime::UNIX_EPOCH,
        };
        Ok(FileInfo::new(
            self.name,
            self.full_name,
            if is_dir { 0 } else { self.length.unwrap_or(0) },
            mode,
            modified,
        ))
    }
}

/// Parses the `LastWriteTime` shapes PowerShell's JSON serializer
/// produces: the classic `/Date(ms)/` form, an RFC3339 string, or an
/// object wrapping either under `value`.
fn parse_ps_date(value: &serde_json::Value) -> crate::Result<OffsetDateTime> {
    match value {
        serde_json::Value::String(s) => {
            if let Some(rest) = s.strip_prefix("/Date(") {
                let ms: i64 = rest
                    .strip_suffix(")/")
                    .and_then(|digits| digits.parse().ok())
                    .ok_or_else(|| Error::parse("PowerShell date", s.clone()))?;
                OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
                    .map_err(|_| Error::parse("PowerShell date", s.clone()))
            } else {
                OffsetDateTime::parse(s, &Rfc3339)
                    .map_err(|_| Error::parse("PowerShell date", s.clone()))
            }
        }
        serde_json::Value::Object(map) => match map.get("value") {
            Some(inner) => parse_ps_date(inner),
            None => Err(Error::parse("PowerShell date", value.to_string())),
        },
        other => Err(Error::parse("PowerShell date", other.to_string())),
    }
}

#[async_trait]
impl RemoteFs for WinFs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        _perm: u32,
    ) -> crate::Result<Box<dyn RemoteFile>> {
        flags.validate().map_err(|e| Error::op("open", name, e))?;

        let mode = if flags.contains(OpenFlags::APPEND) {
            "Append"
        } else if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
            "CreateNew"
        } else if flags.contains(OpenFlags::TRUNCATE) {
            if flags.contains(OpenFlags::CREATE) && !self.file_exist(name).await {
                "OpenOrCreate"
            } else {
                "Truncate"
            }
        } else if flags.contains(OpenFlags::CREATE) {
            "OpenOrCreate"
        } else {
            "Open"
        };
        let access = if flags.contains(OpenFlags::APPEND) {
            "Write"
        } else if flags.is_readable() && flags.is_writable() {
            "ReadWrite"
        } else if flags.is_writable() {
            "Write"
        } else {
            "Read"
        };

        let path = ps::to_windows_path(name);
        let agent = self.agent().await.map_err(|e| Error::op("open", name, e))?;
        let pos = {
            let mut io = agent.lock().await;
            let reply = io
                .request(&format!("o {mode} {access} {path}"))
                .await
                .map_err(|e| Error::op("open", name, e))?;
            if let Some(message) = reply.error {
                return Err(Error::op("open", name, agent::map_agent_error(name, &message)));
            }
            reply.pos.unwrap_or(0)
        };
        Ok(Box::new(WinFile::new(self.clone(), path, pos)))
    }

    async fn stat(&self, name: &str) -> crate::Result<FileInfo> {
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ Get-Item -LiteralPath {p} -Force | Select-Object {SELECT_FIELDS} | ConvertTo-Json -Compress }} else {{ '{{\"Err\":\"does not exist\"}}' }}"
        );
        let out = self.run_ps("stat", name, &script).await?;
        let item: WinItem = serde_json::from_str(&out)
            .map_err(|_| Error::op("stat", name, Error::parse("Get-Item output", out.clone())))?;
        if let Some(err) = &item.err {
            return Err(Error::op(
                "stat",
                name,
                agent::map_agent_error(name, err),
            ));
        }
        item.into_info().map_err(|e| Error::op("stat", name, e))
    }

    async fn read_dir(&self, name: &str) -> crate::Result<DirEntryBuffer> {
        let p = self.quoted(name);
        let script = format!(
            "if (-not (Test-Path -LiteralPath {p})) {{ '{{\"Err\":\"does not exist\"}}' }} else {{ ConvertTo-Json -Compress -Depth 5 -InputObject @(Get-ChildItem -LiteralPath {p} -Force | Select-Object {SELECT_FIELDS}) }}"
        );
        let out = self.run_ps("read dir", name, &script).await?;
        if let Ok(marker) = serde_json::from_str::<WinItem>(&out) {
            if let Some(err) = &marker.err {
                return Err(Error::op("read dir", name, agent::map_agent_error(name, err)));
            }
        }
        let items: Vec<WinItem> = serde_json::from_str(&out).map_err(|_| {
            Error::op(
                "read dir",
                name,
                Error::parse("Get-ChildItem output", out.clone()),
            )
        })?;
        let mut infos = Vec::with_capacity(items.len());
        for item in items {
            infos.push(item.into_info().map_err(|e| Error::op("read dir", name, e))?);
        }
        Ok(DirEntryBuffer::new(infos))
    }

    async fn read_file(&self, name: &str) -> crate::Result<Vec<u8>> {
        let mut file = self.open(name).await?;
        let buf = SharedBuffer::new();
        file.copy_to(Box::new(buf.clone())).await?;
        file.close().await?;
        Ok(buf.take())
    }

    async fn write_file(&self, name: &str, data: &[u8], _perm: u32) -> crate::Result<()> {
        let mut file = self
            .open_file(
                name,
                OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                0,
            )
            .await?;
        file.copy_from(Box::new(std::io::Cursor::new(data.to_vec())))
            .await?;
        file.close().await
    }

    async fn remove(&self, name: &str) -> crate::Result<()> {
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ Remove-Item -LiteralPath {p} -ErrorAction Stop }} else {{ throw 'does not exist' }}"
        );
        self.run_ps("remove", name, &script).await.map(|_| ())
    }

    async fn remove_all(&self, name: &str) -> crate::Result<()> {
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ Remove-Item -LiteralPath {p} -Recurse -Force -ErrorAction Stop }}"
        );
        self.run_ps("remove", name, &script).await.map(|_| ())
    }

    async fn mkdir(&self, name: &str, _perm: u32) -> crate::Result<()> {
        let p = self.quoted(name);
        let script = format!(
            "New-Item -ItemType Directory -Path {p} -ErrorAction Stop | Out-Null"
        );
        self.run_ps("mkdir", name, &script).await.map(|_| ())
    }

    async fn mkdir_all(&self, name: &str, _perm: u32) -> crate::Result<()> {
        let p = self.quoted(name);
        let script = format!(
            "New-Item -ItemType Directory -Force -Path {p} -ErrorAction Stop | Out-Null"
        );
        self.run_ps("mkdir", name, &script).await.map(|_| ())
    }

    async fn mkdir_temp(&self, dir: &str, pattern: &str) -> crate::Result<String> {
        let dir = if dir.is_empty() {
            self.temp_dir().await?
        } else {
            dir.to_string()
        };
        for _ in 0..3 {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(10)
                .map(char::from)
                .collect();
            let name = match pattern.rfind('*') {
                Some(idx) => format!("{}{}{}", &pattern[..idx], suffix, &pattern[idx + 1..]),
                None => format!("{pattern}{suffix}"),
            };
            let path = self.join(&[&dir, &name]);
            if self.file_exist(&path).await {
                continue;
            }
            self.mkdir(&path, 0o700).await?;
            return Ok(path);
        }
        Err(Error::op(
            "mkdir",
            dir,
            Error::Exists("temp name collisions".to_string()),
        ))
    }

    async fn rename(&self, old: &str, new: &str) -> crate::Result<()> {
        let from = self.quoted(old);
        let to = self.quoted(new);
        let script =
            format!("Move-Item -LiteralPath {from} -Destination {to} -Force -ErrorAction Stop");
        self.run_ps("rename", old, &script).await.map(|_| ())
    }

    async fn chmod(&self, name: &str, perm: u32) -> crate::Result<()> {
        // Windows has no permission bits; the writable bit maps to the
        // read-only attribute.
        let read_only = perm & 0o200 == 0;
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ Set-ItemProperty -LiteralPath {p} -Name IsReadOnly -Value ${read_only} -ErrorAction Stop }} else {{ throw 'does not exist' }}"
        );
        self.run_ps("chmod", name, &script).await.map(|_| ())
    }

    async fn chown(&self, name: &str, _uid: u32, _gid: u32) -> crate::Result<()> {
        Err(Error::op("chown", name, Error::UnsupportedPlatform("chown")))
    }

    async fn chtimes(
        &self,
        name: &str,
        _atime: OffsetDateTime,
        _mtime: OffsetDateTime,
    ) -> crate::Result<()> {
        Err(Error::op(
            "chtimes",
            name,
            Error::UnsupportedPlatform("chtimes"),
        ))
    }

    async fn touch(&self, name: &str) -> crate::Result<()> {
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ (Get-Item -LiteralPath {p} -Force).LastWriteTime = Get-Date }} else {{ New-Item -ItemType File -Path {p} -ErrorAction Stop | Out-Null }}"
        );
        self.run_ps("touch", name, &script).await.map(|_| ())
    }

    async fn truncate(&self, name: &str, size: u64) -> crate::Result<()> {
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ $f = [System.IO.File]::Open({p}, 'Open', 'Write', [System.IO.FileShare]::ReadWrite); $f.SetLength({size}); $f.Close() }} else {{ throw 'does not exist' }}"
        );
        self.run_ps("truncate", name, &script).await.map(|_| ())
    }

    async fn sha256(&self, name: &str) -> crate::Result<String> {
        let p = self.quoted(name);
        let script = format!(
            "if (Test-Path -LiteralPath {p}) {{ (Get-FileHash -LiteralPath {p} -Algorithm SHA256).Hash.ToLower() }} else {{ throw 'does not exist' }}"
        );
        let digest = self.run_ps("sha256", name, &script).await?;
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::op(
                "sha256",
                name,
                Error::parse("Get-FileHash output", digest),
            ));
        }
        Ok(digest)
    }

    async fn temp_dir(&self) -> crate::Result<String> {
        self.run_ps("getenv", "TEMP", "$env:TEMP").await
    }

    async fn user_home_dir(&self) -> crate::Result<String> {
        self.run_ps("getenv", "USERPROFILE", "$env:USERPROFILE").await
    }

    async fn user_cache_dir(&self) -> crate::Result<String> {
        self.run_ps("getenv", "LOCALAPPDATA", "$env:LOCALAPPDATA").await
    }

    async fn user_config_dir(&self) -> crate::Result<String> {
        self.run_ps("getenv", "APPDATA", "$env:APPDATA").await
    }

    async fn getenv(&self, key: &str) -> crate::Result<String> {
        let script = format!(
            "[Environment]::GetEnvironmentVariable({})",
            ps::single_quote(key)
        );
        self.run_ps("getenv", key, &script).await
    }

    async fn hostname(&self) -> crate::Result<String> {
        self.run_ps("hostname", "", "[Environment]::MachineName").await
    }

    async fn long_hostname(&self) -> crate::Result<String> {
        self.run_ps(
            "hostname",
            "",
            "[System.Net.Dns]::GetHostEntry($env:COMPUTERNAME).HostName",
        )
        .await
    }

    async fn file_exist(&self, name: &str) -> bool {
        let p = self.quoted(name);
        match self
            .run_ps("stat", name, &format!("Test-Path -LiteralPath {p}"))
            .await
        {
            Ok(out) => out.eq_ignore_ascii_case("true"),
            Err(_) => false,
        }
    }

    async fn look_path(&self, cmd: &str) -> crate::Result<String> {
        let script = format!(
            "$c = Get-Command {} -ErrorAction SilentlyContinue; if ($c) {{ $c.Source }}",
            ps::single_quote(cmd)
        );
        let out = self.run_ps("look path", cmd, &script).await?;
        if out.is_empty() {
            return Err(Error::op("look path", cmd, Error::NotExist(cmd.to_string())));
        }
        Ok(out)
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut out = String::new();
        for part in parts {
            let part = ps::to_windows_path(part);
            let trimmed = part.trim_end_matches('\\');
            if trimmed.is_empty() {
                continue;
            }
            if out.is_empty() {
                out.push_str(trimmed);
            } else {
                out.push('\\');
                out.push_str(trimmed.trim_start_matches('\\'));
            }
        }
        out
    }
}
