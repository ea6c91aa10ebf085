//! The POSIX remote filesystem: a full filesystem API implemented purely
//! by issuing shell commands through the runner and parsing their output.
//!
//! The only per-host state is a pair of idempotent first-use caches: the
//! stat dialect (GNU/BusyBox vs BSD format strings) and the touch
//! timestamp precision. Concurrent first use wastes a probe, nothing
//! more.

pub mod file;

pub use file::PosixFile;

use std::sync::Arc;

use async_trait::async_trait;
use farhost_shell::{CommandBuilder, quote};
use farhost_streams::SharedBuffer;
use farhost_transport::ProcessInput;
use rand::Rng;
use rand::distributions::Alphanumeric;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use tokio::sync::OnceCell;

use crate::exec::options::ExecOpts;
use crate::exec::runner::Runner;
use crate::fs::direntry::DirEntryBuffer;
use crate::fs::flags::OpenFlags;
use crate::fs::info::FileInfo;
use crate::fs::mode::FileMode;
use crate::fs::{RemoteFile, RemoteFs};
use crate::Error;

/// Command lines for a multi-stat batch stay under this size.
const STAT_BATCH_LEN: usize = 1024;

/// Which `stat` format template the remote host understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatDialect {
    /// GNU coreutils and BusyBox.
    Gnu,
    /// BSD/macOS stat.
    Bsd,
}

impl StatDialect {
    /// The stat invocation prefix; quoted paths are appended.
    fn template(self) -> &'static str {
        match self {
            StatDialect::Gnu => "env -i LC_ALL=C stat -c '%#f %s %.9Y //%n//' -- ",
            StatDialect::Bsd => "env -i LC_ALL=C stat -f '%#p %z %Fm //%N//' -- ",
        }
    }

    /// Queries the filesystem block size of a directory.
    fn block_size_command(self, dir: &str) -> String {
        match self {
            StatDialect::Gnu => format!("env -i LC_ALL=C stat -f -c '%s' -- {}", quote(dir)),
            StatDialect::Bsd => format!("env -i LC_ALL=C stat -f '%k' -- {}", quote(dir)),
        }
    }
}

/// Whether the remote `touch` accepts nanosecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChtimesPrecision {
    Nanosecond,
    Second,
}

const TOUCH_NS_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:9] +0000"
);

struct Inner {
    runner: Runner,
    stat_dialect: OnceCell<StatDialect>,
    chtimes: OnceCell<ChtimesPrecision>,
}

/// Filesystem access to a POSIX host through its shell.
#[derive(Clone)]
pub struct PosixFs {
    inner: Arc<Inner>,
}

/// The outcome of one remote command with both output streams captured.
pub(crate) struct CmdOutput {
    pub(crate) result: crate::Result<()>,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: String,
}

impl PosixFs {
    pub fn new(runner: Runner) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                stat_dialect: OnceCell::new(),
                chtimes: OnceCell::new(),
            }),
        }
    }

    pub fn runner(&self) -> &Runner {
        &self.inner.runner
    }

    /// Runs a command capturing both streams, without classifying the
    /// outcome.
    pub(crate) async fn run(&self, cmd: &str, stdin: Option<ProcessInput>) -> CmdOutput {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let mut builder = ExecOpts::builder()
            .stdout(Box::new(stdout.clone()))
            .stderr(Box::new(stderr.clone()))
            .hide_output();
        if let Some(stdin) = stdin {
            builder = builder.stdin(stdin);
        }
        let result = self.inner.runner.exec(cmd, builder.build()).await;
        CmdOutput {
            result,
            stdout: stdout.take(),
            stderr: String::from_utf8_lossy(&stderr.take()).into_owned(),
        }
    }

    /// Runs a command, mapping well-known stderr phrases to filesystem
    /// sentinels. Returns captured stdout.
    pub(crate) async fn run_classified(
        &self,
        op: &'static str,
        path: &str,
        cmd: &str,
        stdin: Option<ProcessInput>,
    ) -> crate::Result<Vec<u8>> {
        let out = self.run(cmd, stdin).await;
        match out.result {
            Ok(()) => Ok(out.stdout),
            Err(err) => Err(Error::op(op, path, classify_stderr(path, &out.stderr, err))),
        }
    }

    pub(crate) async fn dialect(&self) -> crate::Result<StatDialect> {
        self.inner
            .stat_dialect
            .get_or_try_init(|| async {
                let out = self.run("stat --help 2>&1", None).await;
                // BSD stat errors out on --help; the probe only cares
                // about the text, not the exit status.
                let text = String::from_utf8_lossy(&out.stdout);
                let dialect = if text.contains("BusyBox") || text.contains("--format=") {
                    StatDialect::Gnu
                } else {
                    StatDialect::Bsd
                };
                log::debug!(
                    "[{}] selected stat dialect {dialect:?}",
                    self.inner.runner.describe()
                );
                Ok(dialect)
            })
            .await
            .copied()
    }

    /// Stats a batch of paths with one command per [`STAT_BATCH_LEN`]
    /// worth of quoted names. Unstattable entries are skipped.
    pub(crate) async fn multi_stat(&self, names: &[String]) -> crate::Result<Vec<FileInfo>> {
        let dialect = self.dialect().await?;
        let mut infos = Vec::with_capacity(names.len());
        let mut batch = String::new();
        for name in names {
            let quoted = quote(name);
            if !batch.is_empty() && batch.len() + quoted.len() + 1 > STAT_BATCH_LEN {
                self.stat_batch(dialect, &batch, &mut infos).await?;
                batch.clear();
            }
            if !batch.is_empty() {
                batch.push(' ');
            }
            batch.push_str(&quoted);
        }
        if !batch.is_empty() {
            self.stat_batch(dialect, &batch, &mut infos).await?;
        }
        Ok(infos)
    }

    async fn stat_batch(
        &self,
        dialect: StatDialect,
        quoted_names: &str,
        infos: &mut Vec<FileInfo>,
    ) -> crate::Result<()> {
        let cmd = format!("{}{}", dialect.template(), quoted_names);
        let out = self.run(&cmd, None).await;
        // A vanished file fails the whole stat invocation but the
        // surviving entries are still printed; keep what parsed.
        if let Err(err) = out.result {
            log::debug!("partial stat batch failure: {err}");
        }
        for line in String::from_utf8_lossy(&out.stdout).lines() {
            if line.trim().is_empty() {
                continue;
            }
            infos.push(parse_stat_line(line)?);
        }
        Ok(())
    }

    async fn chtimes_command(
        &self,
        precision: ChtimesPrecision,
        name: &str,
        atime: OffsetDateTime,
        mtime: OffsetDateTime,
    ) -> crate::Result<()> {
        let quoted = quote(name).into_owned();
        let cmd = match precision {
            ChtimesPrecision::Nanosecond => {
                let atime = format_touch_ns(atime)?;
                let mtime = format_touch_ns(mtime)?;
                format!(
                    "env -i LC_ALL=C touch -a -d '{atime}' -- {quoted} && env -i LC_ALL=C touch -m -d '{mtime}' -- {quoted}"
                )
            }
            ChtimesPrecision::Second => format!(
                "env -i LC_ALL=C touch -a -d @{} -- {quoted} && env -i LC_ALL=C touch -m -d @{} -- {quoted}",
                atime.unix_timestamp(),
                mtime.unix_timestamp()
            ),
        };
        let out = self.run(&cmd, None).await;
        match out.result {
            Ok(()) => Ok(()),
            Err(err) => Err(classify_stderr(name, &out.stderr, err)),
        }
    }
}

#[async_trait]
impl RemoteFs for PosixFs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        perm: u32,
    ) -> crate::Result<Box<dyn RemoteFile>> {
        flags.validate().map_err(|e| Error::op("open", name, e))?;

        let existing = match self.stat(name).await {
            Ok(info) => Some(info),
            Err(e) if e.is_not_exist() => None,
            Err(e) => return Err(Error::op("open", name, e)),
        };

        let info = match existing {
            Some(info) => {
                if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                    return Err(Error::op("open", name, Error::Exists(name.to_string())));
                }
                if info.is_dir() && flags.is_writable() {
                    return Err(Error::op(
                        "open",
                        name,
                        Error::IsADirectory(name.to_string()),
                    ));
                }
                if flags.contains(OpenFlags::TRUNCATE) {
                    self.run_classified(
                        "truncate",
                        name,
                        &format!("truncate -s 0 -- {}", quote(name)),
                        None,
                    )
                    .await?;
                    self.stat(name).await?
                } else {
                    info
                }
            }
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(Error::op("open", name, Error::NotExist(name.to_string())));
                }
                let parent = dir_name(name);
                if let Err(e) = self.stat(&parent).await {
                    let e = if e.is_not_exist() {
                        Error::NotExist(parent.clone())
                    } else {
                        e
                    };
                    return Err(Error::op("open", name, e));
                }
                // install creates the file with the requested mode; the
                // re-stat captures the actual permissions after umask.
                self.run_classified(
                    "create",
                    name,
                    &format!("install -m {:o} /dev/null {}", perm & 0o7777, quote(name)),
                    None,
                )
                .await?;
                self.stat(name).await?
            }
        };

        let pos = if flags.contains(OpenFlags::APPEND) {
            info.size()
        } else {
            0
        };
        Ok(Box::new(PosixFile::new(
            self.clone(),
            name.to_string(),
            flags,
            pos,
            info.size(),
        )))
    }

    async fn stat(&self, name: &str) -> crate::Result<FileInfo> {
        let dialect = self.dialect().await?;
        let cmd = format!("{}{}", dialect.template(), quote(name));
        let stdout = self.run_classified("stat", name, &cmd, None).await?;
        let text = String::from_utf8_lossy(&stdout);
        let line = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::op("stat", name, Error::parse("stat output", text.clone())))?;
        parse_stat_line(line).map_err(|e| Error::op("stat", name, e))
    }

    async fn read_dir(&self, name: &str) -> crate::Result<DirEntryBuffer> {
        let cmd = CommandBuilder::new("find")
            .arg(name)
            .raw(" -maxdepth 1 -print0")
            .to_string();
        let stdout = self.run_classified("read dir", name, &cmd, None).await?;
        let text = String::from_utf8_lossy(&stdout);
        let mut items = text.split('\0').filter(|s| !s.is_empty());
        match items.next() {
            Some(first) if first == name => {}
            _ => {
                return Err(Error::op(
                    "read dir",
                    name,
                    Error::NotExist(name.to_string()),
                ));
            }
        }
        let children: Vec<String> = items.map(str::to_string).collect();
        let infos = self.multi_stat(&children).await?;
        Ok(DirEntryBuffer::new(infos))
    }

    async fn read_file(&self, name: &str) -> crate::Result<Vec<u8>> {
        self.run_classified("read", name, &format!("cat -- {}", quote(name)), None)
            .await
    }

    async fn write_file(&self, name: &str, data: &[u8], perm: u32) -> crate::Result<()> {
        let mut file = self
            .open_file(
                name,
                OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                perm,
            )
            .await?;
        file.copy_from(Box::new(std::io::Cursor::new(data.to_vec())))
            .await?;
        file.close().await
    }

    async fn remove(&self, name: &str) -> crate::Result<()> {
        let info = self.stat(name).await.map_err(|e| Error::op("remove", name, e))?;
        let cmd = if info.is_dir() {
            format!("rmdir -- {}", quote(name))
        } else {
            format!("rm -f -- {}", quote(name))
        };
        self.run_classified("remove", name, &cmd, None).await.map(|_| ())
    }

    async fn remove_all(&self, name: &str) -> crate::Result<()> {
        self.run_classified("remove", name, &format!("rm -rf -- {}", quote(name)), None)
            .await
            .map(|_| ())
    }

    async fn mkdir(&self, name: &str, perm: u32) -> crate::Result<()> {
        self.run_classified(
            "mkdir",
            name,
            &format!("mkdir -m {:o} -- {}", perm & 0o7777, quote(name)),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn mkdir_all(&self, name: &str, perm: u32) -> crate::Result<()> {
        self.run_classified(
            "mkdir",
            name,
            &format!("install -d -m {:o} -- {}", perm & 0o7777, quote(name)),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn mkdir_temp(&self, dir: &str, pattern: &str) -> crate::Result<String> {
        let dir = if dir.is_empty() {
            self.temp_dir().await?
        } else {
            dir.to_string()
        };
        for _ in 0..3 {
            let path = join_posix(&dir, &random_name(pattern));
            match self.mkdir(&path, 0o700).await {
                Ok(()) => return Ok(path),
                Err(e) if e.is_exists() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::op(
            "mkdir",
            dir,
            Error::Exists("temp name collisions".to_string()),
        ))
    }

    async fn rename(&self, old: &str, new: &str) -> crate::Result<()> {
        self.run_classified(
            "rename",
            old,
            &format!("mv -f -- {} {}", quote(old), quote(new)),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn chmod(&self, name: &str, perm: u32) -> crate::Result<()> {
        self.run_classified(
            "chmod",
            name,
            &format!("chmod {:o} -- {}", perm & 0o7777, quote(name)),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn chown(&self, name: &str, uid: u32, gid: u32) -> crate::Result<()> {
        self.run_classified(
            "chown",
            name,
            &format!("chown {uid}:{gid} -- {}", quote(name)),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn chtimes(
        &self,
        name: &str,
        atime: OffsetDateTime,
        mtime: OffsetDateTime,
    ) -> crate::Result<()> {
        if let Some(&precision) = self.inner.chtimes.get() {
            return self
                .chtimes_command(precision, name, atime, mtime)
                .await
                .map_err(|e| Error::op("chtimes", name, e));
        }
        // Probe: try nanosecond syntax once; on failure fall back to
        // second precision permanently. A remote touch that accepts the
        // syntax but silently truncates yields a false positive; there is
        // no error to detect that case by.
        match self
            .chtimes_command(ChtimesPrecision::Nanosecond, name, atime, mtime)
            .await
        {
            Ok(()) => {
                let _ = self.inner.chtimes.set(ChtimesPrecision::Nanosecond);
                Ok(())
            }
            Err(e) if e.is_not_exist() => Err(Error::op("chtimes", name, e)),
            Err(_) => {
                let _ = self.inner.chtimes.set(ChtimesPrecision::Second);
                self.chtimes_command(ChtimesPrecision::Second, name, atime, mtime)
                    .await
                    .map_err(|e| Error::op("chtimes", name, e))
            }
        }
    }

    async fn touch(&self, name: &str) -> crate::Result<()> {
        self.run_classified("touch", name, &format!("touch -- {}", quote(name)), None)
            .await
            .map(|_| ())
    }

    async fn truncate(&self, name: &str, size: u64) -> crate::Result<()> {
        self.run_classified(
            "truncate",
            name,
            &format!("truncate -s {size} -- {}", quote(name)),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn sha256(&self, name: &str) -> crate::Result<String> {
        let stdout = self
            .run_classified("sha256", name, &format!("sha256sum -b {}", quote(name)), None)
            .await?;
        let text = String::from_utf8_lossy(&stdout);
        let digest = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::op(
                "sha256",
                name,
                Error::parse("sha256sum output", text.trim()),
            ));
        }
        Ok(digest)
    }

    async fn temp_dir(&self) -> crate::Result<String> {
        self.inner
            .runner
            .exec_output("printf '%s' \"${TMPDIR:-/tmp}\"", ExecOpts::builder().build())
            .await
    }

    async fn user_home_dir(&self) -> crate::Result<String> {
        self.getenv("HOME").await
    }

    async fn user_cache_dir(&self) -> crate::Result<String> {
        self.inner
            .runner
            .exec_output(
                "printf '%s' \"${XDG_CACHE_HOME:-$HOME/.cache}\"",
                ExecOpts::builder().build(),
            )
            .await
    }

    async fn user_config_dir(&self) -> crate::Result<String> {
        self.inner
            .runner
            .exec_output(
                "printf '%s' \"${XDG_CONFIG_HOME:-$HOME/.config}\"",
                ExecOpts::builder().build(),
            )
            .await
    }

    async fn getenv(&self, key: &str) -> crate::Result<String> {
        if !valid_env_key(key) {
            return Err(Error::InvalidArgument(format!(
                "invalid environment variable name {key:?}"
            )));
        }
        self.inner
            .runner
            .exec_output(
                &format!("printf '%s' \"${{{key}}}\""),
                ExecOpts::builder().build(),
            )
            .await
    }

    async fn hostname(&self) -> crate::Result<String> {
        self.inner
            .runner
            .exec_output("hostname", ExecOpts::builder().build())
            .await
    }

    async fn long_hostname(&self) -> crate::Result<String> {
        match self
            .inner
            .runner
            .exec_output("hostname -f", ExecOpts::builder().build())
            .await
        {
            Ok(name) if !name.is_empty() => Ok(name),
            _ => self.hostname().await,
        }
    }

    async fn file_exist(&self, name: &str) -> bool {
        self.inner
            .runner
            .exec(&format!("test -e {}", quote(name)), ExecOpts::builder().build())
            .await
            .is_ok()
    }

    async fn look_path(&self, cmd: &str) -> crate::Result<String> {
        let out = self
            .inner
            .runner
            .exec_output(&format!("command -v {}", quote(cmd)), ExecOpts::builder().build())
            .await
            .map_err(|_| Error::op("look path", cmd, Error::NotExist(cmd.to_string())))?;
        if out.is_empty() {
            return Err(Error::op("look path", cmd, Error::NotExist(cmd.to_string())));
        }
        Ok(out)
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut out = String::new();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            out = join_posix(&out, part);
        }
        out
    }
}

/// Maps well-known shell error phrases onto filesystem sentinels; other
/// failures keep their transport error.
pub(crate) fn classify_stderr(path: &str, stderr: &str, err: Error) -> Error {
    if stderr.contains("No such file or directory") {
        Error::NotExist(path.to_string())
    } else if stderr.contains("File exists") {
        Error::Exists(path.to_string())
    } else if stderr.contains("Is a directory") {
        Error::IsADirectory(path.to_string())
    } else {
        err
    }
}

/// Parses one line of stat output:
/// `<mode> <size> <seconds>.<nanos> //<name>//`. The mode is hex with a
/// `0x` prefix (GNU `%#f`) or octal (BSD `%#p`); the name is wrapped in
/// `//` sentinels to survive spaces.
pub(crate) fn parse_stat_line(line: &str) -> crate::Result<FileInfo> {
    let line = line.trim_end();
    let sep = line
        .find(" //")
        .ok_or_else(|| Error::parse("stat line", line))?;
    let path = line[sep + 3..]
        .strip_suffix("//")
        .ok_or_else(|| Error::parse("stat line", line))?;

    let mut fields = line[..sep].split_whitespace();
    let (mode_s, size_s, mtime_s) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(mode), Some(size), Some(mtime), None) => (mode, size, mtime),
        _ => return Err(Error::parse("stat line", line)),
    };

    let mode = match mode_s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => u32::from_str_radix(mode_s, 8),
    }
    .map_err(|_| Error::parse("stat mode", mode_s))?;

    let size: u64 = size_s
        .parse()
        .map_err(|_| Error::parse("stat size", size_s))?;

    let (secs_s, frac_s) = mtime_s.split_once('.').unwrap_or((mtime_s, ""));
    let secs: i64 = secs_s
        .parse()
        .map_err(|_| Error::parse("stat mtime", mtime_s))?;
    let nanos: u32 = if frac_s.is_empty() {
        0
    } else {
        format!("{frac_s:0<9}")
            .get(..9)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::parse("stat mtime", mtime_s))?
    };
    let modified = OffsetDateTime::from_unix_timestamp_nanos(secs as i128 * 1_000_000_000 + nanos as i128)
        .map_err(|_| Error::parse("stat mtime", mtime_s))?;

    Ok(FileInfo::new(
        base_name(path),
        path,
        size,
        FileMode::new(mode),
        modified,
    ))
}

fn format_touch_ns(t: OffsetDateTime) -> crate::Result<String> {
    t.to_offset(time::UtcOffset::UTC)
        .format(&TOUCH_NS_FORMAT)
        .map_err(|e| Error::InvalidArgument(format!("unformattable timestamp: {e}")))
}

pub(crate) fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub(crate) fn dir_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => ".".to_string(),
    }
}

fn join_posix(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn random_name(pattern: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    match pattern.rfind('*') {
        Some(idx) => format!("{}{}{}", &pattern[..idx], suffix, &pattern[idx + 1..]),
        None => format!("{pattern}{suffix}"),
    }
}

fn valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gnu_stat_line() {
        let info = parse_stat_line("0x81a4 1234 1699970097.220228000 //test.txt//").unwrap();
        assert_eq!(info.name(), "test.txt");
        assert_eq!(info.path(), "test.txt");
        assert_eq!(info.size(), 1234);
        assert!(!info.is_dir());
        assert!(info.mode().is_regular());
        assert_eq!(info.mode().perm(), 0o644);
        assert_eq!(info.modified().unix_timestamp(), 1699970097);
        assert_eq!(info.modified().nanosecond(), 220228000);
    }

    #[test]
    fn test_parse_bsd_stat_line() {
        let info = parse_stat_line("040755 96 1699970097.000000000 ///tmp/some dir//").unwrap();
        assert_eq!(info.name(), "some dir");
        assert_eq!(info.path(), "/tmp/some dir");
        assert!(info.is_dir());
        assert_eq!(info.mode().perm(), 0o755);
    }

    #[test]
    fn test_parse_stat_line_name_with_spaces() {
        let info = parse_stat_line("0x81a4 7 1699970097.5 //a b c.txt//").unwrap();
        assert_eq!(info.name(), "a b c.txt");
        // Fractional seconds are right-padded to nanoseconds.
        assert_eq!(info.modified().nanosecond(), 500_000_000);
    }

    #[test]
    fn test_parse_stat_line_garbage() {
        assert!(parse_stat_line("not a stat line").is_err());
        assert!(parse_stat_line("0xZZ 1 2 //x//").is_err());
        assert!(parse_stat_line("0x81a4 nope 2 //x//").is_err());
    }

    #[test]
    fn test_base_and_dir_name() {
        assert_eq!(base_name("/a/b/c.txt"), "c.txt");
        assert_eq!(base_name("/a/b/"), "b");
        assert_eq!(base_name("plain"), "plain");
        assert_eq!(base_name("/"), "/");
        assert_eq!(dir_name("/a/b/c.txt"), "/a/b");
        assert_eq!(dir_name("/a"), "/");
        assert_eq!(dir_name("plain"), ".");
    }

    #[test]
    fn test_random_name_replaces_star() {
        let name = random_name("prefix-*.d");
        assert!(name.starts_with("prefix-"));
        assert!(name.ends_with(".d"));
        assert_eq!(name.len(), "prefix-".len() + 10 + ".d".len());
        let plain = random_name("work");
        assert!(plain.starts_with("work"));
        assert_eq!(plain.len(), 14);
    }

    #[test]
    fn test_valid_env_key() {
        assert!(valid_env_key("HOME"));
        assert!(valid_env_key("_X1"));
        assert!(!valid_env_key("1X"));
        assert!(!valid_env_key("PATH; rm -rf /"));
        assert!(!valid_env_key(""));
    }

    #[test]
    fn test_classify_stderr() {
        let base = Error::NoSudo;
        assert!(matches!(
            classify_stderr("/x", "stat: cannot stat '/x': No such file or directory", base),
            Error::NotExist(_)
        ));
        assert!(matches!(
            classify_stderr("/x", "mkdir: cannot create directory '/x': File exists", Error::NoSudo),
            Error::Exists(_)
        ));
        assert!(matches!(
            classify_stderr("/x", "cat: /x: Is a directory", Error::NoSudo),
            Error::IsADirectory(_)
        ));
    }
}
