//! The remote filesystem layer.
//!
//! One surface, two implementations: [`PosixFs`] drives POSIX hosts with
//! plain shell commands and parses their output; [`WinFs`] drives Windows
//! hosts with PowerShell, keeping a long-running agent process for
//! random-access file I/O.

pub mod direntry;
pub mod flags;
pub mod info;
pub mod mode;
pub mod posix;
pub mod windows;

pub use direntry::DirEntryBuffer;
pub use flags::OpenFlags;
pub use info::FileInfo;
pub use mode::FileMode;
pub use posix::PosixFs;
pub use windows::WinFs;

use std::io::{Read, Write};

use async_trait::async_trait;
use time::OffsetDateTime;

/// Filesystem operations on a remote host.
///
/// Paths are remote-native strings; sentinel failures (`NotExist`,
/// `Exists`, `IsADirectory`, `Closed`, …) are uniform across both OS
/// families so callers can match on [`crate::Error`] without caring which
/// implementation served them.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Opens a file read-only.
    async fn open(&self, name: &str) -> crate::Result<Box<dyn RemoteFile>> {
        self.open_file(name, OpenFlags::READ_ONLY, 0).await
    }

    /// Opens a file with the given flags; `perm` applies when the file is
    /// created (ignored on Windows).
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        perm: u32,
    ) -> crate::Result<Box<dyn RemoteFile>>;

    async fn stat(&self, name: &str) -> crate::Result<FileInfo>;

    /// Lists a directory, sorted directories-first then alphabetically.
    /// The directory's own entry is never returned.
    async fn read_dir(&self, name: &str) -> crate::Result<DirEntryBuffer>;

    async fn read_file(&self, name: &str) -> crate::Result<Vec<u8>>;

    async fn write_file(&self, name: &str, data: &[u8], perm: u32) -> crate::Result<()>;

    /// Removes a file or an empty directory.
    async fn remove(&self, name: &str) -> crate::Result<()>;

    /// Removes a path recursively; missing paths are not an error.
    async fn remove_all(&self, name: &str) -> crate::Result<()>;

    async fn mkdir(&self, name: &str, perm: u32) -> crate::Result<()>;

    async fn mkdir_all(&self, name: &str, perm: u32) -> crate::Result<()>;

    /// Creates a uniquely named directory under `dir` (the host temp dir
    /// when empty). A `*` in `pattern` is replaced by the random suffix,
    /// otherwise the suffix is appended. Returns the new path.
    async fn mkdir_temp(&self, dir: &str, pattern: &str) -> crate::Result<String>;

    async fn rename(&self, old: &str, new: &str) -> crate::Result<()>;

    async fn chmod(&self, name: &str, perm: u32) -> crate::Result<()>;

    async fn chown(&self, name: &str, uid: u32, gid: u32) -> crate::Result<()>;

    async fn chtimes(
        &self,
        name: &str,
        atime: OffsetDateTime,
        mtime: OffsetDateTime,
    ) -> crate::Result<()>;

    /// Creates the file if missing, updates its timestamps otherwise.
    async fn touch(&self, name: &str) -> crate::Result<()>;

    async fn truncate(&self, name: &str, size: u64) -> crate::Result<()>;

    /// The remote-computed SHA-256 of the file, lowercase hex.
    async fn sha256(&self, name: &str) -> crate::Result<String>;

    async fn temp_dir(&self) -> crate::Result<String>;

    async fn user_home_dir(&self) -> crate::Result<String>;

    async fn user_cache_dir(&self) -> crate::Result<String>;

    async fn user_config_dir(&self) -> crate::Result<String>;

    async fn getenv(&self, key: &str) -> crate::Result<String>;

    async fn hostname(&self) -> crate::Result<String>;

    async fn long_hostname(&self) -> crate::Result<String>;

    async fn file_exist(&self, name: &str) -> bool;

    /// Resolves a command name through the remote PATH.
    async fn look_path(&self, cmd: &str) -> crate::Result<String>;

    /// Joins path elements with the remote separator.
    fn join(&self, parts: &[&str]) -> String;
}

/// An open remote file handle.
///
/// Positioning is handle-local: two handles on the same remote file do
/// not observe each other's writes. A caller needing coherence must
/// re-[`stat`](RemoteFile::stat) between uses.
#[async_trait]
pub trait RemoteFile: Send {
    /// Reads up to `buf.len()` bytes at the current position. `Ok(0)`
    /// signals end of file.
    async fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize>;

    /// Writes the whole buffer at the current position.
    async fn write(&mut self, buf: &[u8]) -> crate::Result<usize>;

    async fn seek(&mut self, pos: std::io::SeekFrom) -> crate::Result<u64>;

    /// Closes the handle; all further operations fail with `Closed`.
    async fn close(&mut self) -> crate::Result<()>;

    async fn stat(&self) -> crate::Result<FileInfo>;

    /// Streams from the current position to end of file into `writer`,
    /// returning the byte count.
    async fn copy_to(&mut self, writer: Box<dyn Write + Send>) -> crate::Result<u64>;

    /// Truncates at the current position and streams `reader` into the
    /// file, returning the byte count.
    async fn copy_from(&mut self, reader: Box<dyn Read + Send>) -> crate::Result<u64>;
}

impl std::fmt::Debug for dyn RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RemoteFile")
    }
}
