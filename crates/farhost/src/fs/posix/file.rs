//! Random-access I/O on a POSIX remote file via `dd`.
//!
//! The position is maintained client-side; every read and write issues a
//! fresh `dd` with `skip`/`seek` computed from it. Two handles on the same
//! remote file will not observe each other's writes.

use std::io::{Read, SeekFrom, Write};

use async_trait::async_trait;
use farhost_shell::quote;
use farhost_streams::{CountingReader, CountingWriter, SharedBuffer};
use farhost_transport::ProcessInput;

use crate::Error;
use crate::fs::flags::OpenFlags;
use crate::fs::info::FileInfo;
use crate::fs::posix::{PosixFs, classify_stderr, dir_name};
use crate::fs::{RemoteFile, RemoteFs};

const DEFAULT_BLOCK_SIZE: u64 = 4096;

pub struct PosixFile {
    fs: PosixFs,
    path: String,
    flags: OpenFlags,
    pos: u64,
    size: u64,
    eof: bool,
    closed: bool,
    block_size: Option<u64>,
}

/// `dd` transfer geometry for one operation.
#[derive(Debug, PartialEq, Eq)]
struct Geometry {
    bs: u64,
    skip: u64,
    count: u64,
}

/// Picks the largest usable block size: the filesystem block size when
/// both the position and length align to it, byte-at-a-time otherwise.
fn geometry(pos: u64, len: u64, block_size: u64) -> Geometry {
    if len > 0 && len % block_size == 0 && pos % block_size == 0 {
        Geometry {
            bs: block_size,
            skip: pos / block_size,
            count: len / block_size,
        }
    } else {
        Geometry {
            bs: 1,
            skip: pos,
            count: len,
        }
    }
}

/// Geometry for open-ended transfers (no length): block-sized when the
/// position aligns.
fn tail_geometry(pos: u64, block_size: u64) -> (u64, u64) {
    if pos % block_size == 0 {
        (block_size, pos / block_size)
    } else {
        (1, pos)
    }
}

impl PosixFile {
    pub(crate) fn new(fs: PosixFs, path: String, flags: OpenFlags, pos: u64, size: u64) -> Self {
        Self {
            fs,
            path,
            flags,
            pos,
            size,
            eof: pos >= size,
            closed: false,
            block_size: None,
        }
    }

    fn check_open(&self) -> crate::Result<()> {
        if self.closed {
            return Err(Error::Closed(self.path.clone()));
        }
        Ok(())
    }

    fn check_readable(&self) -> crate::Result<()> {
        self.check_open()?;
        if !self.flags.is_readable() {
            return Err(Error::InvalidArgument(format!(
                "{} is not open for reading",
                self.path
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> crate::Result<()> {
        self.check_open()?;
        if !self.flags.is_writable() {
            return Err(Error::InvalidArgument(format!(
                "{} is not open for writing",
                self.path
            )));
        }
        Ok(())
    }

    /// The filesystem block size of the parent directory, queried once and
    /// cached; anything unparseable falls back to 4 KiB.
    async fn block_size(&mut self) -> crate::Result<u64> {
        if let Some(bs) = self.block_size {
            return Ok(bs);
        }
        let dialect = self.fs.dialect().await?;
        let cmd = dialect.block_size_command(&dir_name(&self.path));
        let out = self.fs.run(&cmd, None).await;
        let bs = match out.result {
            Ok(()) => String::from_utf8_lossy(&out.stdout)
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&bs| bs > 0)
                .unwrap_or(DEFAULT_BLOCK_SIZE),
            Err(_) => DEFAULT_BLOCK_SIZE,
        };
        self.block_size = Some(bs);
        Ok(bs)
    }
}

#[async_trait]
impl RemoteFile for PosixFile {
    async fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        self.check_readable()
            .map_err(|e| Error::op("read", &*self.path, e))?;
        if self.eof || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len() as u64;
        let block_size = self.block_size().await?;
        let geo = geometry(self.pos, len, block_size);
        let cmd = format!(
            "dd if={} bs={} skip={} count={}",
            quote(&self.path),
            geo.bs,
            geo.skip,
            geo.count
        );
        let out = self
            .fs
            .run_classified("read", &self.path, &cmd, None)
            .await?;
        let actual = out.len().min(buf.len());
        buf[..actual].copy_from_slice(&out[..actual]);
        self.pos += actual as u64;
        if (actual as u64) < len || self.pos >= self.size {
            self.eof = true;
        }
        Ok(actual)
    }

    async fn write(&mut self, buf: &[u8]) -> crate::Result<usize> {
        self.check_writable()
            .map_err(|e| Error::op("write", &*self.path, e))?;
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len() as u64;
        let block_size = self.block_size().await?;
        let geo = geometry(self.pos, len, block_size);
        let cmd = format!(
            "dd if=/dev/stdin of={} bs={} count={} seek={} conv=notrunc",
            quote(&self.path),
            geo.bs,
            geo.count,
            geo.skip
        );
        self.fs
            .run_classified(
                "write",
                &self.path,
                &cmd,
                Some(ProcessInput::bytes(buf.to_vec())),
            )
            .await?;
        self.pos += len;
        if self.pos > self.size {
            self.size = self.pos;
        }
        self.eof = self.pos >= self.size;
        Ok(buf.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> crate::Result<u64> {
        self.check_open()
            .map_err(|e| Error::op("seek", &*self.path, e))?;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.size as i64 + delta,
        };
        if target < 0 {
            return Err(Error::op(
                "seek",
                &*self.path,
                Error::InvalidArgument(format!("negative position {target}")),
            ));
        }
        self.pos = target as u64;
        self.eof = self.pos >= self.size;
        Ok(self.pos)
    }

    async fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.flags.is_writable() && self.flags.contains(OpenFlags::SYNC) {
            self.fs
                .run_classified("sync", &self.path, "sync", None)
                .await?;
        }
        self.closed = true;
        Ok(())
    }

    async fn stat(&self) -> crate::Result<FileInfo> {
        self.fs.stat(&self.path).await
    }

    async fn copy_to(&mut self, writer: Box<dyn Write + Send>) -> crate::Result<u64> {
        self.check_readable()
            .map_err(|e| Error::op("read", &*self.path, e))?;
        let block_size = self.block_size().await?;
        let (bs, skip) = tail_geometry(self.pos, block_size);
        let counting = CountingWriter::new(writer);
        let counter = counting.counter();

        let stderr = SharedBuffer::new();
        let opts = crate::exec::options::ExecOpts::builder()
            .stdout(Box::new(counting))
            .stderr(Box::new(stderr.clone()))
            .hide_output()
            .build();
        let cmd = format!("dd if={} bs={bs} skip={skip}", quote(&self.path));
        if let Err(err) = self.fs.runner().exec(&cmd, opts).await {
            let stderr = String::from_utf8_lossy(&stderr.take()).into_owned();
            return Err(Error::op(
                "read",
                &*self.path,
                classify_stderr(&self.path, &stderr, err),
            ));
        }
        let n = counter.load(std::sync::atomic::Ordering::Relaxed);
        self.pos += n;
        self.eof = true;
        Ok(n)
    }

    async fn copy_from(&mut self, reader: Box<dyn Read + Send>) -> crate::Result<u64> {
        self.check_writable()
            .map_err(|e| Error::op("write", &*self.path, e))?;
        // Drop whatever lies beyond the current position first; dd below
        // runs with conv=notrunc.
        self.fs
            .run_classified(
                "truncate",
                &self.path,
                &format!("truncate -s {} -- {}", self.pos, quote(&self.path)),
                None,
            )
            .await?;

        let block_size = self.block_size().await?;
        let (bs, seek) = tail_geometry(self.pos, block_size);
        let counting = CountingReader::new(reader);
        let counter = counting.counter();
        let cmd = format!(
            "dd if=/dev/stdin of={} bs={bs} seek={seek} conv=notrunc",
            quote(&self.path)
        );
        self.fs
            .run_classified(
                "write",
                &self.path,
                &cmd,
                Some(ProcessInput::reader(Box::new(counting))),
            )
            .await?;
        let n = counter.load(std::sync::atomic::Ordering::Relaxed);
        self.pos += n;
        self.size = self.pos;
        self.eof = true;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_aligned() {
        let geo = geometry(8192, 4096, 4096);
        assert_eq!(
            geo,
            Geometry {
                bs: 4096,
                skip: 2,
                count: 1
            }
        );
    }

    #[test]
    fn test_geometry_unaligned_length() {
        let geo = geometry(4096, 100, 4096);
        assert_eq!(
            geo,
            Geometry {
                bs: 1,
                skip: 4096,
                count: 100
            }
        );
    }

    #[test]
    fn test_geometry_unaligned_position() {
        // A block-multiple length still cannot use block addressing when
        // the position is off-grid.
        let geo = geometry(100, 4096, 4096);
        assert_eq!(
            geo,
            Geometry {
                bs: 1,
                skip: 100,
                count: 4096
            }
        );
    }

    #[test]
    fn test_tail_geometry() {
        assert_eq!(tail_geometry(8192, 4096), (4096, 2));
        assert_eq!(tail_geometry(100, 4096), (1, 100));
        assert_eq!(tail_geometry(0, 4096), (4096, 0));
    }
}
