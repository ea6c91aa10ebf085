//! A Windows remote file handle backed by the agent co-process.
//!
//! Position and end-of-file are authoritative on the agent side; the
//! local fields mirror the replies. The agent serves one open file at a
//! time, so opening a second file before closing the first fails.

use std::io::{Read, SeekFrom, Write};

use async_trait::async_trait;

use crate::Error;
use crate::fs::info::FileInfo;
use crate::fs::windows::WinFs;
use crate::fs::windows::agent::map_agent_error;
use crate::fs::{RemoteFile, RemoteFs};

const WRITE_CHUNK: usize = 64 * 1024;

pub struct WinFile {
    fs: WinFs,
    path: String,
    pos: i64,
    eof: bool,
    closed: bool,
}

impl WinFile {
    pub(crate) fn new(fs: WinFs, path: String, pos: i64) -> Self {
        Self {
            fs,
            path,
            pos,
            eof: false,
            closed: false,
        }
    }

    fn check_open(&self) -> crate::Result<()> {
        if self.closed {
            return Err(Error::Closed(self.path.clone()));
        }
        Ok(())
    }

    fn whence(pos: SeekFrom) -> (i64, &'static str) {
        match pos {
            SeekFrom::Start(offset) => (offset as i64, "Begin"),
            SeekFrom::Current(delta) => (delta, "Current"),
            SeekFrom::End(delta) => (delta, "End"),
        }
    }
}

#[async_trait]
impl RemoteFile for WinFile {
    async fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        self.check_open().map_err(|e| Error::op("read", &*self.path, e))?;
        if self.eof || buf.is_empty() {
            return Ok(0);
        }
        let agent = self.fs.agent().await?;
        let mut io = agent.lock().await;
        let reply = io
            .request(&format!("r {}", buf.len()))
            .await
            .map_err(|e| Error::op("read", &*self.path, e))?;
        if let Some(message) = reply.error {
            if message == "eof" {
                self.eof = true;
                return Ok(0);
            }
            return Err(Error::op(
                "read",
                &*self.path,
                map_agent_error(&self.path, &message),
            ));
        }
        let n = reply.n.unwrap_or(0).max(0) as usize;
        if n == 0 {
            self.eof = true;
            return Ok(0);
        }
        let payload = io
            .read_payload(n)
            .await
            .map_err(|e| Error::op("read", &*self.path, e))?;
        drop(io);
        buf[..n].copy_from_slice(&payload);
        self.pos += n as i64;
        if n < buf.len() {
            self.eof = true;
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> crate::Result<usize> {
        self.check_open().map_err(|e| Error::op("write", &*self.path, e))?;
        if buf.is_empty() {
            return Ok(0);
        }
        let agent = self.fs.agent().await?;
        let mut io = agent.lock().await;
        let reply = io
            .request(&format!("w {}", buf.len()))
            .await
            .map_err(|e| Error::op("write", &*self.path, e))?;
        if let Some(message) = reply.error {
            return Err(Error::op(
                "write",
                &*self.path,
                map_agent_error(&self.path, &message),
            ));
        }
        io.write_payload(buf)
            .map_err(|e| Error::op("write", &*self.path, e))?;
        drop(io);
        self.pos += buf.len() as i64;
        self.eof = false;
        Ok(buf.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> crate::Result<u64> {
        self.check_open().map_err(|e| Error::op("seek", &*self.path, e))?;
        let (offset, whence) = Self::whence(pos);
        let agent = self.fs.agent().await?;
        let mut io = agent.lock().await;
        let reply = io
            .request(&format!("s {offset} {whence}"))
            .await
            .map_err(|e| Error::op("seek", &*self.path, e))?;
        if let Some(message) = reply.error {
            return Err(Error::op(
                "seek",
                &*self.path,
                map_agent_error(&self.path, &message),
            ));
        }
        self.pos = reply.pos.unwrap_or(0);
        self.eof = false;
        Ok(self.pos.max(0) as u64)
    }

    async fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        let agent = self.fs.agent().await?;
        let mut io = agent.lock().await;
        let reply = io
            .request("c")
            .await
            .map_err(|e| Error::op("close", &*self.path, e))?;
        if let Some(message) = reply.error {
            return Err(Error::op(
                "close",
                &*self.path,
                map_agent_error(&self.path, &message),
            ));
        }
        self.closed = true;
        Ok(())
    }

    async fn stat(&self) -> crate::Result<FileInfo> {
        self.fs.stat(&self.path).await
    }

    async fn copy_to(&mut self, writer: Box<dyn Write + Send>) -> crate::Result<u64> {
        self.check_open().map_err(|e| Error::op("read", &*self.path, e))?;
        let mut writer = writer;
        let agent = self.fs.agent().await?;
        let mut io = agent.lock().await;
        let reply = io
            .request("r -1")
            .await
            .map_err(|e| Error::op("read", &*self.path, e))?;
        if let Some(message) = reply.error {
            if message == "eof" {
                self.eof = true;
                return Ok(0);
            }
            return Err(Error::op(
                "read",
                &*self.path,
                map_agent_error(&self.path, &message),
            ));
        }
        let n = reply.n.unwrap_or(0).max(0) as u64;
        io.read_payload_into(&mut *writer, n)
            .await
            .map_err(|e| Error::op("read", &*self.path, e))?;
        drop(io);
        writer.flush()?;
        self.pos += n as i64;
        self.eof = true;
        Ok(n)
    }

    async fn copy_from(&mut self, reader: Box<dyn Read + Send>) -> crate::Result<u64> {
        self.check_open().map_err(|e| Error::op("write", &*self.path, e))?;
        let mut reader = reader;
        let mut total = 0u64;
        let mut chunk = vec![0u8; WRITE_CHUNK];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            self.write(&chunk[..n]).await?;
            total += n as u64;
        }
        Ok(total)
    }
}
