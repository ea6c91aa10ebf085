//! End-to-end behavior against the loop-back transport with a real
//! shell: the POSIX filesystem drives actual `stat`, `dd`, `find` and
//! friends on the local machine.

#![cfg(unix)]

use std::io::SeekFrom;
use std::sync::Arc;

use farhost::{
    ExecOpts, Host, LocalTransport, OpenFlags, PosixFs, RemoteFile, RemoteFs, Runner,
};
use farhost_streams::SharedBuffer;
use sha2::{Digest, Sha256};

fn local_fs() -> PosixFs {
    PosixFs::new(Runner::new(Arc::new(LocalTransport::new())))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[test_log::test(tokio::test)]
async fn test_exec_output_round_trip() {
    let runner = Runner::new(Arc::new(LocalTransport::new()));
    let out = runner
        .exec_output("echo hello world", ExecOpts::default())
        .await
        .unwrap();
    assert_eq!(out, "hello world");
}

#[test_log::test(tokio::test)]
async fn test_write_file_read_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    fs.write_file(path, &payload, 0o644).await.unwrap();
    assert_eq!(fs.read_file(path).await.unwrap(), payload);

    let info = fs.stat(path).await.unwrap();
    assert_eq!(info.size(), payload.len() as u64);
    assert!(info.mode().is_regular());
}

#[test_log::test(tokio::test)]
async fn test_remote_sha256_matches_local_digest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashme");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    let payload = b"content to hash across the wire";
    fs.write_file(path, payload, 0o644).await.unwrap();
    assert_eq!(
        fs.sha256(path).await.unwrap(),
        hex(&Sha256::digest(payload))
    );
}

#[test_log::test(tokio::test)]
async fn test_copy_from_then_copy_to_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    let payload: Vec<u8> = (0..5_000u32).flat_map(|i| i.to_le_bytes()).collect();
    let mut file = fs
        .open_file(
            path,
            OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            0o600,
        )
        .await
        .unwrap();
    let written = file
        .copy_from(Box::new(std::io::Cursor::new(payload.clone())))
        .await
        .unwrap();
    assert_eq!(written, payload.len() as u64);

    file.seek(SeekFrom::Start(0)).await.unwrap();
    let sink = SharedBuffer::new();
    let read = file.copy_to(Box::new(sink.clone())).await.unwrap();
    file.close().await.unwrap();
    assert_eq!(read, payload.len() as u64);
    assert_eq!(sink.take(), payload);
}

#[test_log::test(tokio::test)]
async fn test_seek_and_partial_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seekable");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    fs.write_file(path, b"0123456789", 0o644).await.unwrap();
    let mut file = fs.open(path).await.unwrap();
    file.seek(SeekFrom::Start(4)).await.unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(file.read(&mut buf).await.unwrap(), 3);
    assert_eq!(&buf, b"456");
    file.seek(SeekFrom::End(-2)).await.unwrap();
    let mut buf = [0u8; 8];
    let n = file.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"89");
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);
    file.close().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_open_truncate_zeroes_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunc");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    fs.write_file(path, b"old content", 0o644).await.unwrap();
    let mut file = fs
        .open_file(path, OpenFlags::WRITE_ONLY | OpenFlags::TRUNCATE, 0)
        .await
        .unwrap();
    file.close().await.unwrap();
    assert_eq!(fs.stat(path).await.unwrap().size(), 0);
}

#[test_log::test(tokio::test)]
async fn test_open_exclusive_and_missing_sentinels() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("here");
    let existing = existing.to_str().unwrap();
    let fs = local_fs();
    fs.write_file(existing, b"x", 0o644).await.unwrap();

    let err = fs
        .open_file(
            existing,
            OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
            0o644,
        )
        .await
        .unwrap_err();
    assert!(err.is_exists());

    let missing = dir.path().join("nowhere");
    let err = fs
        .open(missing.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(err.is_not_exist());
}

#[test_log::test(tokio::test)]
async fn test_read_dir_ordering_and_self_exclusion() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap();
    let fs = local_fs();

    fs.write_file(&format!("{base}/zz-file"), b"f", 0o644)
        .await
        .unwrap();
    fs.mkdir(&format!("{base}/aa-dir"), 0o755).await.unwrap();
    fs.mkdir(&format!("{base}/zz-dir"), 0o755).await.unwrap();
    fs.write_file(&format!("{base}/aa-file"), b"f", 0o644)
        .await
        .unwrap();

    let entries: Vec<_> = fs.read_dir(base).await.unwrap().collect();
    let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["aa-dir", "zz-dir", "aa-file", "zz-file"]);
    assert!(!names.iter().any(|&n| format!("{base}/{n}") == *base));
}

#[test_log::test(tokio::test)]
async fn test_mkdir_temp_and_remove_all() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap();
    let fs = local_fs();

    let tmp = fs.mkdir_temp(base, "scratch-*").await.unwrap();
    assert!(tmp.starts_with(&format!("{base}/scratch-")));
    assert!(fs.file_exist(&tmp).await);
    fs.write_file(&fs.join(&[&tmp, "inner"]), b"x", 0o644)
        .await
        .unwrap();
    fs.remove_all(&tmp).await.unwrap();
    assert!(!fs.file_exist(&tmp).await);
}

#[test_log::test(tokio::test)]
async fn test_chmod_is_visible_in_stat() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modes");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    fs.write_file(path, b"x", 0o644).await.unwrap();
    fs.chmod(path, 0o600).await.unwrap();
    assert_eq!(fs.stat(path).await.unwrap().mode().perm(), 0o600);
}

#[test_log::test(tokio::test)]
async fn test_chtimes_sets_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stamped");
    let path = path.to_str().unwrap();
    let fs = local_fs();

    fs.write_file(path, b"x", 0o644).await.unwrap();
    let t = time::OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap();
    fs.chtimes(path, t, t).await.unwrap();
    assert_eq!(
        fs.stat(path).await.unwrap().modified().unix_timestamp(),
        1_600_000_000
    );
}

#[test_log::test(tokio::test)]
async fn test_getenv_and_temp_dir() {
    let fs = local_fs();
    assert!(!fs.getenv("HOME").await.unwrap().is_empty());
    assert!(!fs.temp_dir().await.unwrap().is_empty());
    assert_eq!(fs.getenv("FARHOST_SURELY_UNSET_VAR").await.unwrap(), "");
}

#[test_log::test(tokio::test)]
async fn test_look_path_finds_sh() {
    let fs = local_fs();
    let sh = fs.look_path("sh").await.unwrap();
    assert!(sh.ends_with("/sh"), "got {sh}");
    assert!(fs.look_path("farhost-surely-missing-tool").await.is_err());
}

#[test_log::test(tokio::test)]
async fn test_host_upload_verifies_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("source.bin");
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&local, &payload).unwrap();

    let host = Host::new(Arc::new(LocalTransport::new()));
    let remote = dir.path().join("uploaded.bin");
    let remote = remote.to_str().unwrap();
    let n = host.upload(&local, remote, 0o644).await.unwrap();
    assert_eq!(n, payload.len() as u64);
    assert_eq!(std::fs::read(remote).unwrap(), payload);
}

#[test_log::test(tokio::test)]
async fn test_cancelled_context_surfaces() {
    let runner = Runner::new(Arc::new(LocalTransport::new()));
    let ctx = farhost::CancellationToken::new();
    let waiter = runner
        .start(ctx.clone(), "sleep 30", ExecOpts::default())
        .await
        .unwrap();
    ctx.cancel();
    let err = waiter.wait().await.unwrap_err();
    assert!(err.is_cancelled());
}
