//! POSIX filesystem behavior against scripted shell conversations.

mod common;

use std::sync::Arc;

use common::{Match, MockTransport, Rule};
use farhost::{Error, OpenFlags, PosixFs, RemoteFile, RemoteFs, Runner};
use time::OffsetDateTime;

fn gnu_help() -> Rule {
    Rule::ok(
        Match::Exact("stat --help 2>&1"),
        "Usage: stat [OPTION]... FILE...\n  -c, --format=FORMAT   use the specified FORMAT\n",
    )
}

fn busybox_help() -> Rule {
    Rule::ok(
        Match::Exact("stat --help 2>&1"),
        "BusyBox v1.36.1 multi-call binary.\nUsage: stat [OPTIONS] FILE...\n",
    )
}

fn bsd_help() -> Rule {
    Rule::fail(
        Match::Exact("stat --help 2>&1"),
        1,
        "stat: illegal option -- -\nusage: stat [-FLnq] ...\n",
    )
}

fn stat_cmd(path: &str) -> String {
    format!("env -i LC_ALL=C stat -c '%#f %s %.9Y //%n//' -- {path}")
}

fn bsd_stat_cmd(path: &str) -> String {
    format!("env -i LC_ALL=C stat -f '%#p %z %Fm //%N//' -- {path}")
}

fn fs(transport: Arc<MockTransport>) -> PosixFs {
    PosixFs::new(Runner::new(transport))
}

fn exact(s: &str) -> Match {
    Match::Exact(Box::leak(s.to_string().into_boxed_str()))
}

fn contains(s: &str) -> Match {
    Match::Contains(Box::leak(s.to_string().into_boxed_str()))
}

#[test_log::test(tokio::test)]
async fn test_stat_parses_gnu_output() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok(
            exact(&stat_cmd("/tmp/test.txt")),
            "0x81a4 1234 1699970097.220228000 ///tmp/test.txt//\n",
        ),
    ]));
    let info = fs(transport).stat("/tmp/test.txt").await.unwrap();
    assert_eq!(info.name(), "test.txt");
    assert_eq!(info.path(), "/tmp/test.txt");
    assert_eq!(info.size(), 1234);
    assert!(!info.is_dir());
    assert!(info.mode().is_regular());
    assert_eq!(info.mode().perm(), 0o644);
    assert_eq!(info.modified().unix_timestamp(), 1699970097);
    assert_eq!(info.modified().nanosecond(), 220_228_000);
}

#[test_log::test(tokio::test)]
async fn test_stat_bsd_dialect_selected_on_help_failure() {
    let transport = Arc::new(MockTransport::posix(vec![
        bsd_help(),
        Rule::ok(
            exact(&bsd_stat_cmd("/tmp/test.txt")),
            "0100644 1234 1699970097.000000000 ///tmp/test.txt//\n",
        ),
    ]));
    let info = fs(transport.clone()).stat("/tmp/test.txt").await.unwrap();
    assert_eq!(info.size(), 1234);
    assert_eq!(info.mode().perm(), 0o644);
    let seen = transport.commands_seen();
    assert!(seen.iter().any(|c| c.contains("stat -f '%#p")));
}

#[test_log::test(tokio::test)]
async fn test_busybox_uses_gnu_dialect() {
    let transport = Arc::new(MockTransport::posix(vec![
        busybox_help(),
        Rule::ok(
            exact(&stat_cmd("/etc")),
            "0x41ed 4096 1699970097.0 ///etc//\n",
        ),
    ]));
    let info = fs(transport).stat("/etc").await.unwrap();
    assert!(info.is_dir());
    assert_eq!(info.mode().perm(), 0o755);
}

#[test_log::test(tokio::test)]
async fn test_stat_missing_maps_to_not_exist() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::fail(
            exact(&stat_cmd("/missing")),
            1,
            "stat: cannot statx '/missing': No such file or directory\n",
        ),
    ]));
    let err = fs(transport).stat("/missing").await.unwrap_err();
    assert!(err.is_not_exist(), "got {err}");
}

#[test_log::test(tokio::test)]
async fn test_read_dir_sorts_and_drops_self() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok_bytes(
            Match::Exact("find /data -maxdepth 1 -print0"),
            b"/data\0/data/beta.txt\0/data/alpha\0".to_vec(),
        ),
        Rule::ok(
            Match::Contains("-- /data/beta.txt /data/alpha"),
            "0x81a4 10 1699970097.0 ///data/beta.txt//\n0x41ed 4096 1699970097.0 ///data/alpha//\n",
        ),
    ]));
    let entries: Vec<_> = fs(transport).read_dir("/data").await.unwrap().collect();
    let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["alpha", "beta.txt"]);
    assert!(entries[0].is_dir());
}

#[test_log::test(tokio::test)]
async fn test_read_dir_missing_directory() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::fail(
            Match::Exact("find /nope -maxdepth 1 -print0"),
            1,
            "find: '/nope': No such file or directory\n",
        ),
    ]));
    let err = fs(transport).read_dir("/nope").await.unwrap_err();
    assert!(err.is_not_exist());
}

#[test_log::test(tokio::test)]
async fn test_open_exclusive_on_existing_fails() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok(
            exact(&stat_cmd("/tmp/test.txt")),
            "0x81a4 6 1699970097.0 ///tmp/test.txt//\n",
        ),
    ]));
    let err = fs(transport)
        .open_file(
            "/tmp/test.txt",
            OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
            0o644,
        )
        .await
        .unwrap_err();
    assert!(err.is_exists(), "got {err}");
}

#[test_log::test(tokio::test)]
async fn test_open_missing_without_create_fails() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::fail(
            exact(&stat_cmd("/tmp/absent")),
            1,
            "stat: cannot statx '/tmp/absent': No such file or directory\n",
        ),
    ]));
    let err = fs(transport)
        .open_file("/tmp/absent", OpenFlags::READ_ONLY, 0)
        .await
        .unwrap_err();
    assert!(err.is_not_exist());
}

#[test_log::test(tokio::test)]
async fn test_open_write_on_directory_fails() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok(exact(&stat_cmd("/data")), "0x41ed 4096 1699970097.0 ///data//\n"),
    ]));
    let err = fs(transport)
        .open_file("/data", OpenFlags::WRITE_ONLY, 0)
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::IsADirectory(_)), "got {err}");
}

#[test_log::test(tokio::test)]
async fn test_open_create_installs_and_restats() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        // The file is missing until install runs.
        Rule::fail(
            exact(&stat_cmd("/tmp/new.txt")),
            1,
            "stat: cannot statx '/tmp/new.txt': No such file or directory\n",
        )
        .once(),
        Rule::ok(exact(&stat_cmd("/tmp")), "0x41ed 4096 1699970097.0 ///tmp//\n"),
        Rule::ok(Match::Exact("install -m 644 /dev/null /tmp/new.txt"), ""),
        Rule::ok(
            exact(&stat_cmd("/tmp/new.txt")),
            "0x81a4 0 1699970097.0 ///tmp/new.txt//\n",
        ),
    ]));
    let mut file = fs(transport.clone())
        .open_file(
            "/tmp/new.txt",
            OpenFlags::WRITE_ONLY | OpenFlags::CREATE,
            0o644,
        )
        .await
        .unwrap();
    file.close().await.unwrap();
    assert!(
        transport
            .commands_seen()
            .iter()
            .any(|c| c == "install -m 644 /dev/null /tmp/new.txt")
    );
}

#[test_log::test(tokio::test)]
async fn test_open_create_missing_parent_fails() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::fail(
            exact(&stat_cmd("/no/dir/file")),
            1,
            "stat: cannot statx '/no/dir/file': No such file or directory\n",
        ),
        Rule::fail(
            exact(&stat_cmd("/no/dir")),
            1,
            "stat: cannot statx '/no/dir': No such file or directory\n",
        ),
    ]));
    let err = fs(transport)
        .open_file(
            "/no/dir/file",
            OpenFlags::WRITE_ONLY | OpenFlags::CREATE,
            0o644,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_exist());
}

#[test_log::test(tokio::test)]
async fn test_read_issues_dd_and_sets_eof() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok(
            exact(&stat_cmd("/tmp/test.txt")),
            "0x81a4 6 1699970097.0 ///tmp/test.txt//\n",
        ),
        Rule::ok(contains("stat -f -c '%s' -- /tmp"), "4096"),
        Rule::ok(Match::Exact("dd if=/tmp/test.txt bs=1 skip=0 count=6"), "hello!"),
    ]));
    let mut file = fs(transport)
        .open("/tmp/test.txt")
        .await
        .unwrap();
    let mut buf = [0u8; 6];
    let n = file.read(&mut buf).await.unwrap();
    assert_eq!(n, 6);
    assert_eq!(&buf, b"hello!");
    // Position reached the cached size; the next read is a local EOF.
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);
}

#[test_log::test(tokio::test)]
async fn test_write_pipes_data_through_dd() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok(
            exact(&stat_cmd("/tmp/test.txt")),
            "0x81a4 0 1699970097.0 ///tmp/test.txt//\n",
        ),
        Rule::ok(contains("stat -f -c '%s' -- /tmp"), "4096"),
        Rule::ok(
            Match::Exact("dd if=/dev/stdin of=/tmp/test.txt bs=1 count=6 seek=0 conv=notrunc"),
            "",
        ),
    ]));
    let mut file = fs(transport.clone())
        .open_file("/tmp/test.txt", OpenFlags::WRITE_ONLY, 0)
        .await
        .unwrap();
    let n = file.write(b"abcdef").await.unwrap();
    assert_eq!(n, 6);
    assert_eq!(
        transport.stdin_log.lock().unwrap().as_slice(),
        [b"abcdef".to_vec()]
    );
}

#[test_log::test(tokio::test)]
async fn test_closed_file_rejects_io() {
    let transport = Arc::new(MockTransport::posix(vec![
        gnu_help(),
        Rule::ok(
            exact(&stat_cmd("/tmp/test.txt")),
            "0x81a4 6 1699970097.0 ///tmp/test.txt//\n",
        ),
    ]));
    let mut file = fs(transport).open("/tmp/test.txt").await.unwrap();
    file.close().await.unwrap();
    let mut buf = [0u8; 1];
    assert!(file.read(&mut buf).await.unwrap_err().is_closed());
    assert!(file.write(b"x").await.unwrap_err().is_closed());
    assert!(
        file.seek(std::io::SeekFrom::Start(0))
            .await
            .unwrap_err()
            .is_closed()
    );
    // Closing again is fine.
    file.close().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_sha256_parses_and_validates() {
    let digest = "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3";
    let transport = Arc::new(MockTransport::posix(vec![
        Rule::ok(
            Match::Exact("sha256sum -b /tmp/test.txt"),
            &format!("{digest} */tmp/test.txt\n"),
        ),
        Rule::ok(Match::Exact("sha256sum -b /tmp/garbled"), "oops\n"),
        Rule::fail(
            Match::Exact("sha256sum -b /missing"),
            1,
            "sha256sum: /missing: No such file or directory\n",
        ),
    ]));
    let fs = fs(transport);
    assert_eq!(fs.sha256("/tmp/test.txt").await.unwrap(), digest);
    assert!(matches!(
        fs.sha256("/tmp/garbled").await.unwrap_err().root(),
        Error::Parse { .. }
    ));
    assert!(fs.sha256("/missing").await.unwrap_err().is_not_exist());
}

#[test_log::test(tokio::test)]
async fn test_chtimes_probes_then_falls_back() {
    let transport = Arc::new(MockTransport::posix(vec![
        // Nanosecond syntax rejected, second syntax accepted.
        Rule::fail(
            Match::Contains("touch -a -d '"),
            1,
            "touch: invalid date format\n",
        ),
        Rule::ok(Match::Contains("touch -a -d @"), ""),
    ]));
    let fs = fs(transport.clone());
    let t = OffsetDateTime::from_unix_timestamp(1699970097).unwrap();
    fs.chtimes("/tmp/test.txt", t, t).await.unwrap();
    fs.chtimes("/tmp/test.txt", t, t).await.unwrap();

    let ns_attempts = transport
        .commands_seen()
        .iter()
        .filter(|c| c.contains("touch -a -d '"))
        .count();
    // The probe runs once; the fallback is permanent.
    assert_eq!(ns_attempts, 1);
}

#[test_log::test(tokio::test)]
async fn test_getenv_rejects_hostile_keys() {
    let transport = Arc::new(MockTransport::posix(vec![]));
    let fs = fs(transport.clone());
    let err = fs.getenv("PATH; rm -rf /").await.unwrap_err();
    assert!(matches!(err.root(), Error::InvalidArgument(_)));
    assert!(transport.commands_seen().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_mkdir_temp_uses_pattern() {
    let transport = Arc::new(MockTransport::posix(vec![Rule::ok(
        Match::Prefix("mkdir -m 700 -- /tmp/work-"),
        "",
    )]));
    let fs = fs(transport);
    let path = fs.mkdir_temp("/tmp", "work-*").await.unwrap();
    assert!(path.starts_with("/tmp/work-"));
    assert_eq!(path.len(), "/tmp/work-".len() + 10);
}
