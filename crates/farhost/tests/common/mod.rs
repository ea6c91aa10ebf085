//! Test transports: a scripted mock matching commands to canned results,
//! and a fake Windows filesystem agent speaking the real wire protocol
//! over an in-memory file store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use farhost::{ProcessInput, StreamSink, Transport, TransportError, Waiter};
use farhost_shell::ps;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub enum Match {
    Exact(&'static str),
    Prefix(&'static str),
    Contains(&'static str),
}

impl Match {
    fn matches(&self, cmd: &str) -> bool {
        match self {
            Match::Exact(s) => cmd == *s,
            Match::Prefix(s) => cmd.starts_with(s),
            Match::Contains(s) => cmd.contains(s),
        }
    }
}

#[derive(Clone)]
pub struct Rule {
    pub matcher: Match,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: i32,
    pub once: bool,
}

impl Rule {
    pub fn ok(matcher: Match, stdout: &str) -> Self {
        Self {
            matcher,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            exit: 0,
            once: false,
        }
    }

    pub fn ok_bytes(matcher: Match, stdout: Vec<u8>) -> Self {
        Self {
            matcher,
            stdout,
            stderr: Vec::new(),
            exit: 0,
            once: false,
        }
    }

    pub fn fail(matcher: Match, exit: i32, stderr: &str) -> Self {
        Self {
            matcher,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            exit,
            once: false,
        }
    }

    /// Consumed by its first match, letting a later rule for the same
    /// command take over (e.g. stat failing before a create, succeeding
    /// after).
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// Matches each started command against scripted rules. Commands carrying
/// an `-EncodedCommand` payload are decoded before matching, so rules can
/// target the plain PowerShell script text. Unmatched commands exit 127.
pub struct MockTransport {
    windows: bool,
    rules: Mutex<Vec<Rule>>,
    pub commands: Mutex<Vec<String>>,
    pub stdin_log: Mutex<Vec<Vec<u8>>>,
    agent_store: Option<Arc<Mutex<HashMap<String, Vec<u8>>>>>,
}

impl MockTransport {
    pub fn posix(rules: Vec<Rule>) -> Self {
        Self {
            windows: false,
            rules: Mutex::new(rules),
            commands: Mutex::new(Vec::new()),
            stdin_log: Mutex::new(Vec::new()),
            agent_store: None,
        }
    }

    pub fn windows(rules: Vec<Rule>) -> Self {
        Self {
            windows: true,
            rules: Mutex::new(rules),
            commands: Mutex::new(Vec::new()),
            stdin_log: Mutex::new(Vec::new()),
            agent_store: None,
        }
    }

    /// A Windows transport whose agent launches are served by a fake
    /// in-process agent over `store`.
    pub fn windows_with_agent(
        rules: Vec<Rule>,
        store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    ) -> Self {
        Self {
            windows: true,
            rules: Mutex::new(rules),
            commands: Mutex::new(Vec::new()),
            stdin_log: Mutex::new(Vec::new()),
            agent_store: Some(store),
        }
    }

    pub fn push_rule(&self, rule: Rule) {
        self.rules.lock().unwrap().push(rule);
    }

    pub fn commands_seen(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_windows(&self) -> bool {
        self.windows
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn start_process(
        &self,
        _ctx: CancellationToken,
        cmd: &str,
        stdin: Option<ProcessInput>,
        mut stdout: StreamSink,
        mut stderr: StreamSink,
    ) -> Result<Box<dyn Waiter>, TransportError> {
        let logical = ps::decode_encoded_command(cmd).unwrap_or_else(|| cmd.to_string());
        self.commands.lock().unwrap().push(logical.clone());

        // The agent is the only process started with piped stdin on a
        // Windows host; everything else is a one-shot command.
        if self.agent_store.is_some() && stdin.is_some() {
            let store = self.agent_store.clone().unwrap();
            let input = stdin.unwrap();
            let handle = std::thread::spawn(move || {
                fake_agent(store, input.into_reader(), stdout);
            });
            return Ok(Box::new(ThreadWaiter {
                handle: Some(handle),
            }));
        }

        if let Some(input) = stdin {
            let mut reader = input.into_reader();
            let mut collected = Vec::new();
            reader
                .read_to_end(&mut collected)
                .map_err(TransportError::Io)?;
            self.stdin_log.lock().unwrap().push(collected);
        }

        let rule = {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter().position(|r| r.matcher.matches(&logical)) {
                Some(idx) if rules[idx].once => Some(rules.remove(idx)),
                Some(idx) => Some(rules[idx].clone()),
                None => None,
            }
        };
        let exit = match rule {
            Some(rule) => {
                stdout.write_all(&rule.stdout).map_err(TransportError::Io)?;
                stderr.write_all(&rule.stderr).map_err(TransportError::Io)?;
                rule.exit
            }
            None => {
                stderr
                    .write_all(format!("mock: no rule for `{logical}`\n").as_bytes())
                    .map_err(TransportError::Io)?;
                127
            }
        };
        drop(stdout);
        drop(stderr);
        Ok(Box::new(ExitWaiter { exit }))
    }
}

struct ExitWaiter {
    exit: i32,
}

#[async_trait]
impl Waiter for ExitWaiter {
    async fn wait(self: Box<Self>) -> Result<(), TransportError> {
        if self.exit == 0 {
            Ok(())
        } else {
            Err(TransportError::ExitStatus(self.exit))
        }
    }
}

struct ThreadWaiter {
    handle: Option<std::thread::JoinHandle<()>>,
}

#[async_trait]
impl Waiter for ThreadWaiter {
    async fn wait(mut self: Box<Self>) -> Result<(), TransportError> {
        let handle = self.handle.take().expect("waited twice");
        tokio::task::spawn_blocking(move || handle.join())
            .await?
            .map_err(|_| TransportError::Terminated)?;
        Ok(())
    }
}

/// Serves the agent wire protocol over an in-memory store: `o`, `s`,
/// `r`, `w`, `c`, `q`, NUL-terminated JSON replies, raw payloads.
fn fake_agent(
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    stdin: Box<dyn Read + Send>,
    mut stdout: StreamSink,
) {
    let mut reader = BufReader::new(stdin);
    let mut open: Option<(String, usize)> = None;

    let reply = |stdout: &mut StreamSink, json: String| {
        stdout.write_all(json.as_bytes()).unwrap();
        stdout.write_all(&[0]).unwrap();
        stdout.flush().unwrap();
    };

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match line.as_bytes()[0] {
            b'o' => {
                let parts: Vec<&str> = line.splitn(4, ' ').collect();
                if parts.len() != 4 {
                    reply(&mut stdout, r#"{"error":"bad open"}"#.to_string());
                    continue;
                }
                if open.is_some() {
                    reply(&mut stdout, r#"{"error":"file already open"}"#.to_string());
                    continue;
                }
                let (mode, _access, path) = (parts[1], parts[2], parts[3].to_string());
                let mut files = store.lock().unwrap();
                let exists = files.contains_key(&path);
                let pos = match mode {
                    "Open" | "Truncate" if !exists => {
                        reply(
                            &mut stdout,
                            r#"{"error":"the file does not exist"}"#.to_string(),
                        );
                        continue;
                    }
                    "CreateNew" if exists => {
                        reply(
                            &mut stdout,
                            r#"{"error":"the file already exists"}"#.to_string(),
                        );
                        continue;
                    }
                    "Truncate" => {
                        files.insert(path.clone(), Vec::new());
                        0
                    }
                    "Append" => {
                        let len = files.entry(path.clone()).or_default().len();
                        len
                    }
                    _ => {
                        files.entry(path.clone()).or_default();
                        0
                    }
                };
                drop(files);
                open = Some((path, pos));
                reply(&mut stdout, format!(r#"{{"pos":{pos}}}"#));
            }
            b's' => {
                let Some((path, pos)) = open.as_mut() else {
                    reply(&mut stdout, r#"{"error":"no open file"}"#.to_string());
                    continue;
                };
                let parts: Vec<&str> = line.split(' ').collect();
                let offset: i64 = parts[1].parse().unwrap();
                let len = store.lock().unwrap().get(path).map_or(0, Vec::len) as i64;
                let base = match parts[2] {
                    "Begin" => 0,
                    "Current" => *pos as i64,
                    _ => len,
                };
                *pos = (base + offset).max(0) as usize;
                reply(&mut stdout, format!(r#"{{"pos":{pos}}}"#));
            }
            b'r' => {
                let Some((path, pos)) = open.as_mut() else {
                    reply(&mut stdout, r#"{"error":"no open file"}"#.to_string());
                    continue;
                };
                let want: i64 = line.split(' ').nth(1).unwrap().parse().unwrap();
                let files = store.lock().unwrap();
                let data = files.get(path).cloned().unwrap_or_default();
                drop(files);
                let want = if want < 0 {
                    data.len().saturating_sub(*pos)
                } else {
                    want as usize
                };
                let available = data.len().saturating_sub(*pos);
                let take = want.min(available);
                if take == 0 && want > 0 {
                    reply(&mut stdout, r#"{"error":"eof"}"#.to_string());
                    continue;
                }
                reply(&mut stdout, format!(r#"{{"n":{take}}}"#));
                stdout.write_all(&data[*pos..*pos + take]).unwrap();
                stdout.flush().unwrap();
                *pos += take;
            }
            b'w' => {
                let want: usize = line.split(' ').nth(1).unwrap().parse().unwrap();
                reply(&mut stdout, format!(r#"{{"n":{want}}}"#));
                let mut payload = vec![0u8; want];
                if reader.read_exact(&mut payload).is_err() {
                    return;
                }
                if let Some((path, pos)) = open.as_mut() {
                    let mut files = store.lock().unwrap();
                    let data = files.entry(path.clone()).or_default();
                    if data.len() < *pos + want {
                        data.resize(*pos + want, 0);
                    }
                    data[*pos..*pos + want].copy_from_slice(&payload);
                    *pos += want;
                }
            }
            b'c' => {
                open = None;
                reply(&mut stdout, r#"{"pos":-1}"#.to_string());
            }
            b'q' => return,
            _ => reply(&mut stdout, r#"{"error":"unknown command"}"#.to_string()),
        }
    }
}
