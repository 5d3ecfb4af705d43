//! Remote shell session layer (spec §4.1).
//!
//! Opens one authenticated, PTY-allocated shell per host and caches it for
//! reuse across the whole run. `ssh2` is a synchronous binding to
//! libssh2, so every blocking call (connect, handshake, auth, channel I/O)
//! runs on a `spawn_blocking` thread; the pool itself only ever holds the
//! lock long enough to look up or insert a cached session.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use ssh2::Session;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::host::Host;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },
    #[error("authentication failed for {host}: {reason}")]
    Auth { host: String, reason: String },
    #[error("command execution failed on {host}: {reason}")]
    Exec { host: String, reason: String },
    #[error("background task panicked: {0}")]
    Join(String),
}

/// A cached, already-authenticated handle to one host.
#[derive(Clone)]
pub enum ManagedSession {
    /// Localhost: no network connection was opened.
    Local,
    Remote(Arc<StdMutex<Session>>),
}

/// Outcome of running one command to completion (spec §4.2 steps 5-7).
pub enum CommandOutcome {
    Ran { stdout: Vec<String> },
    /// `sudo` was requested, the host is not `passwordless_user`, and
    /// `Config.linux_password` was empty.
    PasswordRequired,
    /// The supplied `linux_password` was rejected by the remote sudo.
    PasswordIncorrect,
}

/// Pooled SSH client cache keyed by host url (spec §4.1, §5).
#[derive(Clone, Default)]
pub struct SessionPool {
    channels: Arc<Mutex<HashMap<String, Arc<StdMutex<Session>>>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached session for `host`, connecting and authenticating
    /// on first use. Connection errors are not cached — the next caller
    /// retries from scratch.
    pub async fn open(&self, host: &Host) -> Result<ManagedSession, SessionError> {
        if host.is_localhost() {
            return Ok(ManagedSession::Local);
        }

        if let Some(existing) = self.channels.lock().await.get(&host.url) {
            return Ok(ManagedSession::Remote(existing.clone()));
        }

        let host_clone = host.clone();
        let session = tokio::task::spawn_blocking(move || connect_blocking(&host_clone))
            .await
            .map_err(|e| SessionError::Join(e.to_string()))??;

        let mut guard = self.channels.lock().await;
        let entry = guard
            .entry(host.url.clone())
            .or_insert_with(|| Arc::new(StdMutex::new(session)));
        Ok(ManagedSession::Remote(entry.clone()))
    }

    /// Runs `command` to completion with a PTY, optionally handling the
    /// interactive sudo-password prompt inline. This is the fused
    /// "exec + fill_password + collect stdout" sequence from spec §4.2.
    pub async fn run_command(
        &self,
        session: ManagedSession,
        host_repr: String,
        command: String,
        sudo_password: Option<String>,
    ) -> Result<CommandOutcome, SessionError> {
        tokio::task::spawn_blocking(move || run_command_blocking(session, &host_repr, &command, sudo_password.as_deref()))
            .await
            .map_err(|e| SessionError::Join(e.to_string()))?
    }

    /// Closes every pooled session. Called once at sequence teardown.
    pub async fn close_all(&self) {
        let mut guard = self.channels.lock().await;
        for (url, session) in guard.drain() {
            if let Ok(session) = session.lock() {
                if let Err(e) = session.disconnect(None, "crit run finished", None) {
                    warn!(host = %url, error = %e, "failed to cleanly close SSH session");
                }
            }
        }
    }
}

fn connect_blocking(host: &Host) -> Result<Session, SessionError> {
    let address = format!("{}:22", host.url);
    debug!(host = %host.url, "opening SSH session");

    let tcp = TcpStream::connect(&address).map_err(|e| SessionError::Connect {
        host: host.url.clone(),
        reason: e.to_string(),
    })?;
    tcp.set_read_timeout(Some(Duration::from_secs(30))).ok();
    tcp.set_write_timeout(Some(Duration::from_secs(30))).ok();

    let mut session = Session::new().map_err(|e| SessionError::Connect {
        host: host.url.clone(),
        reason: e.to_string(),
    })?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| SessionError::Connect {
        host: host.url.clone(),
        reason: e.to_string(),
    })?;

    // Best-effort host-key trust: accept whatever the remote presents.
    // crit does not maintain a known_hosts trust store (spec Non-goals).

    let identity: PathBuf = host.expanded_identity_file();
    match &host.ssh_password {
        Some(password) => {
            session
                .userauth_password(&host.ssh_user, password)
                .map_err(|e| SessionError::Auth {
                    host: host.url.clone(),
                    reason: e.to_string(),
                })?;
        }
        None => {
            session
                .userauth_pubkey_file(&host.ssh_user, None, &identity, None)
                .map_err(|e| SessionError::Auth {
                    host: host.url.clone(),
                    reason: e.to_string(),
                })?;
        }
    }

    if !session.authenticated() {
        return Err(SessionError::Auth {
            host: host.url.clone(),
            reason: "server rejected credentials".to_string(),
        });
    }

    Ok(session)
}

fn run_command_blocking(
    session: ManagedSession,
    host_repr: &str,
    command: &str,
    sudo_password: Option<&str>,
) -> Result<CommandOutcome, SessionError> {
    match session {
        ManagedSession::Local => run_local(command, sudo_password),
        ManagedSession::Remote(session) => run_remote(&session, host_repr, command, sudo_password),
    }
}

fn run_remote(
    session: &StdMutex<Session>,
    host_repr: &str,
    command: &str,
    sudo_password: Option<&str>,
) -> Result<CommandOutcome, SessionError> {
    let session = session.lock().map_err(|_| SessionError::Exec {
        host: host_repr.to_string(),
        reason: "session lock poisoned".to_string(),
    })?;

    let mut channel = session.channel_session().map_err(|e| SessionError::Exec {
        host: host_repr.to_string(),
        reason: e.to_string(),
    })?;
    channel
        .request_pty("xterm", None, None)
        .map_err(|e| SessionError::Exec {
            host: host_repr.to_string(),
            reason: e.to_string(),
        })?;
    channel.exec(command).map_err(|e| SessionError::Exec {
        host: host_repr.to_string(),
        reason: e.to_string(),
    })?;

    let mut reader = BufReader::new(&mut channel);

    if let Some(outcome) = fill_password(&mut reader, host_repr, sudo_password)? {
        return Ok(outcome);
    }

    let mut raw = String::new();
    reader.read_to_string(&mut raw).map_err(|e| SessionError::Exec {
        host: host_repr.to_string(),
        reason: e.to_string(),
    })?;
    let mut stderr_discard = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr_discard);
    let _ = channel.wait_close();

    Ok(CommandOutcome::Ran {
        stdout: split_preserving_trailing(&raw),
    })
}

fn run_local(command: &str, sudo_password: Option<&str>) -> Result<CommandOutcome, SessionError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SessionError::Exec {
            host: "localhost".to_string(),
            reason: e.to_string(),
        })?;

    if let Some(password) = sudo_password {
        if let Some(stdin) = child.stdin.as_mut() {
            let _ = writeln!(stdin, "{password}");
        }
    }

    let mut stdout = String::new();
    if let Some(out) = child.stdout.as_mut() {
        let _ = out.read_to_string(&mut stdout);
    }
    let _ = child.wait();

    Ok(CommandOutcome::Ran {
        stdout: split_preserving_trailing(&stdout),
    })
}

/// Implements spec §4.2 step 6: writes the sudo password, discards the
/// two prompt lines, and checks the third line for a rejected password.
///
/// Takes the same `BufReader` the caller will keep reading from for the
/// command's real stdout, so any bytes the underlying `read_line` calls
/// pull past the prompt lines stay buffered and are not lost.
fn fill_password(
    reader: &mut BufReader<&mut ssh2::Channel>,
    host_repr: &str,
    sudo_password: Option<&str>,
) -> Result<Option<CommandOutcome>, SessionError> {
    let Some(password) = sudo_password else {
        return Ok(None);
    };

    std::thread::sleep(Duration::from_millis(100));

    reader
        .get_mut()
        .write_all(format!("{password}\n").as_bytes())
        .map_err(|e| SessionError::Exec {
            host: host_repr.to_string(),
            reason: e.to_string(),
        })?;
    reader.get_mut().flush().ok();

    let mut discard = String::new();
    reader.read_line(&mut discard).ok();
    discard.clear();
    reader.read_line(&mut discard).ok();

    let mut check_line = String::new();
    reader.read_line(&mut check_line).ok();

    if check_line.contains("Sorry, try again.") {
        reader.get_mut().write_all(&[0x03]).ok();
        reader.get_mut().flush().ok();
        return Ok(Some(CommandOutcome::PasswordIncorrect));
    }

    Ok(None)
}

fn split_preserving_trailing(raw: &str) -> Vec<String> {
    raw.split('\n').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_preserves_trailing_empty_line() {
        let lines = split_preserving_trailing("hello\n");
        assert_eq!(lines, vec!["hello".to_string(), String::new()]);
    }

    #[test]
    fn split_with_no_trailing_newline() {
        let lines = split_preserving_trailing("hello");
        assert_eq!(lines, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn localhost_bypasses_pool() {
        let pool = SessionPool::new();
        let host = Host::localhost();
        let session = pool.open(&host).await.expect("local session");
        assert!(matches!(session, ManagedSession::Local));
    }

    #[tokio::test]
    async fn localhost_runs_via_local_shell() {
        let pool = SessionPool::new();
        let session = pool.open(&Host::localhost()).await.expect("open");
        let outcome = pool
            .run_command(session, "localhost".into(), "echo hello".into(), None)
            .await
            .expect("run");
        match outcome {
            CommandOutcome::Ran { stdout } => {
                assert_eq!(stdout, vec!["hello".to_string(), String::new()]);
            }
            _ => panic!("expected Ran"),
        }
    }
}
