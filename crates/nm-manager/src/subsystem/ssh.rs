//! Remote shell sessions through the system ssh client
//!
//! Every remote command runs under a supervisor task that owns the child
//! process. Closing a session makes the supervisor kill and reap the child;
//! [`RemoteShell::close_all`] returns only after every supervisor is done.

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use nm_core::config::ManagerConfig;
use nm_core::error::ShellError;
use nm_core::traits::RemoteShell;

/// A command running on a remote host
struct SessionEntry {
    host: String,
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

/// Runs commands on remote hosts and tracks the sessions still running
pub struct SshHandler {
    ssh_binary: PathBuf,
    connect_timeout: Duration,
    sessions: DashMap<u64, SessionEntry>,
    next_id: AtomicU64,
}

/// Forgets a session when its `exec` call ends and stops it if the call
/// was abandoned early
struct SessionGuard<'a> {
    sessions: &'a DashMap<u64, SessionEntry>,
    id: u64,
    cancel: CancellationToken,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.sessions.remove(&self.id);
    }
}

impl SshHandler {
    /// Create a handler using the given ssh client binary
    pub fn new(ssh_binary: PathBuf, connect_timeout: Duration) -> Self {
        Self {
            ssh_binary,
            connect_timeout,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a handler from the manager configuration
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config.ssh_binary.clone(), config.ssh_connect_timeout)
    }

    /// Arguments passed to the ssh client for one remote command
    pub fn ssh_args<S: AsRef<str>>(&self, host: &str, user: Option<&str>, command: &[S]) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(user) = user {
            args.push("-l".to_string());
            args.push(user.to_string());
        }
        args.push(host.to_string());
        args.extend(command.iter().map(|arg| arg.as_ref().to_string()));
        args
    }

    /// Run `command` on `host` and return its standard output.
    ///
    /// The session is tracked until the command exits; [`RemoteShell::close_all`]
    /// kills it and makes this call return [`ShellError::Closed`]. Dropping
    /// the returned future kills the command as well.
    pub async fn exec<S: AsRef<str>>(
        &self,
        host: &str,
        user: Option<&str>,
        command: &[S],
    ) -> Result<String, ShellError> {
        let child = Command::new(&self.ssh_binary)
            .args(self.ssh_args(host, user, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ShellError::Spawn {
                host: host.to_string(),
                source,
            })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(id, child, cancel.clone(), result_tx));
        self.sessions.insert(
            id,
            SessionEntry {
                host: host.to_string(),
                cancel: cancel.clone(),
                supervisor,
            },
        );
        let _guard = SessionGuard {
            sessions: &self.sessions,
            id,
            cancel,
        };
        tracing::debug!("Remote session {} opened on {}", id, host);

        let output = match result_rx.await {
            Ok(Ok(Some(output))) => output,
            Ok(Ok(None)) | Err(_) => return Err(ShellError::Closed(id)),
            Ok(Err(e)) => return Err(e.into()),
        };

        if !output.status.success() {
            return Err(ShellError::CommandFailed {
                host: host.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Hosts of the sessions currently running, by session id
    pub fn sessions(&self) -> Vec<(u64, String)> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().host.clone()))
            .collect();
        sessions.sort();
        sessions
    }

    /// Close a single session.
    ///
    /// Returns once the remote command has been killed and reaped.
    pub async fn close(&self, id: u64) -> Result<(), ShellError> {
        let (_, entry) = self.sessions.remove(&id).ok_or(ShellError::NotFound(id))?;
        stop(id, entry).await;
        Ok(())
    }
}

/// Cancel a session and wait for its supervisor to reap the child
async fn stop(id: u64, entry: SessionEntry) {
    tracing::info!("Closing remote session {} on {}", id, entry.host);
    entry.cancel.cancel();
    if let Err(e) = entry.supervisor.await {
        tracing::warn!("Supervisor of remote session {} failed: {}", id, e);
    }
}

/// Own the child until it exits or the session is cancelled.
///
/// Sends `Some(output)` on exit and `None` once a cancelled child is reaped.
async fn supervise(
    id: u64,
    mut child: Child,
    cancel: CancellationToken,
    result: oneshot::Sender<std::io::Result<Option<Output>>>,
) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = tokio::select! {
        (status, stdout, stderr) = async {
            tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
        } => {
            match (status, stdout, stderr) {
                (Ok(status), Ok(stdout), Ok(stderr)) => Ok(Some(Output { status, stdout, stderr })),
                (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => Err(e),
            }
        }
        _ = cancel.cancelled() => {
            // kill() also waits, so the child is reaped on return
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill remote session {}: {}", id, e);
            }
            Ok(None)
        }
    };

    // exec may have been dropped already
    let _ = result.send(outcome);
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[async_trait]
impl RemoteShell for SshHandler {
    fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    async fn close_all(&self) -> Result<(), ShellError> {
        let ids: Vec<u64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let stopping: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .map(|(id, entry)| stop(id, entry))
            .collect();
        futures::future::join_all(stopping).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ssh_args() {
        let handler = SshHandler::new(PathBuf::from("ssh"), Duration::from_secs(5));
        let args = handler.ssh_args("robot", Some("ros"), &["screen", "-ls"]);
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=5",
                "-l",
                "ros",
                "robot",
                "screen",
                "-ls"
            ]
        );

        let args = handler.ssh_args::<&str>("robot", None, &[]);
        assert_eq!(args.last().unwrap(), "robot");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let handler = SshHandler::new(PathBuf::from("/nonexistent/ssh"), Duration::from_secs(1));
        let result = handler.exec("robot", None, &["true"]).await;
        assert!(matches!(result, Err(ShellError::Spawn { .. })));
        assert_eq!(handler.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_close_unknown_session() {
        let handler = SshHandler::from_config(&ManagerConfig::default());
        assert!(matches!(handler.close(42).await, Err(ShellError::NotFound(42))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_success_and_failure() {
        let handler = SshHandler::new(PathBuf::from("true"), Duration::from_secs(1));
        assert_eq!(handler.exec("robot", None, &["ls"]).await.unwrap(), "");
        assert_eq!(handler.open_sessions(), 0);

        let handler = SshHandler::new(PathBuf::from("false"), Duration::from_secs(1));
        let result = handler.exec("robot", None, &["ls"]).await;
        assert!(matches!(result, Err(ShellError::CommandFailed { status: Some(1), .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_all_kills_running_sessions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-ssh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let handler = Arc::new(SshHandler::new(script, Duration::from_secs(1)));
        let runner = Arc::clone(&handler);
        let task = tokio::spawn(async move { runner.exec("robot", None, &["roslaunch"]).await });

        for _ in 0..100 {
            if handler.open_sessions() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.sessions(), vec![(1, "robot".to_string())]);

        handler.close_all().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ShellError::Closed(1))));
        assert_eq!(handler.open_sessions(), 0);
    }

    #[cfg(unix)]
    fn process_exists(pid: i32) -> bool {
        unsafe { libc::kill(pid, 0) == 0 }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_all_reaps_processes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("fake-ssh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let handler = Arc::new(SshHandler::new(script, Duration::from_secs(1)));
        let runner = Arc::clone(&handler);
        let task = tokio::spawn(async move { runner.exec("robot", None, &["roslaunch"]).await });

        let mut pid = None;
        for _ in 0..200 {
            if let Ok(content) = std::fs::read_to_string(&pid_file) {
                if let Ok(value) = content.trim().parse::<i32>() {
                    pid = Some(value);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let pid = pid.expect("fake ssh did not start");
        assert!(process_exists(pid));

        handler.close_all().await.unwrap();
        // Killed and reaped, so no zombie is left behind either
        assert!(!process_exists(pid));

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ShellError::Closed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_single_session() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-ssh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let handler = Arc::new(SshHandler::new(script, Duration::from_secs(1)));
        let runner = Arc::clone(&handler);
        let task = tokio::spawn(async move { runner.exec("robot", None, &["talker"]).await });

        for _ in 0..100 {
            if handler.open_sessions() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let (id, _) = handler.sessions()[0].clone();
        handler.close(id).await.unwrap();
        assert_eq!(handler.open_sessions(), 0);
        assert!(matches!(task.await.unwrap(), Err(ShellError::Closed(closed)) if closed == id));
    }
}
