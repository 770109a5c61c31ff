//! Analysis-process lifecycle.
//!
//! One child process per session id, owned exclusively by the
//! [`ProcessManager`]. Spawn is idempotent for live sessions; kill is
//! graceful-then-forceful with a bounded grace period. The session map is
//! behind one async mutex so spawn, kill, and lookup for the same id never
//! race into duplicate processes.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::AnalysisCommand;
use crate::error::ServerError;

/// Grace period before a termination request escalates to a hard kill.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// The captured stdio triple of one child process.
///
/// Pipes can only be consumed once, so a bridge claims the whole triple and
/// the claim cannot be repeated while the process lives.
#[derive(Debug)]
pub struct SessionStdio {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// One tracked child process.
#[derive(Debug)]
pub struct SessionProcess {
    pid: Option<u32>,
    child: tokio::sync::Mutex<Child>,
    stdio: parking_lot::Mutex<Option<SessionStdio>>,
}

impl SessionProcess {
    fn new(child: Child, stdio: SessionStdio) -> Self {
        Self {
            pid: child.id(),
            child: tokio::sync::Mutex::new(child),
            stdio: parking_lot::Mutex::new(Some(stdio)),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the stdio triple. Returns `None` if another bridge already
    /// holds it.
    pub fn claim_stdio(&self) -> Option<SessionStdio> {
        self.stdio.lock().take()
    }

    /// Liveness, derived from the exit status.
    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    /// Two-phase termination: close stdin to ask the server to exit, wait
    /// out the grace period, then force-kill.
    async fn shutdown(&self, grace: Duration) {
        // A bridge that claimed the streams already dropped stdin by now.
        // An unclaimed triple still holds it open, so drop it here; the
        // graceful request must happen before the bounded wait.
        drop(self.stdio.lock().take());
        let mut child = self.child.lock().await;
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            tracing::warn!(pid = ?self.pid, "process ignored termination request, killing");
            let _ = child.kill().await;
        }
    }
}

/// Owns every analysis process, keyed by session id.
pub struct ProcessManager {
    command: AnalysisCommand,
    grace: Duration,
    sessions: tokio::sync::Mutex<HashMap<String, Arc<SessionProcess>>>,
}

impl ProcessManager {
    pub fn new(command: AnalysisCommand) -> Self {
        Self {
            command,
            grace: KILL_GRACE,
            sessions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Override the kill grace period (tests use a short one).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Spawn-or-reuse: a live entry is returned unchanged, a dead entry is
    /// replaced by a fresh process. At most one live process per session id.
    pub async fn spawn(&self, session_id: &str) -> Result<Arc<SessionProcess>, ServerError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(session_id) {
            if existing.is_alive().await {
                return Ok(existing.clone());
            }
            tracing::debug!(session = %session_id, "tracked process has exited, respawning");
            sessions.remove(session_id);
        }

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(&self.command.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServerError::Spawn {
                command: self.command.program.clone(),
                source,
            })?;

        let stdio = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => SessionStdio {
                stdin,
                stdout,
                stderr,
            },
            _ => {
                return Err(ServerError::Spawn {
                    command: self.command.program.clone(),
                    source: std::io::Error::other("child stdio was not captured"),
                });
            }
        };

        let process = Arc::new(SessionProcess::new(child, stdio));
        tracing::info!(session = %session_id, pid = ?process.pid(), "spawned analysis process");
        sessions.insert(session_id.to_string(), process.clone());
        Ok(process)
    }

    /// Idempotent: unknown or already-dead sessions are a no-op. The entry
    /// is always gone when this returns.
    pub async fn kill(&self, session_id: &str) {
        let process = self.sessions.lock().await.remove(session_id);
        if let Some(process) = process {
            process.shutdown(self.grace).await;
            tracing::info!(session = %session_id, "analysis process stopped");
        }
    }

    /// Kill every tracked session. Shutdown path only.
    pub async fn kill_all(&self) {
        let drained: Vec<(String, Arc<SessionProcess>)> =
            self.sessions.lock().await.drain().collect();
        for (session_id, process) in drained {
            process.shutdown(self.grace).await;
            tracing::info!(session = %session_id, "analysis process stopped");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
