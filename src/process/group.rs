//! Process-group spawning, signaling, and reaping.
//!
//! Every execution runs as the leader of a fresh process group
//! (`setpgid(0, 0)` via `pre_exec`), so signals delivered with `killpg`
//! reach the entire subtree — shells, wrappers, and grandchildren alike.
//! Signaling the pid alone leaves orphans behind when the command is a
//! wrapper script; the group is the only reliable unit of control.
//!
//! Termination is two-stage: SIGTERM, a bounded grace period, then SIGKILL.
//! A stopped (SIGSTOP'd) group never delivers SIGTERM, so termination always
//! follows up with SIGCONT.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Hard cap on waiting for a reap during [`cleanup`]. A group that survives
/// SIGKILL this long is stuck in the kernel (uninterruptible sleep) and is
/// logged rather than waited on.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Control verbs deliverable to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Job-control stop (SIGSTOP).
    Pause,
    /// Job-control continue (SIGCONT).
    Resume,
    /// Graceful termination request (SIGTERM).
    Terminate,
}

impl SignalKind {
    fn signal(self) -> Signal {
        match self {
            Self::Pause => Signal::SIGSTOP,
            Self::Resume => Signal::SIGCONT,
            Self::Terminate => Signal::SIGTERM,
        }
    }
}

/// A spawned command and its stdio handles, before the I/O tasks take over.
pub struct SpawnedProcess {
    pub child: Child,
    pub pid: u32,
    /// Process group id — equals `pid` because the child is the group leader.
    pub pgid: u32,
    pub stdout: tokio::process::ChildStdout,
    pub stderr: tokio::process::ChildStderr,
}

/// Spawn `<shell> -c <command>` as the leader of a new process group.
///
/// Extra environment variables are merged into the inherited environment.
/// `kill_on_drop(true)` is a backstop: if the owning task dies without
/// running [`cleanup`], dropping the handle still SIGKILLs the direct child.
pub fn spawn_group(
    shell: &str,
    working_dir: &str,
    command: &str,
    env: &HashMap<String, String>,
) -> std::io::Result<SpawnedProcess> {
    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.envs(env);
    // SAFETY: setpgid is async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }

    let mut child = cmd.spawn()?;
    let pid = child.id().unwrap_or(0);

    let stdout = child.stdout.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "failed to take stdout pipe")
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "failed to take stderr pipe")
    })?;

    Ok(SpawnedProcess {
        child,
        pid,
        pgid: pid,
        stdout,
        stderr,
    })
}

/// Deliver a control signal to the whole group.
///
/// An already-exited group (ESRCH) is tolerated silently — controls racing a
/// natural exit are expected. Any other failure is returned for the caller
/// to log as a warning; it never aborts the execution state machine.
pub fn signal_group(pgid: u32, kind: SignalKind) -> Result<(), String> {
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid::from_raw(pgid as i32);
    match killpg(pid, kind.signal()) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(format!("killpg({pgid}, {:?}) failed: {e}", kind.signal())),
    }
}

/// Two-stage termination: SIGTERM (+SIGCONT), wait up to `grace`, then
/// SIGKILL the group and reap.
///
/// Returns `(exit_code, escalated)` where `escalated` is true when the grace
/// period expired and SIGKILL was required. The exit code is `-1` when the
/// child died to a signal (no status code), matching the rest of the server.
pub async fn terminate_with_grace(child: &mut Child, pgid: u32, grace: Duration) -> (i32, bool) {
    if let Err(e) = signal_group(pgid, SignalKind::Terminate) {
        warn!("Terminate: {e}");
    }
    // A stopped group holds SIGTERM pending until continued.
    if let Err(e) = signal_group(pgid, SignalKind::Resume) {
        warn!("Terminate: {e}");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(e)) => {
            warn!("Terminate: wait failed: {e}");
            (-1, false)
        }
        Err(_) => {
            info!("Grace period expired for pgid {pgid}, escalating to SIGKILL");
            kill_group(pgid);
            match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => (status.code().unwrap_or(-1), true),
                Ok(Err(e)) => {
                    warn!("Reap after SIGKILL failed for pgid {pgid}: {e}");
                    (-1, true)
                }
                Err(_) => {
                    warn!("pgid {pgid} did not reap within {REAP_TIMEOUT:?} after SIGKILL");
                    (-1, true)
                }
            }
        }
    }
}

/// SIGKILL the whole group, tolerating an already-empty group.
pub fn kill_group(pgid: u32) {
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid::from_raw(pgid as i32);
    if let Err(e) = killpg(pid, Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            warn!("killpg({pgid}, SIGKILL) failed: {e}");
        }
    }
}

/// Unconditional end-of-execution cleanup, paired with every spawn.
///
/// Kills any surviving group members and reaps the child with a hard
/// timeout. Safe to call after the child has already been reaped — `wait`
/// then returns the cached status. Residual processes are logged, never
/// propagated.
pub async fn cleanup(child: &mut Child, pgid: u32) {
    kill_group(pgid);
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Cleanup: wait failed for pgid {pgid}: {e}"),
        Err(_) => warn!("Cleanup: residual processes in pgid {pgid} after {REAP_TIMEOUT:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_creates_group_leader() {
        let spawned = spawn_group("/bin/sh", "/", "exit 0", &HashMap::new()).unwrap();
        assert!(spawned.pid > 0);
        assert_eq!(spawned.pid, spawned.pgid);
        let mut child = spawned.child;
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(0));
    }

    #[tokio::test]
    async fn signal_after_exit_is_tolerated() {
        let spawned = spawn_group("/bin/sh", "/", "exit 0", &HashMap::new()).unwrap();
        let mut child = spawned.child;
        child.wait().await.unwrap();
        // The group is gone; ESRCH must be swallowed.
        assert!(signal_group(spawned.pgid, SignalKind::Terminate).is_ok());
        assert!(signal_group(spawned.pgid, SignalKind::Pause).is_ok());
    }

    #[tokio::test]
    async fn terminate_reaps_a_sleeping_child() {
        let spawned = spawn_group("/bin/sh", "/", "sleep 60", &HashMap::new()).unwrap();
        let mut child = spawned.child;
        let (code, escalated) =
            terminate_with_grace(&mut child, spawned.pgid, Duration::from_secs(5)).await;
        // sh exits on SIGTERM without a status code.
        assert_eq!(code, -1);
        assert!(!escalated);
    }

    #[tokio::test]
    async fn terminate_escalates_when_sigterm_is_trapped() {
        // The shell ignores TERM and outlives its interrupted sleeps.
        let spawned = spawn_group(
            "/bin/sh",
            "/",
            "trap '' TERM; while :; do sleep 1; done",
            &HashMap::new(),
        )
        .unwrap();
        let mut child = spawned.child;
        let (_, escalated) =
            terminate_with_grace(&mut child, spawned.pgid, Duration::from_millis(200)).await;
        assert!(escalated);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let spawned = spawn_group("/bin/sh", "/", "exit 3", &HashMap::new()).unwrap();
        let mut child = spawned.child;
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        cleanup(&mut child, spawned.pgid).await;
        cleanup(&mut child, spawned.pgid).await;
    }
}
