//! Per-session execution state machine.
//!
//! One [`Execution`] wraps one subprocess invocation:
//!
//! ```text
//!     IDLE ──execute──► STARTING ──spawned──► RUNNING ──child_exit──► COMPLETED → IDLE
//!                           │                    │                        ▲
//!                           │                    ├── pause ──► PAUSED ────┤
//!                           │                    │
//!                           │                    ├── cancel/timeout/disconnect ──► TERMINATING
//!                           │
//!                           └── spawn_error ──► FAILED → IDLE
//! ```
//!
//! IDLE is the absence of an execution in the session's slot; the slot is
//! cleared exactly once, when the run task reaches a terminal state. Three
//! cooperating tasks serve one execution:
//!
//! - **reader** — [`crate::process::stream::read_streams`], both pipes to EOF
//! - **drainer** — formats chunks into `process.output` notifications and
//!   emits `heartbeat` during silent stretches
//! - **run** — supervises the child: exit, cancellation, wall-clock timeout,
//!   and output-stall timeout; owns termination escalation and cleanup
//!
//! `process.completed` is sent by the drainer after the chunk queue has run
//! dry, so it always follows every `process.output` of its execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::process::group::{self, SignalKind};
use crate::process::stream::{self, Chunk, StreamCaps};
use crate::rpc::{self, ControlType};
use crate::sessions::queue::{self, OutputTally};
use crate::sessions::Session;

/// How long the run task waits for the reader to hit EOF after the process
/// group is dead, and for the drainer to flush to the socket funnel.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Stall-watchdog polling interval.
const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Execution lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Starting,
    Running,
    Paused,
    Terminating,
    Completed,
    Failed,
}

impl ExecStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Terminating => "terminating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Why an execution reached `process.completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCause {
    Normal,
    Timeout,
    Cancelled,
    /// The grace period expired and the group had to be SIGKILLed.
    Killed,
}

impl CompletionCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Killed => "killed",
        }
    }
}

/// Errors surfaced to the `execute` caller.
#[derive(Debug)]
pub enum ExecuteError {
    /// The session already has a live execution.
    Busy,
    /// The pre-spawn hook rejected or failed to transform the command.
    Hook(String),
    /// The subprocess could not be started.
    Spawn(String),
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "session already has a live execution"),
            Self::Hook(e) => write!(f, "command hook failed: {e}"),
            Self::Spawn(e) => write!(f, "failed to spawn process: {e}"),
        }
    }
}

/// Per-execution limits, snapshotted from configuration at `execute` time.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub session_timeout: Duration,
    pub stream_timeout: Duration,
    pub grace_period: Duration,
    pub caps: StreamCaps,
    pub queue_capacity: usize,
    pub queue_put_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub sentinels: Vec<String>,
}

impl ExecutionLimits {
    pub fn from_config(config: &Config) -> Self {
        let limits = &config.limits;
        Self {
            session_timeout: Duration::from_secs(limits.session_timeout_secs),
            stream_timeout: Duration::from_secs(limits.stream_timeout_secs),
            grace_period: Duration::from_secs(limits.grace_period_secs),
            caps: StreamCaps {
                max_line_bytes: limits.max_line_bytes,
                max_total_bytes: limits.max_buffer_bytes,
                max_line_count: limits.max_buffer_lines,
            },
            queue_capacity: limits.queue_capacity,
            queue_put_timeout: Duration::from_millis(limits.queue_put_timeout_ms),
            heartbeat_interval: Duration::from_secs(limits.heartbeat_interval_secs),
            sentinels: config.exec.token_limit_patterns.clone(),
        }
    }
}

/// A live subprocess invocation owned by one session.
#[derive(Debug)]
pub struct Execution {
    /// OS pid of the shell (also the process group id — the child is leader).
    pub pid: u32,
    pub pgid: u32,
    pub command: String,
    pub started_at: Instant,
    pub status: Mutex<ExecStatus>,
    pub tally: Arc<OutputTally>,
    /// Tripped by explicit cancel; child of the session token, so disconnect
    /// and server shutdown trip it too.
    cancel: CancellationToken,
}

impl Execution {
    /// Apply a control verb. States where the verb has no effect are
    /// accepted silently — controls racing completion or repeated cancels
    /// must never error (only a missing execution does, in the caller).
    pub async fn control(&self, kind: ControlType) {
        let mut status = self.status.lock().await;
        match (kind, *status) {
            (ControlType::Pause, ExecStatus::Running) => {
                if let Err(e) = group::signal_group(self.pgid, SignalKind::Pause) {
                    warn!("Execution {}: {e}", self.pid);
                }
                *status = ExecStatus::Paused;
                info!("Execution {} paused", self.pid);
            }
            (ControlType::Resume, ExecStatus::Paused) => {
                if let Err(e) = group::signal_group(self.pgid, SignalKind::Resume) {
                    warn!("Execution {}: {e}", self.pid);
                }
                *status = ExecStatus::Running;
                info!("Execution {} resumed", self.pid);
            }
            (
                ControlType::Cancel,
                ExecStatus::Starting | ExecStatus::Running | ExecStatus::Paused,
            ) => {
                *status = ExecStatus::Terminating;
                self.cancel.cancel();
                info!("Execution {} cancelled", self.pid);
            }
            (kind, state) => {
                debug!(
                    "Execution {}: control {} in state {} is a no-op",
                    self.pid,
                    kind.as_str(),
                    state.as_str()
                );
            }
        }
    }

    pub async fn current_status(&self) -> ExecStatus {
        *self.status.lock().await
    }
}

/// A spawned-but-not-yet-supervised execution.
///
/// Spawning and launching are split so the `execute` response (carrying the
/// pid) can be queued on the socket before `process.started` — both go
/// through the same per-connection funnel, which fixes their order.
pub struct PendingExecution {
    exec: Arc<Execution>,
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    limits: ExecutionLimits,
    outbound: mpsc::Sender<Value>,
    session: Arc<Session>,
}

impl PendingExecution {
    pub fn pid(&self) -> u32 {
        self.exec.pid
    }

    pub(crate) fn handle(&self) -> Arc<Execution> {
        Arc::clone(&self.exec)
    }

    /// Spawn the run task and record its handle on the session.
    pub async fn launch(self) {
        let session = Arc::clone(&self.session);
        let handle = tokio::spawn(run(self));
        session.store_run_task(handle).await;
    }
}

/// Spawn the subprocess for `command` and build the execution around it.
pub(crate) fn prepare(
    session: Arc<Session>,
    command: String,
    env: HashMap<String, String>,
    shell: &str,
    working_dir: &str,
    limits: ExecutionLimits,
    outbound: mpsc::Sender<Value>,
) -> Result<PendingExecution, ExecuteError> {
    let spawned = group::spawn_group(shell, working_dir, &command, &env)
        .map_err(|e| ExecuteError::Spawn(e.to_string()))?;

    let exec = Arc::new(Execution {
        pid: spawned.pid,
        pgid: spawned.pgid,
        command,
        started_at: Instant::now(),
        status: Mutex::new(ExecStatus::Starting),
        tally: Arc::new(OutputTally::new()),
        cancel: session.cancel.child_token(),
    });

    Ok(PendingExecution {
        exec,
        child: spawned.child,
        stdout: spawned.stdout,
        stderr: spawned.stderr,
        limits,
        outbound,
        session,
    })
}

struct Outcome {
    exit_code: i32,
    cause: CompletionCause,
}

/// Supervise one execution start to finish. Cleanup runs on every path out
/// of the select; `kill_on_drop` on the child is the backstop if this task
/// itself dies.
async fn run(pending: PendingExecution) {
    let PendingExecution {
        exec,
        mut child,
        stdout,
        stderr,
        limits,
        outbound,
        session,
    } = pending;

    let _ = outbound.send(rpc::notify::process_started(exec.pid)).await;
    {
        let mut status = exec.status.lock().await;
        // A cancel can land between spawn and here; don't resurrect it.
        if *status == ExecStatus::Starting {
            *status = ExecStatus::Running;
        }
    }
    info!("Execution {} running: {}", exec.pid, exec.command);

    let (sink, chunk_rx) = queue::channel(
        limits.queue_capacity,
        limits.queue_put_timeout,
        Arc::clone(&exec.tally),
    );
    let mut reader = tokio::spawn(stream::read_streams(
        stdout,
        stderr,
        sink,
        limits.caps.clone(),
        limits.sentinels.clone(),
        Arc::clone(&exec.tally),
    ));
    let (outcome_tx, outcome_rx) = oneshot::channel::<Outcome>();
    let mut drainer = tokio::spawn(drain_output(
        chunk_rx,
        outbound.clone(),
        Arc::clone(&exec.tally),
        limits.heartbeat_interval,
        outcome_rx,
    ));

    let mut cause = CompletionCause::Normal;
    let mut exit_code = -1;
    let mut wait_failed = false;

    tokio::select! {
        res = child.wait() => match res {
            Ok(status) => exit_code = status.code().unwrap_or(-1),
            Err(e) => {
                warn!("Execution {}: wait failed: {e}", exec.pid);
                wait_failed = true;
            }
        },
        () = exec.cancel.cancelled() => {
            cause = CompletionCause::Cancelled;
        }
        () = tokio::time::sleep(limits.session_timeout) => {
            cause = CompletionCause::Timeout;
            warn!(
                "Execution {} exceeded session timeout ({}s)",
                exec.pid,
                limits.session_timeout.as_secs()
            );
            let _ = outbound
                .send(rpc::notify::timeout("session_timeout", limits.session_timeout.as_secs()))
                .await;
        }
        () = stalled(&exec, &limits) => {
            cause = CompletionCause::Timeout;
            warn!(
                "Execution {} produced no output for {}s",
                exec.pid,
                limits.stream_timeout.as_secs()
            );
            let _ = outbound
                .send(rpc::notify::timeout("stream_timeout", limits.stream_timeout.as_secs()))
                .await;
        }
    }

    if cause != CompletionCause::Normal {
        *exec.status.lock().await = ExecStatus::Terminating;
        let (code, escalated) =
            group::terminate_with_grace(&mut child, exec.pgid, limits.grace_period).await;
        exit_code = code;
        if escalated {
            cause = CompletionCause::Killed;
        }
    }

    // Reap any surviving group members; the pipes EOF once the group is gone.
    group::cleanup(&mut child, exec.pgid).await;

    if tokio::time::timeout(STREAM_DRAIN_TIMEOUT, &mut reader)
        .await
        .is_err()
    {
        warn!("Execution {}: stream reader did not reach EOF, aborting", exec.pid);
        reader.abort();
    }

    let _ = outcome_tx.send(Outcome { exit_code, cause });
    if tokio::time::timeout(DRAIN_FLUSH_TIMEOUT, &mut drainer)
        .await
        .is_err()
    {
        warn!("Execution {}: drainer stalled on a slow socket, aborting", exec.pid);
        drainer.abort();
    }

    *exec.status.lock().await = if wait_failed {
        ExecStatus::Failed
    } else {
        ExecStatus::Completed
    };
    info!(
        "Execution {} finished: exit_code={exit_code}, cause={}, bytes={}, dropped_lines={}, elapsed={:.1}s",
        exec.pid,
        cause.as_str(),
        exec.tally.emitted_bytes(),
        exec.tally.dropped(),
        exec.started_at.elapsed().as_secs_f64()
    );

    session.clear_execution(&exec).await;
}

/// Resolves when no read progress has been made for `stream_timeout`.
/// A paused execution is stopped on purpose — its silence doesn't count.
async fn stalled(exec: &Execution, limits: &ExecutionLimits) {
    let interval = STALL_CHECK_INTERVAL.min(limits.stream_timeout);
    loop {
        tokio::time::sleep(interval).await;
        if *exec.status.lock().await == ExecStatus::Paused {
            exec.tally.touch_progress();
            continue;
        }
        #[allow(clippy::cast_possible_truncation)]
        if exec.tally.progress_age_ms() > limits.stream_timeout.as_millis() as u64 {
            return;
        }
    }
}

/// Consume the chunk queue, forward notifications, keep the connection warm.
///
/// Ends when the queue closes (reader done) and `process.completed` has been
/// sent with the outcome from the run task.
async fn drain_output(
    mut rx: mpsc::Receiver<Chunk>,
    outbound: mpsc::Sender<Value>,
    tally: Arc<OutputTally>,
    heartbeat: Duration,
    outcome_rx: oneshot::Receiver<Outcome>,
) {
    let mut exhausted_sent = false;
    let mut last_sent = tokio::time::Instant::now();

    loop {
        if !exhausted_sent && tally.is_exhausted() {
            let stream = tally.exhausted_stream();
            let _ = outbound
                .send(rpc::notify::process_output_marker(
                    stream.as_str(),
                    "buffer_exhausted",
                    "",
                ))
                .await;
            exhausted_sent = true;
            last_sent = tokio::time::Instant::now();
        }

        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(chunk) => {
                    if let Some(msg) = render_chunk(&chunk) {
                        let _ = outbound.send(msg).await;
                        last_sent = tokio::time::Instant::now();
                    }
                }
                None => break,
            },
            () = tokio::time::sleep_until(last_sent + heartbeat) => {
                let _ = outbound.send(rpc::notify::heartbeat()).await;
                last_sent = tokio::time::Instant::now();
            }
        }
    }

    // The caps can be crossed by the very last lines in the queue.
    if !exhausted_sent && tally.is_exhausted() {
        let stream = tally.exhausted_stream();
        let _ = outbound
            .send(rpc::notify::process_output_marker(
                stream.as_str(),
                "buffer_exhausted",
                "",
            ))
            .await;
    }

    if let Ok(outcome) = outcome_rx.await {
        let _ = outbound
            .send(rpc::notify::process_completed(
                outcome.exit_code,
                outcome.cause.as_str(),
            ))
            .await;
    }
}

/// Map a chunk to its wire notification. EOF markers are internal only.
fn render_chunk(chunk: &Chunk) -> Option<Value> {
    match chunk {
        Chunk::Data {
            stream,
            text,
            truncated,
        } => Some(rpc::notify::process_output(stream.as_str(), text, *truncated)),
        Chunk::LineTruncated { stream } => Some(rpc::notify::process_output_marker(
            stream.as_str(),
            "line_truncated",
            "",
        )),
        Chunk::TokenLimit { line, limit } => {
            Some(rpc::notify::token_limit_exceeded(*limit, line))
        }
        Chunk::StreamError { stream, message } => Some(rpc::notify::process_output_marker(
            stream.as_str(),
            "stream_error",
            message,
        )),
        Chunk::Eof { stream } => {
            debug!("stream {} closed", stream.as_str());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::stream::StreamTag;

    fn test_limits() -> ExecutionLimits {
        ExecutionLimits {
            session_timeout: Duration::from_secs(30),
            stream_timeout: Duration::from_secs(30),
            grace_period: Duration::from_secs(2),
            caps: StreamCaps {
                max_line_bytes: 8192,
                max_total_bytes: 1024 * 1024,
                max_line_count: 10_000,
            },
            queue_capacity: 64,
            queue_put_timeout: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(20),
            sentinels: Vec::new(),
        }
    }

    fn collect_methods(values: &[Value]) -> Vec<String> {
        values
            .iter()
            .filter_map(|v| v["method"].as_str().map(ToString::to_string))
            .collect()
    }

    async fn run_command(command: &str, limits: ExecutionLimits) -> Vec<Value> {
        let session = Session::new("test".to_string());
        let (tx, mut rx) = mpsc::channel(256);
        let pending = prepare(
            Arc::clone(&session),
            command.to_string(),
            HashMap::new(),
            "/bin/sh",
            "/",
            limits,
            tx,
        )
        .unwrap();
        pending.launch().await;
        session.wait_idle(Duration::from_secs(30)).await;
        drop(session);
        let mut out = Vec::new();
        while let Ok(v) = rx.try_recv() {
            out.push(v);
        }
        out
    }

    #[tokio::test]
    async fn happy_path_emits_started_output_completed() {
        let msgs = run_command("echo hello", test_limits()).await;
        let methods = collect_methods(&msgs);
        assert_eq!(methods[0], "process.started");
        assert!(methods.contains(&"process.output".to_string()));
        assert_eq!(methods.last().unwrap(), "process.completed");

        let output = msgs
            .iter()
            .find(|m| m["method"] == "process.output")
            .unwrap();
        assert_eq!(output["params"]["stream"], "stdout");
        assert_eq!(output["params"]["data"], "hello\n");

        let completed = msgs.last().unwrap();
        assert_eq!(completed["params"]["exit_code"], 0);
        assert_eq!(completed["params"]["cause"], "normal");
    }

    #[tokio::test]
    async fn completed_follows_all_output() {
        let msgs = run_command("seq 1 50", test_limits()).await;
        let methods = collect_methods(&msgs);
        let last_output = methods.iter().rposition(|m| m == "process.output").unwrap();
        let completed = methods.iter().position(|m| m == "process.completed").unwrap();
        assert!(completed > last_output);
        let outputs: Vec<&str> = msgs
            .iter()
            .filter(|m| m["method"] == "process.output")
            .map(|m| m["params"]["data"].as_str().unwrap())
            .collect();
        // Emission order within the stream is preserved.
        assert_eq!(outputs[0], "1\n");
        assert_eq!(outputs[49], "50\n");
    }

    #[tokio::test]
    async fn stderr_is_tagged() {
        let msgs = run_command("echo oops >&2", test_limits()).await;
        let output = msgs
            .iter()
            .find(|m| m["method"] == "process.output")
            .unwrap();
        assert_eq!(output["params"]["stream"], "stderr");
        assert_eq!(output["params"]["data"], "oops\n");
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported() {
        let msgs = run_command("exit 7", test_limits()).await;
        let completed = msgs.last().unwrap();
        assert_eq!(completed["params"]["exit_code"], 7);
        assert_eq!(completed["params"]["cause"], "normal");
    }

    #[tokio::test]
    async fn cancel_terminates_within_grace() {
        let session = Session::new("test".to_string());
        let (tx, mut rx) = mpsc::channel(256);
        let pending = prepare(
            Arc::clone(&session),
            "sleep 60".to_string(),
            HashMap::new(),
            "/bin/sh",
            "/",
            test_limits(),
            tx,
        )
        .unwrap();
        let exec = pending.handle();
        pending.launch().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        exec.control(ControlType::Cancel).await;
        // Second cancel is a no-op, never an error (idempotence).
        exec.control(ControlType::Cancel).await;

        session.wait_idle(Duration::from_secs(10)).await;
        let mut cause = None;
        while let Ok(v) = rx.try_recv() {
            if v["method"] == "process.completed" {
                cause = Some(v["params"]["cause"].as_str().unwrap().to_string());
            }
        }
        assert_eq!(cause.as_deref(), Some("cancelled"));
        // The group must be gone from the process table.
        assert!(group::signal_group(exec.pgid, SignalKind::Terminate).is_ok());
    }

    #[tokio::test]
    async fn token_limit_sentinel_is_notified_and_run_completes() {
        let mut limits = test_limits();
        limits.sentinels = vec!["output token maximum".to_string()];
        let msgs = run_command(
            "echo \"response exceeded the 32000 output token maximum\"",
            limits,
        )
        .await;
        let methods = collect_methods(&msgs);
        assert!(methods.contains(&"error.token_limit_exceeded".to_string()));
        let notif = msgs
            .iter()
            .find(|m| m["method"] == "error.token_limit_exceeded")
            .unwrap();
        assert_eq!(notif["params"]["limit"], 32000);
        assert_eq!(notif["params"]["recoverable"], true);
        assert_eq!(msgs.last().unwrap()["params"]["cause"], "normal");
    }

    #[tokio::test]
    async fn session_timeout_kills_and_reports_timeout() {
        let mut limits = test_limits();
        limits.session_timeout = Duration::from_millis(300);
        limits.grace_period = Duration::from_secs(2);
        let msgs = run_command("sleep 60", limits).await;
        let methods = collect_methods(&msgs);
        let timeout_idx = methods.iter().position(|m| m == "error.timeout").unwrap();
        let completed_idx = methods
            .iter()
            .position(|m| m == "process.completed")
            .unwrap();
        assert!(timeout_idx < completed_idx);
        let completed = msgs.last().unwrap();
        assert_eq!(completed["params"]["cause"], "timeout");
    }

    #[tokio::test]
    async fn buffer_cap_emits_single_exhausted_marker() {
        let mut limits = test_limits();
        limits.caps.max_total_bytes = 64;
        let msgs = run_command("seq 1 200", limits).await;
        let markers: Vec<&Value> = msgs
            .iter()
            .filter(|m| m["params"]["marker"] == "buffer_exhausted")
            .collect();
        assert_eq!(markers.len(), 1);
        let emitted: usize = msgs
            .iter()
            .filter(|m| {
                m["method"] == "process.output" && m["params"].get("marker").is_none()
            })
            .map(|m| m["params"]["data"].as_str().unwrap().len())
            .sum();
        assert!(emitted <= 64);
    }

    #[tokio::test]
    async fn stream_stall_terminates_with_timeout_cause() {
        let mut limits = test_limits();
        limits.stream_timeout = Duration::from_millis(400);
        // Prints once, then goes silent far past the stall deadline.
        let msgs = run_command("echo warmup; sleep 60", limits).await;
        let methods = collect_methods(&msgs);
        assert!(methods.contains(&"error.timeout".to_string()));
        let timeout_notif = msgs.iter().find(|m| m["method"] == "error.timeout").unwrap();
        assert_eq!(timeout_notif["params"]["kind"], "stream_timeout");
        assert_eq!(msgs.last().unwrap()["params"]["cause"], "timeout");
    }

    #[tokio::test]
    async fn drainer_emits_heartbeats_during_silence() {
        let tally = Arc::new(OutputTally::new());
        let (sink, rx) = queue::channel(16, Duration::from_millis(100), Arc::clone(&tally));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (tx, mut out) = mpsc::channel(64);
        let drainer = tokio::spawn(drain_output(
            rx,
            tx,
            Arc::clone(&tally),
            Duration::from_millis(100),
            outcome_rx,
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        drop(sink);
        let _ = outcome_tx.send(Outcome {
            exit_code: 0,
            cause: CompletionCause::Normal,
        });
        drainer.await.unwrap();

        let mut heartbeats = 0;
        let mut completed = 0;
        while let Ok(v) = out.try_recv() {
            match v["method"].as_str() {
                Some("heartbeat") => heartbeats += 1,
                Some("process.completed") => completed += 1,
                _ => {}
            }
        }
        assert!(heartbeats >= 2, "expected repeated heartbeats, got {heartbeats}");
        assert_eq!(completed, 1);
    }

    #[test]
    fn paused_chunk_tag() {
        assert_eq!(StreamTag::Stdout.as_str(), "stdout");
        assert_eq!(ExecStatus::Terminating.as_str(), "terminating");
        assert_eq!(CompletionCause::Killed.as_str(), "killed");
    }
}
