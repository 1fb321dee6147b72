//! Session lifecycle management.
//!
//! One WebSocket connection is one [`Session`]: an identifier, a
//! cancellation token, and a slot for at most one live [`execution::Execution`].
//! The [`SessionRegistry`] is the only process-wide table; it enforces the
//! `max_sessions` cap and serializes mutations behind a single `RwLock`.
//!
//! ## Concurrency
//!
//! `register` holds the write lock across the capacity check and the insert
//! to prevent TOCTOU races. The lock is only ever held for the table
//! operation itself — spawning, signaling, and teardown all happen outside
//! it. `unregister` is idempotent; every disconnect path calls it exactly
//! once before the connection task returns, so a registry entry can never
//! outlive its socket.

pub mod execution;
pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::hooks::HookSet;
use crate::rpc::ControlType;
use execution::{ExecuteError, Execution, ExecutionLimits, PendingExecution};

/// One connection's server-side state.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub created_at: Instant,
    /// Tripped on disconnect, explicit cancel (via a child token), or server
    /// shutdown. Observed at every suspension point of the session's tasks.
    pub cancel: CancellationToken,
    /// The supervisor slot — at most one live execution.
    execution: Mutex<Option<Arc<Execution>>>,
    /// Handle of the current run task, awaited during teardown.
    run_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(id: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            created_at: Instant::now(),
            cancel: CancellationToken::new(),
            execution: Mutex::new(None),
            run_task: Mutex::new(None),
        })
    }

    /// Start a new execution: hook transform, spawn, occupy the slot.
    ///
    /// Returns the pending execution so the caller can queue the JSON-RPC
    /// response before [`PendingExecution::launch`] emits `process.started`.
    pub async fn start_execution(
        self: &Arc<Self>,
        command: String,
        shell: &str,
        working_dir: &str,
        hooks: &HookSet,
        limits: ExecutionLimits,
        outbound: mpsc::Sender<Value>,
    ) -> Result<PendingExecution, ExecuteError> {
        let mut slot = self.execution.lock().await;
        if slot.is_some() {
            return Err(ExecuteError::Busy);
        }

        let (command, env) = hooks
            .apply(command, HashMap::new())
            .await
            .map_err(ExecuteError::Hook)?;

        let pending = execution::prepare(
            Arc::clone(self),
            command,
            env,
            shell,
            working_dir,
            limits,
            outbound,
        )?;
        *slot = Some(pending.handle());
        Ok(pending)
    }

    /// Apply a control verb to the current execution. Returns false when the
    /// session is idle (`no_active_execution`).
    pub async fn control(&self, kind: ControlType) -> bool {
        let exec = self.execution.lock().await.as_ref().map(Arc::clone);
        match exec {
            Some(exec) => {
                exec.control(kind).await;
                true
            }
            None => false,
        }
    }

    /// Pid of the live execution, if any.
    pub async fn active_pid(&self) -> Option<u32> {
        self.execution.lock().await.as_ref().map(|e| e.pid)
    }

    pub(crate) async fn store_run_task(&self, handle: tokio::task::JoinHandle<()>) {
        *self.run_task.lock().await = Some(handle);
    }

    /// Free the slot once the given execution reached a terminal state.
    /// Guarded by pointer identity so a stale call can't evict a successor.
    pub(crate) async fn clear_execution(&self, exec: &Arc<Execution>) {
        let mut slot = self.execution.lock().await;
        if slot.as_ref().is_some_and(|cur| Arc::ptr_eq(cur, exec)) {
            *slot = None;
        }
    }

    /// Wait for the current execution (if any) to reach a terminal state and
    /// free its slot. Returns only once the run task has finished — the
    /// registry slot must not be freed while the process group is still
    /// being reaped. `limit` is the expected worst case; overrunning it is
    /// an invariant violation and is alarmed, but the wait continues (the
    /// run task's own grace and reap timeouts bound how long that can take).
    pub async fn wait_idle(&self, limit: std::time::Duration) {
        let handle = self.run_task.lock().await.take();
        let Some(mut handle) = handle else { return };
        match tokio::time::timeout(limit, &mut handle).await {
            Ok(result) => {
                if let Err(e) = result {
                    error!("Session {}: execution task failed: {e}", self.id);
                }
            }
            Err(_) => {
                error!(
                    "Session {}: execution did not wind down within {limit:?}, \
                     waiting for reap before releasing the session",
                    self.id
                );
                if let Err(e) = handle.await {
                    error!("Session {}: execution task failed: {e}", self.id);
                }
            }
        }
    }

    /// Full teardown on disconnect or shutdown: trip the token, then wait
    /// for the execution to terminate and the process group to be reaped.
    pub async fn teardown(&self, limit: std::time::Duration) {
        self.cancel.cancel();
        self.wait_idle(limit).await;
    }
}

/// Process-wide table of live sessions.
///
/// Cloneable — all clones share the same inner `Arc<RwLock<...>>`.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
        }
    }

    /// Atomically check capacity and insert a new session.
    pub async fn register(&self) -> Result<Arc<Session>, String> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(format!("Session limit reached (max {})", self.max_sessions));
        }
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());
        sessions.insert(id, Arc::clone(&session));
        info!("Session {} registered, total: {}", session.id, sessions.len());
        Ok(session)
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).map(Arc::clone)
    }

    /// Remove a session. Idempotent — a second call for the same id is a
    /// no-op.
    pub async fn unregister(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            info!("Session {id} unregistered, remaining: {}", sessions.len());
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Cancel every session and wait (bounded) for the table to empty.
    /// Connection handlers observe their token, tear down their executions,
    /// and unregister themselves; this only has to wait for them.
    pub async fn shutdown_all(&self, drain: std::time::Duration) {
        let snapshot: Vec<Arc<Session>> = self
            .sessions
            .read()
            .await
            .values()
            .map(Arc::clone)
            .collect();
        if snapshot.is_empty() {
            return;
        }
        info!("Shutting down {} session(s)", snapshot.len());
        for session in &snapshot {
            session.cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + drain;
        loop {
            if self.count().await == 0 {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "{} session(s) still registered after shutdown drain",
                    self.count().await
                );
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_enforces_capacity_atomically() {
        let registry = SessionRegistry::new(2);
        let a = registry.register().await.unwrap();
        let _b = registry.register().await.unwrap();
        let err = registry.register().await.unwrap_err();
        assert!(err.contains("max 2"));
        assert_eq!(registry.count().await, 2);

        // Freeing a slot re-admits new sessions.
        registry.unregister(&a.id).await;
        assert!(registry.register().await.is_ok());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = SessionRegistry::new(4);
        let s = registry.register().await.unwrap();
        registry.unregister(&s.id).await;
        registry.unregister(&s.id).await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn lookup_finds_registered_sessions_only() {
        let registry = SessionRegistry::new(4);
        let s = registry.register().await.unwrap();
        assert!(registry.lookup(&s.id).await.is_some());
        assert!(registry.lookup("nope").await.is_none());
    }

    #[tokio::test]
    async fn control_on_idle_session_reports_no_execution() {
        let registry = SessionRegistry::new(4);
        let s = registry.register().await.unwrap();
        assert!(!s.control(ControlType::Cancel).await);
        assert_eq!(s.active_pid().await, None);
    }

    #[tokio::test]
    async fn shutdown_cancels_all_tokens() {
        let registry = SessionRegistry::new(4);
        let s = registry.register().await.unwrap();
        let id = s.id.clone();
        let reg2 = registry.clone();
        // Simulate the connection handler: unregister once cancelled.
        let task = tokio::spawn(async move {
            s.cancel.cancelled().await;
            reg2.unregister(&id).await;
        });
        registry
            .shutdown_all(std::time::Duration::from_secs(2))
            .await;
        assert_eq!(registry.count().await, 0);
        task.await.unwrap();
    }
}
