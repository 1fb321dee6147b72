//! Pre-spawn command transform seam.
//!
//! A [`CommandHook`] gets one shot at rewriting `(command, env)` before the
//! supervisor spawns anything. Hooks are expected to be pure and fast; any
//! that need I/O get it anyway — the whole chain runs on the blocking pool
//! under a hard timeout, never on the scheduler threads. A hook error or
//! timeout surfaces to the client as `spawn_failed`.
//!
//! No hooks ship by default; `hook_status` then reports `enabled: false`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

/// Hard cap on one `execute`'s full hook chain.
const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// A single pre-spawn transform.
pub trait CommandHook: Send + Sync {
    /// Short identifier reported by `hook_status`.
    fn name(&self) -> &str;

    /// Rewrite the command line and extra environment. Returning `Err`
    /// aborts the `execute` request before anything is spawned.
    fn transform(
        &self,
        command: String,
        env: HashMap<String, String>,
    ) -> Result<(String, HashMap<String, String>), String>;
}

/// The configured hook chain, applied in order.
#[derive(Clone)]
pub struct HookSet {
    hooks: Vec<Arc<dyn CommandHook>>,
}

impl HookSet {
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn new(hooks: Vec<Arc<dyn CommandHook>>) -> Self {
        Self { hooks }
    }

    pub fn is_enabled(&self) -> bool {
        !self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.iter().map(|h| h.name().to_string()).collect()
    }

    /// Run the chain on the blocking pool with a hard timeout.
    pub async fn apply(
        &self,
        command: String,
        env: HashMap<String, String>,
    ) -> Result<(String, HashMap<String, String>), String> {
        if self.hooks.is_empty() {
            return Ok((command, env));
        }

        let hooks = self.hooks.clone();
        let task = tokio::task::spawn_blocking(move || {
            hooks.iter().try_fold((command, env), |(cmd, env), hook| {
                hook.transform(cmd, env)
                    .map_err(|e| format!("hook {}: {e}", hook.name()))
            })
        });

        match tokio::time::timeout(HOOK_TIMEOUT, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Hook chain panicked: {e}");
                Err("hook chain panicked".to_string())
            }
            Err(_) => Err(format!("hook chain timed out after {HOOK_TIMEOUT:?}")),
        }
    }
}

impl Default for HookSet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Prefixer;

    impl CommandHook for Prefixer {
        fn name(&self) -> &str {
            "prefixer"
        }

        fn transform(
            &self,
            command: String,
            mut env: HashMap<String, String>,
        ) -> Result<(String, HashMap<String, String>), String> {
            env.insert("HOOKED".into(), "1".into());
            Ok((format!("nice -n 10 {command}"), env))
        }
    }

    struct Rejector;

    impl CommandHook for Rejector {
        fn name(&self) -> &str {
            "rejector"
        }

        fn transform(
            &self,
            _command: String,
            _env: HashMap<String, String>,
        ) -> Result<(String, HashMap<String, String>), String> {
            Err("denied".to_string())
        }
    }

    #[tokio::test]
    async fn empty_set_passes_through() {
        let hooks = HookSet::empty();
        assert!(!hooks.is_enabled());
        let (cmd, env) = hooks.apply("echo hi".into(), HashMap::new()).await.unwrap();
        assert_eq!(cmd, "echo hi");
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn hooks_apply_in_order() {
        let hooks = HookSet::new(vec![Arc::new(Prefixer)]);
        assert_eq!(hooks.names(), vec!["prefixer"]);
        let (cmd, env) = hooks.apply("claude -p hi".into(), HashMap::new()).await.unwrap();
        assert_eq!(cmd, "nice -n 10 claude -p hi");
        assert_eq!(env.get("HOOKED").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn hook_error_names_the_hook() {
        let hooks = HookSet::new(vec![Arc::new(Prefixer), Arc::new(Rejector)]);
        let err = hooks.apply("echo hi".into(), HashMap::new()).await.unwrap_err();
        assert!(err.contains("rejector"));
        assert!(err.contains("denied"));
    }
}
