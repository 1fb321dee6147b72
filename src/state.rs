//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::hooks::HookSet;
use crate::sessions::SessionRegistry;

/// Shared application state for the executor server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// The process-wide session table.
    pub registry: SessionRegistry,
    /// Pre-spawn command transform chain (empty by default).
    pub hooks: Arc<HookSet>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let max_sessions = config.server.max_sessions;
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            registry: SessionRegistry::new(max_sessions),
            hooks: Arc::new(HookSet::empty()),
        }
    }
}
