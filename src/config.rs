//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `CC_EXECUTOR_LISTEN`,
//!    `CC_EXECUTOR_MAX_SESSIONS`, `CC_EXECUTOR_SESSION_TIMEOUT`, … (see
//!    [`Config::load`])
//! 2. **Config file** — path via `--config <path>`, or `cc-executor.toml`
//!    in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8347"
//! max_connections = 256
//! max_sessions = 100
//!
//! [limits]
//! session_timeout_secs = 3600
//! stream_timeout_secs = 600
//! max_buffer_bytes = 1048576   # 1 MiB
//! max_buffer_lines = 10000
//! max_line_bytes = 8192
//! heartbeat_interval_secs = 20
//! grace_period_secs = 10
//! queue_capacity = 1024
//! queue_put_timeout_ms = 100
//!
//! [exec]
//! shell = "/bin/sh"
//! working_dir = "."
//! allowed_commands = []        # empty = permit all
//! token_limit_patterns = ["output token maximum"]
//!
//! [logging]
//! level = "info"
//!
//! [supervisor]
//! max_backoff = 60
//! stable_threshold = 60
//! ```
//!
//! Configuration failures are the only fatal startup errors: an unreadable
//! or unparsable file, or an unparsable env override, panics before the
//! server binds.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Listener and capacity settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8347`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum concurrent TCP connections, enforced by a tower layer
    /// (default 256). Independent of `max_sessions`.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum concurrent sessions in the registry (default 100).
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// Per-execution resource and timing limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Wall-clock cap per execution in seconds (default 3600).
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Max seconds without any stdout/stderr progress before termination
    /// (default 600). The AI tool legitimately thinks for 30–60 s, so this
    /// must stay well above that.
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
    /// Total output byte budget per execution (default 1 MiB).
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: u64,
    /// Total output line budget per execution (default 10 000).
    #[serde(default = "default_max_buffer_lines")]
    pub max_buffer_lines: u64,
    /// Per-line truncation threshold in bytes (default 8192).
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Idle seconds before a `heartbeat` notification (default 20).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Seconds between SIGTERM and SIGKILL escalation (default 10).
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Chunk queue depth between reader and drainer (default 1024).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Bounded wait for a queue slot in milliseconds (default 100); past it
    /// the chunk is dropped and counted.
    #[serde(default = "default_queue_put_timeout_ms")]
    pub queue_put_timeout_ms: u64,
}

/// Subprocess spawning defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecConfig {
    /// Shell used for `<shell> -c <command>` (default `/bin/sh`).
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Working directory for spawned commands (default `.`).
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Allow-list for the leading token of `command`; empty permits all.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Stdout substrings that trigger `error.token_limit_exceeded`.
    #[serde(default = "default_token_limit_patterns")]
    pub token_limit_patterns: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Supervisor settings for `cc-executor supervise`.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Maximum seconds between restart attempts (default 60).
    #[serde(default = "default_supervisor_max_backoff")]
    pub max_backoff: u64,
    /// Seconds of uptime before resetting backoff (default 60).
    #[serde(default = "default_supervisor_stable_threshold")]
    pub stable_threshold: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8347".to_string()
}
fn default_max_connections() -> usize {
    256
}
fn default_max_sessions() -> usize {
    100
}
fn default_session_timeout_secs() -> u64 {
    3600
}
fn default_stream_timeout_secs() -> u64 {
    600
}
fn default_max_buffer_bytes() -> u64 {
    1024 * 1024 // 1 MiB
}
fn default_max_buffer_lines() -> u64 {
    10_000
}
fn default_max_line_bytes() -> usize {
    8192
}
fn default_heartbeat_interval_secs() -> u64 {
    20
}
fn default_grace_period_secs() -> u64 {
    10
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_queue_put_timeout_ms() -> u64 {
    100
}
fn default_shell() -> String {
    "/bin/sh".to_string()
}
fn default_working_dir() -> String {
    ".".to_string()
}
fn default_token_limit_patterns() -> Vec<String> {
    vec!["output token maximum".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_supervisor_max_backoff() -> u64 {
    60
}
fn default_supervisor_stable_threshold() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
            max_buffer_bytes: default_max_buffer_bytes(),
            max_buffer_lines: default_max_buffer_lines(),
            max_line_bytes: default_max_line_bytes(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
            queue_capacity: default_queue_capacity(),
            queue_put_timeout_ms: default_queue_put_timeout_ms(),
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            working_dir: default_working_dir(),
            allowed_commands: Vec::new(),
            token_limit_patterns: default_token_limit_patterns(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_backoff: default_supervisor_max_backoff(),
            stable_threshold: default_supervisor_stable_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            exec: ExecConfig::default(),
            logging: LoggingConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Parse an env override, panicking on garbage — a half-applied limit is
/// worse than refusing to start.
fn env_override<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => panic!("Invalid value for {name}: {raw:?}"),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise
    /// looks for `cc-executor.toml` in the current directory, falling back
    /// to compiled defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("cc-executor.toml").exists() {
            let content = std::fs::read_to_string("cc-executor.toml")
                .expect("Failed to read cc-executor.toml");
            toml::from_str(&content).expect("Failed to parse cc-executor.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        env_override("CC_EXECUTOR_LISTEN", &mut config.server.listen);
        env_override("CC_EXECUTOR_MAX_SESSIONS", &mut config.server.max_sessions);
        env_override(
            "CC_EXECUTOR_SESSION_TIMEOUT",
            &mut config.limits.session_timeout_secs,
        );
        env_override(
            "CC_EXECUTOR_STREAM_TIMEOUT",
            &mut config.limits.stream_timeout_secs,
        );
        env_override(
            "CC_EXECUTOR_MAX_BUFFER_BYTES",
            &mut config.limits.max_buffer_bytes,
        );
        env_override(
            "CC_EXECUTOR_MAX_BUFFER_LINES",
            &mut config.limits.max_buffer_lines,
        );
        env_override(
            "CC_EXECUTOR_MAX_LINE_BYTES",
            &mut config.limits.max_line_bytes,
        );
        env_override(
            "CC_EXECUTOR_HEARTBEAT_INTERVAL",
            &mut config.limits.heartbeat_interval_secs,
        );
        env_override(
            "CC_EXECUTOR_GRACE_PERIOD",
            &mut config.limits.grace_period_secs,
        );
        env_override("CC_EXECUTOR_SHELL", &mut config.exec.shell);
        if let Ok(raw) = std::env::var("CC_EXECUTOR_ALLOWED_COMMANDS") {
            config.exec.allowed_commands = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        config
    }

    /// Sanity-check the loaded values. Returns human-readable problems; any
    /// problem is fatal at startup.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.server.max_sessions == 0 {
            errors.push("server.max_sessions must be at least 1".to_string());
        }
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.listen is not a valid socket address: {}",
                self.server.listen
            ));
        }
        if self.limits.max_line_bytes == 0 {
            errors.push("limits.max_line_bytes must be at least 1".to_string());
        }
        if self.limits.max_buffer_bytes < self.limits.max_line_bytes as u64 {
            errors.push(
                "limits.max_buffer_bytes must be at least limits.max_line_bytes".to_string(),
            );
        }
        if self.limits.max_buffer_lines == 0 {
            errors.push("limits.max_buffer_lines must be at least 1".to_string());
        }
        if self.limits.queue_capacity == 0 {
            errors.push("limits.queue_capacity must be at least 1".to_string());
        }
        if self.limits.grace_period_secs == 0 {
            errors.push("limits.grace_period_secs must be at least 1".to_string());
        }
        if self.limits.heartbeat_interval_secs == 0 {
            errors.push("limits.heartbeat_interval_secs must be at least 1".to_string());
        }
        if self.exec.shell.is_empty() {
            errors.push("exec.shell must not be empty".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.server.max_sessions, 100);
        assert_eq!(config.limits.max_buffer_bytes, 1024 * 1024);
        assert_eq!(config.limits.grace_period_secs, 10);
        assert_eq!(
            config.exec.token_limit_patterns,
            vec!["output token maximum"]
        );
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            max_sessions = 2

            [limits]
            max_buffer_bytes = 65536
            "#,
        )
        .unwrap();
        assert_eq!(config.server.max_sessions, 2);
        assert_eq!(config.limits.max_buffer_bytes, 65536);
        assert_eq!(config.limits.max_line_bytes, 8192);
        assert_eq!(config.exec.shell, "/bin/sh");
    }

    #[test]
    fn validate_flags_zero_capacity() {
        let mut config = Config::default();
        config.server.max_sessions = 0;
        config.limits.queue_capacity = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn validate_flags_bad_listen_addr() {
        let mut config = Config::default();
        config.server.listen = "not-an-addr".to_string();
        assert_eq!(config.validate().len(), 1);
    }
}
