#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! cc-executor library — exposes the execution core for tests and embedding.
//!
//! The key building blocks:
//! - `config` — configuration loading
//! - `rpc` — JSON-RPC 2.0 framing and notification constructors
//! - `sessions` — session registry and per-session execution state machine
//! - `process` — process-group supervision and stream multiplexing
//! - `hooks` — pre-spawn command transform seam
//! - `ws` — WebSocket protocol handling
//! - `routes` — the HTTP health probe

pub mod config;
pub mod hooks;
pub mod process;
pub mod routes;
pub mod rpc;
pub mod sessions;
pub mod state;
pub mod ws;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use hooks::{CommandHook, HookSet};
pub use sessions::SessionRegistry;
pub use state::AppState;
