//! WebSocket transport: JSON-RPC 2.0 request routing per connection.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /api/ws`. The upgrade always completes; a full
//!    registry is reported in-band with an `error.capacity_exceeded`
//!    notification followed by a close frame, so clients get a reason
//!    instead of a bare refusal.
//! 2. One connection is one session. Requests are handled in arrival order;
//!    different connections proceed independently.
//! 3. On disconnect the session's cancellation token trips, the live
//!    execution (if any) is terminated and reaped, and the session is
//!    unregistered — always in that order.
//!
//! ## Methods (client → server)
//!
//! | Method        | Params                                  | Result                           | Errors                                   |
//! |---------------|-----------------------------------------|----------------------------------|------------------------------------------|
//! | `execute`     | `{ "command": string }`                 | `{ "pid": number }`              | `busy`, `spawn_failed`, `invalid_params` |
//! | `control`     | `{ "type": "pause"\|"resume"\|"cancel" }` | `{ "ok": true }`               | `no_active_execution`, `invalid_params`  |
//! | `hook_status` | `{}`                                    | `{ "enabled", "hooks_configured" }` | —                                     |
//!
//! ## Notifications (server → client)
//!
//! | Method                       | Key params                                  |
//! |------------------------------|---------------------------------------------|
//! | `process.started`            | `pid`                                       |
//! | `process.output`             | `stream`, `data`, `truncated?`, `marker?`   |
//! | `process.completed`          | `exit_code`, `cause`                        |
//! | `error.token_limit_exceeded` | `limit`, `message`, `recoverable`           |
//! | `error.timeout`              | `kind`, `timeout_secs`                      |
//! | `heartbeat`                  | `ts`                                        |
//!
//! All frames are UTF-8 JSON text; binary frames are rejected with
//! `invalid_request`. Outgoing messages are funneled through one mpsc
//! channel per connection, which serializes every write on the socket —
//! responses, execution output, and heartbeats cannot interleave mid-frame.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::rpc::{self, ControlParams, ErrorCode, ExecuteParams, Request};
use crate::sessions::execution::{ExecuteError, ExecutionLimits};
use crate::sessions::Session;
use crate::AppState;

/// Slack on top of the grace period when waiting for a disconnected
/// session's execution to wind down (stream drain + reap margins).
const TEARDOWN_MARGIN: Duration = Duration::from_secs(25);

/// `GET /api/ws` — WebSocket upgrade handler.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main per-connection event loop.
///
/// Splits the socket into a sink (outgoing) and stream (incoming). Outgoing
/// messages are funneled through an mpsc channel so execution tasks can send
/// without holding a reference to the socket.
async fn handle_ws(mut socket: axum::extract::ws::WebSocket, state: AppState) {
    // Accept-then-reject on capacity: the client gets a typed reason.
    let session = match state.registry.register().await {
        Ok(session) => session,
        Err(e) => {
            warn!("Connection rejected: {e}");
            let notif = rpc::notify::capacity_exceeded(state.config.server.max_sessions);
            if let Ok(text) = serde_json::to_string(&notif) {
                let _ = socket
                    .send(axum::extract::ws::Message::Text(text.into()))
                    .await;
            }
            let _ = socket
                .send(axum::extract::ws::Message::Close(Some(
                    axum::extract::ws::CloseFrame {
                        code: 1013, // try again later
                        reason: "capacity_exceeded".into(),
                    },
                )))
                .await;
            return;
        }
    };
    info!("Session {} connected", session.id);

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Channel for sending messages back to the WebSocket
    let (tx, mut rx) = mpsc::channel::<Value>(256);

    // Task: forward channel messages to the WebSocket sink
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    error!("WS send: failed to serialize message: {e}");
                    continue;
                }
            };
            if ws_sink
                .send(axum::extract::ws::Message::Text(text.into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Process incoming frames until the socket closes or the server shuts
    // down (the session token also trips on shutdown).
    loop {
        tokio::select! {
            ws_msg = ws_stream.next() => {
                let Some(Ok(msg)) = ws_msg else { break };
                match msg {
                    axum::extract::ws::Message::Text(text) => {
                        handle_frame(&state, &session, &tx, &text).await;
                    }
                    axum::extract::ws::Message::Binary(_) => {
                        let _ = tx
                            .send(rpc::error(
                                None,
                                ErrorCode::InvalidRequest,
                                "binary frames are not supported",
                            ))
                            .await;
                    }
                    axum::extract::ws::Message::Close(_) => break,
                    _ => {}
                }
            }
            () = session.cancel.cancelled() => break,
        }
    }

    // Disconnect: terminate and reap before releasing the registry slot.
    info!("Session {} disconnected", session.id);
    let limit = Duration::from_secs(state.config.limits.grace_period_secs) + TEARDOWN_MARGIN;
    session.teardown(limit).await;
    state.registry.unregister(&session.id).await;
    send_task.abort();
}

/// Decode one text frame and dispatch it.
async fn handle_frame(
    state: &AppState,
    session: &Arc<Session>,
    tx: &mpsc::Sender<Value>,
    text: &str,
) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        let _ = tx
            .send(rpc::error(
                None,
                ErrorCode::ParseError,
                "failed to parse JSON frame",
            ))
            .await;
        return;
    };

    // Keep the id for error reporting even when the envelope is malformed.
    let id = value.get("id").cloned().filter(|v| !v.is_null());

    let request: Request = match serde_json::from_value(value) {
        Ok(req) => req,
        Err(_) => {
            let _ = tx
                .send(rpc::error(
                    id.as_ref(),
                    ErrorCode::InvalidRequest,
                    "not a JSON-RPC request",
                ))
                .await;
            return;
        }
    };

    if request.jsonrpc != "2.0" {
        let _ = tx
            .send(rpc::error(
                id.as_ref(),
                ErrorCode::InvalidRequest,
                "unsupported jsonrpc version",
            ))
            .await;
        return;
    }

    match request.method.as_str() {
        "execute" => handle_execute(state, session, tx, &request).await,
        "control" => handle_control(session, tx, &request).await,
        "hook_status" => {
            respond(
                tx,
                &request,
                serde_json::json!({
                    "enabled": state.hooks.is_enabled(),
                    "hooks_configured": state.hooks.names(),
                }),
            )
            .await;
        }
        other => {
            let _ = tx
                .send(rpc::error(
                    request.id.as_ref(),
                    ErrorCode::MethodNotFound,
                    format!("unknown method: {other}"),
                ))
                .await;
        }
    }
}

/// Handle `execute` — spawn a subprocess for this session.
///
/// The success response (carrying the pid) is queued before the execution is
/// launched, so it always precedes `process.started` on the wire.
async fn handle_execute(
    state: &AppState,
    session: &Arc<Session>,
    tx: &mpsc::Sender<Value>,
    request: &Request,
) {
    let params: ExecuteParams = match parse_params(request) {
        Ok(p) => p,
        Err(msg) => {
            let _ = tx
                .send(rpc::error(request.id.as_ref(), ErrorCode::InvalidParams, msg))
                .await;
            return;
        }
    };
    if params.command.trim().is_empty() {
        let _ = tx
            .send(rpc::error(
                request.id.as_ref(),
                ErrorCode::InvalidParams,
                "command must not be empty",
            ))
            .await;
        return;
    }
    if !command_allowed(&state.config.exec.allowed_commands, &params.command) {
        let _ = tx
            .send(rpc::error(
                request.id.as_ref(),
                ErrorCode::InvalidParams,
                "command is not in the allow-list",
            ))
            .await;
        return;
    }

    let limits = ExecutionLimits::from_config(&state.config);
    match session
        .start_execution(
            params.command,
            &state.config.exec.shell,
            &state.config.exec.working_dir,
            &state.hooks,
            limits,
            tx.clone(),
        )
        .await
    {
        Ok(pending) => {
            let pid = pending.pid();
            respond(tx, request, serde_json::json!({ "pid": pid })).await;
            pending.launch().await;
        }
        Err(ExecuteError::Busy) => {
            let _ = tx
                .send(rpc::error(
                    request.id.as_ref(),
                    ErrorCode::Busy,
                    "session already has a live execution",
                ))
                .await;
        }
        Err(err @ (ExecuteError::Hook(_) | ExecuteError::Spawn(_))) => {
            warn!("Session {}: {err}", session.id);
            let _ = tx
                .send(rpc::error(
                    request.id.as_ref(),
                    ErrorCode::SpawnFailed,
                    err.to_string(),
                ))
                .await;
        }
    }
}

/// Handle `control` — pause/resume/cancel the current execution.
async fn handle_control(session: &Arc<Session>, tx: &mpsc::Sender<Value>, request: &Request) {
    let params: ControlParams = match parse_params(request) {
        Ok(p) => p,
        Err(msg) => {
            let _ = tx
                .send(rpc::error(request.id.as_ref(), ErrorCode::InvalidParams, msg))
                .await;
            return;
        }
    };

    if session.control(params.kind).await {
        respond(tx, request, serde_json::json!({ "ok": true })).await;
    } else {
        let _ = tx
            .send(rpc::error(
                request.id.as_ref(),
                ErrorCode::NoActiveExecution,
                "no active execution",
            ))
            .await;
    }
}

/// Decode `request.params`, treating absent params as `{}`.
fn parse_params<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, String> {
    let params = request
        .params
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    serde_json::from_value(params).map_err(|e| format!("invalid params: {e}"))
}

/// Send a success response, unless the request was a notification (no id).
async fn respond(tx: &mpsc::Sender<Value>, request: &Request, result: Value) {
    if let Some(id) = &request.id {
        let _ = tx.send(rpc::response(id, result)).await;
    }
}

/// Allow-list check on the leading token of the command line. An empty list
/// permits everything.
fn command_allowed(allowed: &[String], command: &str) -> bool {
    if allowed.is_empty() {
        return true;
    }
    command
        .split_whitespace()
        .next()
        .is_some_and(|head| allowed.iter().any(|a| a == head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_all() {
        assert!(command_allowed(&[], "rm -rf /tmp/x"));
    }

    #[test]
    fn allow_list_matches_leading_token_only() {
        let allowed = vec!["claude".to_string(), "echo".to_string()];
        assert!(command_allowed(&allowed, "claude -p 'hi'"));
        assert!(command_allowed(&allowed, "echo hello"));
        assert!(!command_allowed(&allowed, "rm -rf /"));
        assert!(!command_allowed(&allowed, "claudex --evil"));
        assert!(!command_allowed(&allowed, ""));
    }
}
