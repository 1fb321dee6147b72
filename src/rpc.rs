//! JSON-RPC 2.0 framing for the WebSocket protocol.
//!
//! Every frame on the wire is a UTF-8 JSON text message. Client→server frames
//! are requests (`execute`, `control`, `hook_status`); server→client frames
//! are either responses (echoing the request `id`) or notifications (no
//! `id`, never awaiting a reply).
//!
//! ## Error codes
//!
//! | Code     | Name                  |
//! |----------|-----------------------|
//! | -32700   | `parse_error`         |
//! | -32600   | `invalid_request`     |
//! | -32601   | `method_not_found`    |
//! | -32602   | `invalid_params`      |
//! | -32603   | `internal_error`      |
//! | -32000   | `busy`                |
//! | -32001   | `no_active_execution` |
//! | -32002   | `spawn_failed`        |
//! | -32003   | `capacity_exceeded`   |
//! | -32004   | `timeout`             |
//!
//! Domain codes live in the JSON-RPC application range; the symbolic name is
//! carried in `error.data.kind` so clients don't have to hardcode numbers.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// A decoded client request frame.
///
/// `id` is kept as a raw [`Value`] so string and numeric ids round-trip
/// unchanged. A missing `id` makes the frame a notification: it is still
/// processed, but no response is sent.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Parameters of the `execute` method.
#[derive(Debug, Deserialize)]
pub struct ExecuteParams {
    pub command: String,
}

/// Parameters of the `control` method.
#[derive(Debug, Deserialize)]
pub struct ControlParams {
    #[serde(rename = "type")]
    pub kind: ControlType,
}

/// The three live-control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Pause,
    Resume,
    Cancel,
}

impl ControlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }
}

/// Error codes: the five JSON-RPC standard codes plus the domain codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Busy,
    NoActiveExecution,
    SpawnFailed,
    CapacityExceeded,
    Timeout,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Busy => -32000,
            Self::NoActiveExecution => -32001,
            Self::SpawnFailed => -32002,
            Self::CapacityExceeded => -32003,
            Self::Timeout => -32004,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::InternalError => "internal_error",
            Self::Busy => "busy",
            Self::NoActiveExecution => "no_active_execution",
            Self::SpawnFailed => "spawn_failed",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Timeout => "timeout",
        }
    }
}

/// Build a success response echoing the request `id`.
pub fn response(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build an error response. `id` is `null` when the offending frame's id
/// could not be recovered (parse errors).
pub fn error(id: Option<&Value>, code: ErrorCode, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.cloned().unwrap_or(Value::Null),
        "error": {
            "code": code.code(),
            "message": message.into(),
            "data": { "kind": code.as_str() },
        },
    })
}

/// Current wall-clock time in epoch milliseconds.
#[allow(clippy::cast_possible_truncation)]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Server→client notification constructors.
pub mod notify {
    use super::{json, now_ms, Value};

    fn notification(method: &str, params: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        })
    }

    /// `process.started` — the subprocess is live.
    pub fn process_started(pid: u32) -> Value {
        notification("process.started", json!({ "pid": pid }))
    }

    /// `process.output` — one output chunk.
    pub fn process_output(stream: &str, data: &str, truncated: bool) -> Value {
        let mut params = json!({ "stream": stream, "data": data });
        if truncated {
            params["truncated"] = json!(true);
        }
        notification("process.output", params)
    }

    /// `process.output` marker variant — a zero-data chunk flagging a
    /// truncation or stream condition (`line_truncated`, `buffer_exhausted`,
    /// `stream_error`).
    pub fn process_output_marker(stream: &str, marker: &str, data: &str) -> Value {
        notification(
            "process.output",
            json!({
                "stream": stream,
                "data": data,
                "truncated": true,
                "marker": marker,
            }),
        )
    }

    /// `process.completed` — terminal status of the execution.
    pub fn process_completed(exit_code: i32, cause: &str) -> Value {
        notification(
            "process.completed",
            json!({ "exit_code": exit_code, "cause": cause }),
        )
    }

    /// `error.token_limit_exceeded` — sentinel substring seen on stdout.
    pub fn token_limit_exceeded(limit: u64, message: &str) -> Value {
        notification(
            "error.token_limit_exceeded",
            json!({ "limit": limit, "message": message, "recoverable": true }),
        )
    }

    /// `error.timeout` — the execution hit a wall-clock or stall deadline.
    pub fn timeout(kind: &str, timeout_secs: u64) -> Value {
        notification(
            "error.timeout",
            json!({ "kind": kind, "timeout_secs": timeout_secs }),
        )
    }

    /// `error.capacity_exceeded` — sent just before closing a connection that
    /// found the registry full.
    pub fn capacity_exceeded(max_sessions: usize) -> Value {
        notification(
            "error.capacity_exceeded",
            json!({ "max_sessions": max_sessions }),
        )
    }

    /// `heartbeat` — liveness ping during silent intervals.
    pub fn heartbeat() -> Value {
        notification("heartbeat", json!({ "ts": now_ms().to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_execute_request_with_numeric_id() {
        let req: Request = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":7,"method":"execute","params":{"command":"echo hi"}}"#,
        )
        .unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(json!(7)));
        assert_eq!(req.method, "execute");
        let params: ExecuteParams = serde_json::from_value(req.params.unwrap()).unwrap();
        assert_eq!(params.command, "echo hi");
    }

    #[test]
    fn parses_string_id_and_echoes_it() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"abc","method":"hook_status"}"#).unwrap();
        let resp = response(req.id.as_ref().unwrap(), json!({"enabled": false}));
        assert_eq!(resp["id"], json!("abc"));
        assert_eq!(resp["result"]["enabled"], json!(false));
    }

    #[test]
    fn control_type_round_trip() {
        let params: ControlParams = serde_json::from_str(r#"{"type":"pause"}"#).unwrap();
        assert_eq!(params.kind, ControlType::Pause);
        assert!(serde_json::from_str::<ControlParams>(r#"{"type":"sigterm"}"#).is_err());
    }

    #[test]
    fn error_carries_code_and_kind() {
        let err = error(Some(&json!(1)), ErrorCode::Busy, "already running");
        assert_eq!(err["error"]["code"], json!(-32000));
        assert_eq!(err["error"]["data"]["kind"], json!("busy"));
        assert_eq!(err["id"], json!(1));
    }

    #[test]
    fn error_without_id_uses_null() {
        let err = error(None, ErrorCode::ParseError, "bad json");
        assert_eq!(err["id"], Value::Null);
    }

    #[test]
    fn notifications_have_no_id() {
        let n = notify::process_completed(0, "normal");
        assert!(n.get("id").is_none());
        assert_eq!(n["method"], json!("process.completed"));
        assert_eq!(n["params"]["cause"], json!("normal"));
    }

    #[test]
    fn output_omits_truncated_when_false() {
        let n = notify::process_output("stdout", "hello\n", false);
        assert!(n["params"].get("truncated").is_none());
        let t = notify::process_output_marker("stdout", "line_truncated", "");
        assert_eq!(t["params"]["truncated"], json!(true));
        assert_eq!(t["params"]["marker"], json!("line_truncated"));
    }
}
