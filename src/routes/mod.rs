//! HTTP route handlers.
//!
//! The WebSocket endpoint carries the whole protocol; the only plain HTTP
//! surface is the health probe.

pub mod health;
