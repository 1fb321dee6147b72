//! Subprocess supervision and output multiplexing.
//!
//! Two layers:
//!
//! - [`group`] — spawning commands in their own process group, delivering
//!   signals to the whole group, and guaranteeing the group is reaped on
//!   every exit path.
//! - [`stream`] — converting the child's stdout/stderr pipes into a bounded,
//!   line-framed chunk sequence with token-limit sentinel detection.

pub mod group;
pub mod stream;
