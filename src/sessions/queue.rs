//! Bounded chunk queue between the stream reader and the socket drainer.
//!
//! The put side waits at most `put_timeout` for a free slot. Past that the
//! chunk is dropped and counted, and the execution is flagged exhausted so
//! the drainer can render the single `buffer_exhausted` marker. Blocking
//! indefinitely here would let a stuck client back the queue up into the
//! child's stdout pipe and eventually deadlock the child on write — dropping
//! with a marker trades completeness for liveness.
//!
//! [`OutputTally`] is the shared accounting for one execution: emitted
//! bytes/lines (charged by the reader against the caps), dropped lines, the
//! exhausted flag, and the last-progress timestamp used by the stall
//! watchdog.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::process::stream::{Chunk, StreamCaps, StreamTag};
use crate::rpc::now_ms;

/// Shared output accounting for a single execution.
#[derive(Debug)]
pub struct OutputTally {
    total_bytes: AtomicU64,
    emitted_lines: AtomicU64,
    dropped_lines: AtomicU64,
    exhausted: AtomicBool,
    /// 0 = stdout, 1 = stderr; only meaningful once `exhausted` is set.
    exhausted_stream: AtomicU8,
    last_progress_ms: AtomicU64,
}

impl OutputTally {
    pub fn new() -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            emitted_lines: AtomicU64::new(0),
            dropped_lines: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
            exhausted_stream: AtomicU8::new(0),
            last_progress_ms: AtomicU64::new(now_ms()),
        }
    }

    /// Charge one line against the caps. Returns false (and charges nothing)
    /// when emitting it would cross either cap.
    pub fn try_charge(&self, bytes: u64, caps: &StreamCaps) -> bool {
        let total = self.total_bytes.load(Ordering::Relaxed);
        let lines = self.emitted_lines.load(Ordering::Relaxed);
        if total + bytes > caps.max_total_bytes || lines + 1 > caps.max_line_count {
            return false;
        }
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.emitted_lines.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Flag the execution exhausted. First caller wins; the stream recorded
    /// is the one that crossed the threshold.
    pub fn mark_exhausted(&self, stream: StreamTag) {
        let idx = match stream {
            StreamTag::Stdout => 0,
            StreamTag::Stderr => 1,
        };
        if !self.exhausted.swap(true, Ordering::Relaxed) {
            self.exhausted_stream.store(idx, Ordering::Relaxed);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }

    /// The stream that first crossed a cap (valid once exhausted).
    pub fn exhausted_stream(&self) -> StreamTag {
        match self.exhausted_stream.load(Ordering::Relaxed) {
            1 => StreamTag::Stderr,
            _ => StreamTag::Stdout,
        }
    }

    pub fn add_dropped(&self, n: u64) {
        self.dropped_lines.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_lines.load(Ordering::Relaxed)
    }

    pub fn emitted_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn emitted_lines(&self) -> u64 {
        self.emitted_lines.load(Ordering::Relaxed)
    }

    /// Record read progress (any bytes off either pipe).
    pub fn touch_progress(&self) {
        self.last_progress_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Milliseconds since the last read progress.
    pub fn progress_age_ms(&self) -> u64 {
        now_ms().saturating_sub(self.last_progress_ms.load(Ordering::Relaxed))
    }
}

impl Default for OutputTally {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer half of the bounded chunk queue.
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Chunk>,
    put_timeout: Duration,
    tally: Arc<OutputTally>,
}

/// Create the bounded queue for one execution.
pub fn channel(
    capacity: usize,
    put_timeout: Duration,
    tally: Arc<OutputTally>,
) -> (ChunkSender, mpsc::Receiver<Chunk>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChunkSender {
            tx,
            put_timeout,
            tally,
        },
        rx,
    )
}

impl ChunkSender {
    /// Timed put. On timeout the chunk is dropped, counted, and the
    /// execution flagged exhausted; on a closed receiver (drainer torn down
    /// at disconnect) the chunk is dropped silently.
    pub async fn send(&self, chunk: Chunk) {
        let stream = chunk.stream().unwrap_or(StreamTag::Stdout);
        match tokio::time::timeout(self.put_timeout, self.tx.send(chunk)).await {
            Ok(Ok(())) => {}
            Ok(Err(_closed)) => {}
            Err(_elapsed) => {
                self.tally.add_dropped(1);
                self.tally.mark_exhausted(stream);
            }
        }
    }
}
