//! Line-framed multiplexing of a child's stdout/stderr with hard caps.
//!
//! Both pipes are read concurrently and split on newline. Three caps bound
//! the output of one execution:
//!
//! - `max_line_bytes` — an oversized line is emitted truncated to the cap,
//!   followed by a `line_truncated` marker; the remainder up to the next
//!   newline is discarded without buffering.
//! - `max_total_bytes` / `max_line_count` — once either is reached the
//!   execution is marked exhausted and further lines are counted into the
//!   dropped-lines tally instead of being emitted. The drainer renders the
//!   single `buffer_exhausted` marker from that flag.
//!
//! The reader never waits for the consumer beyond the queue's bounded put
//! (see [`crate::sessions::queue`]); a slow client therefore cannot back up
//! into the child's pipe and block it on write.
//!
//! Stdout lines are additionally scanned for token-limit sentinel substrings
//! (the AI CLI prints a recognizable phrase when it runs out of output
//! tokens). A match emits a [`Chunk::TokenLimit`] without disturbing the
//! read loop — the subprocess is allowed to finish naturally.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::sessions::queue::{ChunkSender, OutputTally};

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Per-execution output caps, snapshotted from configuration.
#[derive(Debug, Clone)]
pub struct StreamCaps {
    /// Truncation threshold for a single line.
    pub max_line_bytes: usize,
    /// Total emitted-byte budget across both streams.
    pub max_total_bytes: u64,
    /// Total emitted-line budget across both streams.
    pub max_line_count: u64,
}

/// One typed chunk produced by the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// A line of output (trailing newline preserved when present).
    Data {
        stream: StreamTag,
        text: String,
        truncated: bool,
    },
    /// Marker following a `Data` chunk that was cut at `max_line_bytes`.
    LineTruncated { stream: StreamTag },
    /// A token-limit sentinel matched on stdout.
    TokenLimit { line: String, limit: u64 },
    /// The underlying pipe read failed; reading on that stream has stopped.
    StreamError { stream: StreamTag, message: String },
    /// The stream reached end-of-file.
    Eof { stream: StreamTag },
}

impl Chunk {
    /// The stream a chunk belongs to, where one applies.
    pub fn stream(&self) -> Option<StreamTag> {
        match self {
            Self::Data { stream, .. }
            | Self::LineTruncated { stream }
            | Self::StreamError { stream, .. }
            | Self::Eof { stream } => Some(*stream),
            Self::TokenLimit { .. } => None,
        }
    }
}

/// Read both pipes to EOF, emitting chunks into the bounded queue.
///
/// Returns only when both streams have closed (or failed). The per-stream
/// loops share one tally, so the byte/line caps apply to the execution as a
/// whole, not per stream.
pub async fn read_streams<O, E>(
    stdout: O,
    stderr: E,
    sink: ChunkSender,
    caps: StreamCaps,
    sentinels: Vec<String>,
    tally: std::sync::Arc<OutputTally>,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    tokio::join!(
        read_stream(
            StreamTag::Stdout,
            stdout,
            &sink,
            &caps,
            Some(&sentinels),
            &tally
        ),
        read_stream(StreamTag::Stderr, stderr, &sink, &caps, None, &tally),
    );
}

/// What one `fill_buf` round decided, computed while the buffer is borrowed.
enum Step {
    /// A full line is ready; consume `consume` bytes from the reader.
    Line { consume: usize, overflowed: bool },
    /// No newline yet; consume the whole buffer.
    Partial { consume: usize, overflowed: bool },
    Eof,
    Error(String),
}

async fn read_stream<R: AsyncRead + Unpin>(
    stream: StreamTag,
    reader: R,
    sink: &ChunkSender,
    caps: &StreamCaps,
    sentinels: Option<&[String]>,
    tally: &OutputTally,
) {
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::new();
    // True while skipping the remainder of an over-cap line.
    let mut discarding = false;

    loop {
        let step = match reader.fill_buf().await {
            Err(e) => Step::Error(e.to_string()),
            Ok(buf) if buf.is_empty() => Step::Eof,
            Ok(buf) => match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let overflowed = !discarding && append_capped(&mut line, &buf[..pos], caps);
                    Step::Line {
                        consume: pos + 1,
                        overflowed,
                    }
                }
                None => {
                    let overflowed = !discarding && append_capped(&mut line, buf, caps);
                    Step::Partial {
                        consume: buf.len(),
                        overflowed,
                    }
                }
            },
        };

        match step {
            Step::Error(message) => {
                let _ = sink.send(Chunk::StreamError { stream, message }).await;
                break;
            }
            Step::Eof => {
                if !line.is_empty() && !discarding {
                    deliver_line(stream, &line, false, false, sink, caps, sentinels, tally).await;
                }
                let _ = sink.send(Chunk::Eof { stream }).await;
                break;
            }
            Step::Line {
                consume,
                overflowed,
            } => {
                reader.consume(consume);
                tally.touch_progress();
                if discarding {
                    discarding = false;
                } else {
                    deliver_line(stream, &line, !overflowed, overflowed, sink, caps, sentinels, tally)
                        .await;
                }
                line.clear();
            }
            Step::Partial {
                consume,
                overflowed,
            } => {
                reader.consume(consume);
                tally.touch_progress();
                if overflowed {
                    deliver_line(stream, &line, false, true, sink, caps, sentinels, tally).await;
                    line.clear();
                    discarding = true;
                }
            }
        }
    }
}

/// Append `src` to `line` up to the line cap. Returns true when the cap was
/// hit (some bytes did not fit).
fn append_capped(line: &mut Vec<u8>, src: &[u8], caps: &StreamCaps) -> bool {
    let room = caps.max_line_bytes.saturating_sub(line.len());
    if src.len() <= room {
        line.extend_from_slice(src);
        false
    } else {
        line.extend_from_slice(&src[..room]);
        true
    }
}

/// Emit one completed line, applying the execution-wide caps and the
/// sentinel scan.
#[allow(clippy::too_many_arguments)]
async fn deliver_line(
    stream: StreamTag,
    line: &[u8],
    with_newline: bool,
    truncated: bool,
    sink: &ChunkSender,
    caps: &StreamCaps,
    sentinels: Option<&[String]>,
    tally: &OutputTally,
) {
    let mut text = String::from_utf8_lossy(line).into_owned();
    if with_newline {
        text.push('\n');
    }

    if tally.is_exhausted() {
        tally.add_dropped(1);
    } else if !tally.try_charge(text.len() as u64, caps) {
        tally.mark_exhausted(stream);
        tally.add_dropped(1);
    } else {
        let _ = sink
            .send(Chunk::Data {
                stream,
                text: text.clone(),
                truncated,
            })
            .await;
        if truncated {
            let _ = sink.send(Chunk::LineTruncated { stream }).await;
        }
    }

    // Sentinel detection runs even on dropped lines — the client still wants
    // to know the token budget blew, whatever the buffer state.
    if let Some(patterns) = sentinels {
        if patterns
            .iter()
            .any(|p| !p.is_empty() && text.contains(p.as_str()))
        {
            let trimmed = text.trim_end_matches('\n').to_string();
            let limit = first_number(&trimmed);
            let _ = sink
                .send(Chunk::TokenLimit {
                    line: trimmed,
                    limit,
                })
                .await;
        }
    }
}

/// First unsigned integer embedded in a line, or 0 when there is none.
/// Used to pull the budget out of lines like
/// `"... exceeded the 32000 output token maximum"`.
fn first_number(text: &str) -> u64 {
    let mut value: Option<u64> = None;
    for c in text.chars() {
        match (c.to_digit(10), value) {
            (Some(d), cur) => value = Some(cur.unwrap_or(0) * 10 + u64::from(d)),
            (None, Some(_)) => break,
            (None, None) => {}
        }
    }
    value.unwrap_or(0)
}
