use std::time::Duration;

use serde_json::Value;

use crate::envelope::Envelope;

/// Interval at which producers emit comment frames to keep intermediaries flushing.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Silence tolerated by consumers before a session is reported as stalled.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(30);

const DONE_SENTINEL: &str = "[DONE]";

/// One outcome of splitting the byte stream at a frame boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Envelope(Envelope),
    /// Comment-only frame. Carries no payload; only proves the connection is alive.
    Comment(String),
    /// Well-formed frame the consumer deliberately skips (unknown discriminant, `[DONE]`).
    Ignored { reason: String },
    /// Frame whose payload could not be decoded.
    Malformed { raw: String, reason: String },
}

impl DecodedFrame {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Largest unterminated frame buffered before it is reported as malformed.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const RAW_PREVIEW_BYTES: usize = 256;

/// Incremental decoder for SSE-shaped byte streams.
///
/// Bytes are buffered until a blank line closes a frame, so chunk boundaries may
/// fall anywhere, including inside a multi-byte UTF-8 sequence. A pending frame
/// that outgrows the size cap is reported once as malformed and its bytes are
/// dropped up to the next boundary.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a boundary.
    scanned: usize,
    max_frame_bytes: usize,
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_frame_bytes: max_frame_bytes.max(1),
            discarding: false,
        }
    }

    /// Feed arbitrary bytes into the decoder and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedFrame> {
        self.buffer
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
        let mut frames = Vec::new();

        // A boundary can straddle the previous scan end by one byte.
        while let Some(split) = find_frame_boundary(&self.buffer, self.scanned.saturating_sub(1)) {
            let raw: Vec<u8> = self.buffer.drain(..split + 2).take(split).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            match String::from_utf8(raw) {
                Ok(frame) => decode_frame(&frame, &mut frames),
                Err(error) => frames.push(DecodedFrame::Malformed {
                    raw: String::from_utf8_lossy(error.as_bytes()).into_owned(),
                    reason: "frame is not valid UTF-8".to_owned(),
                }),
            }
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_frame_bytes {
            if !self.discarding {
                let preview = &self.buffer[..self.buffer.len().min(RAW_PREVIEW_BYTES)];
                frames.push(DecodedFrame::Malformed {
                    raw: String::from_utf8_lossy(preview).into_owned(),
                    reason: format!("frame exceeds {} bytes", self.max_frame_bytes),
                });
                self.discarding = true;
            }
            // Keep the last byte: it may be the first half of a boundary.
            let keep_from = self.buffer.len() - 1;
            self.buffer.drain(..keep_from);
            self.scanned = self.buffer.len();
        }

        frames
    }

    /// Decode a complete payload string in one shot.
    pub fn decode_all(input: &str) -> Vec<DecodedFrame> {
        let mut decoder = Self::default();
        decoder.feed(input.as_bytes())
    }

    /// Bytes of an unterminated trailing frame. They are discarded when the stream ends.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_frame_boundary(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|window| window == b"\n\n")
        .map(|position| position + from)
}

fn decode_frame(frame: &str, out: &mut Vec<DecodedFrame>) {
    let mut data_lines = Vec::new();
    let mut comments = Vec::new();

    for line in frame.split('\n') {
        if let Some(comment) = line.strip_prefix(':') {
            comments.push(comment.strip_prefix(' ').unwrap_or(comment));
        } else if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
        // `event:`, `id:` and `retry:` fields carry nothing for this protocol.
    }

    if !comments.is_empty() {
        out.push(DecodedFrame::Comment(comments.join("\n")));
    }

    if data_lines.is_empty() {
        return;
    }

    let payload = data_lines.join("\n");
    let trimmed = payload.trim();
    if trimmed.is_empty() || trimmed == DONE_SENTINEL {
        out.push(DecodedFrame::Ignored {
            reason: "end-of-stream sentinel".to_owned(),
        });
        return;
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(error) => {
            out.push(DecodedFrame::Malformed {
                raw: payload,
                reason: error.to_string(),
            });
            return;
        }
    };

    out.push(match Envelope::from_value(value) {
        Ok(envelope) => DecodedFrame::Envelope(envelope),
        Err(error) if error.is_unknown_discriminant() => DecodedFrame::Ignored {
            reason: error.to_string(),
        },
        Err(error) => DecodedFrame::Malformed {
            raw: payload,
            reason: error.to_string(),
        },
    });
}

/// Encode one envelope as a `data:` frame.
pub fn encode_envelope(envelope: &Envelope) -> String {
    format!("data: {}\n\n", envelope.to_value())
}

/// Encode a comment frame. Multi-line tokens become one comment line each.
pub fn encode_comment(token: &str) -> String {
    let mut frame = String::new();
    for line in token.split('\n') {
        frame.push_str(": ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}
