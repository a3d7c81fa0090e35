//! Byte-accumulating MJPEG frame extractor.

use bytes::Bytes;
use tracing::warn;

use super::boundary::{DEFAULT_BOUNDARY, boundary_from_content_type};

/// JPEG start-of-image marker.
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Hard cap on unconsumed stream data. Exceeding it resets the buffer to
/// empty: lossy recovery, not an error.
pub const MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Incremental demultiplexer for `multipart/x-mixed-replace` JPEG streams.
///
/// Feed received chunks to [`push`](MjpegDemux::push) and collect the JPEG
/// payloads it returns. The demuxer owns exactly the unconsumed trailing
/// bytes: every completed frame range, including part headers and any
/// pre-boundary junk, is drained from the front as soon as it has been
/// processed, and a trailing partial frame survives until the bytes that
/// complete it arrive. Extraction is invariant to how the stream is
/// chunked.
pub struct MjpegDemux {
    buffer: Vec<u8>,
    needle: Vec<u8>,
    dropped: u64,
    resets: u64,
}

impl MjpegDemux {
    /// Create a demuxer for the given boundary token (without the leading
    /// dashes; they are added here per the on-wire convention).
    pub fn new(boundary: &str) -> Self {
        let mut needle = Vec::with_capacity(boundary.len() + 2);
        needle.extend_from_slice(b"--");
        needle.extend_from_slice(boundary.as_bytes());
        Self { buffer: Vec::new(), needle, dropped: 0, resets: 0 }
    }

    /// Create a demuxer from a response Content-Type, falling back to the
    /// default token when the header carries no boundary parameter.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let token = content_type
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        Self::new(&token)
    }

    /// The in-buffer search token, dashes included.
    pub fn needle(&self) -> &[u8] {
        &self.needle
    }

    /// Unconsumed bytes currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frame candidates skipped for missing or inverted JPEG markers.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Times the buffer was reset after hitting the size cap.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Append a received chunk and extract every complete frame payload.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        if self.buffer.len() + chunk.len() > MAX_BUFFER_BYTES {
            warn!(
                buffered = self.buffer.len(),
                chunk = chunk.len(),
                "MJPEG buffer cap exceeded, resetting"
            );
            self.buffer.clear();
            self.resets += 1;
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(b1) = find(&self.buffer, &self.needle) else {
                break;
            };
            let Some(rel) = find(&self.buffer[b1 + self.needle.len()..], &self.needle) else {
                // Only one boundary in sight: shed any pre-boundary junk
                // and wait for the bytes that complete this frame.
                if b1 > 0 {
                    self.buffer.drain(..b1);
                }
                break;
            };
            let b2 = b1 + self.needle.len() + rel;

            if let Some(payload) = extract_jpeg(&self.buffer[b1..b2]) {
                frames.push(payload);
            } else {
                self.dropped += 1;
            }
            self.buffer.drain(..b2);
        }
        frames
    }
}

/// Pull the JPEG payload out of one frame candidate: first SOI scanning
/// forward, last EOI scanning backward, markers inclusive. A candidate
/// missing either marker yields nothing.
fn extract_jpeg(frame: &[u8]) -> Option<Bytes> {
    let start = find(frame, &SOI)?;
    let end = rfind(frame, &EOI)?;
    if end < start {
        return None;
    }
    Some(Bytes::copy_from_slice(&frame[start..end + 2]))
}

// Naive linear scans; boundary tokens and markers are short relative to a
// video frame, and chunks arrive at most a few times per frame.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
