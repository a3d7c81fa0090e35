//! Video frame types for the stream-based architecture

use bytes::Bytes;

/// One decoded JPEG image extracted from the camera stream.
///
/// This is the fundamental data unit that flows through the system.
/// Payloads are cheaply cloneable (`Bytes`); frames are published behind an
/// `Arc` in a watch channel, so at most one live frame is retained per
/// display surface and the previous one is dropped when a new frame lands.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// JPEG payload, SOI through EOI inclusive
    pub data: Bytes,

    /// Monotonic frame counter within one stream session
    pub seq: u64,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(data: Bytes, seq: u64) -> Self {
        Self { data, seq }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
