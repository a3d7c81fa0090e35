//! Frame sources for the video driver.
//!
//! A [`FrameSource`] hands the driver one decoded frame at a time and owns
//! its own pacing, mirroring how providers work elsewhere in the stack:
//! [`MultipartSource`] demuxes a live MJPEG response, degrading to a single
//! static image when the response is not actually multipart, and
//! [`SnapshotPoller`] is the fallback that refetches the snapshot endpoint
//! on a fixed interval.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::client::ProxyClient;
use crate::host::{ByteStream, Host};
use crate::mjpeg::{MjpegDemux, is_multipart};
use crate::types::VideoFrame;
use crate::{Result, RobotError};

/// Snapshot refetch period for the polling fallback.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

/// A source of decoded video frames.
#[async_trait::async_trait]
pub trait FrameSource: Send + 'static {
    /// Get the next frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - new frame available
    /// - `Ok(None)` - source ended (normal termination)
    /// - `Err(e)` - error occurred
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

enum MultipartMode {
    /// Live multipart body being demuxed incrementally.
    Streaming(MjpegDemux),
    /// Response was not multipart: the whole body is one static image.
    StaticImage,
    /// Static image already delivered.
    Done,
}

/// Demuxing source over one streaming response.
pub struct MultipartSource {
    body: ByteStream,
    mode: MultipartMode,
    ready: VecDeque<Bytes>,
    seq: u64,
}

impl std::fmt::Debug for MultipartSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartSource")
            .field("ready", &self.ready.len())
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl MultipartSource {
    /// Open the stream URL and sniff the response shape.
    pub async fn open(host: &Arc<dyn Host>, path: &str) -> Result<Self> {
        let response = host.get(path).await?;
        if !response.ok() {
            return Err(RobotError::http_status(response.status(), path));
        }

        let content_type = response.content_type().map(str::to_owned);
        let mode = match content_type.as_deref() {
            Some(ct) if is_multipart(ct) => {
                debug!(content_type = ct, "Opened multipart stream");
                MultipartMode::Streaming(MjpegDemux::from_content_type(Some(ct)))
            }
            other => {
                info!(content_type = ?other, "Response is not multipart, treating body as a static image");
                MultipartMode::StaticImage
            }
        };

        Ok(Self { body: response.into_byte_stream(), mode, ready: VecDeque::new(), seq: 0 })
    }

    fn emit(&mut self, payload: Bytes) -> VideoFrame {
        self.seq += 1;
        VideoFrame::new(payload, self.seq)
    }
}

#[async_trait::async_trait]
impl FrameSource for MultipartSource {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                self.seq += 1;
                return Ok(Some(VideoFrame::new(payload, self.seq)));
            }
            match &mut self.mode {
                MultipartMode::Streaming(demux) => match self.body.next().await {
                    Some(Ok(chunk)) => {
                        self.ready.extend(demux.push(&chunk));
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        debug!(
                            frames = self.seq,
                            dropped = demux.dropped_frames(),
                            resets = demux.resets(),
                            "Multipart stream ended"
                        );
                        return Ok(None);
                    }
                },
                MultipartMode::StaticImage => {
                    let mut image = Vec::new();
                    while let Some(chunk) = self.body.next().await {
                        image.extend_from_slice(&chunk?);
                    }
                    self.mode = MultipartMode::Done;
                    if image.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(self.emit(Bytes::from(image))));
                }
                MultipartMode::Done => return Ok(None),
            }
        }
    }
}

/// Polling fallback: one snapshot fetch per interval tick.
pub struct SnapshotPoller {
    client: Arc<ProxyClient>,
    interval: Interval,
    seq: u64,
}

impl SnapshotPoller {
    /// Create a poller over the snapshot endpoint.
    pub fn new(client: Arc<ProxyClient>, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { client, interval, seq: 0 }
    }
}

#[async_trait::async_trait]
impl FrameSource for SnapshotPoller {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.interval.tick().await;
        let payload = self.client.snapshot().await?;
        self.seq += 1;
        Ok(Some(VideoFrame::new(payload, self.seq)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostResponse;
    use crate::test_utils::{FakeHost, multipart_part};

    const STREAM: &str = "/api/esp32_robot/proxy/rover/stream";

    fn multipart_response(chunks: Vec<Vec<u8>>) -> HostResponse {
        let stream =
            futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed();
        HostResponse::streaming(
            200,
            Some("multipart/x-mixed-replace; boundary=frame".to_string()),
            stream,
        )
    }

    #[tokio::test]
    async fn multipart_source_yields_demuxed_frames() {
        let host = Arc::new(FakeHost::new());
        let mut wire = multipart_part("frame", b"one");
        wire.extend_from_slice(&multipart_part("frame", b"two"));
        wire.extend_from_slice(b"--frame\r\n");

        // Split mid-frame to exercise chunked delivery
        let cut = wire.len() / 2;
        host.push_response(
            STREAM,
            multipart_response(vec![wire[..cut].to_vec(), wire[cut..].to_vec()]),
        );

        let host: Arc<dyn Host> = host;
        let mut source = MultipartSource::open(&host, STREAM).await.unwrap();

        let first = source.next_frame().await.unwrap().unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(&first.data[..2], &[0xFF, 0xD8]);

        let second = source.next_frame().await.unwrap().unwrap();
        assert_eq!(second.seq, 2);

        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_multipart_response_is_a_single_static_image() {
        let host = Arc::new(FakeHost::new());
        host.push_response(
            STREAM,
            HostResponse::full(
                200,
                Some("image/jpeg".to_string()),
                Bytes::from_static(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]),
            ),
        );

        let host: Arc<dyn Host> = host;
        let mut source = MultipartSource::open(&host, STREAM).await.unwrap();

        let frame = source.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.data.as_ref(), &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);

        // Exactly one frame, then a clean end.
        assert!(source.next_frame().await.unwrap().is_none());
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_2xx_open_is_an_error() {
        let host = Arc::new(FakeHost::new());
        host.push_response(STREAM, HostResponse::full(502, None, Bytes::new()));

        let host: Arc<dyn Host> = host;
        let err = MultipartSource::open(&host, STREAM).await.unwrap_err();
        assert!(matches!(err, RobotError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn mid_stream_transport_error_surfaces() {
        let host = Arc::new(FakeHost::new());
        let wire = {
            let mut w = multipart_part("frame", b"ok");
            w.extend_from_slice(b"--frame\r\n");
            w
        };
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from(wire)),
            Err(RobotError::transport("connection reset")),
        ])
        .boxed();
        host.push_response(
            STREAM,
            HostResponse::streaming(
                200,
                Some("multipart/x-mixed-replace; boundary=frame".to_string()),
                stream,
            ),
        );

        let host: Arc<dyn Host> = host;
        let mut source = MultipartSource::open(&host, STREAM).await.unwrap();

        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.unwrap_err().is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_poller_paces_fetches() {
        let host = Arc::new(FakeHost::new());
        host.set_body(
            "/api/esp32_robot/proxy/rover/snapshot",
            200,
            "image/jpeg",
            Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        );

        let client =
            Arc::new(ProxyClient::new(host.clone() as Arc<dyn Host>, "rover"));
        let mut poller = SnapshotPoller::new(client, SNAPSHOT_INTERVAL);

        let start = tokio::time::Instant::now();
        for expected_seq in 1..=3u64 {
            let frame = poller.next_frame().await.unwrap().unwrap();
            assert_eq!(frame.seq, expected_seq);
        }
        // First tick is immediate, the next two are spaced by the interval.
        assert_eq!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(host.get_count("/api/esp32_robot/proxy/rover/snapshot"), 3);
    }
}
