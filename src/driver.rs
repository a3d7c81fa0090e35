//! Driver spawns and manages the video pump task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::client::ProxyClient;
use crate::source::{FrameSource, MultipartSource, SnapshotPoller};
use crate::types::VideoFrame;

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Receiver for video frames
    pub frames: watch::Receiver<Option<Arc<VideoFrame>>>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns and manages the video pump task
///
/// The task owns the source chain: it opens the signed multipart stream,
/// publishes each frame into a watch channel (the slot holds the single
/// live frame; publishing drops the previous one), falls back to snapshot
/// polling when multipart processing fails, and reconnects when the signed
/// stream URL is refreshed.
pub struct Driver;

impl Driver {
    /// Maximum consecutive snapshot-poll errors before giving up
    const MAX_ERRORS: u32 = 10;

    /// Spawn the video pump for the given client
    ///
    /// `signed_path` carries the current signed stream path and is swapped
    /// by the refresh task. Returns a watch receiver for frames plus the
    /// cancellation token that stops the pump.
    pub fn spawn(
        client: Arc<ProxyClient>,
        signed_path: watch::Receiver<String>,
        snapshot_interval: Duration,
        cancel: CancellationToken,
    ) -> DriverChannels {
        let (frame_tx, frame_rx) = watch::channel(None);

        let cancel_task = cancel.clone();
        tokio::spawn(async move {
            Self::video_task(client, signed_path, snapshot_interval, frame_tx, cancel_task).await;
        });

        DriverChannels { frames: frame_rx, cancel }
    }

    /// Video pump task - connects, demuxes, falls back, reconnects
    async fn video_task(
        client: Arc<ProxyClient>,
        mut signed_path: watch::Receiver<String>,
        snapshot_interval: Duration,
        frame_tx: watch::Sender<Option<Arc<VideoFrame>>>,
        cancel: CancellationToken,
    ) {
        info!("Video pump task started");
        let mut frame_count = 0u64;

        'connect: loop {
            if cancel.is_cancelled() {
                info!("Video pump cancelled");
                break;
            }

            let path = signed_path.borrow_and_update().clone();

            // Open the multipart stream; an abort during the open is a
            // clean stop, not a fallback trigger.
            let opened = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Video pump cancelled during connect");
                    break 'connect;
                }
                result = MultipartSource::open(client.host(), &path) => result,
            };

            match opened {
                Ok(mut source) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Video pump cancelled during read");
                            break 'connect;
                        }
                        changed = signed_path.changed() => {
                            if changed.is_err() {
                                debug!("Signed path channel closed, stopping");
                                break 'connect;
                            }
                            debug!("Signed stream URL refreshed, reconnecting");
                            continue 'connect;
                        }
                        result = source.next_frame() => match result {
                            Ok(Some(frame)) => {
                                frame_count += 1;
                                trace!("Frame {}: {} bytes", frame_count, frame.len());
                                if frame_tx.send(Some(Arc::new(frame))).is_err() {
                                    debug!("Frame receiver dropped, shutting down");
                                    break 'connect;
                                }
                            }
                            Ok(None) => {
                                info!("Stream ended after {} frames", frame_count);
                                let _ = frame_tx.send(None);
                                break 'connect;
                            }
                            Err(e) => {
                                warn!("Multipart stream failed, falling back to snapshot polling: {e}");
                                break;
                            }
                        }
                    }
                },
                Err(e) => {
                    warn!("Failed to open multipart stream, falling back to snapshot polling: {e}");
                }
            }

            // Snapshot-polling fallback: runs until cancelled, until a
            // fresh signed URL invites another multipart attempt, or until
            // too many consecutive errors.
            let mut poller = SnapshotPoller::new(Arc::clone(&client), snapshot_interval);
            let mut error_count = 0u32;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Video pump cancelled during fallback polling");
                        break 'connect;
                    }
                    changed = signed_path.changed() => {
                        if changed.is_err() {
                            debug!("Signed path channel closed, stopping");
                            break 'connect;
                        }
                        debug!("Signed stream URL refreshed, retrying multipart");
                        continue 'connect;
                    }
                    result = poller.next_frame() => match result {
                        Ok(Some(frame)) => {
                            frame_count += 1;
                            error_count = 0;
                            if frame_tx.send(Some(Arc::new(frame))).is_err() {
                                debug!("Frame receiver dropped, shutting down");
                                break 'connect;
                            }
                        }
                        Ok(None) => {
                            info!("Snapshot source ended after {} frames", frame_count);
                            let _ = frame_tx.send(None);
                            break 'connect;
                        }
                        Err(e) => {
                            error_count += 1;
                            error!("Snapshot poll error ({}/{}): {}", error_count, Self::MAX_ERRORS, e);

                            if error_count >= Self::MAX_ERRORS {
                                error!("Too many snapshot errors, shutting down");
                                let _ = frame_tx.send(None);
                                break 'connect;
                            }

                            // Exponential backoff: 50ms, 100ms, 200ms, ...
                            let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                            tokio::select! {
                                _ = cancel.cancelled() => break 'connect,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        }
                    }
                }
            }
        }

        info!("Video pump task ended (published {} frames)", frame_count);
    }
}
