//! Stream sessions: signed-URL lifecycle, status polling, teleoperation.
//!
//! A [`StreamSession`] is one open control-overlay instance. Starting it
//! signs the stream path, spawns the video pump, the signed-URL refresh
//! task, the status poller and the joystick pump, all tied to a single
//! cancellation token. Stopping is idempotent and never fails observably.


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::ProxyClient;
use crate::control::{self, CommandSink, Joystick};
use crate::driver::Driver;
use crate::host::Host;
use crate::stream::PaceExt;
use crate::types::{RobotStatus, UpdateRate, VideoFrame};
use crate::{Result, RobotError};

/// Nominal camera frame rate assumed when the entity does not report one.
pub const DEFAULT_NOMINAL_FPS: f64 = 20.0;

/// Tunables for one stream session.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Requested signed-URL validity
    pub expires: Duration,

    /// How long before expiry the refresh fires
    pub refresh_margin: Duration,

    /// Backoff before the in-cycle refresh retry
    pub retry_backoff: Duration,

    /// Consecutive failed refresh cycles tolerated before giving up
    pub max_refresh_failures: u32,

    /// Status poll period
    pub status_interval: Duration,

    /// Snapshot fallback period
    pub snapshot_interval: Duration,

    /// Bound on the initial sign request
    pub sign_timeout: Duration,

    /// Minimum spacing between joystick commands
    pub command_interval: Duration,

    /// Camera frame rate used to normalize subscription rates
    pub nominal_fps: f64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            expires: Duration::from_secs(110),
            refresh_margin: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(5),
            max_refresh_failures: 3,
            status_interval: Duration::from_secs(2),
            snapshot_interval: crate::source::SNAPSHOT_INTERVAL,
            sign_timeout: Duration::from_secs(10),
            command_interval: control::MIN_SEND_INTERVAL,
            nominal_fps: DEFAULT_NOMINAL_FPS,
        }
    }
}

/// One open stream session against a robot.
///
/// Dropping the session stops it; [`stop`](StreamSession::stop) may also be
/// called any number of times explicitly.
pub struct StreamSession {
    client: Arc<ProxyClient>,
    frames: watch::Receiver<Option<Arc<VideoFrame>>>,
    status: watch::Receiver<Option<RobotStatus>>,
    joystick: Joystick,
    stream_url: Url,
    nominal_fps: f64,
    cancel: CancellationToken,
    stopped: AtomicBool,
    // Keeps the signed-path channel open for the driver's lifetime even if
    // the refresh task gives up early.
    _signed_path: Arc<watch::Sender<String>>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("stream_url", &self.stream_url)
            .field("nominal_fps", &self.nominal_fps)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Sign the stream path and spawn the session tasks.
    pub async fn start(client: Arc<ProxyClient>, options: StreamOptions) -> Result<Self> {
        let host = Arc::clone(client.host());
        let path = client.stream_path();

        let signed = sign_once(&host, &path, &options).await?;
        let stream_url = host.resolve(&signed)?;
        info!(url = %stream_url, "Stream source signed and resolved");

        let cancel = CancellationToken::new();
        let (signed_tx, signed_rx) = watch::channel(signed);
        let signed_tx = Arc::new(signed_tx);

        let channels = Driver::spawn(
            Arc::clone(&client),
            signed_rx,
            options.snapshot_interval,
            cancel.clone(),
        );

        tokio::spawn(refresh_task(
            Arc::clone(&host),
            path,
            options.clone(),
            Arc::clone(&signed_tx),
            cancel.clone(),
        ));

        let (status_tx, status_rx) = watch::channel(None);
        tokio::spawn(status_task(
            Arc::clone(&client),
            options.status_interval,
            status_tx,
            cancel.clone(),
        ));

        let joystick = control::spawn_pump(
            Arc::clone(&client) as Arc<dyn CommandSink>,
            options.command_interval,
            cancel.clone(),
        );

        Ok(Self {
            client,
            frames: channels.frames,
            status: status_rx,
            joystick,
            stream_url,
            nominal_fps: options.nominal_fps,
            cancel,
            stopped: AtomicBool::new(false),
            _signed_path: signed_tx,
        })
    }

    /// The resolved signed stream URL this session opened with.
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    /// Handle for feeding joystick input.
    pub fn joystick(&self) -> Joystick {
        self.joystick.clone()
    }

    /// Subscribe to video frames.
    ///
    /// `UpdateRate::Max` paces delivery with latest-wins semantics. Leading
    /// empty values (before the first frame arrives) are skipped; the first
    /// `None` published after frames flowed ends the stream.
    pub fn frames(&self, rate: UpdateRate) -> impl Stream<Item = Arc<VideoFrame>> + 'static {
        let frames = WatchStream::new(self.frames.clone())
            .skip_while(|opt| {
                let is_none = opt.is_none();
                async move { is_none }
            })
            .take_while(|opt| {
                let is_some = opt.is_some();
                async move { is_some }
            })
            .filter_map(|opt| async move { opt });

        match rate.pace_interval(self.nominal_fps) {
            None => frames.boxed(),
            Some(period) => frames.paced(period).boxed(),
        }
    }

    /// Stream of status snapshots from the 2-second poller.
    pub fn status_updates(&self) -> impl Stream<Item = RobotStatus> + 'static {
        WatchStream::new(self.status.clone()).filter_map(|opt| async move { opt })
    }

    /// Latest polled status, if any arrived yet.
    pub fn current_status(&self) -> Option<RobotStatus> {
        self.status.borrow().clone()
    }

    /// Whether the session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the session.
    ///
    /// Cancels the video pump, refresh timer, status poller and joystick
    /// pump, and fires a best-effort stop notice at the device. Safe to
    /// call repeatedly: later calls are no-ops and the notice is sent once.
    pub fn stop(&self) {
        self.cancel.cancel();
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Stream session stopping");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&self.client);
            handle.spawn(async move {
                client.stop_stream().await;
            });
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.stopped.swap(true, Ordering::SeqCst)
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            let client = Arc::clone(&self.client);
            handle.spawn(async move {
                client.stop_stream().await;
            });
        }
    }
}

async fn sign_once(host: &Arc<dyn Host>, path: &str, options: &StreamOptions) -> Result<String> {
    tokio::time::timeout(options.sign_timeout, host.sign_path(path, options.expires))
        .await
        .map_err(|_| RobotError::timeout(options.sign_timeout))?
}

/// Proactive signed-URL refresh.
///
/// Arms a timer `refresh_margin` before the requested expiry. Each cycle
/// makes one attempt and, on failure, one retry after `retry_backoff`.
/// Refresh requests are never issued concurrently; the next timer is armed
/// only after the current cycle resolves. After `max_refresh_failures`
/// consecutive failed cycles the task gives up and lets the token lapse.
async fn refresh_task(
    host: Arc<dyn Host>,
    path: String,
    options: StreamOptions,
    signed_tx: Arc<watch::Sender<String>>,
    cancel: CancellationToken,
) {
    let lead = options.expires.saturating_sub(options.refresh_margin);
    let mut deadline = Instant::now() + lead;
    let mut failed_cycles = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Refresh task cancelled");
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {}
        }

        match sign_once(&host, &path, &options).await {
            Ok(signed) => {
                info!("Stream URL refreshed");
                failed_cycles = 0;
                let _ = signed_tx.send(signed);
                deadline = Instant::now() + lead;
                continue;
            }
            Err(e) => {
                warn!("Stream URL refresh failed, retrying in {:?}: {e}", options.retry_backoff);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Refresh task cancelled during retry backoff");
                return;
            }
            _ = tokio::time::sleep(options.retry_backoff) => {}
        }

        match sign_once(&host, &path, &options).await {
            Ok(signed) => {
                info!("Stream URL refreshed on retry");
                failed_cycles = 0;
                let _ = signed_tx.send(signed);
                deadline = Instant::now() + lead;
            }
            Err(e) => {
                failed_cycles += 1;
                error!(
                    "Stream URL refresh cycle failed ({}/{}): {e}",
                    failed_cycles, options.max_refresh_failures
                );
                if failed_cycles >= options.max_refresh_failures {
                    error!("Giving up on stream URL refresh; stream ends when the token lapses");
                    return;
                }
                deadline = Instant::now() + options.retry_backoff;
            }
        }
    }
}

/// Status poller: one fetch per tick, last good value wins.
async fn status_task(
    client: Arc<ProxyClient>,
    period: Duration,
    status_tx: watch::Sender<Option<RobotStatus>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Status poller cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        match client.status().await {
            Ok(status) => {
                if status_tx.send(Some(status)).is_err() {
                    debug!("Status receiver dropped, poller ending");
                    return;
                }
            }
            // Keep the last good value; errors here only matter in logs.
            Err(e) => warn!("Status poll failed: {e}"),
        }
    }
}
