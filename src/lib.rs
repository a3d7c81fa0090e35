//! Type-safe Rust client for proxied robot camera streams and teleoperation.
//!
//! Rovercam talks to a camera robot that sits behind a home-automation
//! frontend's authenticated device proxy: it opens the signed MJPEG stream,
//! demuxes it into frames, keeps the signed URL fresh, polls stream status,
//! and coalesces joystick input into rate-limited control commands.
//!
//! # Features
//!
//! - **MJPEG demux**: incremental multipart frame extraction with bounded
//!   buffering and a snapshot-polling fallback
//! - **Signed-URL lifecycle**: proactive refresh before expiry with bounded
//!   retry
//! - **Teleoperation**: dead-zoned, throttled joystick commands that always
//!   deliver the final stop
//! - **Narrow host seam**: the frontend host is four capabilities behind a
//!   trait, so everything is testable against a fake
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use rovercam::{CardConfig, Host, Rovercam, StreamOptions, UpdateRate};
//!
//! # fn my_host() -> Arc<dyn Host> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> rovercam::Result<()> {
//!     let host: Arc<dyn Host> = my_host();
//!     let robot = Rovercam::open(host, CardConfig::new("sensor.esp32_robot_kitchen")).await?;
//!
//!     let session = robot.start_stream(StreamOptions::default()).await?;
//!     let mut frames = Box::pin(session.frames(UpdateRate::Max(10)));
//!
//!     while let Some(frame) = frames.next().await {
//!         println!("frame {}: {} bytes", frame.seq, frame.len());
//!     }
//!     session.stop();
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod config;
pub mod types;
#[cfg(test)]
pub mod test_utils;

// Host integration
pub mod host;
pub mod rpc;

// Stream-based video architecture
pub mod client;
pub mod driver;
pub mod mjpeg;
pub mod session;
pub mod source;
pub mod stream;

// Teleoperation
pub mod control;

// Core exports
pub use error::*;
pub use types::*;

pub use client::{DEFAULT_NAMESPACE, ProxyClient};
pub use config::CardConfig;
pub use control::{CommandSink, Joystick, MIN_SEND_INTERVAL};
pub use host::{EntityAttributes, EntityState, HassHost, Host, HostResponse};
pub use mjpeg::{MjpegDemux, boundary_from_content_type};
pub use rpc::DuplexRpc;
pub use session::{DEFAULT_NOMINAL_FPS, StreamOptions, StreamSession};

use std::sync::Arc;

/// Unified entry point for robot connections.
///
/// Validates the card configuration, resolves the entity against the host
/// and hands back a [`Robot`] bound to the proxy endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rovercam::{CardConfig, Host, Rovercam};
///
/// # fn my_host() -> Arc<dyn Host> { unimplemented!() }
/// # #[tokio::main]
/// # async fn main() -> rovercam::Result<()> {
/// let robot = Rovercam::open(my_host(), CardConfig::new("sensor.garage_rover")).await?;
/// println!("{} is {}", robot.name(), robot.state().await?.state);
/// # Ok(())
/// # }
/// ```
pub struct Rovercam;

impl Rovercam {
    /// Open a robot described by a card configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the configuration has no valid entity id
    /// - the entity does not exist on the host
    pub async fn open(host: Arc<dyn Host>, config: CardConfig) -> Result<Robot> {
        config.validate()?;
        let entity = host.entity_state(&config.entity).await?;

        let name = config
            .title
            .clone()
            .or_else(|| entity.attributes.friendly_name.clone())
            .unwrap_or_else(|| config.entity.clone());

        let client = Arc::new(ProxyClient::new(Arc::clone(&host), config.robot_id()));
        Ok(Robot { host, client, config, name })
    }
}

/// A robot bound to its proxy endpoints.
pub struct Robot {
    host: Arc<dyn Host>,
    client: Arc<ProxyClient>,
    config: CardConfig,
    name: String,
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Robot {
    /// Display name: the configured title, else the entity's friendly name,
    /// else the entity id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The card configuration this robot was opened with.
    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Endpoint client for one-off calls (camera settings, LED, snapshot).
    pub fn client(&self) -> &Arc<ProxyClient> {
        &self.client
    }

    /// Current entity state from the host.
    pub async fn state(&self) -> Result<EntityState> {
        self.host.entity_state(&self.config.entity).await
    }

    /// Open a stream session.
    ///
    /// Requires the robot to be online; the entity's reported frame rate,
    /// when present, becomes the session's nominal rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is offline or the initial signed-URL
    /// request fails.
    pub async fn start_stream(&self, mut options: StreamOptions) -> Result<StreamSession> {
        let state = self.state().await?;
        if !state.is_online() {
            return Err(RobotError::Offline { entity_id: self.config.entity.clone() });
        }
        if let Some(fps) = state.attributes.fps {
            options.nominal_fps = fps;
        }
        StreamSession::start(Arc::clone(&self.client), options).await
    }
}
