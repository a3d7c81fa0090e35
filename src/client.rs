//! Thin wrapper over the backend proxy's per-robot endpoints.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tracing::{debug, warn};

use crate::control::CommandSink;
use crate::host::Host;
use crate::types::{CameraSettings, JoystickVector, RobotStatus};
use crate::{Result, RobotError};

/// Namespace segment used in proxy paths unless overridden.
pub const DEFAULT_NAMESPACE: &str = "esp32_robot";

/// Client for one robot behind the backend proxy.
///
/// All paths have the shape `/api/<namespace>/proxy/<robot_id>/<endpoint>`
/// and are fetched through the host's authenticated transport.
pub struct ProxyClient {
    host: Arc<dyn Host>,
    namespace: String,
    robot_id: String,
}

impl ProxyClient {
    /// Create a client with the default namespace.
    pub fn new(host: Arc<dyn Host>, robot_id: impl Into<String>) -> Self {
        Self::with_namespace(host, DEFAULT_NAMESPACE, robot_id)
    }

    /// Create a client with a custom proxy namespace.
    pub fn with_namespace(
        host: Arc<dyn Host>,
        namespace: impl Into<String>,
        robot_id: impl Into<String>,
    ) -> Self {
        Self { host, namespace: namespace.into(), robot_id: robot_id.into() }
    }

    /// The robot id used in proxy paths.
    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    /// The host this client fetches through.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    fn path(&self, endpoint: &str) -> String {
        format!("/api/{}/proxy/{}/{endpoint}", self.namespace, self.robot_id)
    }

    /// Path of the multipart stream endpoint (the one that gets signed).
    pub fn stream_path(&self) -> String {
        self.path("stream")
    }

    /// Path of the single-frame snapshot endpoint.
    pub fn snapshot_path(&self) -> String {
        self.path("snapshot")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let path = self.path(endpoint);
        let response = self.host.get(&path).await?;
        if !response.ok() {
            return Err(RobotError::http_status(response.status(), path));
        }
        response.json().await
    }

    /// Fetch the current stream status (`{fps, streaming}`).
    pub async fn status(&self) -> Result<RobotStatus> {
        self.get_json("status").await
    }

    /// Fetch one JPEG frame from the snapshot endpoint.
    pub async fn snapshot(&self) -> Result<Bytes> {
        let path = self.snapshot_path();
        let response = self.host.get(&path).await?;
        if !response.ok() {
            return Err(RobotError::http_status(response.status(), path));
        }
        response.bytes().await
    }

    /// Tell the device to stop streaming.
    ///
    /// Best-effort teardown notice: failures are logged and swallowed so
    /// session teardown can never observably fail on this call.
    pub async fn stop_stream(&self) {
        let path = self.path("stopstream");
        match self.host.get(&path).await {
            Ok(response) if response.ok() => debug!("Stream stop notice delivered"),
            Ok(response) => warn!(status = response.status(), "Stream stop notice rejected"),
            Err(e) => warn!("Error delivering stream stop notice: {e}"),
        }
    }

    /// Fetch the current camera settings.
    pub async fn camera_settings(&self) -> Result<CameraSettings> {
        self.get_json("camera/settings").await
    }

    /// Set frame size and JPEG quality.
    pub async fn set_quality(&self, resolution: &str, quality: u8) -> Result<()> {
        let path = self.path(&format!("quality?resolution={resolution}&quality={quality}"));
        let response = self.host.get(&path).await?;
        if !response.ok() {
            return Err(RobotError::http_status(response.status(), path));
        }
        Ok(())
    }

    /// Set LED brightness in percent.
    pub async fn set_led(&self, percent: u8) -> Result<()> {
        let percent = percent.min(100);
        let path = self.path(&format!("led?value={percent}"));
        let response = self.host.get(&path).await?;
        if !response.ok() {
            return Err(RobotError::http_status(response.status(), path));
        }
        Ok(())
    }

    /// Send one joystick command.
    pub async fn send_control(&self, vector: JoystickVector) -> Result<()> {
        let path = self.path("control");
        let body = json!({ "mode": "joystick", "x": vector.x, "y": vector.y });
        let response = self.host.post_json(&path, body).await?;
        if !response.ok() {
            return Err(RobotError::http_status(response.status(), path));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CommandSink for ProxyClient {
    async fn send(&self, vector: JoystickVector) -> Result<()> {
        self.send_control(vector).await
    }
}
