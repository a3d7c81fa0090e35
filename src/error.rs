//! Error types for the robot proxy client.
//!
//! All errors implement the `std::error::Error` trait and include structured
//! context for debugging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: network failures talking to the backend proxy
//! - **Http Errors**: non-2xx responses from a proxy endpoint
//! - **Protocol Errors**: malformed stream data or RPC payloads
//! - **Timeout Errors**: an RPC correlation or readiness wait never resolved
//! - **Rpc Errors**: the signed-path RPC failed outright
//! - **Entity Errors**: the configured entity is missing or offline
//! - **Cancelled**: an explicit user stop, deliberately *not* an error the
//!   retry or fallback machinery is allowed to react to
//!
//! ## Recovery and Retry
//!
//! Errors provide methods to determine if they are recoverable:
//!
//! ```rust
//! use rovercam::RobotError;
//!
//! let error = RobotError::transport("proxy unreachable");
//! if error.is_retryable() {
//!     println!("Can retry this operation");
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for robot client operations.
pub type Result<T, E = RobotError> = std::result::Result<T, E>;

/// Main error type for robot client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RobotError {
    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Proxy returned HTTP {status} for {path}")]
    Http { status: u16, path: String },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Signed-path RPC failed: {reason}")]
    Rpc { reason: String },

    #[error("Entity '{entity_id}' not found")]
    EntityNotFound { entity_id: String },

    #[error("Entity '{entity_id}' is offline")]
    Offline { entity_id: String },

    #[error("Invalid card configuration: {reason}")]
    Config { reason: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl RobotError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RobotError::Transport { .. } => true,
            RobotError::Timeout { .. } => true,
            RobotError::Http { status, .. } => *status >= 500,
            RobotError::Rpc { .. } => true,
            RobotError::Offline { .. } => true,
            RobotError::Protocol { .. } => false,
            RobotError::EntityNotFound { .. } => false,
            RobotError::Config { .. } => false,
            RobotError::Cancelled => false,
        }
    }

    /// Returns whether this error represents an explicit user stop.
    ///
    /// Cancellation must never trigger the error-fallback path or retry
    /// loops; callers use this to tell the two apart.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RobotError::Cancelled)
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RobotError::Transport { .. } => vec![
                "Check the robot is powered on and reachable",
                "Verify the backend proxy is running",
                "Check network connectivity to the host",
            ],
            RobotError::Http { .. } => vec![
                "Check the robot firmware endpoint exists",
                "Verify proxy authentication credentials",
                "Inspect proxy logs for the upstream failure",
            ],
            RobotError::Protocol { .. } => vec![
                "Check the camera is producing a multipart MJPEG stream",
                "Verify firmware and client versions are compatible",
            ],
            RobotError::Timeout { .. } => vec![
                "Increase the timeout duration",
                "Check the duplex connection is established",
                "Verify the host is responding",
            ],
            RobotError::Rpc { .. } => vec![
                "Check the host supports signed-path requests",
                "Re-authenticate with the host",
            ],
            RobotError::EntityNotFound { .. } => vec![
                "Check the entity id spelling in the card config",
                "Verify the integration created the entity",
            ],
            RobotError::Offline { .. } => vec![
                "Power-cycle the robot",
                "Check the robot's network connection",
            ],
            RobotError::Config { .. } => vec![
                "Define an entity in the card configuration",
                "Use a domain-qualified entity id (e.g. sensor.my_robot)",
            ],
            RobotError::Cancelled => vec![],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        RobotError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RobotError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for HTTP status errors.
    pub fn http_status(status: u16, path: impl Into<String>) -> Self {
        RobotError::Http { status, path: path.into() }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        RobotError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for timeout errors.
    pub fn timeout(duration: Duration) -> Self {
        RobotError::Timeout { duration }
    }

    /// Helper constructor for RPC failures.
    pub fn rpc(reason: impl Into<String>) -> Self {
        RobotError::Rpc { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        RobotError::Config { reason: reason.into() }
    }
}

impl From<reqwest::Error> for RobotError {
    fn from(err: reqwest::Error) -> Self {
        RobotError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_json::Error> for RobotError {
    fn from(err: serde_json::Error) -> Self {
        RobotError::Protocol { context: "json".to_string(), details: err.to_string() }
    }
}

impl From<url::ParseError> for RobotError {
    fn from(err: url::ParseError) -> Self {
        RobotError::Config { reason: format!("invalid URL: {err}") }
    }
}
