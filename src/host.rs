//! Host capability interface.
//!
//! The frontend host is reduced to four narrow capabilities: entity state
//! lookup, authenticated HTTP against backend-proxied paths, the signed-path
//! RPC, and base-URL resolution. Everything in this crate talks to the host
//! through the [`Host`] trait, so the core logic is unit-testable against a
//! fake implementation.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use url::Url;

use crate::rpc::DuplexRpc;
use crate::{Result, RobotError};

/// Boxed byte stream used for streaming response bodies.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Entity state as reported by the host's state machine.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityState {
    /// Domain-qualified entity id
    pub entity_id: String,

    /// Status string, `online` / `offline` / anything else is unknown
    pub state: String,

    #[serde(default)]
    pub attributes: EntityAttributes,
}

impl EntityState {
    /// Whether the robot is reachable according to the host.
    pub fn is_online(&self) -> bool {
        self.state == "online"
    }
}

/// Named attributes attached to the robot entity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityAttributes {
    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub fps: Option<f64>,

    #[serde(default)]
    pub streaming: Option<bool>,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default)]
    pub friendly_name: Option<String>,
}

enum ResponseBody {
    Full(Bytes),
    Stream(ByteStream),
}

/// An HTTP response from the host's authenticated fetch.
///
/// The body can be read whole as bytes or JSON, or consumed incrementally
/// as a byte stream (the multipart path needs the latter).
pub struct HostResponse {
    status: u16,
    content_type: Option<String>,
    body: ResponseBody,
}

impl HostResponse {
    /// Build a response with a fully buffered body.
    pub fn full(status: u16, content_type: Option<String>, body: Bytes) -> Self {
        Self { status, content_type, body: ResponseBody::Full(body) }
    }

    /// Build a response with a streaming body.
    pub fn streaming(status: u16, content_type: Option<String>, body: ByteStream) -> Self {
        Self { status, content_type, body: ResponseBody::Stream(body) }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `Content-Type` header value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        match self.body {
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(out))
            }
        }
    }

    /// Read and deserialize the body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Consume the response as a byte stream.
    pub fn into_byte_stream(self) -> ByteStream {
        match self.body {
            ResponseBody::Full(bytes) => futures::stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Stream(stream) => stream,
        }
    }
}

/// The four capabilities consumed from the frontend host.
#[async_trait::async_trait]
pub trait Host: Send + Sync + 'static {
    /// Look up the current state of an entity.
    async fn entity_state(&self, entity_id: &str) -> Result<EntityState>;

    /// Authenticated GET against a backend-proxied path.
    async fn get(&self, path: &str) -> Result<HostResponse>;

    /// Authenticated POST with a JSON body.
    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<HostResponse>;

    /// Request a signed path valid for `expires` without further auth.
    async fn sign_path(&self, path: &str, expires: Duration) -> Result<String>;

    /// Resolve a (signed) path against the host's base URL.
    fn resolve(&self, path: &str) -> Result<Url>;
}

/// Production [`Host`] backed by the host's REST API and duplex channel.
///
/// Plain HTTP goes through `reqwest` with a long-lived access token; the
/// signed-path RPC goes through a [`DuplexRpc`] correlated over the host's
/// persistent message channel.
pub struct HassHost {
    http: reqwest::Client,
    base: Url,
    token: String,
    rpc: DuplexRpc,
}

impl HassHost {
    /// Create a host bound to `base` with a bearer `token` and an
    /// established duplex RPC channel.
    pub fn new(base: Url, token: impl Into<String>, rpc: DuplexRpc) -> Self {
        Self { http: reqwest::Client::new(), base, token: token.into(), rpc }
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn wrap(response: reqwest::Response) -> HostResponse {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(RobotError::from)).boxed();
        HostResponse::streaming(status, content_type, stream)
    }
}

#[async_trait::async_trait]
impl Host for HassHost {
    async fn entity_state(&self, entity_id: &str) -> Result<EntityState> {
        let url = self.url_for(&format!("/api/states/{entity_id}"))?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;

        if response.status().as_u16() == 404 {
            return Err(RobotError::EntityNotFound { entity_id: entity_id.to_string() });
        }
        if !response.status().is_success() {
            return Err(RobotError::http_status(
                response.status().as_u16(),
                format!("/api/states/{entity_id}"),
            ));
        }

        Ok(response.json().await?)
    }

    async fn get(&self, path: &str) -> Result<HostResponse> {
        let url = self.url_for(path)?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        Ok(Self::wrap(response))
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<HostResponse> {
        let url = self.url_for(path)?;
        let response =
            self.http.post(url).bearer_auth(&self.token).json(&body).send().await?;
        Ok(Self::wrap(response))
    }

    async fn sign_path(&self, path: &str, expires: Duration) -> Result<String> {
        self.rpc.sign_path(path, expires).await
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.url_for(path)
    }
}
