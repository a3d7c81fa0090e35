//! Shared helpers for unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use url::Url;

use crate::host::{EntityState, Host, HostResponse};
use crate::{Result, RobotError};

/// One recorded sign_path call: requested path and expiry seconds.
pub type SignRequest = (String, u64);

#[derive(Default)]
struct FakeHostState {
    gets: Vec<String>,
    posts: Vec<(String, Value)>,
    sign_requests: Vec<SignRequest>,
    one_shots: HashMap<String, VecDeque<HostResponse>>,
    sticky: HashMap<String, (u16, Option<String>, Bytes)>,
    signed: VecDeque<Result<String>>,
    entity: Option<EntityState>,
    sign_count: u64,
}

/// In-memory [`Host`] double.
///
/// Responses are looked up by path with any query string stripped;
/// one-shot responses queued with [`push_response`](FakeHost::push_response)
/// take precedence over sticky bodies set with [`set_json`](FakeHost::set_json).
pub struct FakeHost {
    base: Url,
    state: Mutex<FakeHostState>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            base: Url::parse("http://hass.local:8123").expect("static URL"),
            state: Mutex::new(FakeHostState::default()),
        }
    }

    pub fn with_entity(self, entity: EntityState) -> Self {
        self.state.lock().unwrap().entity = Some(entity);
        self
    }

    /// Queue a one-shot response for a path (query string ignored).
    pub fn push_response(&self, path: &str, response: HostResponse) {
        self.state
            .lock()
            .unwrap()
            .one_shots
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    /// Set a sticky JSON body served on every GET of a path.
    pub fn set_json(&self, path: &str, value: Value) {
        self.state.lock().unwrap().sticky.insert(
            path.to_string(),
            (200, Some("application/json".to_string()), Bytes::from(value.to_string())),
        );
    }

    /// Set a sticky raw body served on every GET of a path.
    pub fn set_body(&self, path: &str, status: u16, content_type: &str, body: Bytes) {
        self.state
            .lock()
            .unwrap()
            .sticky
            .insert(path.to_string(), (status, Some(content_type.to_string()), body));
    }

    /// Queue the outcome of the next sign_path call.
    pub fn push_signed(&self, result: Result<String>) {
        self.state.lock().unwrap().signed.push_back(result);
    }

    pub fn gets(&self) -> Vec<String> {
        self.state.lock().unwrap().gets.clone()
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn sign_requests(&self) -> Vec<SignRequest> {
        self.state.lock().unwrap().sign_requests.clone()
    }

    /// Count of GETs whose path (query stripped) equals `path`.
    pub fn get_count(&self, path: &str) -> usize {
        self.state.lock().unwrap().gets.iter().filter(|p| strip_query(p) == path).count()
    }

    fn lookup(&self, path: &str) -> HostResponse {
        let key = strip_query(path).to_string();
        let mut state = self.state.lock().unwrap();
        if let Some(queue) = state.one_shots.get_mut(&key)
            && let Some(response) = queue.pop_front()
        {
            return response;
        }
        if let Some((status, content_type, body)) = state.sticky.get(&key) {
            return HostResponse::full(*status, content_type.clone(), body.clone());
        }
        HostResponse::full(404, None, Bytes::new())
    }
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map(|(p, _)| p).unwrap_or(path)
}

#[async_trait::async_trait]
impl Host for FakeHost {
    async fn entity_state(&self, entity_id: &str) -> Result<EntityState> {
        let state = self.state.lock().unwrap();
        match &state.entity {
            Some(entity) if entity.entity_id == entity_id => Ok(entity.clone()),
            _ => Err(RobotError::EntityNotFound { entity_id: entity_id.to_string() }),
        }
    }

    async fn get(&self, path: &str) -> Result<HostResponse> {
        self.state.lock().unwrap().gets.push(path.to_string());
        Ok(self.lookup(path))
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<HostResponse> {
        self.state.lock().unwrap().posts.push((path.to_string(), body));
        Ok(self.lookup(path))
    }

    async fn sign_path(&self, path: &str, expires: Duration) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.sign_requests.push((path.to_string(), expires.as_secs()));
        if let Some(result) = state.signed.pop_front() {
            return result;
        }
        state.sign_count += 1;
        Ok(format!("{path}?authSig=fake{}", state.sign_count))
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }
}

/// An online robot entity for tests.
pub fn online_entity(entity_id: &str) -> EntityState {
    serde_json::from_value(serde_json::json!({
        "entity_id": entity_id,
        "state": "online",
        "attributes": {
            "ip_address": "192.168.1.42",
            "fps": 20.0,
            "streaming": false,
            "friendly_name": "Test Robot"
        }
    }))
    .expect("static entity JSON")
}

/// Compose one multipart part for wire fixtures.
pub fn multipart_part(boundary: &str, payload: &[u8]) -> Vec<u8> {
    let mut image = vec![0xFF, 0xD8];
    image.extend_from_slice(payload);
    image.extend_from_slice(&[0xFF, 0xD9]);

    let mut out = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        image.len()
    )
    .into_bytes();
    out.extend_from_slice(&image);
    out.extend_from_slice(b"\r\n");
    out
}
