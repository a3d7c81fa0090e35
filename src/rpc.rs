//! Signed-path RPC over a persistent duplex channel.
//!
//! The host exposes path signing as a message exchange on its long-lived
//! duplex connection rather than a REST endpoint. [`DuplexRpc`] correlates
//! replies to requests by a locally generated id: a reader task owns the
//! inbound half and dispatches each reply to the pending caller, while
//! callers wait on a oneshot with a bounded timeout. Issuing a call before
//! the channel reports ready waits for the ready signal under the same
//! bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use crate::{Result, RobotError};

/// Bound on readiness waits and reply correlation.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Correlation-by-id RPC client over a duplex message channel.
///
/// Cloneable; all clones share the same pending map and outbound half.
#[derive(Clone)]
pub struct DuplexRpc {
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    ready: watch::Receiver<bool>,
    timeout: Duration,
}

impl DuplexRpc {
    /// Attach to a duplex channel.
    ///
    /// `outbound` carries request messages to the host; `inbound` is the
    /// stream of host messages (a reader task is spawned to dispatch them);
    /// `ready` signals whether the channel is connected and authenticated.
    pub fn new(
        outbound: mpsc::Sender<Value>,
        inbound: impl Stream<Item = Value> + Send + 'static,
        ready: watch::Receiver<bool>,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let dispatch = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut inbound = std::pin::pin!(inbound);
            while let Some(message) = inbound.next().await {
                let Some(id) = message.get("id").and_then(Value::as_u64) else {
                    trace!("Ignoring duplex message without id");
                    continue;
                };
                let waiter = dispatch.lock().expect("pending map poisoned").remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(message);
                    }
                    None => trace!(id, "No pending call for reply id"),
                }
            }
            debug!("Duplex inbound stream ended");
        });

        Self {
            outbound,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            ready,
            timeout: RPC_TIMEOUT,
        }
    }

    /// Override the correlation/readiness timeout (testing hook).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn wait_ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        let wait = async {
            while !*ready.borrow_and_update() {
                ready
                    .changed()
                    .await
                    .map_err(|_| RobotError::transport("duplex channel closed"))?;
            }
            Ok(())
        };
        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| RobotError::timeout(self.timeout))?
    }

    /// Send one request message and wait for the reply with the same id.
    ///
    /// `message` must be a JSON object; the id field is filled in here.
    pub async fn call(&self, mut message: Value) -> Result<Value> {
        self.wait_ready().await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        message
            .as_object_mut()
            .ok_or_else(|| RobotError::rpc("request message must be a JSON object"))?
            .insert("id".to_string(), json!(id));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("pending map poisoned").insert(id, tx);

        if self.outbound.send(message).await.is_err() {
            self.pending.lock().expect("pending map poisoned").remove(&id);
            return Err(RobotError::transport("duplex channel closed"));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RobotError::transport("duplex reader dropped the reply")),
            Err(_) => {
                self.pending.lock().expect("pending map poisoned").remove(&id);
                warn!(id, "Signed-path RPC timed out after {:?}", self.timeout);
                Err(RobotError::timeout(self.timeout))
            }
        }
    }

    /// Request a signed path for `path`, valid for `expires`.
    pub async fn sign_path(&self, path: &str, expires: Duration) -> Result<String> {
        let reply = self
            .call(json!({
                "type": "auth/sign_path",
                "path": path,
                "expires": expires.as_secs(),
            }))
            .await?;

        if reply.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = reply
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("host rejected sign_path");
            return Err(RobotError::rpc(reason));
        }

        // Hosts have shipped the signed path both at the top level and
        // nested under result; accept either.
        let signed = reply
            .pointer("/result/path")
            .or_else(|| reply.get("path"))
            .and_then(Value::as_str);

        match signed {
            Some(path) => Ok(path.to_string()),
            None => Err(RobotError::rpc("missing signed path in response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::wrappers::ReceiverStream;

    struct Channel {
        rpc: DuplexRpc,
        requests: mpsc::Receiver<Value>,
        replies: mpsc::Sender<Value>,
        ready_tx: watch::Sender<bool>,
    }

    fn channel(ready: bool) -> Channel {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = watch::channel(ready);
        let rpc = DuplexRpc::new(out_tx, ReceiverStream::new(in_rx), ready_rx);
        Channel { rpc, requests: out_rx, replies: in_tx, ready_tx }
    }

    #[tokio::test]
    async fn sign_path_correlates_by_id() {
        let mut chan = channel(true);
        let rpc = chan.rpc.clone();

        let responder = tokio::spawn(async move {
            let request = chan.requests.recv().await.expect("request sent");
            assert_eq!(request["type"], "auth/sign_path");
            assert_eq!(request["path"], "/api/esp32_robot/proxy/rover/stream");
            assert_eq!(request["expires"], 110);
            let id = request["id"].as_u64().unwrap();

            // A reply for an unrelated id must be ignored
            chan.replies
                .send(json!({"id": id + 100, "result": {"path": "/wrong"}}))
                .await
                .unwrap();
            chan.replies
                .send(json!({
                    "id": id,
                    "type": "result",
                    "success": true,
                    "result": {"path": "/api/esp32_robot/proxy/rover/stream?authSig=abc"},
                }))
                .await
                .unwrap();
        });

        let signed = rpc
            .sign_path("/api/esp32_robot/proxy/rover/stream", Duration::from_secs(110))
            .await
            .unwrap();
        assert_eq!(signed, "/api/esp32_robot/proxy/rover/stream?authSig=abc");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn sign_path_accepts_top_level_path() {
        let mut chan = channel(true);
        let rpc = chan.rpc.clone();

        tokio::spawn(async move {
            let request = chan.requests.recv().await.unwrap();
            let id = request["id"].as_u64().unwrap();
            chan.replies.send(json!({"id": id, "path": "/signed?authSig=x"})).await.unwrap();
        });

        let signed = rpc.sign_path("/stream", Duration::from_secs(60)).await.unwrap();
        assert_eq!(signed, "/signed?authSig=x");
    }

    #[tokio::test]
    async fn rejected_sign_path_is_an_rpc_error() {
        let mut chan = channel(true);
        let rpc = chan.rpc.clone();

        tokio::spawn(async move {
            let request = chan.requests.recv().await.unwrap();
            let id = request["id"].as_u64().unwrap();
            chan.replies
                .send(json!({
                    "id": id,
                    "success": false,
                    "error": {"message": "invalid path"},
                }))
                .await
                .unwrap();
        });

        let err = rpc.sign_path("/stream", Duration::from_secs(60)).await.unwrap_err();
        match err {
            RobotError::Rpc { reason } => assert_eq!(reason, "invalid path"),
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_reply_times_out() {
        let chan = channel(true);
        // Keep the reply sender alive so the inbound stream stays open but
        // silent; only the correlation timeout can resolve the call.
        let _replies = chan.replies;
        let _requests = chan.requests;

        let err = chan.rpc.sign_path("/stream", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, RobotError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_channel_times_out() {
        let chan = channel(false);
        let _requests = chan.requests;

        let err = chan.rpc.sign_path("/stream", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, RobotError::Timeout { .. }));
    }

    #[tokio::test]
    async fn call_waits_for_ready_signal() {
        let mut chan = channel(false);
        let rpc = chan.rpc.clone();
        let ready_tx = chan.ready_tx;

        let responder = tokio::spawn(async move {
            let request = chan.requests.recv().await.unwrap();
            let id = request["id"].as_u64().unwrap();
            chan.replies.send(json!({"id": id, "path": "/ok"})).await.unwrap();
        });

        // Flip readiness after the call has started waiting.
        let flipper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = ready_tx.send(true);
            ready_tx
        });

        let signed = rpc.sign_path("/stream", Duration::from_secs(60)).await.unwrap();
        assert_eq!(signed, "/ok");
        responder.await.unwrap();
        drop(flipper.await.unwrap());
    }
}
