//! Realtime channel boundary.
//!
//! The feed controller never talks to a pub/sub vendor directly. It asks a
//! [`Transport`] for a [`Subscription`] to a room and pulls raw channel
//! messages from it. Authentication is delegated to a [`TokenProvider`],
//! which the transport invokes whenever the channel demands a token.
//!
//! Two transports ship with the crate:
//!
//! - [`ReplayTransport`] streams raw messages from a JSON-lines capture.
//! - [`MemoryTransport`] is fed from an in-process [`mpsc::Sender`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A message exactly as delivered by the channel, before decoding.
pub type RawChannelMessage = serde_json::Value;

const DEFAULT_BUFFER: usize = 256;

/// Supplies channel auth tokens for a room.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, room_id: &str) -> Result<String>;
}

/// Opens subscriptions to a room's channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to `room_id`. Token failures fail the subscription.
    async fn subscribe(
        &self,
        room_id: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Subscription>;
}

/// A live stream of raw messages for one room.
pub struct Subscription {
    room_id: String,
    rx: mpsc::Receiver<RawChannelMessage>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(room_id: impl Into<String>, rx: mpsc::Receiver<RawChannelMessage>) -> Self {
        Self {
            room_id: room_id.into(),
            rx,
            producer: None,
        }
    }

    /// Attach the task feeding this subscription; it is stopped on unsubscribe.
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next raw message, or `None` once the channel has ended.
    pub async fn recv(&mut self) -> Option<RawChannelMessage> {
        self.rx.recv().await
    }

    /// Stop delivery. Messages still buffered are discarded.
    pub async fn unsubscribe(mut self) {
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
            let _ = producer.await;
        }
        tracing::debug!(room_id = %self.room_id, "unsubscribed");
    }
}

/// Replays raw channel messages from a JSON-lines file.
///
/// Blank lines are skipped and lines that are not valid JSON are logged and
/// skipped. A token is fetched once before streaming starts.
pub struct ReplayTransport {
    path: PathBuf,
    delay: Duration,
}

impl ReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive messages.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Parse a JSON-lines capture into raw messages.
pub fn parse_capture(content: &str) -> Vec<RawChannelMessage> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str(line) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "skipping malformed capture line");
                None
            }
        })
        .collect()
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn subscribe(
        &self,
        room_id: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Subscription> {
        tokens
            .fetch_token(room_id)
            .await
            .with_context(|| format!("Failed to authenticate channel for room {}", room_id))?;

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read capture file: {}", self.path.display()))?;
        let messages = parse_capture(&content);
        tracing::info!(
            room_id,
            count = messages.len(),
            path = %self.path.display(),
            "replaying capture"
        );

        let (tx, rx) = mpsc::channel(DEFAULT_BUFFER);
        let delay = self.delay;
        let producer = tokio::spawn(async move {
            for msg in messages {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(room_id, rx).with_producer(producer))
    }
}

/// Transport fed by an in-process sender.
///
/// Only one subscription can be opened; the stream ends when every sender
/// returned by [`MemoryTransport::channel`] is dropped.
pub struct MemoryTransport {
    rx: Mutex<Option<mpsc::Receiver<RawChannelMessage>>>,
}

impl MemoryTransport {
    pub fn channel(buffer: usize) -> (Self, mpsc::Sender<RawChannelMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(
        &self,
        room_id: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Subscription> {
        tokens
            .fetch_token(room_id)
            .await
            .with_context(|| format!("Failed to authenticate channel for room {}", room_id))?;

        let rx = self
            .rx
            .lock()
            .map_err(|e| anyhow::anyhow!("transport lock poisoned: {}", e))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("memory transport already subscribed"))?;
        Ok(Subscription::new(room_id, rx))
    }
}

/// Token provider that always returns the same token.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn fetch_token(&self, _room_id: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    struct FailingToken;

    #[async_trait]
    impl TokenProvider for FailingToken {
        async fn fetch_token(&self, _room_id: &str) -> Result<String> {
            anyhow::bail!("token endpoint returned 401")
        }
    }

    #[test]
    fn test_parse_capture_skips_blank_and_bad_lines() {
        let msgs = parse_capture("{\"data\":\"a\"}\n\nnot json\n{\"data\":\"b\"}\n");
        assert_eq!(msgs, vec![json!({"data": "a"}), json!({"data": "b"})]);
    }

    #[tokio::test]
    async fn test_replay_streams_then_ends() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"data\":\"one\"}}").unwrap();
        writeln!(file, "{{\"data\":\"two\"}}").unwrap();

        let transport = ReplayTransport::new(file.path());
        let mut sub = transport
            .subscribe("room-1", Arc::new(StaticToken("t".into())))
            .await
            .unwrap();
        assert_eq!(sub.room_id(), "room-1");
        assert_eq!(sub.recv().await, Some(json!({"data": "one"})));
        assert_eq!(sub.recv().await, Some(json!({"data": "two"})));
        assert_eq!(sub.recv().await, None);
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_token_failure_fails_subscribe() {
        let (transport, _tx) = MemoryTransport::channel(4);
        let err = transport
            .subscribe("room-1", Arc::new(FailingToken))
            .await
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("401"));
    }

    #[tokio::test]
    async fn test_memory_transport_subscribes_once() {
        let (transport, tx) = MemoryTransport::channel(4);
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken("t".into()));
        let mut sub = transport.subscribe("r", tokens.clone()).await.unwrap();
        assert!(transport.subscribe("r", tokens).await.is_err());

        tx.send(json!({"x": 1})).await.unwrap();
        drop(tx);
        assert_eq!(sub.recv().await, Some(json!({"x": 1})));
        assert_eq!(sub.recv().await, None);
    }
}
