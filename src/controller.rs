//! Per-room feed session.
//!
//! A [`FeedController`] owns the bounded feed for one room and drives it
//! through its lifecycle:
//!
//! ```text
//! Idle ──start()──▶ Seeded ──run()──▶ Connected ──stream ends / shutdown──▶ Idle
//!        purge expired,          subscribe,           unsubscribe,
//!        seed from history       handle_raw per msg   final save
//! ```
//!
//! Every feed mutation publishes an immutable snapshot on a
//! [`tokio::sync::watch`] channel. A writer task persists the latest snapshot
//! (optionally debounced) so storage never blocks message handling, and
//! teardown performs one final awaited save so the stored history matches the
//! final feed.

use anyhow::Result;
use chat_overlay_core::catalog::GiftLookup;
use chat_overlay_core::decode::decode;
use chat_overlay_core::feed::BoundedFeed;
use chat_overlay_core::history::HistoryStore;
use chat_overlay_core::models::IndexedChatRecord;
use chat_overlay_core::normalize::{normalize_decoded, NormalizeContext};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::FeedConfig;
use crate::transport::{RawChannelMessage, TokenProvider, Transport};

/// Snapshot of the feed as published to watchers.
pub type FeedSnapshot = Arc<Vec<IndexedChatRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// History loaded, not yet subscribed.
    Seeded,
    Connected,
}

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub capacity: usize,
    pub persist_debounce: Duration,
}

impl From<&FeedConfig> for FeedOptions {
    fn from(config: &FeedConfig) -> Self {
        Self {
            capacity: config.capacity,
            persist_debounce: Duration::from_millis(config.persist_debounce_ms),
        }
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

struct Writer {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct FeedController {
    room_id: String,
    ctx: NormalizeContext,
    catalog: Arc<dyn GiftLookup>,
    history: Arc<HistoryStore>,
    feed: BoundedFeed,
    state: SessionState,
    persist_debounce: Duration,
    snapshots: watch::Sender<FeedSnapshot>,
    writer: Option<Writer>,
}

impl FeedController {
    pub fn new(
        room_id: impl Into<String>,
        ctx: NormalizeContext,
        catalog: Arc<dyn GiftLookup>,
        history: Arc<HistoryStore>,
        options: FeedOptions,
    ) -> Self {
        let (snapshots, _) = watch::channel(FeedSnapshot::default());
        Self {
            room_id: room_id.into(),
            ctx,
            catalog,
            history,
            feed: BoundedFeed::new(options.capacity),
            state: SessionState::Idle,
            persist_debounce: options.persist_debounce,
            snapshots,
            writer: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn feed(&self) -> &BoundedFeed {
        &self.feed
    }

    /// Receiver of published feed snapshots, starting at the current one.
    pub fn watch_feed(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshots.subscribe()
    }

    /// Purge expired history, seed the feed from this room's snapshot and
    /// start the persistence writer. No-op unless idle.
    pub async fn start(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }

        match self.history.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "purged expired chat history"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired chat history"),
        }

        let restored = self.history.load(&self.room_id).await;
        tracing::info!(room_id = %self.room_id, restored = restored.len(), "feed seeded from history");
        self.feed.seed(restored);
        self.publish();

        self.writer = Some(self.spawn_writer());
        self.state = SessionState::Seeded;
    }

    /// Decode, classify and append one raw message.
    ///
    /// Returns the appended record, or `None` when the message was dropped.
    pub fn handle_raw(&mut self, raw: &RawChannelMessage) -> Option<&IndexedChatRecord> {
        let decoded = decode(raw);
        let record = normalize_decoded(&decoded, &self.ctx, self.catalog.as_ref())?;
        self.feed.push(record);
        self.publish();
        self.feed.last()
    }

    /// Run a session until the stream ends or `shutdown` resolves.
    ///
    /// Returns the number of records appended.
    pub async fn run<F>(
        &mut self,
        transport: &dyn Transport,
        tokens: Arc<dyn TokenProvider>,
        shutdown: F,
    ) -> Result<usize>
    where
        F: Future<Output = ()>,
    {
        self.run_with(transport, tokens, shutdown, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_record` for every appended record.
    pub async fn run_with<F, C>(
        &mut self,
        transport: &dyn Transport,
        tokens: Arc<dyn TokenProvider>,
        shutdown: F,
        mut on_record: C,
    ) -> Result<usize>
    where
        F: Future<Output = ()>,
        C: FnMut(&IndexedChatRecord),
    {
        self.start().await;

        let mut subscription = match transport.subscribe(&self.room_id, tokens).await {
            Ok(sub) => sub,
            Err(e) => {
                self.stop().await;
                return Err(e);
            }
        };
        self.state = SessionState::Connected;
        tracing::info!(room_id = %self.room_id, "connected");

        tokio::pin!(shutdown);
        let mut appended = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!(room_id = %self.room_id, "shutdown requested");
                    break;
                }
                msg = subscription.recv() => match msg {
                    Some(raw) => {
                        if let Some(record) = self.handle_raw(&raw) {
                            on_record(record);
                            appended += 1;
                        }
                    }
                    None => {
                        tracing::info!(room_id = %self.room_id, "channel closed");
                        break;
                    }
                },
            }
        }

        subscription.unsubscribe().await;
        self.stop().await;
        Ok(appended)
    }

    /// Drain the writer and save the final feed. Leaves the controller idle.
    pub async fn stop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.stop.send(());
            if let Err(e) = writer.handle.await {
                tracing::warn!(error = %e, "history writer task failed");
            }
        }

        if !self.feed.is_empty() {
            let records = self.feed.records();
            if let Err(e) = self.history.save(&self.room_id, &records).await {
                tracing::warn!(room_id = %self.room_id, error = %e, "final history save failed");
            }
        }

        self.state = SessionState::Idle;
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.feed.records()));
    }

    fn spawn_writer(&self) -> Writer {
        let (stop, mut stop_rx) = oneshot::channel();
        let mut rx = self.snapshots.subscribe();
        let history = self.history.clone();
        let room_id = self.room_id.clone();
        let debounce = self.persist_debounce;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !debounce.is_zero() {
                            tokio::select! {
                                _ = &mut stop_rx => break,
                                _ = tokio::time::sleep(debounce) => {}
                            }
                        }
                        let records = rx.borrow_and_update().clone();
                        if records.is_empty() {
                            continue;
                        }
                        if let Err(e) = history.save(&room_id, &records).await {
                            tracing::warn!(room_id = %room_id, error = %e, "history save failed");
                        }
                    }
                }
            }
        });

        Writer { stop, handle }
    }
}
