//! Expiring per-room chat history.
//!
//! Each room's feed is persisted as one JSON [`ChatHistorySnapshot`] under
//! `chat_history_{roomId}`. A snapshot older than the TTL (24 hours by
//! default) is never handed back by [`HistoryStore::load`] and is removed by
//! [`HistoryStore::purge_expired`].
//!
//! `save` is the only write path and `purge_expired` the only delete path.

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::models::{snapshot_key, ChatHistorySnapshot, IndexedChatRecord, SNAPSHOT_KEY_PREFIX};
use crate::store::KvStore;

/// How long a snapshot stays readable.
pub const DEFAULT_HISTORY_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history storage failed: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("history snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct HistoryStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl HistoryStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_ttl(kv, Duration::hours(DEFAULT_HISTORY_TTL_HOURS))
    }

    pub fn with_ttl(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist `records` as the room's snapshot, stamped with the current time.
    pub async fn save(&self, room_id: &str, records: &[IndexedChatRecord]) -> Result<(), HistoryError> {
        self.save_at(room_id, records, Utc::now().timestamp_millis())
            .await
    }

    /// Persist `records` with an explicit timestamp (ms since epoch).
    pub async fn save_at(
        &self,
        room_id: &str,
        records: &[IndexedChatRecord],
        timestamp: i64,
    ) -> Result<(), HistoryError> {
        let snapshot = ChatHistorySnapshot {
            room_id: room_id.to_string(),
            timestamp,
            records: records.to_vec(),
        };
        let value = serde_json::to_string(&snapshot)?;
        self.kv.set(&snapshot_key(room_id), &value).await?;
        Ok(())
    }

    /// Load the room's records, oldest first.
    ///
    /// Absent, expired, or unreadable snapshots all yield an empty list.
    /// Within a readable snapshot, records that no longer parse are skipped
    /// and the rest are returned.
    pub async fn load(&self, room_id: &str) -> Vec<IndexedChatRecord> {
        self.load_at(room_id, Utc::now().timestamp_millis()).await
    }

    pub async fn load_at(&self, room_id: &str, now: i64) -> Vec<IndexedChatRecord> {
        let raw = match self.kv.get(&snapshot_key(room_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(room_id, error = %e, "failed to read chat history");
                return Vec::new();
            }
        };
        match serde_json::from_str::<ChatHistorySnapshot>(&raw) {
            Ok(snapshot) if !self.is_expired(snapshot.timestamp, now) => snapshot.records,
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!(room_id, error = %e, "ignoring unreadable chat history");
                Vec::new()
            }
        }
    }

    /// Delete every expired snapshot, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, HistoryError> {
        self.purge_expired_at(Utc::now().timestamp_millis()).await
    }

    pub async fn purge_expired_at(&self, now: i64) -> Result<usize, HistoryError> {
        let mut removed = 0;
        for key in self.kv.list_keys().await? {
            if !key.starts_with(SNAPSHOT_KEY_PREFIX) {
                continue;
            }
            let Some(raw) = self.kv.get(&key).await? else {
                continue;
            };
            let timestamp = match serde_json::from_str::<SnapshotHeader>(&raw) {
                Ok(header) => header.timestamp,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping unreadable chat history during purge");
                    continue;
                }
            };
            if self.is_expired(timestamp, now) {
                self.kv.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn is_expired(&self, timestamp: i64, now: i64) -> bool {
        now - timestamp > self.ttl.num_milliseconds()
    }
}

/// Just the timestamp, so purging never deserializes whole feeds.
#[derive(serde::Deserialize)]
struct SnapshotHeader {
    timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryKvStore;
    use serde_json::json;

    const HOUR_MS: i64 = 60 * 60 * 1000;
    const NOW: i64 = 1_760_000_000_000;

    fn record(id: &str) -> IndexedChatRecord {
        serde_json::from_value(json!({
            "id": id,
            "messageType": 3,
            "content": "hello",
            "streamerInfo": { "userID": "s1" }
        }))
        .unwrap()
    }

    fn store() -> (Arc<InMemoryKvStore>, HistoryStore) {
        let kv = Arc::new(InMemoryKvStore::new());
        let history = HistoryStore::new(kv.clone());
        (kv, history)
    }

    #[tokio::test]
    async fn test_fresh_snapshot_round_trips() {
        let (_, history) = store();
        let records = vec![record("a"), record("b")];
        history.save_at("room1", &records, NOW - HOUR_MS).await.unwrap();
        assert_eq!(history.load_at("room1", NOW).await, records);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_not_loaded() {
        let (kv, history) = store();
        history
            .save_at("room1", &[record("a")], NOW - 25 * HOUR_MS)
            .await
            .unwrap();
        assert!(history.load_at("room1", NOW).await.is_empty());
        // load never deletes
        assert!(kv.get("chat_history_room1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_absent_room_is_empty() {
        let (_, history) = store();
        assert!(history.load("nowhere").await.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let (kv, history) = store();
        history.save("room1", &[record("a")]).await.unwrap();
        history.save("room1", &[record("b")]).await.unwrap();
        let loaded = history.load("room1").await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "b");
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_wire_shape() {
        let (kv, history) = store();
        history.save_at("42", &[record("a")], NOW).await.unwrap();
        let raw = kv.get("chat_history_42").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["roomId"], json!("42"));
        assert_eq!(value["timestamp"], json!(NOW));
        assert_eq!(value["records"][0]["id"], json!("a"));
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_loads_empty() {
        let (kv, history) = store();
        kv.set("chat_history_bad", "{not json").await.unwrap();
        assert!(history.load_at("bad", NOW).await.is_empty());
    }

    #[tokio::test]
    async fn test_partially_readable_snapshot_keeps_good_records() {
        let (kv, history) = store();
        let snapshot = json!({
            "roomId": "mixed",
            "timestamp": NOW - HOUR_MS,
            "records": [
                { "id": "a", "messageType": 3, "streamerInfo": { "userID": "s1" } },
                { "id": "b", "messageType": 999, "streamerInfo": { "userID": "s1" } },
                { "id": "c", "messageType": 3 },
                { "id": "d", "messageType": 13, "level": "7", "isVIP": null, "streamerInfo": { "userID": 5 } },
                "garbage"
            ]
        });
        kv.set("chat_history_mixed", &snapshot.to_string()).await.unwrap();

        let loaded = history.load_at("mixed", NOW).await;
        let ids: Vec<&str> = loaded.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(loaded[1].level, Some(7));
        assert_eq!(loaded[1].streamer_info.user_id, "5");
    }

    #[tokio::test]
    async fn test_legacy_chats_snapshot_skips_bad_records() {
        let (kv, history) = store();
        let snapshot = json!({
            "roomId": "legacy",
            "timestamp": NOW - HOUR_MS,
            "chats": [
                { "id": "x", "messageType": 18, "isGuardian": null, "streamerInfo": { "userID": "s1" } },
                { "messageType": 3, "streamerInfo": { "userID": "s1" } }
            ]
        });
        kv.set("chat_history_legacy", &snapshot.to_string()).await.unwrap();

        let loaded = history.load_at("legacy", NOW).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "x");
        assert!(!loaded[0].is_guardian);
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_snapshots() {
        let (kv, history) = store();
        history.save_at("old", &[record("a")], NOW - 25 * HOUR_MS).await.unwrap();
        history.save_at("new", &[record("b")], NOW - HOUR_MS).await.unwrap();
        kv.set("chat_history_broken", "nope").await.unwrap();
        kv.set("settings", "{\"timestamp\":0}").await.unwrap();

        let removed = history.purge_expired_at(NOW).await.unwrap();
        assert_eq!(removed, 1);
        let keys = kv.list_keys().await.unwrap();
        assert_eq!(keys, vec!["chat_history_broken", "chat_history_new", "settings"]);
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let kv = Arc::new(InMemoryKvStore::new());
        let history = HistoryStore::with_ttl(kv, Duration::hours(1));
        history.save_at("r", &[record("a")], NOW - 2 * HOUR_MS).await.unwrap();
        assert!(history.load_at("r", NOW).await.is_empty());
        assert_eq!(history.purge_expired_at(NOW).await.unwrap(), 1);
    }
}
