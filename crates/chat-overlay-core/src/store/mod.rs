//! Key-value persistence abstraction for Chat Overlay.
//!
//! The [`KvStore`] trait is the narrow surface the history store writes
//! through, mirroring browser-style local storage: string keys, string
//! values, and key enumeration. Backends are pluggable (SQLite in the
//! application crate, in-memory here for tests and embedding).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Abstract string key-value store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KvStore::get) | Read a value, `None` when absent |
/// | [`set`](KvStore::set) | Insert or overwrite a value |
/// | [`remove`](KvStore::remove) | Delete a key (absent keys are not an error) |
/// | [`list_keys`](KvStore::list_keys) | Enumerate every stored key |
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn list_keys(&self) -> Result<Vec<String>>;
}
