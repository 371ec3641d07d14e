//! # Chat Overlay Core
//!
//! Runtime-free logic for Chat Overlay: payload decoding, message
//! classification and normalization, the gift catalog, the bounded feed,
//! and the expiring history store.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Everything
//! here can be driven from tests with in-memory collaborators.
//!
//! ```text
//! raw channel message
//!        │  decode::decode
//!        ▼
//! decoded JSON ──▶ normalize::normalize_decoded ──▶ IndexedChatRecord
//!                         ▲                               │
//!                  catalog::GiftLookup          feed::BoundedFeed
//!                                                         │
//!                                              history::HistoryStore
//!                                                         │
//!                                                  store::KvStore
//! ```

pub mod catalog;
pub mod decode;
pub mod feed;
pub mod history;
pub mod models;
pub mod normalize;
pub mod props;
pub mod store;
