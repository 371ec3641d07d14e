//! # Chat Overlay
//!
//! A live-stream chat overlay backend: decode the realtime channel's
//! compressed payloads, normalize them into chat records, keep a bounded
//! feed per room, and persist it as expiring history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌────────────┐
//! │  Transport  │──▶│  FeedController  │──▶│  History   │
//! │ replay/mem  │   │ decode+normalize │   │ SQLite kv  │
//! └─────────────┘   └────────┬─────────┘   └────────────┘
//!        ▲                   │ watch
//!   TokenProvider            ▼
//!   (lapi/messenger)   ┌──────────┐   ┌──────────┐
//!                      │   CLI    │   │   HTTP   │
//!                      │(overlay) │   │  /feed   │
//!                      └──────────┘   └──────────┘
//! ```
//!
//! Runtime-free logic (decoding, classification, the feed and the history
//! store) lives in the `chat-overlay-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`controller`] | Per-room session and persistence writer |
//! | [`transport`] | Channel subscription and token boundary |
//! | [`lapi`] | Backend clients (gifts, room info, tokens) |
//! | [`server`] | HTTP feed server |
//! | [`sqlite_store`] | SQLite key-value store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod controller;
pub mod db;
pub mod decode_cmd;
pub mod history_cmd;
pub mod lapi;
pub mod migrate;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod transport;
