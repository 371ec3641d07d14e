//! `overlay history` commands.

use anyhow::{Context, Result};
use chat_overlay_core::history::HistoryStore;
use std::sync::Arc;

use crate::config::Config;
use crate::sqlite_store::SqliteKvStore;
use crate::{db, migrate, session};

/// Open the SQLite-backed history store, creating the schema if needed.
pub async fn open_history(config: &Config) -> Result<Arc<HistoryStore>> {
    let pool = db::connect(config)
        .await
        .with_context(|| format!("Failed to open database: {}", config.db.path.display()))?;
    migrate::apply(&pool).await?;

    let kv = Arc::new(SqliteKvStore::new(pool));
    Ok(Arc::new(HistoryStore::with_ttl(
        kv,
        chrono::Duration::hours(config.history.ttl_hours),
    )))
}

pub async fn run_show(config: &Config, room_id: &str) -> Result<()> {
    let history = open_history(config).await?;
    let records = history.load(room_id).await;

    println!("history {}", room_id);
    for record in &records {
        println!("  {}", session::describe(record));
    }
    println!("  records: {}", records.len());
    Ok(())
}

pub async fn run_purge(config: &Config) -> Result<()> {
    let history = open_history(config).await?;
    let removed = history
        .purge_expired()
        .await
        .context("Failed to purge chat history")?;

    println!("history purge");
    println!("  removed: {}", removed);
    Ok(())
}
