//! `overlay decode`: inspect a single raw channel message offline.

use anyhow::{Context, Result};
use chat_overlay_core::catalog::GiftCatalog;
use chat_overlay_core::decode::decode;
use chat_overlay_core::models::StreamerInfo;
use chat_overlay_core::normalize::{normalize_decoded, ChannelEvent, NormalizeContext};
use chat_overlay_core::props::ChatProps;
use std::path::Path;

pub async fn run_decode(
    path: &Path,
    user_id: &str,
    streamer_id: &str,
    gifts_file: Option<&Path>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON channel message", path.display()))?;

    let catalog = GiftCatalog::new();
    if let Some(gifts_file) = gifts_file {
        let json = tokio::fs::read_to_string(gifts_file)
            .await
            .with_context(|| format!("Failed to read {}", gifts_file.display()))?;
        catalog.load_from_json(&json)?;
    }

    let decoded = decode(&raw);
    println!("decoded:");
    println!("{}", serde_json::to_string_pretty(&decoded)?);

    match ChannelEvent::from_decoded(&decoded) {
        Ok(event) => println!("type: {:?}", event.message_type()),
        Err(e) => println!("type: unreadable ({})", e),
    }

    let streamer = StreamerInfo {
        user_id: streamer_id.to_string(),
        picture: None,
        extra: Default::default(),
    };
    let ctx = NormalizeContext::new(streamer, user_id);
    match normalize_decoded(&decoded, &ctx, &catalog) {
        Some(record) => {
            println!("record:");
            println!("{}", serde_json::to_string_pretty(&ChatProps::from(&record))?);
        }
        None => println!("record: (dropped)"),
    }

    Ok(())
}
