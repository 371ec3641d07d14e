//! `overlay watch` and `overlay serve`: wire a room session together.
//!
//! A session resolves the streamer through `/lapi getRoomInfo`, loads the
//! gift catalog in the background, opens the SQLite history store and then
//! hands everything to a [`FeedController`]. Raw messages come from a
//! JSON-lines capture (`--replay`) or, without one, from stdin.

use anyhow::{Context, Result};
use chat_overlay_core::catalog::GiftCatalog;
use chat_overlay_core::models::{IndexedChatRecord, MessageType};
use chat_overlay_core::normalize::NormalizeContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::config::Config;
use crate::controller::{FeedController, FeedOptions};
use crate::history_cmd::open_history;
use crate::lapi::{LapiClient, MessengerTokenClient};
use crate::server::{self, AppState};
use crate::transport::{MemoryTransport, ReplayTransport, StaticToken, TokenProvider, Transport};

#[derive(Debug, Clone)]
pub struct SessionArgs {
    pub room_id: String,
    pub user_id: String,
    pub replay: Option<PathBuf>,
    pub delay_ms: u64,
    /// Skip channel authentication (useful with captures).
    pub offline: bool,
}

struct Session {
    controller: FeedController,
    transport: Box<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
}

async fn build_session(config: &Config, args: &SessionArgs) -> Result<Session> {
    let history = open_history(config).await?;
    let lapi = Arc::new(LapiClient::from_config(&config.lapi)?);

    let room_info = lapi
        .get_room_info()
        .await
        .context("Failed to resolve room info")?;
    tracing::info!(
        room_id = %args.room_id,
        streamer = %room_info.user_info.user_id,
        "room info resolved"
    );

    // Gift messages may arrive before the catalog is loaded.
    let catalog = Arc::new(GiftCatalog::new());
    {
        let lapi = lapi.clone();
        let catalog = catalog.clone();
        tokio::spawn(async move {
            if let Err(e) = lapi.load_catalog(&catalog).await {
                tracing::warn!(error = %format!("{:#}", e), "gift catalog unavailable");
            }
        });
    }

    let mut ctx = NormalizeContext::new(room_info.user_info, args.user_id.clone());
    ctx.ai_cohost_name = config.feed.ai_cohost_name.clone();

    let tokens: Arc<dyn TokenProvider> = if args.offline {
        Arc::new(StaticToken("offline".to_string()))
    } else if let Some(messenger) = &config.messenger {
        Arc::new(MessengerTokenClient::from_config(messenger, config.lapi.timeout_secs)?)
    } else {
        lapi.clone()
    };

    let transport: Box<dyn Transport> = match &args.replay {
        Some(path) => Box::new(
            ReplayTransport::new(path.clone()).with_delay(Duration::from_millis(args.delay_ms)),
        ),
        None => Box::new(stdin_transport()),
    };

    let controller = FeedController::new(
        args.room_id.clone(),
        ctx,
        catalog,
        history,
        FeedOptions::from(&config.feed),
    );

    Ok(Session {
        controller,
        transport,
        tokens,
    })
}

/// Raw messages read line by line from stdin.
fn stdin_transport() -> MemoryTransport {
    let (transport, tx) = MemoryTransport::channel(256);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed stdin line"),
            }
        }
    });
    transport
}

/// Ctrl-C as a shareable flag.
fn shutdown_flag() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

async fn wait_for_shutdown(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|stop| *stop).await;
}

/// One-line summary of a record for terminal output.
pub fn describe(record: &IndexedChatRecord) -> String {
    let name = record.display_name.as_deref().unwrap_or("-");
    let body = match record.message_type {
        MessageType::NewGift | MessageType::NewLuckyBag => {
            let gift = record
                .gift
                .as_ref()
                .and_then(|g| g.name.clone())
                .unwrap_or_else(|| "unknown gift".to_string());
            format!("sent {}", gift)
        }
        MessageType::JoinRoom => "joined".to_string(),
        MessageType::Poke => "poked".to_string(),
        _ => record.content.clone().unwrap_or_default(),
    };
    format!("{:<12} {}: {}", format!("{:?}", record.message_type), name, body)
}

pub async fn run_watch(config: &Config, args: &SessionArgs) -> Result<()> {
    let Session {
        mut controller,
        transport,
        tokens,
    } = build_session(config, args).await?;

    let appended = controller
        .run_with(
            transport.as_ref(),
            tokens,
            wait_for_shutdown(shutdown_flag()),
            |record| println!("{}", describe(record)),
        )
        .await?;

    println!("watch {}", args.room_id);
    println!("  appended: {}", appended);
    println!("  feed size: {}", controller.feed().len());
    Ok(())
}

pub async fn run_serve(config: &Config, args: &SessionArgs) -> Result<()> {
    let Session {
        mut controller,
        transport,
        tokens,
    } = build_session(config, args).await?;

    let flag = shutdown_flag();
    let state = AppState::new(&args.room_id, controller.watch_feed());
    let bind = config.server.bind.clone();
    let server_flag = flag.clone();
    let server = tokio::spawn(async move {
        server::run_server(&bind, state, wait_for_shutdown(server_flag)).await
    });

    let appended = controller
        .run(transport.as_ref(), tokens, wait_for_shutdown(flag.clone()))
        .await?;
    tracing::info!(appended, "session ended");

    if !*flag.borrow() {
        println!("Channel closed; serving the final feed until Ctrl-C");
    }
    server.await.context("feed server task failed")??;
    Ok(())
}
