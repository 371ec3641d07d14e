//! # Chat Overlay CLI (`overlay`)
//!
//! The `overlay` binary runs a live chat session for one room: it decodes
//! channel messages, normalizes them into chat records, keeps the bounded
//! feed, and persists it as expiring history.
//!
//! ## Usage
//!
//! ```bash
//! overlay --config ./config/overlay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `overlay init` | Create the SQLite database and run schema migrations |
//! | `overlay watch <room>` | Run a session and print records as they arrive |
//! | `overlay serve <room>` | Run a session and serve the feed over HTTP |
//! | `overlay decode <file>` | Decode and classify one raw channel message |
//! | `overlay history show <room>` | Print a room's persisted feed |
//! | `overlay history purge` | Delete expired history snapshots |
//!
//! ## Examples
//!
//! ```bash
//! # Replay a captured channel against local mock data
//! overlay watch 12345 --user me --replay ./captures/room.jsonl --offline
//!
//! # Pipe raw messages from another process
//! bridge --room 12345 | overlay serve 12345 --user me
//! ```

use chat_overlay::{config, decode_cmd, history_cmd, migrate, session};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Chat Overlay CLI: decode, normalize and persist a live stream's chat.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/overlay.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "overlay",
    about = "Chat Overlay: live stream chat feed with expiring history",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/overlay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Run a room session and print each record as it is appended.
    ///
    /// Reads raw channel messages from `--replay` or, without it, one JSON
    /// message per line on stdin.
    Watch {
        #[command(flatten)]
        session: SessionOpts,
    },

    /// Run a room session and serve the feed at `GET /feed`.
    Serve {
        #[command(flatten)]
        session: SessionOpts,
    },

    /// Decode a raw channel message (JSON file) and show its record.
    Decode {
        /// Path to a file holding one raw channel message.
        file: PathBuf,

        /// Viewer id used for the visibility rule.
        #[arg(long, default_value = "")]
        user: String,

        /// Streamer id used to flag streamer pokes.
        #[arg(long, default_value = "")]
        streamer: String,

        /// Gift list (`{ "gifts": [...] }`); defaults to `lapi.gifts_file`.
        #[arg(long)]
        gifts: Option<PathBuf>,
    },

    /// Inspect or clean up persisted chat history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(clap::Args)]
struct SessionOpts {
    /// Room (channel) id.
    room_id: String,

    /// Id of the viewer running the overlay.
    #[arg(long)]
    user: String,

    /// JSON-lines capture of raw channel messages to replay.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Delay between replayed messages, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Do not fetch a channel token.
    #[arg(long)]
    offline: bool,
}

impl From<SessionOpts> for session::SessionArgs {
    fn from(opts: SessionOpts) -> Self {
        Self {
            room_id: opts.room_id,
            user_id: opts.user,
            replay: opts.replay,
            delay_ms: opts.delay_ms,
            offline: opts.offline,
        }
    }
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the records persisted for a room (expired snapshots are hidden).
    Show { room_id: String },
    /// Delete every expired snapshot.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Decoding works without a config file
    if let Commands::Decode {
        file,
        user,
        streamer,
        gifts,
    } = &cli.command
    {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
        let gifts = gifts.clone().or(cfg.lapi.gifts_file);
        decode_cmd::run_decode(file, user, streamer, gifts.as_deref()).await?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Watch { session: opts } => {
            session::run_watch(&cfg, &opts.into()).await?;
        }
        Commands::Serve { session: opts } => {
            session::run_serve(&cfg, &opts.into()).await?;
        }
        Commands::History { action } => match action {
            HistoryAction::Show { room_id } => {
                history_cmd::run_show(&cfg, &room_id).await?;
            }
            HistoryAction::Purge => {
                history_cmd::run_purge(&cfg).await?;
            }
        },
        Commands::Decode { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
