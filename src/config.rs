use anyhow::{Context, Result};
use chat_overlay_core::feed::DEFAULT_FEED_CAPACITY;
use chat_overlay_core::history::DEFAULT_HISTORY_TTL_HOURS;
use chat_overlay_core::normalize::DEFAULT_AI_COHOST_NAME;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    pub lapi: LapiConfig,
    #[serde(default)]
    pub messenger: Option<MessengerConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Coalesce history writes that land within this window.
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    #[serde(default = "default_ai_cohost_name")]
    pub ai_cohost_name: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            persist_debounce_ms: default_persist_debounce_ms(),
            ai_cohost_name: default_ai_cohost_name(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}
fn default_persist_debounce_ms() -> u64 {
    250
}
fn default_ai_cohost_name() -> String {
    DEFAULT_AI_COHOST_NAME.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> i64 {
    DEFAULT_HISTORY_TTL_HOURS
}

#[derive(Debug, Deserialize, Clone)]
pub struct LapiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Local `{ "gifts": [...] }` file used instead of `getGifts`.
    #[serde(default)]
    pub gifts_file: Option<PathBuf>,
    /// Local room info file used instead of `getRoomInfo`.
    #[serde(default)]
    pub room_info_file: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    10
}

/// Direct messenger token endpoint, used in place of `getAblyToken`.
#[derive(Debug, Deserialize, Clone)]
pub struct MessengerConfig {
    pub api_url: String,
    #[serde(default = "default_jwt_env")]
    pub jwt_env: String,
}

fn default_jwt_env() -> String {
    "OVERLAY_JWT_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// A config good enough for commands that never touch the network.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/overlay.sqlite"),
            },
            feed: FeedConfig::default(),
            history: HistoryConfig::default(),
            lapi: LapiConfig {
                base_url: "http://127.0.0.1:8080".to_string(),
                timeout_secs: default_timeout_secs(),
                gifts_file: None,
                room_info_file: None,
            },
            messenger: None,
            server: ServerConfig::default(),
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.feed.capacity == 0 {
        anyhow::bail!("feed.capacity must be > 0");
    }

    if config.history.ttl_hours <= 0 {
        anyhow::bail!("history.ttl_hours must be > 0");
    }

    if config.lapi.timeout_secs == 0 {
        anyhow::bail!("lapi.timeout_secs must be > 0");
    }

    if config.lapi.base_url.trim().is_empty() {
        anyhow::bail!("lapi.base_url must not be empty");
    }

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let cfg = parse_config(
            r#"
[db]
path = "./data/overlay.sqlite"

[lapi]
base_url = "http://127.0.0.1:8080"
"#,
        )
        .unwrap();
        assert_eq!(cfg.feed.capacity, 1000);
        assert_eq!(cfg.feed.persist_debounce_ms, 250);
        assert_eq!(cfg.history.ttl_hours, 24);
        assert_eq!(cfg.lapi.timeout_secs, 10);
        assert_eq!(cfg.server.bind, "127.0.0.1:7340");
        assert!(cfg.messenger.is_none());
    }

    #[test]
    fn test_messenger_section() {
        let cfg = parse_config(
            r#"
[db]
path = "x.sqlite"

[lapi]
base_url = "http://localhost"
gifts_file = "./mock/gifts.json"

[messenger]
api_url = "https://api.example.com"
"#,
        )
        .unwrap();
        let messenger = cfg.messenger.unwrap();
        assert_eq!(messenger.jwt_env, "OVERLAY_JWT_TOKEN");
        assert_eq!(
            cfg.lapi.gifts_file.as_deref(),
            Some(Path::new("./mock/gifts.json"))
        );
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = parse_config(
            r#"
[db]
path = "x.sqlite"

[feed]
capacity = 0

[lapi]
base_url = "http://localhost"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("feed.capacity"));
    }

    #[test]
    fn test_rejects_non_positive_ttl() {
        let err = parse_config(
            r#"
[db]
path = "x.sqlite"

[history]
ttl_hours = 0

[lapi]
base_url = "http://localhost"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ttl_hours"));
    }
}
