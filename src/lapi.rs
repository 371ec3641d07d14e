//! Clients for the overlay backend.
//!
//! [`LapiClient`] speaks the `/lapi` action protocol: every call is a
//! `POST {base_url}/lapi` with a `{"action": "..."}` body.
//!
//! | Action | Response |
//! |--------|----------|
//! | `getGifts` | `{ "gifts": [Gift] }` |
//! | `getRoomInfo` | `{ "userInfo": StreamerInfo, ... }` |
//! | `getAblyToken` | `{ "token": "..." }` |
//!
//! In development the gift list and room info can be read from local files
//! instead (`lapi.gifts_file`, `lapi.room_info_file`), and tokens can come
//! straight from the messenger API through [`MessengerTokenClient`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chat_overlay_core::catalog::{GiftCatalog, GiftList};
use chat_overlay_core::models::{Gift, StreamerInfo};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{LapiConfig, MessengerConfig};
use crate::transport::TokenProvider;

/// `getRoomInfo` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomInfo {
    #[serde(rename = "userInfo")]
    pub user_info: StreamerInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

pub struct LapiClient {
    client: reqwest::Client,
    endpoint: String,
    gifts_file: Option<PathBuf>,
    room_info_file: Option<PathBuf>,
}

impl LapiClient {
    pub fn from_config(config: &LapiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/lapi", config.base_url.trim_end_matches('/')),
            gifts_file: config.gifts_file.clone(),
            room_info_file: config.room_info_file.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, action: &str) -> Result<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "action": action }))
            .send()
            .await
            .with_context(|| format!("lapi {} request failed", action))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("lapi {} returned {}: {}", action, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse lapi {} response", action))
    }

    pub async fn get_gifts(&self) -> Result<Vec<Gift>> {
        let list: GiftList = match &self.gifts_file {
            Some(path) => read_json(path).await?,
            None => self.call("getGifts").await?,
        };
        Ok(list.gifts)
    }

    /// Fetch the gift list and load it into `catalog`.
    pub async fn load_catalog(&self, catalog: &GiftCatalog) -> Result<usize> {
        let gifts = self.get_gifts().await?;
        let count = catalog.load(gifts);
        tracing::info!(count, "gift catalog loaded");
        Ok(count)
    }

    pub async fn get_room_info(&self) -> Result<RoomInfo> {
        match &self.room_info_file {
            Some(path) => read_json(path).await,
            None => self.call("getRoomInfo").await,
        }
    }
}

#[async_trait]
impl TokenProvider for LapiClient {
    async fn fetch_token(&self, _room_id: &str) -> Result<String> {
        let response: TokenResponse = self.call("getAblyToken").await?;
        Ok(response.token)
    }
}

/// Fetches channel tokens directly from the messenger API.
pub struct MessengerTokenClient {
    client: reqwest::Client,
    api_url: String,
    jwt_env: String,
}

impl MessengerTokenClient {
    pub fn from_config(config: &MessengerConfig, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            jwt_env: config.jwt_env.clone(),
        })
    }

    pub fn token_url(&self, room_id: &str) -> String {
        messenger_token_url(&self.api_url, room_id)
    }
}

/// `type=3` selects the chat channel provider.
pub fn messenger_token_url(api_url: &str, room_id: &str) -> String {
    format!(
        "{}/api/v1/messenger/token?type=3&roomID={}",
        api_url.trim_end_matches('/'),
        urlencoding::encode(room_id)
    )
}

#[async_trait]
impl TokenProvider for MessengerTokenClient {
    async fn fetch_token(&self, room_id: &str) -> Result<String> {
        let jwt = std::env::var(&self.jwt_env)
            .with_context(|| format!("{} is not set", self.jwt_env))?;

        let response = self
            .client
            .get(self.token_url(room_id))
            .bearer_auth(jwt)
            .send()
            .await
            .context("messenger token request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("messenger token endpoint returned {}", status);
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse messenger token response")?;
        Ok(body.token)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
