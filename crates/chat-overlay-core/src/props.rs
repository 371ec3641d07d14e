//! Renderer-facing projection of a chat record.
//!
//! The renderer consumes a flat prop set per list item rather than the raw
//! record. Upstream colours arrive as `AARRGGBB` hex strings; CSS wants
//! `#RRGGBBAA`, so every colour passes through [`transfer_8bit_hex_code`].

use serde::Serialize;
use serde_json::Value;

use crate::models::{Gift, IndexedChatRecord, MessageType, StreamerInfo};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatProps {
    /// List key; same as `id`.
    pub key: String,
    pub id: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "openID", skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_badges: Option<Value>,
    pub is_guardian: bool,
    #[serde(rename = "isVIP")]
    pub is_vip: bool,
    pub is_streamer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checking_level: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift: Option<Gift>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lucky_bag: Option<Gift>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poke_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_right_badge: Option<String>,
    pub streamer_info: StreamerInfo,
    // Passed through untouched from the record's upstream fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_send_all: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_metas: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_invisible: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snacks: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_shadow_color: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_badges: Option<Value>,
}

impl From<&IndexedChatRecord> for ChatProps {
    fn from(record: &IndexedChatRecord) -> Self {
        let badge_url = |key: &str| {
            record
                .extra
                .get(key)
                .and_then(|b| b.get("URL"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let upstream = |key: &str| record.extra.get(key).filter(|v| !v.is_null()).cloned();
        Self {
            key: record.id.clone(),
            id: record.id.clone(),
            message_type: record.message_type,
            display_name: record.display_name.clone(),
            open_id: record.open_id.clone(),
            user_id: record.user_id.clone(),
            content: record.content.clone(),
            level: record.level,
            level_badges: record.level_badges.clone(),
            is_guardian: record.is_guardian,
            is_vip: record.is_vip,
            is_streamer: record.is_streamer,
            checking_level: record.extra.get("checkinLevel").cloned(),
            gift: record.gift.clone(),
            lucky_bag: record.lucky_bag.clone(),
            poke_info: record.poke_info.clone(),
            border: record.border.clone(),
            name_color: record
                .name
                .as_ref()
                .and_then(|s| transfer_8bit_hex_code(s.text_color.as_deref()?)),
            text_color: record
                .comment
                .as_ref()
                .and_then(|s| transfer_8bit_hex_code(s.text_color.as_deref()?)),
            background_color: record
                .background_color
                .as_deref()
                .and_then(transfer_8bit_hex_code),
            middle_badge: badge_url("middleBadge"),
            top_right_badge: badge_url("topRightBadge"),
            streamer_info: record.streamer_info.clone(),
            is_send_all: upstream("isSendAll"),
            kind: upstream("type"),
            gift_type: upstream("giftType"),
            gift_metas: upstream("giftMetas"),
            receiver: upstream("receiver"),
            value: upstream("value"),
            is_invisible: upstream("isInvisible"),
            snacks: upstream("snacks"),
            comment_shadow_color: upstream("commentShadowColor"),
            prefix_badges: upstream("prefixBadges"),
        }
    }
}

/// Convert an upstream hex colour into CSS form.
///
/// Six digits pass through as `#RRGGBB`; eight digits are read as
/// `AARRGGBB` and reordered to `#RRGGBBAA`. Empty input yields `None`.
pub fn transfer_8bit_hex_code(hex_code: &str) -> Option<String> {
    if hex_code.is_empty() {
        return None;
    }
    let hex: Vec<char> = hex_code.replacen('#', "", 1).chars().collect();
    if hex.len() == 6 {
        return Some(format!("#{}", hex.iter().collect::<String>()));
    }
    let slice = |from: usize, to: usize| -> String {
        let to = to.min(hex.len());
        let from = from.min(to);
        hex[from..to].iter().collect()
    };
    Some(format!("#{}{}", slice(2, 8), slice(0, 2)))
}
