//! Core data models used throughout Chat Overlay.
//!
//! These types represent the gifts, streamer info, normalized chat records,
//! and history snapshots that flow through the decode → normalize → store
//! pipeline. Wire names are camelCase to stay compatible with upstream
//! producers and with snapshots already sitting in local storage.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Numeric message-type codes carried in the decoded `type` field.
///
/// The set is closed: any other code is unrecognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MessageType {
    Comment,
    NewGift,
    JoinRoom,
    NewLuckyBag,
    Poke,
    AiCohostMessage,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::Comment,
        MessageType::NewGift,
        MessageType::JoinRoom,
        MessageType::NewLuckyBag,
        MessageType::Poke,
        MessageType::AiCohostMessage,
    ];

    pub fn code(self) -> i64 {
        match self {
            MessageType::Comment => 3,
            MessageType::NewGift => 13,
            MessageType::JoinRoom => 18,
            MessageType::NewLuckyBag => 32,
            MessageType::Poke => 47,
            MessageType::AiCohostMessage => 120,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl TryFrom<i64> for MessageType {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unrecognized message type: {}", code))
    }
}

impl From<MessageType> for i64 {
    fn from(t: MessageType) -> i64 {
        t.code()
    }
}

/// A gift catalog entry, keyed by `giftID`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gift {
    #[serde(rename = "giftID", deserialize_with = "lenient::key")]
    pub gift_id: String,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer", skip_serializing_if = "Option::is_none")]
    pub point: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The streamer of the current room, resolved once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerInfo {
    #[serde(rename = "userID", deserialize_with = "lenient::key")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Upstream colour style object (`{ "textColor": "#RRGGBB" }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(
        rename = "textColor",
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub text_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TextStyle {
    pub fn with_color(color: &str) -> Self {
        Self {
            text_color: Some(color.to_string()),
            extra: Map::new(),
        }
    }
}

/// The normalized output unit consumed by the renderer and the history store.
///
/// Records are built once by the normalizer and never mutated afterwards.
/// Upstream fields without a dedicated slot are preserved in `extra`. The
/// typed slots read upstream values through [`lenient`], so a loosely typed
/// field degrades to its default rather than rejecting the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedChatRecord {
    /// Session-unique identifier generated at normalization time.
    #[serde(deserialize_with = "lenient::key")]
    pub id: String,
    pub message_type: MessageType,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(
        rename = "userID",
        default,
        deserialize_with = "lenient::id",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(
        rename = "openID",
        default,
        deserialize_with = "lenient::id",
        skip_serializing_if = "Option::is_none"
    )]
    pub open_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer", skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_badges: Option<Value>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_guardian: bool,
    #[serde(rename = "isVIP", default, deserialize_with = "lenient::flag")]
    pub is_vip: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_streamer: bool,
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::object", skip_serializing_if = "Option::is_none")]
    pub name: Option<TextStyle>,
    #[serde(default, deserialize_with = "lenient::object", skip_serializing_if = "Option::is_none")]
    pub comment: Option<TextStyle>,
    pub streamer_info: StreamerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barrage: Option<Value>,
    #[serde(default, deserialize_with = "lenient::object", skip_serializing_if = "Option::is_none")]
    pub gift: Option<Gift>,
    #[serde(default, deserialize_with = "lenient::object", skip_serializing_if = "Option::is_none")]
    pub lucky_bag: Option<Gift>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poke_info: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndexedChatRecord {
    /// Wire names of the typed slots; everything else lands in `extra`.
    pub const SLOTS: [&'static str; 20] = [
        "id",
        "messageType",
        "displayName",
        "userID",
        "openID",
        "content",
        "level",
        "levelBadges",
        "isGuardian",
        "isVIP",
        "isStreamer",
        "backgroundColor",
        "name",
        "comment",
        "streamerInfo",
        "barrage",
        "gift",
        "luckyBag",
        "pokeInfo",
        "border",
    ];

    /// A record holding only the generated fields.
    pub fn new(id: impl Into<String>, message_type: MessageType, streamer_info: StreamerInfo) -> Self {
        Self {
            id: id.into(),
            message_type,
            display_name: None,
            user_id: None,
            open_id: None,
            content: None,
            level: None,
            level_badges: None,
            is_guardian: false,
            is_vip: false,
            is_streamer: false,
            background_color: None,
            name: None,
            comment: None,
            streamer_info,
            barrage: None,
            gift: None,
            lucky_bag: None,
            poke_info: None,
            border: None,
            extra: Map::new(),
        }
    }
}

/// A room's persisted feed, stored under [`snapshot_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistorySnapshot {
    pub room_id: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(alias = "chats", default, deserialize_with = "readable_records")]
    pub records: Vec<IndexedChatRecord>,
}

/// Read stored records one by one, skipping any that no longer parse.
fn readable_records<'de, D>(deserializer: D) -> Result<Vec<IndexedChatRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let total = raw.len();
    let records: Vec<IndexedChatRecord> = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable stored chat record");
                None
            }
        })
        .collect();
    if records.len() < total {
        tracing::warn!(kept = records.len(), total, "chat history snapshot was partially readable");
    }
    Ok(records)
}

/// Key prefix shared by every persisted snapshot.
pub const SNAPSHOT_KEY_PREFIX: &str = "chat_history_";

/// Storage key for a room's snapshot.
pub fn snapshot_key(room_id: &str) -> String {
    format!("{}{}", SNAPSHOT_KEY_PREFIX, room_id)
}

/// Forgiving readers for loosely typed upstream fields.
///
/// Ids arrive as strings or numbers, flags as `null` or `0`, levels as
/// numeric strings. Each reader coerces what it can and otherwise yields
/// the field's default.
pub mod lenient {
    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// A string or numeric id, as a string.
    pub fn id_string(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// JavaScript truthiness of a JSON value.
    pub fn truthy(v: &Value) -> bool {
        match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// An integer, or a string holding one.
    pub fn as_integer(v: &Value) -> Option<i64> {
        match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Required id; the only reader here that can fail.
    pub fn key<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let v = Value::deserialize(d)?;
        id_string(&v).ok_or_else(|| D::Error::custom(format!("expected a string or numeric id, found {}", v)))
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(id_string(&Value::deserialize(d)?))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(truthy(&Value::deserialize(d)?))
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(as_integer(&Value::deserialize(d)?))
    }

    /// Strings as is; numbers and booleans in their JSON spelling.
    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
            _ => None,
        })
    }

    /// A nested object, or `None` when it does not have the expected shape.
    pub fn object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            v => serde_json::from_value(v).ok(),
        })
    }
}
