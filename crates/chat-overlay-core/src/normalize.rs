//! Message classification and normalization.
//!
//! A decoded channel message is first classified into a [`ChannelEvent`]
//! (one variant per [`MessageType`]) and then projected into an
//! [`IndexedChatRecord`]. Projection follows object-spread semantics: the
//! payload's own fields come first, then the author's display fields, then
//! the generated fields, with later keys winning on collision.
//!
//! # Visibility
//!
//! Comments and join notices flagged by moderation (`isDirty`,
//! `isDirtyWord`, `isDirtyUser`) are suppressed unless the viewer is the
//! author. Whether other viewers should also see the flagged message is a
//! product decision; the viewer-only exception is preserved as is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::GiftLookup;
use crate::models::lenient::{id_string, truthy};
use crate::models::{IndexedChatRecord, MessageType, StreamerInfo};

/// Display name used for AI co-host lines when none is configured.
pub const DEFAULT_AI_COHOST_NAME: &str = "AI Co-host";

const AI_COHOST_TEXT_COLOR: &str = "#333333";
const AI_COHOST_NAME_COLOR: &str = "#527fff";
const AI_COHOST_BACKGROUND_COLOR: &str = "#FFFFFFE6";

/// Payload of COMMENT and JOIN_ROOM messages (`commentMsg`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentMsg {
    #[serde(rename = "displayUser", default)]
    pub display_user: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barrage: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl CommentMsg {
    /// True when any moderation flag is set.
    pub fn is_flagged(&self) -> bool {
        ["isDirty", "isDirtyWord", "isDirtyUser"]
            .iter()
            .any(|k| self.rest.get(*k).is_some_and(truthy))
    }

    pub fn author_id(&self) -> Option<String> {
        self.display_user.get("userID").and_then(id_string)
    }

    /// Whether the comment may be shown to `viewer_id`.
    pub fn is_visible_to(&self, viewer_id: &str) -> bool {
        if !self.is_flagged() {
            return true;
        }
        matches!(self.author_id(), Some(author) if !author.is_empty() && author == viewer_id)
    }
}

/// Payload of NEW_GIFT and NEW_LUCKYBAG messages (`giftMsg`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftMsg {
    #[serde(rename = "displayUser", default)]
    pub display_user: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barrage: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl GiftMsg {
    pub fn gift_id(&self) -> Option<String> {
        self.rest.get("giftID").and_then(id_string)
    }

    /// Secondary reward id of a lucky bag; empty values count as absent.
    pub fn ext_id(&self) -> Option<String> {
        self.rest
            .get("extID")
            .and_then(id_string)
            .filter(|id| !id.is_empty())
    }
}

/// Payload of POKE messages (`pokeInfo`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PokeInfo {
    pub sender: Map<String, Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl PokeInfo {
    pub fn sender_id(&self) -> Option<String> {
        self.sender.get("userID").and_then(id_string)
    }
}

/// Payload of AI_COHOST_MESSAGE messages (`aiCohostMsg`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiCohostMsg {
    #[serde(rename = "commentTxt", default, skip_serializing_if = "Option::is_none")]
    pub comment_txt: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A decoded channel message, classified by its `type` code.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Comment(CommentMsg),
    JoinRoom(CommentMsg),
    NewGift(GiftMsg),
    NewLuckyBag(GiftMsg),
    Poke(PokeInfo),
    AiCohost(AiCohostMsg),
    /// Any other (or missing) type code.
    Unrecognized(Option<i64>),
}

/// A recognized message whose payload could not be read.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("message type {code} is missing its `{field}` payload")]
    MissingPayload { code: i64, field: &'static str },
    #[error("message type {code} has a malformed `{field}` payload: {source}")]
    InvalidPayload {
        code: i64,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ChannelEvent {
    /// Classify a decoded message by its `type` field.
    pub fn from_decoded(message: &Value) -> Result<Self, ClassifyError> {
        let code = message.get("type").and_then(Value::as_i64);
        let Some(message_type) = code.and_then(MessageType::from_code) else {
            return Ok(ChannelEvent::Unrecognized(code));
        };

        Ok(match message_type {
            MessageType::Comment => ChannelEvent::Comment(payload(message, message_type)?),
            MessageType::JoinRoom => ChannelEvent::JoinRoom(payload(message, message_type)?),
            MessageType::NewGift => ChannelEvent::NewGift(payload(message, message_type)?),
            MessageType::NewLuckyBag => {
                ChannelEvent::NewLuckyBag(payload(message, message_type)?)
            }
            MessageType::Poke => ChannelEvent::Poke(payload(message, message_type)?),
            MessageType::AiCohostMessage => {
                ChannelEvent::AiCohost(payload(message, message_type)?)
            }
        })
    }

    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            ChannelEvent::Comment(_) => Some(MessageType::Comment),
            ChannelEvent::JoinRoom(_) => Some(MessageType::JoinRoom),
            ChannelEvent::NewGift(_) => Some(MessageType::NewGift),
            ChannelEvent::NewLuckyBag(_) => Some(MessageType::NewLuckyBag),
            ChannelEvent::Poke(_) => Some(MessageType::Poke),
            ChannelEvent::AiCohost(_) => Some(MessageType::AiCohostMessage),
            ChannelEvent::Unrecognized(_) => None,
        }
    }
}

/// Per-session inputs to normalization.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub streamer_info: StreamerInfo,
    /// The viewer; their own flagged comments stay visible to them.
    pub current_user_id: String,
    pub ai_cohost_name: String,
}

impl NormalizeContext {
    pub fn new(streamer_info: StreamerInfo, current_user_id: impl Into<String>) -> Self {
        Self {
            streamer_info,
            current_user_id: current_user_id.into(),
            ai_cohost_name: DEFAULT_AI_COHOST_NAME.to_string(),
        }
    }
}

/// Project a classified event into a chat record.
///
/// Returns `None` only for unrecognized types and for comments hidden by
/// the visibility rule. Gift catalog misses do not suppress the record; the
/// `gift` / `luckyBag` fields are simply absent.
pub fn normalize(
    event: &ChannelEvent,
    ctx: &NormalizeContext,
    catalog: &dyn GiftLookup,
) -> Option<IndexedChatRecord> {
    let message_type = event.message_type()?;
    let mut fields = Map::new();

    match event {
        ChannelEvent::Comment(msg) | ChannelEvent::JoinRoom(msg) => {
            if !msg.is_visible_to(&ctx.current_user_id) {
                return None;
            }
            fields.extend(msg.rest.clone());
            fields.extend(msg.display_user.clone());
            put(&mut fields, "barrage", msg.barrage.clone());
            stamp(&mut fields, message_type, ctx);
        }
        ChannelEvent::NewGift(msg) | ChannelEvent::NewLuckyBag(msg) => {
            let gift = msg.gift_id().and_then(|id| catalog.lookup(&id));
            fields.extend(msg.rest.clone());
            fields.extend(msg.display_user.clone());
            put(&mut fields, "barrage", msg.barrage.clone());
            stamp(&mut fields, message_type, ctx);
            put(&mut fields, "gift", gift.and_then(|g| serde_json::to_value(g).ok()));
            if message_type == MessageType::NewLuckyBag {
                if let Some(ext_id) = msg.ext_id() {
                    let lucky_bag = catalog.lookup(&ext_id);
                    put(
                        &mut fields,
                        "luckyBag",
                        lucky_bag.and_then(|g| serde_json::to_value(g).ok()),
                    );
                }
            }
        }
        ChannelEvent::AiCohost(msg) => {
            put(&mut fields, "content", msg.comment_txt.clone().map(Value::String));
            fields.insert(
                "comment".to_string(),
                serde_json::json!({ "textColor": AI_COHOST_TEXT_COLOR }),
            );
            fields.insert(
                "displayName".to_string(),
                Value::String(ctx.ai_cohost_name.clone()),
            );
            fields.insert(
                "name".to_string(),
                serde_json::json!({ "textColor": AI_COHOST_NAME_COLOR }),
            );
            fields.insert(
                "backgroundColor".to_string(),
                Value::String(AI_COHOST_BACKGROUND_COLOR.to_string()),
            );
            stamp(&mut fields, message_type, ctx);
        }
        ChannelEvent::Poke(poke) => {
            let is_streamer = poke.sender_id().as_deref() == Some(ctx.streamer_info.user_id.as_str());
            fields.extend(poke.sender.clone());
            fields.insert("isStreamer".to_string(), Value::Bool(is_streamer));
            put(&mut fields, "pokeInfo", serde_json::to_value(poke).ok());
            stamp(&mut fields, message_type, ctx);
        }
        ChannelEvent::Unrecognized(_) => return None,
    }

    match serde_json::from_value(Value::Object(fields.clone())) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(
                error = %e,
                message_type = message_type.code(),
                "chat record fields did not fit; keeping them untyped"
            );
            let mut record = IndexedChatRecord::new(
                Uuid::new_v4().to_string(),
                message_type,
                ctx.streamer_info.clone(),
            );
            fields.retain(|k, _| !IndexedChatRecord::SLOTS.contains(&k.as_str()));
            record.extra = fields;
            Some(record)
        }
    }
}

/// Classify and normalize a decoded message, logging anything dropped.
pub fn normalize_decoded(
    message: &Value,
    ctx: &NormalizeContext,
    catalog: &dyn GiftLookup,
) -> Option<IndexedChatRecord> {
    match ChannelEvent::from_decoded(message) {
        Ok(ChannelEvent::Unrecognized(code)) => {
            tracing::debug!(?code, "ignoring unrecognized message type");
            None
        }
        Ok(event) => normalize(&event, ctx, catalog),
        Err(e) => {
            tracing::warn!(error = %e, "dropping unreadable channel message");
            None
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    message: &Value,
    message_type: MessageType,
) -> Result<T, ClassifyError> {
    let field = match message_type {
        MessageType::Comment | MessageType::JoinRoom => "commentMsg",
        MessageType::NewGift | MessageType::NewLuckyBag => "giftMsg",
        MessageType::Poke => "pokeInfo",
        MessageType::AiCohostMessage => "aiCohostMsg",
    };
    let code = message_type.code();
    match message.get(field) {
        None | Some(Value::Null) => Err(ClassifyError::MissingPayload { code, field }),
        Some(v) => T::deserialize(v).map_err(|source| ClassifyError::InvalidPayload {
            code,
            field,
            source,
        }),
    }
}

/// Generated fields shared by every record: id, messageType, streamerInfo.
fn stamp(fields: &mut Map<String, Value>, message_type: MessageType, ctx: &NormalizeContext) {
    fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    fields.insert("messageType".to_string(), Value::from(message_type.code()));
    put(
        fields,
        "streamerInfo",
        serde_json::to_value(&ctx.streamer_info).ok(),
    );
}

/// Insert `value`, or clear the key when it is absent (spread of `undefined`).
fn put(fields: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    match value {
        Some(v) => {
            fields.insert(key.to_string(), v);
        }
        None => {
            fields.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gift;
    use serde_json::json;
    use std::collections::HashMap;

    fn streamer() -> StreamerInfo {
        serde_json::from_value(json!({ "userID": "streamer-1", "picture": "s.png" })).unwrap()
    }

    fn ctx() -> NormalizeContext {
        NormalizeContext::new(streamer(), "viewer-1")
    }

    fn gift(id: &str, name: &str) -> Gift {
        serde_json::from_value(json!({ "giftID": id, "name": name, "point": 5 })).unwrap()
    }

    fn catalog() -> HashMap<String, Gift> {
        let mut map = HashMap::new();
        map.insert("g1".to_string(), gift("g1", "Rose"));
        map.insert("bag-7".to_string(), gift("bag-7", "Lucky Bag"));
        map
    }

    fn comment(kind: i64, author: &str, dirty: bool) -> Value {
        json!({
            "type": kind,
            "commentMsg": {
                "content": "hi there",
                "isDirty": dirty,
                "isDirtyWord": false,
                "isDirtyUser": false,
                "barrage": { "style": 2 },
                "displayUser": {
                    "userID": author,
                    "displayName": "Ann",
                    "level": 12,
                    "isVIP": true
                }
            }
        })
    }

    fn gift_message(kind: i64, ext_id: Option<&str>) -> Value {
        let mut msg = json!({
            "type": kind,
            "giftMsg": {
                "giftID": "g1",
                "count": 1,
                "displayUser": { "userID": "fan-9", "displayName": "Fan" },
                "barrage": null
            }
        });
        if let Some(ext) = ext_id {
            msg["giftMsg"]["extID"] = json!(ext);
        }
        msg
    }

    #[test]
    fn test_visible_comment_is_projected() {
        let record = normalize_decoded(&comment(3, "author-1", false), &ctx(), &catalog()).unwrap();
        assert_eq!(record.message_type, MessageType::Comment);
        assert_eq!(record.content.as_deref(), Some("hi there"));
        assert_eq!(record.display_name.as_deref(), Some("Ann"));
        assert_eq!(record.user_id.as_deref(), Some("author-1"));
        assert_eq!(record.level, Some(12));
        assert!(record.is_vip);
        assert_eq!(record.barrage, Some(json!({ "style": 2 })));
        assert_eq!(record.streamer_info, streamer());
        assert_eq!(record.extra.get("isDirty"), Some(&json!(false)));
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_dirty_comment_from_someone_else_is_hidden() {
        assert!(normalize_decoded(&comment(3, "author-1", true), &ctx(), &catalog()).is_none());
    }

    #[test]
    fn test_dirty_comment_is_shown_to_its_author() {
        let record = normalize_decoded(&comment(3, "viewer-1", true), &ctx(), &catalog());
        assert!(record.is_some());
    }

    #[test]
    fn test_each_moderation_flag_hides_the_comment() {
        for flag in ["isDirtyWord", "isDirtyUser"] {
            let mut msg = comment(3, "author-1", false);
            msg["commentMsg"][flag] = json!(true);
            assert!(normalize_decoded(&msg, &ctx(), &catalog()).is_none(), "{}", flag);
        }
    }

    #[test]
    fn test_empty_author_never_matches_viewer() {
        let ctx = NormalizeContext::new(streamer(), "");
        assert!(normalize_decoded(&comment(3, "", true), &ctx, &catalog()).is_none());
    }

    #[test]
    fn test_join_room_uses_comment_rules() {
        let record = normalize_decoded(&comment(18, "author-1", false), &ctx(), &catalog()).unwrap();
        assert_eq!(record.message_type, MessageType::JoinRoom);
        assert!(normalize_decoded(&comment(18, "author-1", true), &ctx(), &catalog()).is_none());
    }

    #[test]
    fn test_gift_resolves_catalog_entry() {
        let record = normalize_decoded(&gift_message(13, None), &ctx(), &catalog()).unwrap();
        assert_eq!(record.message_type, MessageType::NewGift);
        assert_eq!(record.gift, Some(gift("g1", "Rose")));
        assert_eq!(record.user_id.as_deref(), Some("fan-9"));
        assert_eq!(record.extra.get("giftID"), Some(&json!("g1")));
        assert_eq!(record.extra.get("count"), Some(&json!(1)));
        assert!(record.barrage.is_none());
        assert!(record.lucky_bag.is_none());
    }

    #[test]
    fn test_gift_catalog_miss_still_emits_record() {
        let empty: HashMap<String, Gift> = HashMap::new();
        let record = normalize_decoded(&gift_message(13, None), &ctx(), &empty).unwrap();
        assert!(record.gift.is_none());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("gift").is_none());
    }

    #[test]
    fn test_lucky_bag_with_ext_id_resolves_both() {
        let record = normalize_decoded(&gift_message(32, Some("bag-7")), &ctx(), &catalog()).unwrap();
        assert_eq!(record.message_type, MessageType::NewLuckyBag);
        assert_eq!(record.gift, Some(gift("g1", "Rose")));
        assert_eq!(record.lucky_bag, Some(gift("bag-7", "Lucky Bag")));
    }

    #[test]
    fn test_lucky_bag_without_ext_id_matches_gift_projection() {
        let as_gift = normalize_decoded(&gift_message(13, None), &ctx(), &catalog()).unwrap();
        let mut as_bag = normalize_decoded(&gift_message(32, None), &ctx(), &catalog()).unwrap();
        assert!(as_bag.lucky_bag.is_none());
        as_bag.id = as_gift.id.clone();
        as_bag.message_type = as_gift.message_type;
        assert_eq!(as_bag, as_gift);

        let empty_ext = normalize_decoded(&gift_message(32, Some("")), &ctx(), &catalog()).unwrap();
        assert!(empty_ext.lucky_bag.is_none());
    }

    #[test]
    fn test_ext_id_is_ignored_for_plain_gifts() {
        let record = normalize_decoded(&gift_message(13, Some("bag-7")), &ctx(), &catalog()).unwrap();
        assert!(record.lucky_bag.is_none());
    }

    #[test]
    fn test_ai_cohost_presentation_defaults() {
        let msg = json!({ "type": 120, "aiCohostMsg": { "commentTxt": "Welcome everyone!" } });
        let mut ctx = ctx();
        ctx.ai_cohost_name = "Co-host".to_string();
        let record = normalize_decoded(&msg, &ctx, &catalog()).unwrap();
        assert_eq!(record.message_type, MessageType::AiCohostMessage);
        assert_eq!(record.content.as_deref(), Some("Welcome everyone!"));
        assert_eq!(record.display_name.as_deref(), Some("Co-host"));
        assert_eq!(record.background_color.as_deref(), Some("#FFFFFFE6"));
        assert_eq!(
            record.comment.and_then(|c| c.text_color).as_deref(),
            Some("#333333")
        );
        assert_eq!(
            record.name.and_then(|c| c.text_color).as_deref(),
            Some("#527fff")
        );
    }

    #[test]
    fn test_poke_from_streamer() {
        let msg = json!({
            "type": 47,
            "pokeInfo": {
                "sender": { "userID": "streamer-1", "displayName": "Host" },
                "receiver": { "userID": "viewer-1" },
                "isPokeBack": true
            }
        });
        let record = normalize_decoded(&msg, &ctx(), &catalog()).unwrap();
        assert_eq!(record.message_type, MessageType::Poke);
        assert!(record.is_streamer);
        assert_eq!(record.display_name.as_deref(), Some("Host"));
        let poke = record.poke_info.unwrap();
        assert_eq!(poke["isPokeBack"], json!(true));
        assert_eq!(poke["sender"]["userID"], json!("streamer-1"));
    }

    #[test]
    fn test_poke_from_viewer_is_not_streamer() {
        let msg = json!({
            "type": 47,
            "pokeInfo": { "sender": { "userID": "fan-2", "isStreamer": true } }
        });
        let record = normalize_decoded(&msg, &ctx(), &catalog()).unwrap();
        assert!(!record.is_streamer);
    }

    #[test]
    fn test_unrecognized_type_is_dropped() {
        let msg = json!({ "type": 999, "commentMsg": { "content": "x" } });
        assert_eq!(
            ChannelEvent::from_decoded(&msg).unwrap(),
            ChannelEvent::Unrecognized(Some(999))
        );
        assert!(normalize_decoded(&msg, &ctx(), &catalog()).is_none());
        assert!(normalize_decoded(&json!({ "id": "no-type" }), &ctx(), &catalog()).is_none());
    }

    #[test]
    fn test_missing_payload_is_a_classify_error() {
        let err = ChannelEvent::from_decoded(&json!({ "type": 13 })).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingPayload { code: 13, field: "giftMsg" }));
        let err = ChannelEvent::from_decoded(&json!({ "type": 47, "pokeInfo": {} })).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidPayload { code: 47, .. }));
        assert!(normalize_decoded(&json!({ "type": 3 }), &ctx(), &catalog()).is_none());
    }

    #[test]
    fn test_null_flag_from_upstream_reads_as_false() {
        let msg = json!({
            "type": 3,
            "commentMsg": { "content": "hi", "displayUser": { "userID": "u", "isGuardian": null } }
        });
        let record = normalize_decoded(&msg, &ctx(), &catalog()).expect("comment kept");
        assert!(!record.is_guardian);
        assert_eq!(record.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_level_sent_as_string_is_parsed() {
        let mut msg = comment(3, "author-1", false);
        msg["commentMsg"]["displayUser"]["level"] = json!("12");
        let record = normalize_decoded(&msg, &ctx(), &catalog()).expect("comment kept");
        assert_eq!(record.level, Some(12));

        msg["commentMsg"]["displayUser"]["level"] = json!("gold");
        let record = normalize_decoded(&msg, &ctx(), &catalog()).expect("comment kept");
        assert_eq!(record.level, None);
    }

    #[test]
    fn test_numeric_user_id_is_kept_as_string() {
        let mut msg = comment(3, "x", false);
        msg["commentMsg"]["displayUser"]["userID"] = json!(12345);
        let record = normalize_decoded(&msg, &ctx(), &catalog()).expect("comment kept");
        assert_eq!(record.user_id.as_deref(), Some("12345"));

        // The same id form also drives the visibility rule
        let ctx = NormalizeContext::new(streamer(), "12345");
        msg["commentMsg"]["isDirty"] = json!(true);
        assert!(normalize_decoded(&msg, &ctx, &catalog()).is_some());
    }

    #[test]
    fn test_odd_typed_slots_do_not_drop_the_record() {
        let msg = json!({
            "type": 13,
            "giftMsg": {
                "giftID": 7,
                "displayName": 42,
                "isVIP": 1,
                "name": "not a style object",
                "displayUser": { "userID": "fan-9", "isStreamer": "" }
            }
        });
        let record = normalize_decoded(&msg, &ctx(), &catalog()).expect("gift kept");
        assert_eq!(record.display_name.as_deref(), Some("42"));
        assert!(record.is_vip);
        assert!(!record.is_streamer);
        assert!(record.name.is_none());
        assert_eq!(record.extra.get("giftID"), Some(&json!(7)));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = normalize_decoded(&comment(3, "a", false), &ctx(), &catalog()).unwrap();
        let b = normalize_decoded(&comment(3, "a", false), &ctx(), &catalog()).unwrap();
        assert_ne!(a.id, b.id);
    }
}
