//! The inbound update union and typed payload extraction.
//!
//! An [`Update`] is one event delivered by the platform. It carries a
//! monotonically increasing `update_id`, used by long-poll sources as a
//! cursor, and exactly one payload. On the wire an update looks like
//!
//! ```text
//! {"update_id": 10, "message": {"message_id": 1, "chat": {...}, "text": "hi"}}
//! ```
//!
//! where the name of the single payload field is the update kind.
//!
//! Handlers never match on [`UpdatePayload`] directly. They name the payload
//! type they want and the [`FromUpdate`] trait pulls it out of the union.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{DecodeError, PayloadError, UnknownUpdateKind};
use crate::types::{CallbackQuery, Message};

// ============================================================================
// UpdateKind
// ============================================================================

/// The discriminant of an [`Update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateKind {
    /// A new incoming message.
    Message,
    /// A new version of a previously seen message.
    EditedMessage,
    /// A new post in a channel.
    ChannelPost,
    /// A new version of a channel post.
    EditedChannelPost,
    /// A press on an inline keyboard button.
    CallbackQuery,
}

impl UpdateKind {
    /// Every recognised kind, in wire order.
    pub const ALL: [UpdateKind; 5] = [
        UpdateKind::Message,
        UpdateKind::EditedMessage,
        UpdateKind::ChannelPost,
        UpdateKind::EditedChannelPost,
        UpdateKind::CallbackQuery,
    ];

    /// Returns the wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::CallbackQuery => "callback_query",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = UnknownUpdateKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownUpdateKind(s.to_string()))
    }
}

impl Serialize for UpdateKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(D::Error::custom)
    }
}

// ============================================================================
// UpdatePayload / Update
// ============================================================================

/// The payload carried by an [`Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    CallbackQuery(CallbackQuery),
    /// A payload kind this crate does not model. Kept verbatim so that the
    /// dispatcher can report it instead of silently dropping it.
    Unknown { kind: String, raw: Value },
}

/// One inbound event from the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Identifier of the update, strictly increasing per bot.
    pub update_id: i64,
    /// The populated payload.
    pub payload: UpdatePayload,
}

impl Update {
    /// Creates an update from its parts.
    pub fn new(update_id: i64, payload: UpdatePayload) -> Self {
        Self { update_id, payload }
    }

    /// Creates a `message` update.
    pub fn message(update_id: i64, message: Message) -> Self {
        Self::new(update_id, UpdatePayload::Message(message))
    }

    /// Creates an `edited_message` update.
    pub fn edited_message(update_id: i64, message: Message) -> Self {
        Self::new(update_id, UpdatePayload::EditedMessage(message))
    }

    /// Creates a `channel_post` update.
    pub fn channel_post(update_id: i64, message: Message) -> Self {
        Self::new(update_id, UpdatePayload::ChannelPost(message))
    }

    /// Creates an `edited_channel_post` update.
    pub fn edited_channel_post(update_id: i64, message: Message) -> Self {
        Self::new(update_id, UpdatePayload::EditedChannelPost(message))
    }

    /// Creates a `callback_query` update.
    pub fn callback_query(update_id: i64, query: CallbackQuery) -> Self {
        Self::new(update_id, UpdatePayload::CallbackQuery(query))
    }

    /// Returns the kind of this update, or `None` for unknown payloads.
    pub fn kind(&self) -> Option<UpdateKind> {
        match &self.payload {
            UpdatePayload::Message(_) => Some(UpdateKind::Message),
            UpdatePayload::EditedMessage(_) => Some(UpdateKind::EditedMessage),
            UpdatePayload::ChannelPost(_) => Some(UpdateKind::ChannelPost),
            UpdatePayload::EditedChannelPost(_) => Some(UpdateKind::EditedChannelPost),
            UpdatePayload::CallbackQuery(_) => Some(UpdateKind::CallbackQuery),
            UpdatePayload::Unknown { .. } => None,
        }
    }

    /// Returns the wire name of the payload, including unknown ones.
    pub fn kind_name(&self) -> &str {
        match &self.payload {
            UpdatePayload::Unknown { kind, .. } => kind,
            _ => self.kind().map(UpdateKind::as_str).unwrap_or_default(),
        }
    }

    /// Extracts the payload as `P`, if this update carries one.
    pub fn payload<P: FromUpdate>(&self) -> Option<&P> {
        P::from_update(self)
    }

    /// Decodes an update from its JSON object form.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let raw: RawUpdate = serde_json::from_value(value).map_err(|source| {
            DecodeError::Payload {
                kind: "update",
                source,
            }
        })?;
        raw.into_update()
    }
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: i64,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl RawUpdate {
    fn into_update(self) -> Result<Update, DecodeError> {
        let update_id = self.update_id;
        let Some((name, raw)) = self.rest.into_iter().next() else {
            return Err(DecodeError::EmptyUpdate { update_id });
        };

        let Ok(kind) = name.parse::<UpdateKind>() else {
            return Ok(Update::new(update_id, UpdatePayload::Unknown { kind: name, raw }));
        };

        let decode_err = |source| DecodeError::Payload {
            kind: kind.as_str(),
            source,
        };
        let payload = match kind {
            UpdateKind::CallbackQuery => {
                UpdatePayload::CallbackQuery(serde_json::from_value(raw).map_err(decode_err)?)
            }
            _ => {
                let message: Message = serde_json::from_value(raw).map_err(decode_err)?;
                match kind {
                    UpdateKind::EditedMessage => UpdatePayload::EditedMessage(message),
                    UpdateKind::ChannelPost => UpdatePayload::ChannelPost(message),
                    UpdateKind::EditedChannelPost => UpdatePayload::EditedChannelPost(message),
                    _ => UpdatePayload::Message(message),
                }
            }
        };
        Ok(Update::new(update_id, payload))
    }
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawUpdate::deserialize(deserializer)?
            .into_update()
            .map_err(D::Error::custom)
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("update_id", &self.update_id)?;
        match &self.payload {
            UpdatePayload::Message(m)
            | UpdatePayload::EditedMessage(m)
            | UpdatePayload::ChannelPost(m)
            | UpdatePayload::EditedChannelPost(m) => map.serialize_entry(self.kind_name(), m)?,
            UpdatePayload::CallbackQuery(q) => map.serialize_entry(self.kind_name(), q)?,
            UpdatePayload::Unknown { kind, raw } => map.serialize_entry(kind, raw)?,
        }
        map.end()
    }
}

// ============================================================================
// FromUpdate
// ============================================================================

/// Payload types that can be pulled out of an [`Update`].
///
/// Extraction is by reference; the update keeps ownership of its payload.
pub trait FromUpdate: Clone + Send + Sync + 'static {
    /// Human-readable name of the payload type, used in error messages.
    const NAME: &'static str;

    /// Returns the payload if `update` carries this type.
    fn from_update(update: &Update) -> Option<&Self>;

    /// Like [`from_update`](Self::from_update), but reports a mismatch.
    fn try_from_update(update: &Update) -> Result<&Self, PayloadError> {
        Self::from_update(update).ok_or_else(|| PayloadError::Mismatch {
            expected: Self::NAME,
            got: update.kind_name().to_string(),
        })
    }
}

impl FromUpdate for Message {
    const NAME: &'static str = "Message";

    fn from_update(update: &Update) -> Option<&Self> {
        match &update.payload {
            UpdatePayload::Message(m)
            | UpdatePayload::EditedMessage(m)
            | UpdatePayload::ChannelPost(m)
            | UpdatePayload::EditedChannelPost(m) => Some(m),
            _ => None,
        }
    }
}

impl FromUpdate for CallbackQuery {
    const NAME: &'static str = "CallbackQuery";

    fn from_update(update: &Update) -> Option<&Self> {
        match &update.payload {
            UpdatePayload::CallbackQuery(q) => Some(q),
            _ => None,
        }
    }
}

impl FromUpdate for Update {
    const NAME: &'static str = "Update";

    fn from_update(update: &Update) -> Option<&Self> {
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chat, User};
    use serde_json::json;

    fn text_update(id: i64) -> Update {
        Update::message(
            id,
            Message::from_text(1, Chat::private(42), Some(User::new(42, "ann")), "hi"),
        )
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in UpdateKind::ALL {
            assert_eq!(kind.as_str().parse::<UpdateKind>(), Ok(kind));
        }
        assert_eq!(
            "poll".parse::<UpdateKind>(),
            Err(UnknownUpdateKind("poll".into()))
        );
    }

    #[test]
    fn test_decode_message_update() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 7,
            "edited_message": {
                "message_id": 3,
                "chat": {"id": 42, "type": "private"},
                "from": {"id": 42, "first_name": "ann"},
                "text": "fixed"
            }
        }))
        .unwrap();

        assert_eq!(update.update_id, 7);
        assert_eq!(update.kind(), Some(UpdateKind::EditedMessage));
        let msg = update.payload::<Message>().unwrap();
        assert_eq!(msg.text.as_deref(), Some("fixed"));
        assert!(update.payload::<CallbackQuery>().is_none());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let update = Update::from_value(json!({"update_id": 9, "poll": {"id": "x"}})).unwrap();
        assert_eq!(update.kind(), None);
        assert_eq!(update.kind_name(), "poll");
    }

    #[test]
    fn test_decode_empty_update() {
        let err = Update::from_value(json!({"update_id": 4})).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyUpdate { update_id: 4 }));
    }

    #[test]
    fn test_serialize_uses_wire_shape() {
        let value = serde_json::to_value(text_update(5)).unwrap();
        assert_eq!(value["update_id"], 5);
        assert_eq!(value["message"]["text"], "hi");

        let back: Update = serde_json::from_value(value).unwrap();
        assert_eq!(back, text_update(5));
    }

    #[test]
    fn test_try_from_update_reports_mismatch() {
        let err = CallbackQuery::try_from_update(&text_update(1)).unwrap_err();
        assert_eq!(
            err,
            PayloadError::Mismatch {
                expected: "CallbackQuery",
                got: "message".into(),
            }
        );
    }
}
