//! Identity keys that tie a continuation to a future update.
//!
//! A key resolves a value from a payload (the sender id, the chat id, the id
//! of the message a button sits on) and compares it with a target captured
//! when the continuation was requested:
//!
//! ```rust,ignore
//! ctx.continue_with(
//!     ContinueWith::message("ask_age").keys(KeyBuilder::for_message().from_user(user_id)),
//! )
//! ```
//!
//! Resolution extracts the payload from the update first. Asking a key to
//! look at an update of the wrong kind is an error, not a non-match, so the
//! continuation matcher compares update kinds before consulting keys.

use std::fmt;
use std::sync::Arc;

use parley_core::{CallbackQuery, FromUpdate, Message, Update};

use crate::error::KeyError;

/// A typed identity key.
pub trait Key: Send + Sync + 'static {
    /// The payload the key reads.
    type Payload: FromUpdate;

    /// The resolved value.
    type Value: PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Computes the key value for `payload`.
    fn resolve(&self, payload: &Self::Payload) -> Result<Self::Value, KeyError>;

    /// The value captured at construction.
    fn target(&self) -> &Self::Value;
}

/// Object-safe view of a [`Key`].
pub trait DynKey: Send + Sync {
    /// Whether the key of `update` equals the target.
    fn is_key(&self, update: &Update) -> Result<bool, KeyError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

impl<K: Key> DynKey for K {
    fn is_key(&self, update: &Update) -> Result<bool, KeyError> {
        let payload = K::Payload::try_from_update(update)?;
        Ok(self.resolve(payload)? == *self.target())
    }

    fn describe(&self) -> String {
        let name = std::any::type_name::<K>();
        let base = name.split('<').next().unwrap_or(name);
        let short = base.rsplit("::").next().unwrap_or(base);
        format!("{short}({:?})", self.target())
    }
}

/// A shared, type-erased key.
pub type BoxedKey = Arc<dyn DynKey>;

/// Erases a key.
pub fn boxed<K: Key>(key: K) -> BoxedKey {
    Arc::new(key)
}

// ============================================================================
// Built-in keys
// ============================================================================

/// The id of the user who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSenderId(pub i64);

impl Key for MessageSenderId {
    type Payload = Message;
    type Value = i64;

    fn resolve(&self, payload: &Message) -> Result<i64, KeyError> {
        payload.sender_id().ok_or(KeyError::Missing { what: "sender" })
    }

    fn target(&self) -> &i64 {
        &self.0
    }
}

/// The id of the chat a message was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageChatId(pub i64);

impl Key for MessageChatId {
    type Payload = Message;
    type Value = i64;

    fn resolve(&self, payload: &Message) -> Result<i64, KeyError> {
        Ok(payload.chat.id)
    }

    fn target(&self) -> &i64 {
        &self.0
    }
}

/// The id of the user who pressed a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackQuerySenderId(pub i64);

impl Key for CallbackQuerySenderId {
    type Payload = CallbackQuery;
    type Value = i64;

    fn resolve(&self, payload: &CallbackQuery) -> Result<i64, KeyError> {
        Ok(payload.from.id)
    }

    fn target(&self) -> &i64 {
        &self.0
    }
}

/// The id of the message carrying the pressed button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackQueryMessageId(pub i64);

impl Key for CallbackQueryMessageId {
    type Payload = CallbackQuery;
    type Value = i64;

    fn resolve(&self, payload: &CallbackQuery) -> Result<i64, KeyError> {
        payload
            .message
            .as_ref()
            .map(|m| m.message_id)
            .ok_or(KeyError::Missing { what: "message" })
    }

    fn target(&self) -> &i64 {
        &self.0
    }
}

// ============================================================================
// Closure keys
// ============================================================================

type ResolveFn<P, V> = Arc<dyn Fn(&P) -> Result<V, KeyError> + Send + Sync>;

/// A key built from a resolver closure.
pub struct KeyResolver<P, V> {
    resolve: ResolveFn<P, V>,
    target: V,
}

impl<P, V> KeyResolver<P, V>
where
    P: FromUpdate,
    V: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a key from an infallible resolver.
    pub fn new<F>(resolve: F, target: V) -> Self
    where
        F: Fn(&P) -> V + Send + Sync + 'static,
    {
        Self::try_new(move |payload| Ok(resolve(payload)), target)
    }

    /// Creates a key from a resolver that may fail.
    pub fn try_new<F>(resolve: F, target: V) -> Self
    where
        F: Fn(&P) -> Result<V, KeyError> + Send + Sync + 'static,
    {
        Self {
            resolve: Arc::new(resolve),
            target,
        }
    }
}

impl<P, V> Key for KeyResolver<P, V>
where
    P: FromUpdate,
    V: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    type Payload = P;
    type Value = V;

    fn resolve(&self, payload: &P) -> Result<V, KeyError> {
        (self.resolve)(payload)
    }

    fn target(&self) -> &V {
        &self.target
    }
}

// ============================================================================
// KeyBuilder
// ============================================================================

/// Entry point for building common key sets.
pub struct KeyBuilder;

impl KeyBuilder {
    /// Keys over message payloads.
    pub fn for_message() -> MessageKeys {
        MessageKeys { keys: Vec::new() }
    }

    /// Keys over callback query payloads.
    pub fn for_callback_query() -> CallbackQueryKeys {
        CallbackQueryKeys { keys: Vec::new() }
    }
}

/// A set of message keys; all of them must hold.
#[derive(Clone)]
pub struct MessageKeys {
    keys: Vec<BoxedKey>,
}

impl MessageKeys {
    /// Requires the message to come from `user_id`.
    pub fn from_user(mut self, user_id: i64) -> Self {
        self.keys.push(boxed(MessageSenderId(user_id)));
        self
    }

    /// Requires the message to be posted in `chat_id`.
    pub fn in_chat(mut self, chat_id: i64) -> Self {
        self.keys.push(boxed(MessageChatId(chat_id)));
        self
    }

    pub fn build(self) -> Vec<BoxedKey> {
        self.keys
    }
}

/// A set of callback query keys; all of them must hold.
#[derive(Clone)]
pub struct CallbackQueryKeys {
    keys: Vec<BoxedKey>,
}

impl CallbackQueryKeys {
    /// Requires the button to be pressed by `user_id`.
    pub fn from_user(mut self, user_id: i64) -> Self {
        self.keys.push(boxed(CallbackQuerySenderId(user_id)));
        self
    }

    /// Requires the button to sit on message `message_id`.
    pub fn from_message(mut self, message_id: i64) -> Self {
        self.keys.push(boxed(CallbackQueryMessageId(message_id)));
        self
    }

    pub fn build(self) -> Vec<BoxedKey> {
        self.keys
    }
}

impl IntoIterator for MessageKeys {
    type Item = BoxedKey;
    type IntoIter = std::vec::IntoIter<BoxedKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

impl IntoIterator for CallbackQueryKeys {
    type Item = BoxedKey;
    type IntoIter = std::vec::IntoIter<BoxedKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}
