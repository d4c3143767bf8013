//! Filters over [`Message`] payloads.

use parley_core::{ChatType, Message};
use regex::Regex;

use super::capture_into;
use crate::filter::Filter;

/// Matches every message.
pub fn any() -> Filter<Message> {
    Filter::new(|_: &Message| true)
}

/// Matches messages that carry text.
pub fn text() -> Filter<Message> {
    Filter::new(|m: &Message| m.text.is_some())
}

/// Matches `/name` commands, with or without a `@bot` suffix.
///
/// Records the command name under `command` and the remaining text under
/// `args`.
pub fn command(name: impl Into<String>) -> Filter<Message> {
    let name = name.into();
    Filter::capture(move |m: &Message, meta| match m.command() {
        Some((cmd, args)) if cmd == name => {
            meta.insert("command", cmd);
            meta.insert("args", args);
            true
        }
        _ => false,
    })
}

/// Matches messages posted in chats of the given type.
pub fn chat_type(kind: ChatType) -> Filter<Message> {
    Filter::new(move |m: &Message| m.chat.kind == kind)
}

/// Matches messages from private chats.
pub fn private() -> Filter<Message> {
    chat_type(ChatType::Private)
}

/// Matches messages from groups and supergroups.
pub fn group() -> Filter<Message> {
    chat_type(ChatType::Group) | chat_type(ChatType::Supergroup)
}

/// Matches messages sent by the given user.
pub fn from_user(user_id: i64) -> Filter<Message> {
    Filter::new(move |m: &Message| m.sender_id() == Some(user_id))
}

/// Matches messages whose text matches `pattern`.
///
/// The pattern is searched anywhere in the text; anchor it with `^` to
/// match from the start.
pub fn regex(pattern: &str) -> Result<Filter<Message>, regex::Error> {
    Ok(matches(Regex::new(pattern)?))
}

/// Like [`regex`], with an already compiled expression.
pub fn matches(re: Regex) -> Filter<Message> {
    Filter::capture(move |m: &Message, meta| {
        m.text
            .as_deref()
            .is_some_and(|text| capture_into(&re, text, meta))
    })
}
