//! Platform value objects carried inside updates.
//!
//! Only the fields the dispatch engine and its built-in filters and key
//! resolvers read are modelled. Unknown JSON fields are ignored on decode.

use serde::{Deserialize, Serialize};

/// A user or bot account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier of the account.
    pub id: i64,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name of the user.
    pub first_name: String,
    /// Last name of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Public username, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    /// Creates a non-bot user with the given id and first name.
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            is_bot: false,
            first_name: first_name.into(),
            last_name: None,
            username: None,
        }
    }

    /// Sets the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// The kind of chat a message was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one conversation with a user.
    Private,
    /// Basic group.
    Group,
    /// Supergroup.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl ChatType {
    /// Returns the wire name of the chat type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

/// A chat: private conversation, group or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique identifier of the chat.
    pub id: i64,
    /// Type of the chat.
    #[serde(rename = "type")]
    pub kind: ChatType,
    /// Title, for groups and channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Public username of the chat, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Chat {
    /// A private chat with the user whose id equals the chat id.
    pub fn private(id: i64) -> Self {
        Self {
            id,
            kind: ChatType::Private,
            title: None,
            username: None,
        }
    }

    /// A group chat with the given title.
    pub fn group(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            kind: ChatType::Group,
            title: Some(title.into()),
            username: None,
        }
    }
}

/// A message posted in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the message, unique inside its chat.
    pub message_id: i64,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i64,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Sender. Empty for channel posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Text of a text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Caption of a media message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// The message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Creates a text message.
    pub fn from_text(
        message_id: i64,
        chat: Chat,
        from: Option<User>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            date: 0,
            chat,
            from,
            text: Some(text.into()),
            caption: None,
            reply_to_message: None,
        }
    }

    /// Returns the sender id, if the message has a sender.
    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.id)
    }

    /// Returns the text, falling back to the caption.
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Splits a `/command@bot args` text into the command name and the rest.
    ///
    /// The bot-name suffix is dropped. Returns `None` when the text does not
    /// start with `/`.
    pub fn command(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref()?.strip_prefix('/')?;
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim_start()),
            None => (text, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some((name, rest))
    }
}

/// A press on an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Unique identifier of the query.
    pub id: String,
    /// The user that pressed the button.
    pub from: User,
    /// The message carrying the button, if it is still available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Identifier of the inline message carrying the button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    /// Global identifier of the chat the button was pressed in.
    #[serde(default)]
    pub chat_instance: String,
    /// Data attached to the button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Creates a callback query attached to `message`.
    pub fn new(
        id: impl Into<String>,
        from: User,
        message: Option<Message>,
        data: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from,
            message,
            inline_message_id: None,
            chat_instance: String::new(),
            data,
        }
    }
}
