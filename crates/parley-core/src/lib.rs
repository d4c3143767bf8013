//! # Parley Core
//!
//! Value objects shared by every Parley crate.
//!
//! This crate knows nothing about routing. It defines what an inbound event
//! looks like and how a handler gets at the part it cares about:
//!
//! - **Updates**: the [`Update`] union, its [`UpdateKind`] discriminant and
//!   the [`UpdatePayload`] variants
//! - **Platform types**: [`Message`], [`CallbackQuery`], [`User`], [`Chat`]
//! - **Extraction**: the [`FromUpdate`] trait, used by handlers and key
//!   resolvers to borrow a typed payload out of an update
//!
//! ## Example
//!
//! ```rust
//! use parley_core::{Chat, FromUpdate, Message, Update, User};
//!
//! let update = Update::message(
//!     1,
//!     Message::from_text(10, Chat::private(42), Some(User::new(42, "ann")), "hi"),
//! );
//!
//! let msg = Message::from_update(&update).unwrap();
//! assert_eq!(msg.sender_id(), Some(42));
//! ```

pub mod error;
pub mod types;
pub mod update;

pub use error::{DecodeError, PayloadError, PayloadResult, UnknownUpdateKind};
pub use types::{CallbackQuery, Chat, ChatType, Message, User};
pub use update::{FromUpdate, Update, UpdateKind, UpdatePayload};

/// Prelude for common imports.
pub mod prelude {
    pub use super::types::*;
    pub use super::update::{FromUpdate, Update, UpdateKind, UpdatePayload};
}
