//! Error types for the Parley framework.
//!
//! Two families live here. [`RegistrationError`] is returned synchronously
//! while wiring handlers and continuations. [`DispatchError`] is produced
//! during routing and never escapes [`Dispatcher::dispatch`]; it is handed
//! to the exception chain instead.
//!
//! [`Dispatcher::dispatch`]: crate::Dispatcher::dispatch

use std::error::Error as StdError;

use parley_core::{PayloadError, UpdateKind};
use thiserror::Error;

/// A boxed, thread-safe error returned by handler bodies.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised while registering handlers or continuations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A handler with the same tag already exists for this update kind.
    #[error("handler tag '{tag}' is already registered for '{kind}' updates")]
    DuplicateTag {
        /// Update kind of the rejected handler.
        kind: UpdateKind,
        /// The conflicting tag.
        tag: String,
    },

    /// Handler tags must be non-empty.
    #[error("handler tag must not be empty")]
    EmptyTag,

    /// A continuation names a handler that does not exist.
    #[error("no '{kind}' handler is registered under tag '{tag}'")]
    UnknownTarget {
        /// Update kind the continuation waits for.
        kind: UpdateKind,
        /// Tag of the missing handler.
        tag: String,
    },

    /// A continuation batch was requested with no registrations.
    #[error("a continuation batch needs at least one registration")]
    EmptyBatch,
}

/// Errors raised while resolving a continuation key against an update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The update does not carry the payload the key reads.
    #[error(transparent)]
    PayloadMismatch(#[from] PayloadError),

    /// The payload lacks the field the key reads.
    #[error("payload has no {what}")]
    Missing {
        /// Name of the missing field.
        what: &'static str,
    },
}

/// Errors produced while routing a single update.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The update carries a payload kind the dispatcher does not know.
    #[error("unknown update type '{0}'")]
    UnknownUpdateType(String),

    /// A handler's payload type does not match the update it was offered.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// A continuation key failed to resolve.
    #[error("continuation key for '{target}' failed: {source}")]
    Key {
        /// Target tag of the continuation being matched.
        target: String,
        #[source]
        source: KeyError,
    },

    /// A handler body returned an error.
    #[error("handler '{tag}' for '{kind}' failed: {source}")]
    Handler {
        kind: UpdateKind,
        tag: String,
        #[source]
        source: BoxError,
    },

    /// A handler body panicked.
    #[error("handler '{tag}' for '{kind}' panicked: {message}")]
    Panicked {
        kind: UpdateKind,
        tag: String,
        message: String,
    },
}

impl DispatchError {
    /// Returns the tag of the handler that failed, if a handler was involved.
    pub fn handler_tag(&self) -> Option<&str> {
        match self {
            Self::Handler { tag, .. } | Self::Panicked { tag, .. } => Some(tag),
            Self::Key { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Returns the error the failing party actually raised.
    ///
    /// For handler failures this is the body's own error, for key and
    /// payload failures the resolver's error. Otherwise it is the dispatch
    /// error itself.
    pub fn raised(&self) -> &(dyn StdError + 'static) {
        match self {
            Self::Handler { source, .. } => source.as_ref(),
            Self::Key { source, .. } => source,
            Self::Payload(source) => source,
            other => other,
        }
    }

    /// Iterates over this error followed by its `source()` chain.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let first: &(dyn StdError + 'static) = self;
        std::iter::successors(Some(first), |&err| err.source())
    }
}
