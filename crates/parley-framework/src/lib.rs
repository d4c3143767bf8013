//! # Parley Framework
//!
//! Update routing for chat bots, with conversational continuations.
//!
//! This layer provides:
//! - [`Filter`]s: composable payload predicates that can capture metadata
//! - [`Handler`]s: tagged, prioritised async bodies bound to one update kind
//! - Continuations: a handler asks for "the next update from this user" to be
//!   routed to a specific handler, without any conversation-state store
//! - An exception chain that observes every routing error
//! - [`Processor`]s deciding whether updates are routed one at a time or
//!   concurrently
//!
//! Everything hangs off a [`Dispatcher`], which can be created as many times
//! per process as needed; nothing is global.

pub mod context;
pub mod continuation;
pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod filter;
pub mod filters;
pub mod handler;
pub mod key;
pub mod processor;
pub mod shared;

pub use context::Context;
pub use continuation::{
    Batch, BatchId, ContinuationRegistry, ContinueWith, DEFAULT_MAX_PENDING, DEFAULT_TTL, Match,
    Registration, ScanError,
};
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherBuilder, Route};
pub use error::{BoxError, DispatchError, KeyError, RegistrationError};
pub use exception::{ErrorContext, ErrorMatch, ExceptionHandler};
pub use filter::{Evaluation, Filter, Metadata};
pub use handler::{
    BoxFuture, BoxedHandler, ErasedHandler, Flow, Handler, IntoFlow, Invocation, Outcome,
};
pub use key::{
    BoxedKey, CallbackQueryKeys, CallbackQueryMessageId, CallbackQuerySenderId, DynKey, Key,
    KeyBuilder, KeyResolver, MessageChatId, MessageKeys, MessageSenderId,
};
pub use processor::{ParallelProcessor, Processor, SequentialProcessor};
pub use shared::SharedData;

/// Prelude for common imports.
pub mod prelude {
    pub use super::filters::{callback_query, message};
    pub use super::{
        CallbackQuerySenderId, Context, ContinueWith, DispatchError, Dispatcher, ErrorContext,
        Filter, Flow, Handler, KeyBuilder, MessageSenderId, Metadata, ParallelProcessor,
        SequentialProcessor,
    };
    pub use parley_core::prelude::*;
}
