//! The value a handler body receives.

use std::ops::Deref;
use std::sync::Arc;

use parley_core::{FromUpdate, PayloadError, Update, UpdateKind};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::continuation::ContinueWith;
use crate::dispatcher::Dispatcher;
use crate::error::RegistrationError;
use crate::filter::Metadata;
use crate::handler::{Flow, Invocation};

/// Per-invocation context for a handler reading payloads of type `P`.
///
/// Derefs to the payload, so `ctx.text` reads the message text directly.
///
/// Keyword values are the ones forwarded by the continuation that led here,
/// overlaid with the metadata captured by the handler's filter. On a key
/// collision the filter metadata wins.
pub struct Context<P> {
    payload: P,
    update: Arc<Update>,
    kind: UpdateKind,
    tag: String,
    metadata: Metadata,
    args: Vec<Value>,
    kwargs: Metadata,
    dispatcher: Dispatcher,
}

impl<P: FromUpdate> Context<P> {
    pub(crate) fn from_invocation(
        kind: UpdateKind,
        tag: &str,
        invocation: Invocation,
    ) -> Result<Self, PayloadError> {
        let Invocation {
            update,
            metadata,
            args,
            mut kwargs,
            dispatcher,
        } = invocation;

        let payload = P::try_from_update(&update)?.clone();
        kwargs.merge(metadata.clone());

        Ok(Self {
            payload,
            update,
            kind,
            tag: tag.to_string(),
            metadata,
            args,
            kwargs,
            dispatcher,
        })
    }

    /// The payload this handler asked for.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// The whole update.
    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn update_id(&self) -> i64 {
        self.update.update_id
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    /// Tag of the running handler.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Metadata captured by the handler's filter.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Positional values forwarded by a continuation.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Forwarded keyword values merged with filter metadata.
    pub fn kwargs(&self) -> &Metadata {
        &self.kwargs
    }

    /// Deserializes the positional value at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.args
            .get(index)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserializes the keyword value `name`.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.kwargs.get_as(name)
    }

    /// Reads a value from the dispatcher's shared data.
    pub fn shared<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.dispatcher.shared().get(key)
    }

    /// Writes a value into the dispatcher's shared data.
    pub fn set_shared<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.dispatcher.shared().insert(key, value);
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Finishes the update. Same as returning [`Flow::Stop`].
    pub fn stop(&self) -> Flow {
        Flow::Stop
    }

    /// Hands the update to the next eligible handler. Same as returning
    /// [`Flow::Resume`].
    pub fn resume(&self) -> Flow {
        Flow::Resume
    }

    /// Asks for the next update matching `request` to be routed to its
    /// target handler, then stops propagation.
    ///
    /// The continuation is recorded with this handler's tag as its origin.
    pub fn continue_with(&self, request: ContinueWith) -> Result<Flow, RegistrationError> {
        self.continue_with_many([request])
    }

    /// Registers several alternative continuations as one batch. Whichever
    /// matches first consumes the whole batch.
    pub fn continue_with_many(
        &self,
        requests: impl IntoIterator<Item = ContinueWith>,
    ) -> Result<Flow, RegistrationError> {
        self.dispatcher
            .register_continuations(&self.tag, requests.into_iter().collect())?;
        Ok(Flow::Stop)
    }
}

impl<P> Deref for Context<P> {
    type Target = P;

    fn deref(&self) -> &Self::Target {
        &self.payload
    }
}
