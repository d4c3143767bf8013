//! Handlers: named, filtered, prioritised units of work.
//!
//! A [`Handler`] is bound to one [`UpdateKind`] and identified within it by
//! a tag. Its body is any async closure taking a [`Context`] for the payload
//! type it wants:
//!
//! ```rust,ignore
//! use parley_framework::{Handler, Flow, filters::message};
//!
//! let greet = Handler::message("greet", |ctx: Context<Message>| async move {
//!     println!("hello {}", ctx.chat.id);
//! })
//! .filter(message::private())
//! .priority(10);
//!
//! dispatcher.add_handler(greet)?;
//! ```
//!
//! # Propagation
//!
//! The body's return value decides what happens next, through [`IntoFlow`]:
//!
//! | Return | Meaning |
//! |---|---|
//! | `()` or `Flow::Stop` | handled, routing ends |
//! | `Flow::Resume` | not handled, try the next handler |
//! | `None` | same as `Flow::Resume` |
//! | `Err(e)` | failure, forwarded to the exception chain |

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parley_core::{CallbackQuery, FromUpdate, Message, Update, UpdateKind};
use serde_json::Value;

use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::{BoxError, DispatchError};
use crate::filter::{Evaluation, Filter, Metadata};

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Flow / IntoFlow
// ============================================================================

/// What a handler body asks the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The update is handled; stop routing.
    Stop,
    /// The update is not handled; continue with the next eligible handler.
    Resume,
}

/// Conversion from a handler body's return value.
pub trait IntoFlow {
    fn into_flow(self) -> Result<Flow, BoxError>;
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Result<Flow, BoxError> {
        Ok(self)
    }
}

impl IntoFlow for () {
    fn into_flow(self) -> Result<Flow, BoxError> {
        Ok(Flow::Stop)
    }
}

impl<T: IntoFlow> IntoFlow for Option<T> {
    fn into_flow(self) -> Result<Flow, BoxError> {
        match self {
            Some(inner) => inner.into_flow(),
            None => Ok(Flow::Resume),
        }
    }
}

impl<T, E> IntoFlow for Result<T, E>
where
    T: IntoFlow,
    E: Into<BoxError>,
{
    fn into_flow(self) -> Result<Flow, BoxError> {
        match self {
            Ok(inner) => inner.into_flow(),
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================================================
// Outcome / Invocation
// ============================================================================

/// The result of offering an update to one handler.
#[derive(Debug)]
pub enum Outcome {
    /// The filter matched and the body finished the update.
    Handled,
    /// The filter matched but the body deferred to later handlers.
    Deferred,
    /// The handler did not want the update.
    Skipped,
    /// The body failed or panicked.
    Failed(DispatchError),
}

/// Everything a handler needs to run its body once.
pub struct Invocation {
    pub update: Arc<Update>,
    /// Metadata captured by the handler's filter.
    pub metadata: Metadata,
    /// Positional values forwarded by a continuation.
    pub args: Vec<Value>,
    /// Named values forwarded by a continuation.
    pub kwargs: Metadata,
    pub dispatcher: Dispatcher,
}

// ============================================================================
// ErasedHandler
// ============================================================================

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    fn kind(&self) -> UpdateKind;

    fn tag(&self) -> &str;

    fn priority(&self) -> i32;

    /// Tags of the handlers this one may continue after. `Some` makes the
    /// handler reachable only through continuations.
    fn continue_after(&self) -> Option<&[String]>;

    /// Decides whether the handler wants `update`.
    ///
    /// Updates of another kind are rejected without touching the filter.
    /// A payload the handler cannot extract from an update of its own kind
    /// is an error.
    fn should_process(&self, update: &Update) -> Result<Evaluation, DispatchError>;

    /// Runs the body. Panics are caught and reported as failures.
    fn process(&self, invocation: Invocation) -> BoxFuture<'static, Outcome>;
}

// ============================================================================
// Handler
// ============================================================================

type BodyFn<P> =
    Arc<dyn Fn(Context<P>) -> BoxFuture<'static, Result<Flow, BoxError>> + Send + Sync>;

/// A handler for updates of one kind, reading payloads of type `P`.
pub struct Handler<P: FromUpdate> {
    kind: UpdateKind,
    tag: String,
    filter: Option<Filter<P>>,
    priority: i32,
    continue_after: Option<Vec<String>>,
    body: BodyFn<P>,
}

impl<P: FromUpdate> Handler<P> {
    /// Creates a handler for `kind` updates.
    pub fn new<F, Fut, R>(kind: UpdateKind, tag: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        let body: BodyFn<P> = Arc::new(
            move |ctx: Context<P>| -> BoxFuture<'static, Result<Flow, BoxError>> {
                let fut = body(ctx);
                Box::pin(async move { fut.await.into_flow() })
            },
        );
        Self {
            kind,
            tag: tag.into(),
            filter: None,
            priority: 0,
            continue_after: None,
            body,
        }
    }

    /// Restricts the handler to payloads matching `filter`.
    pub fn filter(mut self, filter: Filter<P>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the priority. Higher runs first; the default is `0`.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Makes the handler reachable only through continuations requested by
    /// the handlers tagged `tags`.
    pub fn continue_after<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.continue_after.get_or_insert_with(Vec::new);
        for tag in tags {
            let tag = tag.into();
            if !list.contains(&tag) {
                list.push(tag);
            }
        }
        self
    }

    /// Allows the handler to continue after itself.
    pub fn continue_after_self(self) -> Self {
        let tag = self.tag.clone();
        self.continue_after([tag])
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Handler<Message> {
    /// A handler for new messages.
    pub fn message<F, Fut, R>(tag: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        Self::new(UpdateKind::Message, tag, body)
    }

    /// A handler for edited messages.
    pub fn edited_message<F, Fut, R>(tag: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        Self::new(UpdateKind::EditedMessage, tag, body)
    }

    /// A handler for channel posts.
    pub fn channel_post<F, Fut, R>(tag: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        Self::new(UpdateKind::ChannelPost, tag, body)
    }
}

impl Handler<CallbackQuery> {
    /// A handler for callback queries.
    pub fn callback_query<F, Fut, R>(tag: impl Into<String>, body: F) -> Self
    where
        F: Fn(Context<CallbackQuery>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        Self::new(UpdateKind::CallbackQuery, tag, body)
    }
}

impl<P: FromUpdate> ErasedHandler for Handler<P> {
    fn kind(&self) -> UpdateKind {
        self.kind
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn continue_after(&self) -> Option<&[String]> {
        self.continue_after.as_deref()
    }

    fn should_process(&self, update: &Update) -> Result<Evaluation, DispatchError> {
        if update.kind() != Some(self.kind) {
            return Ok(Evaluation::rejected());
        }
        let payload = P::try_from_update(update)?;
        Ok(match &self.filter {
            Some(filter) => filter.evaluate(Some(payload)),
            None => Evaluation::accepted(Metadata::new()),
        })
    }

    fn process(&self, invocation: Invocation) -> BoxFuture<'static, Outcome> {
        let kind = self.kind;
        let tag = self.tag.clone();
        let body = Arc::clone(&self.body);

        Box::pin(async move {
            let ctx = match Context::<P>::from_invocation(kind, &tag, invocation) {
                Ok(ctx) => ctx,
                Err(err) => return Outcome::Failed(err.into()),
            };

            match AssertUnwindSafe(async move { body(ctx).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(Flow::Stop)) => Outcome::Handled,
                Ok(Ok(Flow::Resume)) => Outcome::Deferred,
                Ok(Err(source)) => Outcome::Failed(DispatchError::Handler { kind, tag, source }),
                Err(panic) => Outcome::Failed(DispatchError::Panicked {
                    kind,
                    tag,
                    message: panic_message(panic.as_ref()),
                }),
            }
        })
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::message;
    use parley_core::{Chat, User};
    use std::io;

    fn text_update(text: &str) -> Update {
        Update::message(
            1,
            Message::from_text(1, Chat::private(42), Some(User::new(42, "ann")), text),
        )
    }

    fn invocation(update: Update) -> Invocation {
        Invocation {
            update: Arc::new(update),
            metadata: Metadata::new(),
            args: Vec::new(),
            kwargs: Metadata::new(),
            dispatcher: Dispatcher::new(),
        }
    }

    #[test]
    fn test_into_flow_conversions() {
        assert_eq!(().into_flow().unwrap(), Flow::Stop);
        assert_eq!(None::<Flow>.into_flow().unwrap(), Flow::Resume);
        assert_eq!(Some(Flow::Resume).into_flow().unwrap(), Flow::Resume);
        assert_eq!(Ok::<_, io::Error>(()).into_flow().unwrap(), Flow::Stop);
        assert!(Err::<(), _>(io::Error::other("boom")).into_flow().is_err());
    }

    #[test]
    fn test_should_process_checks_kind_then_filter() {
        let handler = Handler::message("cmd", |_ctx| async {}).filter(message::command("start"));

        assert!(handler.should_process(&text_update("/start")).unwrap().matched);
        assert!(!handler.should_process(&text_update("hello")).unwrap().matched);

        let edited =
            Update::edited_message(2, Message::from_text(1, Chat::private(1), None, "/start"));
        assert!(!handler.should_process(&edited).unwrap().matched);
    }

    #[test]
    fn test_mismatched_payload_type_is_an_error() {
        let handler = Handler::<CallbackQuery>::new(UpdateKind::Message, "odd", |_ctx| async {});
        let err = handler.should_process(&text_update("hi")).unwrap_err();
        assert!(matches!(err, DispatchError::Payload(_)));
    }

    #[test]
    fn test_continue_after_self_adds_own_tag_once() {
        let handler = Handler::message("ask", |_ctx| async {})
            .continue_after(["start", "ask"])
            .continue_after_self();
        assert_eq!(
            ErasedHandler::continue_after(&handler),
            Some(&["start".to_string(), "ask".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_process_maps_body_results() {
        let stop = Handler::message("stop", |_ctx| async { Flow::Stop });
        let resume = Handler::message("resume", |_ctx| async { Flow::Resume });
        let fail =
            Handler::message("fail", |_ctx| async { Err::<(), _>(io::Error::other("boom")) });

        assert!(matches!(stop.process(invocation(text_update("x"))).await, Outcome::Handled));
        assert!(matches!(resume.process(invocation(text_update("x"))).await, Outcome::Deferred));
        assert!(matches!(
            fail.process(invocation(text_update("x"))).await,
            Outcome::Failed(DispatchError::Handler { .. })
        ));
    }

    async fn explode(message: &'static str) {
        panic!("{message}");
    }

    #[tokio::test]
    async fn test_process_catches_panics() {
        let handler = Handler::message("boom", |_ctx| explode("kaboom"));

        match handler.process(invocation(text_update("x"))).await {
            Outcome::Failed(DispatchError::Panicked { tag, message, .. }) => {
                assert_eq!(tag, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
