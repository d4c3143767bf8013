//! The exception chain: observers for errors raised while routing.
//!
//! Errors never leave [`Dispatcher::dispatch`](crate::Dispatcher::dispatch).
//! Each one is offered to every registered exception handler whose matcher
//! accepts it, in registration order. Matching comes in two flavours:
//!
//! - [`ErrorMatch::Exact`]: the error the failing party raised is an `E`.
//!   For handler failures that is the body's own error; for everything else
//!   it is the [`DispatchError`] itself.
//! - [`ErrorMatch::Chain`]: any error in the `source()` chain, starting at
//!   the [`DispatchError`], is an `E`.
//!
//! Exception handlers that fail or panic are logged and swallowed. When no
//! handler matches, the error is logged at `WARN` and dropped.

use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use parley_core::Update;
use tracing::{error, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{BoxError, DispatchError};
use crate::handler::{BoxFuture, Flow, IntoFlow, panic_message};

/// How an exception handler selects errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMatch {
    /// The raised error has exactly the registered type.
    Exact,
    /// The registered type appears anywhere in the source chain.
    Chain,
}

/// What an exception handler receives.
#[derive(Clone)]
pub struct ErrorContext {
    error: Arc<DispatchError>,
    update: Arc<Update>,
    dispatcher: Dispatcher,
}

impl ErrorContext {
    pub fn error(&self) -> &DispatchError {
        &self.error
    }

    /// The update whose routing failed.
    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the first error of type `E` in the source chain.
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.chain().find_map(|err| err.downcast_ref::<E>())
    }
}

type MatchFn = Arc<dyn Fn(&DispatchError) -> bool + Send + Sync>;
type ErrorBodyFn =
    Arc<dyn Fn(ErrorContext) -> BoxFuture<'static, Result<Flow, BoxError>> + Send + Sync>;

/// A registered exception handler.
pub struct ExceptionHandler {
    name: &'static str,
    matcher: MatchFn,
    body: ErrorBodyFn,
}

impl ExceptionHandler {
    /// Handles errors of type `E`, matched as `mode` says.
    pub fn new<E, F, Fut, R>(mode: ErrorMatch, body: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        let matcher: MatchFn = match mode {
            ErrorMatch::Exact => Arc::new(|err: &DispatchError| err.raised().is::<E>()),
            ErrorMatch::Chain => Arc::new(|err: &DispatchError| err.chain().any(|e| e.is::<E>())),
        };
        Self::with_matcher(std::any::type_name::<E>(), matcher, body)
    }

    /// Handles every error.
    pub fn any<F, Fut, R>(body: F) -> Self
    where
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        Self::with_matcher("any", Arc::new(|_: &DispatchError| true), body)
    }

    fn with_matcher<F, Fut, R>(name: &'static str, matcher: MatchFn, body: F) -> Self
    where
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        let body: ErrorBodyFn = Arc::new(
            move |ctx: ErrorContext| -> BoxFuture<'static, Result<Flow, BoxError>> {
                let fut = body(ctx);
                Box::pin(async move { fut.await.into_flow() })
            },
        );
        Self {
            name,
            matcher,
            body,
        }
    }

    /// Whether this handler wants `error`.
    pub fn matches(&self, error: &DispatchError) -> bool {
        (self.matcher)(error)
    }
}

/// Ordered exception handlers of one dispatcher.
#[derive(Default)]
pub(crate) struct ExceptionChain {
    handlers: RwLock<Vec<Arc<ExceptionHandler>>>,
}

impl ExceptionChain {
    pub(crate) fn push(&self, handler: ExceptionHandler) {
        self.handlers.write().push(Arc::new(handler));
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Offers `error` to every matching handler. Returns how many ran.
    pub(crate) async fn report(
        &self,
        error: DispatchError,
        update: Arc<Update>,
        dispatcher: Dispatcher,
    ) -> usize {
        let matching: Vec<_> = self
            .handlers
            .read()
            .iter()
            .filter(|h| h.matches(&error))
            .cloned()
            .collect();

        if matching.is_empty() {
            warn!(
                update_id = update.update_id,
                error = %error,
                "Unhandled dispatch error"
            );
            return 0;
        }

        let ctx = ErrorContext {
            error: Arc::new(error),
            update,
            dispatcher,
        };
        for handler in &matching {
            let body = Arc::clone(&handler.body);
            let ctx = ctx.clone();
            match AssertUnwindSafe(async move { body(ctx).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!(handler = handler.name, error = %err, "Exception handler failed");
                }
                Err(panic) => {
                    error!(
                        handler = handler.name,
                        panic = %panic_message(panic.as_ref()),
                        "Exception handler panicked"
                    );
                }
            }
        }
        matching.len()
    }
}
