//! The update dispatcher.
//!
//! A [`Dispatcher`] owns the handler registry, the pending continuations,
//! the exception chain and the shared data of one bot. It is cheap to clone;
//! clones share all state.
//!
//! # Routing
//!
//! Each update goes through one routing pass:
//!
//! 1. An update of unknown kind is reported to the exception chain and
//!    dropped.
//! 2. **Continuation phase.** Pending batches are scanned oldest first. The
//!    first registration whose kind and keys match, whose target handler's
//!    filter accepts the update and whose target allows continuing after the
//!    registration's origin wins. Its batch is claimed, the target runs with
//!    the forwarded arguments, and routing ends there.
//! 3. **Default phase.** Handlers for the update's kind that are not
//!    continuation-only run in priority order, highest first, ties in
//!    registration order. A handler that returns [`Flow::Stop`] ends
//!    routing; [`Flow::Resume`] passes the update on.
//! 4. Any error ends routing and goes to the exception chain.
//!
//! ```rust,ignore
//! use parley_framework::prelude::*;
//!
//! let dispatcher = Dispatcher::new();
//!
//! dispatcher.add_handler(Handler::message("ask_name", |ctx: Context<Message>| async move {
//!     let user = ctx.sender_id().unwrap_or_default();
//!     ctx.continue_with(ContinueWith::message("got_name").key(MessageSenderId(user)))
//! }).filter(message::command("start")))?;
//!
//! dispatcher.add_handler(Handler::message("got_name", |ctx: Context<Message>| async move {
//!     println!("nice to meet you, {}", ctx.text.as_deref().unwrap_or("stranger"));
//! }).continue_after(["ask_name"]))?;
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::RwLock;
use parley_core::{FromUpdate, Update, UpdateKind};
use tower::Service;
use tracing::{Instrument, debug, debug_span, trace};

use crate::continuation::{
    BatchId, ContinuationRegistry, ContinueWith, DEFAULT_MAX_PENDING, DEFAULT_TTL, Registration,
};
use crate::error::{DispatchError, RegistrationError};
use crate::exception::{ErrorContext, ErrorMatch, ExceptionChain, ExceptionHandler};
use crate::filter::Evaluation;
use crate::handler::{BoxFuture, BoxedHandler, Handler, IntoFlow, Invocation, Outcome};
use crate::processor::{Processor, SequentialProcessor};
use crate::shared::SharedData;

// ============================================================================
// DispatchReport
// ============================================================================

/// How a routing pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A continuation matched and its target ran.
    Continuation { tag: String, batch: BatchId },
    /// A default-phase handler finished the update.
    Handled { tag: String },
    /// Every eligible handler deferred or declined.
    Exhausted,
    /// No handler is registered for the update's kind.
    Unhandled,
    /// An error was reported to the exception chain.
    Failed,
}

/// Summary of one routing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub update_id: i64,
    pub route: Route,
    /// Tags of the handlers whose bodies ran, in order.
    pub invoked: Vec<String>,
}

impl DispatchReport {
    fn new(update_id: i64) -> Self {
        Self {
            update_id,
            route: Route::Unhandled,
            invoked: Vec::new(),
        }
    }

    fn finish(mut self, route: Route) -> Self {
        self.route = route;
        self
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct DispatcherInner {
    handlers: RwLock<HashMap<UpdateKind, Vec<BoxedHandler>>>,
    continuations: ContinuationRegistry,
    exceptions: ExceptionChain,
    shared: SharedData,
    processor: Arc<dyn Processor>,
}

/// The central update dispatcher.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync`. Registries sit behind locks that are never
/// held across an `.await`.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with a sequential processor and default
    /// continuation bounds.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers a handler.
    ///
    /// Fails if the tag is empty or already used for the handler's kind; the
    /// registry is left unchanged in that case.
    pub fn add_handler<P: FromUpdate>(
        &self,
        handler: Handler<P>,
    ) -> Result<(), RegistrationError> {
        if handler.tag().is_empty() {
            return Err(RegistrationError::EmptyTag);
        }
        let handler: BoxedHandler = Arc::new(handler);
        let kind = handler.kind();

        let mut handlers = self.inner.handlers.write();
        let list = handlers.entry(kind).or_default();
        if list.iter().any(|h| h.tag() == handler.tag()) {
            return Err(RegistrationError::DuplicateTag {
                kind,
                tag: handler.tag().to_string(),
            });
        }

        let pos = list
            .iter()
            .position(|h| h.priority() < handler.priority())
            .unwrap_or(list.len());
        debug!(
            kind = %kind,
            tag = handler.tag(),
            priority = handler.priority(),
            "Registered handler"
        );
        list.insert(pos, handler);
        Ok(())
    }

    /// Whether a handler tagged `tag` exists for `kind`.
    pub fn handler_tag_exists(&self, kind: UpdateKind, tag: &str) -> bool {
        self.find_handler(kind, tag).is_some()
    }

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().values().map(Vec::len).sum()
    }

    /// Handles errors whose source chain contains an `E`.
    pub fn on_error<E, F, Fut, R>(&self, body: F)
    where
        E: std::error::Error + 'static,
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        self.add_exception_handler(ExceptionHandler::new::<E, _, _, _>(ErrorMatch::Chain, body));
    }

    /// Handles errors where the raised error itself is an `E`.
    pub fn on_error_exact<E, F, Fut, R>(&self, body: F)
    where
        E: std::error::Error + 'static,
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        self.add_exception_handler(ExceptionHandler::new::<E, _, _, _>(ErrorMatch::Exact, body));
    }

    /// Handles every error.
    pub fn on_any_error<F, Fut, R>(&self, body: F)
    where
        F: Fn(ErrorContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow + 'static,
    {
        self.add_exception_handler(ExceptionHandler::any(body));
    }

    /// Appends a pre-built exception handler.
    pub fn add_exception_handler(&self, handler: ExceptionHandler) {
        self.inner.exceptions.push(handler);
    }

    pub fn exception_handler_count(&self) -> usize {
        self.inner.exceptions.len()
    }

    /// Data shared by every handler of this dispatcher.
    pub fn shared(&self) -> &SharedData {
        &self.inner.shared
    }

    // ------------------------------------------------------------------
    // Continuations
    // ------------------------------------------------------------------

    /// Registers a batch of continuations on behalf of the handler `origin`.
    ///
    /// Every target must name an existing handler of the requested kind.
    pub fn register_continuations(
        &self,
        origin: &str,
        requests: Vec<ContinueWith>,
    ) -> Result<BatchId, RegistrationError> {
        for request in &requests {
            if !self.handler_tag_exists(request.kind(), request.target()) {
                return Err(RegistrationError::UnknownTarget {
                    kind: request.kind(),
                    tag: request.target().to_string(),
                });
            }
        }
        self.inner.continuations.register_batch(origin, requests)
    }

    /// Number of pending continuation batches.
    pub fn pending_continuations(&self) -> usize {
        self.inner.continuations.len()
    }

    /// Drops every pending continuation.
    pub fn clear_continuations(&self) {
        self.inner.continuations.clear();
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Feeds one inbound update through the configured processor.
    pub async fn feed_update(&self, update: Update) {
        self.inner.processor.process(self.clone(), update).await;
    }

    /// Waits for updates still being processed in the background.
    pub async fn drain(&self) {
        self.inner.processor.drain().await;
    }

    /// Name of the configured processor.
    pub fn processor_name(&self) -> &'static str {
        self.inner.processor.name()
    }

    /// Runs one routing pass for `update`.
    ///
    /// Never fails: errors are handed to the exception chain and reflected
    /// in the returned report.
    pub async fn dispatch(&self, update: Update) -> DispatchReport {
        let span = debug_span!(
            "dispatch",
            update_id = update.update_id,
            kind = %update.kind_name()
        );
        self.route(Arc::new(update)).instrument(span).await
    }

    async fn route(&self, update: Arc<Update>) -> DispatchReport {
        let report = DispatchReport::new(update.update_id);

        let Some(kind) = update.kind() else {
            let err = DispatchError::UnknownUpdateType(update.kind_name().to_string());
            self.report_error(err, &update).await;
            return report.finish(Route::Failed);
        };

        match self.continuation_phase(&update, kind, report).await {
            Ok(report) => report,
            Err(report) => self.default_phase(&update, kind, report).await,
        }
    }

    /// Returns `Err` with the untouched report when no continuation matched.
    async fn continuation_phase(
        &self,
        update: &Arc<Update>,
        kind: UpdateKind,
        mut report: DispatchReport,
    ) -> Result<DispatchReport, DispatchReport> {
        let snapshot = self.inner.continuations.snapshot();
        let mut offset = 0;

        let (registration, handler, evaluation, batch) = loop {
            let found = ContinuationRegistry::find_match(&snapshot[offset..], update, kind, |reg| {
                self.accept_continuation(reg, update)
            });
            let found = match found {
                Ok(Some(found)) => found,
                Ok(None) => return Err(report),
                Err(skipped) => {
                    debug!(
                        batch_index = offset + skipped.index,
                        error = %skipped.error,
                        "Skipping continuation batch that failed to resolve"
                    );
                    self.report_error(skipped.error, update).await;
                    offset += skipped.index + 1;
                    continue;
                }
            };

            if self.inner.continuations.claim(found.batch) {
                let (handler, evaluation) = found.accepted;
                break (found.registration, handler, evaluation, found.batch);
            }
            trace!(batch = ?found.batch, "Continuation batch claimed elsewhere");
            offset += found.index + 1;
        };

        debug!(
            tag = registration.target(),
            origin = registration.origin(),
            batch = ?batch,
            "Continuation matched"
        );

        let invocation = Invocation {
            update: Arc::clone(update),
            metadata: evaluation.metadata,
            args: registration.args().to_vec(),
            kwargs: registration.kwargs().clone(),
            dispatcher: self.clone(),
        };
        report.invoked.push(handler.tag().to_string());

        let route = match handler.process(invocation).await {
            Outcome::Failed(err) => {
                self.report_error(err, update).await;
                Route::Failed
            }
            _ => Route::Continuation {
                tag: handler.tag().to_string(),
                batch,
            },
        };
        Ok(report.finish(route))
    }

    fn accept_continuation(
        &self,
        registration: &Registration,
        update: &Update,
    ) -> Result<Option<(BoxedHandler, Evaluation)>, DispatchError> {
        let Some(handler) = self.find_handler(registration.kind(), registration.target()) else {
            trace!(tag = registration.target(), "Continuation target missing, skipping");
            return Ok(None);
        };

        let evaluation = handler.should_process(update)?;
        if !evaluation.matched {
            trace!(tag = handler.tag(), "Continuation target filter rejected update");
            return Ok(None);
        }

        if let Some(allowed) = handler.continue_after() {
            if !allowed.iter().any(|tag| tag == registration.origin()) {
                trace!(
                    tag = handler.tag(),
                    origin = registration.origin(),
                    "Continuation target does not continue after origin"
                );
                return Ok(None);
            }
        }

        Ok(Some((handler, evaluation)))
    }

    async fn default_phase(
        &self,
        update: &Arc<Update>,
        kind: UpdateKind,
        mut report: DispatchReport,
    ) -> DispatchReport {
        let handlers = self
            .inner
            .handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!("No handlers registered for update kind");
            return report.finish(Route::Unhandled);
        }

        for handler in handlers.iter().filter(|h| h.continue_after().is_none()) {
            match self.offer(handler, update).await {
                Outcome::Skipped => {
                    trace!(tag = handler.tag(), "Handler filter rejected update");
                }
                Outcome::Deferred => {
                    report.invoked.push(handler.tag().to_string());
                    trace!(tag = handler.tag(), "Handler resumed propagation");
                }
                Outcome::Handled => {
                    report.invoked.push(handler.tag().to_string());
                    debug!(tag = handler.tag(), "Update handled");
                    let tag = handler.tag().to_string();
                    return report.finish(Route::Handled { tag });
                }
                Outcome::Failed(err) => {
                    if !matches!(err, DispatchError::Payload(_)) {
                        report.invoked.push(handler.tag().to_string());
                    }
                    self.report_error(err, update).await;
                    return report.finish(Route::Failed);
                }
            }
        }

        report.finish(Route::Exhausted)
    }

    async fn offer(&self, handler: &BoxedHandler, update: &Arc<Update>) -> Outcome {
        let evaluation = match handler.should_process(update) {
            Ok(evaluation) => evaluation,
            Err(err) => return Outcome::Failed(err),
        };
        if !evaluation.matched {
            return Outcome::Skipped;
        }

        handler
            .process(Invocation {
                update: Arc::clone(update),
                metadata: evaluation.metadata,
                args: Vec::new(),
                kwargs: Default::default(),
                dispatcher: self.clone(),
            })
            .await
    }

    async fn report_error(&self, error: DispatchError, update: &Arc<Update>) {
        self.inner
            .exceptions
            .report(error, Arc::clone(update), self.clone())
            .await;
    }

    fn find_handler(&self, kind: UpdateKind, tag: &str) -> Option<BoxedHandler> {
        self.inner
            .handlers
            .read()
            .get(&kind)?
            .iter()
            .find(|h| h.tag() == tag)
            .cloned()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.handler_count())
            .field("pending_continuations", &self.pending_continuations())
            .field("processor", &self.processor_name())
            .finish()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    processor: Arc<dyn Processor>,
    continuation_ttl: Option<Duration>,
    max_pending_continuations: Option<usize>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            processor: Arc::new(SequentialProcessor),
            continuation_ttl: Some(DEFAULT_TTL),
            max_pending_continuations: Some(DEFAULT_MAX_PENDING),
        }
    }
}

impl DispatcherBuilder {
    /// Sets the strategy used by [`Dispatcher::feed_update`].
    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    /// Sets how long a continuation batch may wait. `None` keeps batches
    /// until they match.
    pub fn continuation_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.continuation_ttl = ttl;
        self
    }

    /// Caps the number of pending batches. `None` removes the cap.
    pub fn max_pending_continuations(mut self, max: Option<usize>) -> Self {
        self.max_pending_continuations = max;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                handlers: RwLock::new(HashMap::new()),
                continuations: ContinuationRegistry::new(
                    self.continuation_ttl,
                    self.max_pending_continuations,
                ),
                exceptions: ExceptionChain::default(),
                shared: SharedData::new(),
                processor: self.processor,
            }),
        }
    }
}

// ============================================================================
// Tower Service Implementation for Dispatcher
// ============================================================================

/// Runs one routing pass per request, bypassing the processor.
///
/// This allows applying Tower middleware (timeouts, concurrency limits,
/// tracing layers) around routing.
impl Service<Update> for Dispatcher {
    type Response = DispatchReport;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, update: Update) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(update).await) })
    }
}
