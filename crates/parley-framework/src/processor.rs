//! Concurrency strategies for a stream of updates.
//!
//! [`Dispatcher::feed_update`](crate::Dispatcher::feed_update) hands every
//! update to the dispatcher's [`Processor`]:
//!
//! - [`SequentialProcessor`] routes the update inline. Updates are processed
//!   strictly one at a time, in arrival order. Use it with long-poll sources
//!   whose cursor must only advance after an update has been handled.
//! - [`ParallelProcessor`] spawns each routing pass as its own task and
//!   returns at once. There is no ordering between updates and no bound on
//!   the number of passes in flight. Spawned tasks are tracked so that
//!   [`Processor::drain`] can wait for them at shutdown.

use async_trait::async_trait;
use parley_core::Update;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, trace, trace_span};

use crate::dispatcher::Dispatcher;

/// A strategy for running routing passes.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processes one update. What "processed" means on return depends on the
    /// strategy.
    async fn process(&self, dispatcher: Dispatcher, update: Update);

    /// Waits until every update accepted so far has been routed.
    async fn drain(&self) {}

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Routes each update to completion before returning.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialProcessor;

#[async_trait]
impl Processor for SequentialProcessor {
    async fn process(&self, dispatcher: Dispatcher, update: Update) {
        let report = dispatcher.dispatch(update).await;
        trace!(update_id = report.update_id, route = ?report.route, "Update processed");
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Spawns each routing pass on the current tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct ParallelProcessor {
    tracker: TaskTracker,
}

impl ParallelProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of routing passes still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait]
impl Processor for ParallelProcessor {
    async fn process(&self, dispatcher: Dispatcher, update: Update) {
        let span = trace_span!("parallel", update_id = update.update_id);
        self.tracker.spawn(
            async move {
                dispatcher.dispatch(update).await;
            }
            .instrument(span),
        );
    }

    async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}
