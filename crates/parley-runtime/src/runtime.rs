//! The polling loop.
//!
//! [`Runtime`] repeatedly asks its [`UpdateSource`] for the updates after the
//! current cursor, feeds each one to the dispatcher and moves the cursor to
//! `update_id + 1`. With the default sequential processor an update is fully
//! handled before the cursor passes it.
//!
//! ```rust,ignore
//! use parley_runtime::{Runtime, config::load_config};
//!
//! let config = load_config()?;
//! let mut runtime = Runtime::from_config(&config, MyApiClient::new(token))?;
//! runtime.dispatcher().add_handler(start_handler)?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use parley_core::{Update, UpdateKind};
use parley_framework::Dispatcher;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ParleyConfig, PollingConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::source::{SourceError, UpdateSource};

/// Drives a dispatcher from an update source.
pub struct Runtime {
    dispatcher: Dispatcher,
    source: Arc<dyn UpdateSource>,
    polling: PollingConfig,
    allowed: Vec<UpdateKind>,
    offset: i64,
}

impl Runtime {
    /// Creates a runtime around an existing dispatcher.
    ///
    /// Fails if `polling.allowed_updates` names an unknown update kind.
    pub fn new(
        dispatcher: Dispatcher,
        source: impl UpdateSource + 'static,
        polling: PollingConfig,
    ) -> RuntimeResult<Self> {
        let allowed = polling.allowed_kinds()?;
        Ok(Self {
            dispatcher,
            source: Arc::new(source),
            polling,
            allowed,
            offset: 0,
        })
    }

    /// Validates `config`, initializes logging from it and builds a
    /// dispatcher with the configured processor and continuation bounds.
    pub fn from_config(
        config: &ParleyConfig,
        source: impl UpdateSource + 'static,
    ) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        let dispatcher = config.dispatcher.to_builder().build();
        info!(
            processor = dispatcher.processor_name(),
            timeout_secs = config.polling.timeout_secs,
            limit = config.polling.limit,
            "Runtime initialized from configuration"
        );
        Self::new(dispatcher, source, config.polling.clone())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The next `update_id` to ask for.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Fetches one batch and feeds it. Returns the number of updates fed.
    pub async fn poll_once(&mut self) -> Result<usize, SourceError> {
        let updates = self.fetch().await?;
        let count = updates.len();
        self.feed(updates).await;
        Ok(count)
    }

    /// Runs until Ctrl+C or SIGTERM, or until the source closes.
    pub async fn run(&mut self) -> RuntimeResult<()> {
        let shutdown = shutdown_signal()?;
        info!("Parley runtime is now running. Press Ctrl+C to stop.");
        self.run_until(shutdown).await
    }

    /// Runs until `shutdown` resolves or the source closes.
    ///
    /// Shutdown interrupts a pending fetch but never an update being fed.
    /// Updates still running in the processor are awaited before returning.
    pub async fn run_until<F>(&mut self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let fetched = tokio::select! {
                biased;
                () = &mut shutdown => break,
                fetched = self.fetch() => fetched,
            };

            match fetched {
                Ok(updates) => self.feed(updates).await,
                Err(SourceError::Closed) => {
                    info!(offset = self.offset, "Update source closed");
                    break;
                }
                Err(err) => {
                    let delay = self.polling.retry_delay();
                    warn!(
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Fetching updates failed"
                    );
                    tokio::select! {
                        biased;
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        debug!("Draining in-flight updates");
        self.dispatcher.drain().await;
        info!("Runtime stopped");
        Ok(())
    }

    async fn fetch(&self) -> Result<Vec<Update>, SourceError> {
        self.source
            .fetch(
                self.offset,
                self.polling.limit,
                self.polling.timeout(),
                &self.allowed,
            )
            .await
    }

    async fn feed(&mut self, updates: Vec<Update>) {
        if !updates.is_empty() {
            debug!(count = updates.len(), offset = self.offset, "Fetched updates");
        }
        for update in updates {
            let next = update.update_id + 1;
            self.dispatcher.feed_update(update).await;
            self.offset = next;
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("dispatcher", &self.dispatcher)
            .field("allowed", &self.allowed)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// Registers the shutdown listeners and returns a future resolving on the
/// first signal.
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(RuntimeError::Signal)?;

    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                result = signal::ctrl_c() => match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down"),
                    Err(err) => error!(error = %err, "Ctrl+C listener failed, shutting down"),
                },
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(err) => error!(error = %err, "Ctrl+C listener failed, shutting down"),
            }
        }
    })
}
