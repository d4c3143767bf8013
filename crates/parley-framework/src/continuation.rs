//! One-shot continuations: "route the next matching update to this handler".
//!
//! A handler that wants to resume a conversation later requests a
//! [`ContinueWith`]: a target handler tag, the update kind to wait for, and
//! identity keys the future update must satisfy. Requests made together form
//! a batch. The first update that satisfies any registration in a batch
//! consumes the entire batch.
//!
//! # Matching
//!
//! Batches are scanned oldest first. Inside a batch, registrations are
//! ordered by priority, highest first, with ties kept in request order. A
//! registration is considered only when its update kind equals the kind of
//! the incoming update; then every one of its keys must hold.
//!
//! Scanning works on a snapshot of the registry, so concurrent dispatch
//! passes never block each other while keys and filters run. Committing to a
//! match goes through [`ContinuationRegistry::claim`], which removes the
//! batch only if it is still present. Of two passes racing for one batch,
//! exactly one wins.
//!
//! # Bounds
//!
//! Batches older than the configured time-to-live are dropped lazily, and
//! when the number of pending batches exceeds the configured cap the oldest
//! ones are evicted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use parley_core::{Update, UpdateKind};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{DispatchError, KeyError, RegistrationError};
use crate::filter::Metadata;
use crate::key::{BoxedKey, Key, boxed};

/// Default time-to-live of a pending batch.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default maximum number of pending batches.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

// ============================================================================
// ContinueWith
// ============================================================================

/// A request to route a future update to a handler.
#[derive(Clone)]
pub struct ContinueWith {
    kind: UpdateKind,
    target: String,
    keys: Vec<BoxedKey>,
    priority: i32,
    args: Vec<Value>,
    kwargs: Metadata,
}

impl ContinueWith {
    /// Waits for a `kind` update and routes it to the handler tagged `target`.
    pub fn new(kind: UpdateKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            keys: Vec::new(),
            priority: 0,
            args: Vec::new(),
            kwargs: Metadata::new(),
        }
    }

    /// Waits for a new message.
    pub fn message(target: impl Into<String>) -> Self {
        Self::new(UpdateKind::Message, target)
    }

    /// Waits for a callback query.
    pub fn callback_query(target: impl Into<String>) -> Self {
        Self::new(UpdateKind::CallbackQuery, target)
    }

    /// Adds a key the update must satisfy.
    pub fn key<K: Key>(mut self, key: K) -> Self {
        self.keys.push(boxed(key));
        self
    }

    /// Adds several keys.
    pub fn keys(mut self, keys: impl IntoIterator<Item = BoxedKey>) -> Self {
        self.keys.extend(keys);
        self
    }

    /// Orders this registration against others in the same batch.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Forwards a positional value to the target handler.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Forwards a keyword value to the target handler.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name, value);
        self
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for ContinueWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinueWith")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("keys", &self.keys.iter().map(|k| k.describe()).collect::<Vec<_>>())
            .field("priority", &self.priority)
            .finish()
    }
}

// ============================================================================
// Registration / Batch
// ============================================================================

/// Identifier of a pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(u64);

/// A pending continuation.
pub struct Registration {
    kind: UpdateKind,
    target: String,
    origin: String,
    keys: Vec<BoxedKey>,
    priority: i32,
    args: Vec<Value>,
    kwargs: Metadata,
}

impl Registration {
    fn from_request(origin: &str, request: ContinueWith) -> Self {
        Self {
            kind: request.kind,
            target: request.target,
            origin: origin.to_string(),
            keys: request.keys,
            priority: request.priority,
            args: request.args,
            kwargs: request.kwargs,
        }
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    /// Tag of the handler that will receive the update.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Tag of the handler that requested the continuation.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Metadata {
        &self.kwargs
    }

    /// Whether every key holds for `update`.
    pub fn matches(&self, update: &Update) -> Result<bool, KeyError> {
        for key in &self.keys {
            if !key.is_key(update)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A group of alternative registrations consumed together.
pub struct Batch {
    id: BatchId,
    created: Instant,
    registrations: Vec<Arc<Registration>>,
}

impl Batch {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Registrations in matching order.
    pub fn registrations(&self) -> &[Arc<Registration>] {
        &self.registrations
    }
}

/// A registration chosen by [`ContinuationRegistry::find_match`].
pub struct Match<T> {
    /// Position of the batch in the scanned snapshot.
    pub index: usize,
    pub batch: BatchId,
    pub registration: Arc<Registration>,
    /// Whatever the acceptance callback produced.
    pub accepted: T,
}

/// A batch whose registration failed to resolve during a scan.
#[derive(Debug)]
pub struct ScanError {
    /// Position of the failing batch in the scanned snapshot.
    pub index: usize,
    pub error: DispatchError,
}

// ============================================================================
// ContinuationRegistry
// ============================================================================

#[derive(Default)]
struct RegistryInner {
    batches: VecDeque<Arc<Batch>>,
    next_id: u64,
}

/// Pending continuation batches of one dispatcher.
pub struct ContinuationRegistry {
    inner: Mutex<RegistryInner>,
    ttl: Option<Duration>,
    max_pending: Option<usize>,
}

impl Default for ContinuationRegistry {
    fn default() -> Self {
        Self::new(Some(DEFAULT_TTL), Some(DEFAULT_MAX_PENDING))
    }
}

impl ContinuationRegistry {
    /// Creates a registry. `None` disables the respective bound.
    pub fn new(ttl: Option<Duration>, max_pending: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            ttl,
            max_pending,
        }
    }

    /// Stores one batch of requests made by the handler tagged `origin`.
    pub fn register_batch(
        &self,
        origin: &str,
        requests: Vec<ContinueWith>,
    ) -> Result<BatchId, RegistrationError> {
        if requests.is_empty() {
            return Err(RegistrationError::EmptyBatch);
        }

        let mut registrations: Vec<_> = requests
            .into_iter()
            .map(|request| Arc::new(Registration::from_request(origin, request)))
            .collect();
        registrations.sort_by_key(|r| std::cmp::Reverse(r.priority));

        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner);

        let id = BatchId(inner.next_id);
        inner.next_id += 1;
        debug!(
            batch = id.0,
            origin,
            registrations = registrations.len(),
            "Registered continuation batch"
        );
        inner.batches.push_back(Arc::new(Batch {
            id,
            created: Instant::now(),
            registrations,
        }));

        if let Some(max) = self.max_pending {
            while inner.batches.len() > max {
                if let Some(evicted) = inner.batches.pop_front() {
                    warn!(batch = evicted.id.0, max, "Evicted oldest continuation batch");
                }
            }
        }
        Ok(id)
    }

    /// Returns the live batches, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Batch>> {
        let mut inner = self.inner.lock();
        self.purge_expired(&mut inner);
        inner.batches.iter().cloned().collect()
    }

    /// Scans `snapshot` for the first registration whose kind equals `kind`,
    /// whose keys all hold and which `accept` approves.
    ///
    /// `accept` sees each key-matching registration in order and returns
    /// `Some` to commit to it. A key or `accept` failure stops the scan at
    /// that batch; callers resume after [`ScanError::index`].
    pub fn find_match<T, F>(
        snapshot: &[Arc<Batch>],
        update: &Update,
        kind: UpdateKind,
        mut accept: F,
    ) -> Result<Option<Match<T>>, ScanError>
    where
        F: FnMut(&Registration) -> Result<Option<T>, DispatchError>,
    {
        for (index, batch) in snapshot.iter().enumerate() {
            for registration in &batch.registrations {
                if registration.kind != kind {
                    continue;
                }
                let keys_hold = registration.matches(update).map_err(|source| ScanError {
                    index,
                    error: DispatchError::Key {
                        target: registration.target.clone(),
                        source,
                    },
                })?;
                if !keys_hold {
                    continue;
                }
                let accepted = accept(registration).map_err(|error| ScanError { index, error })?;
                if let Some(accepted) = accepted {
                    return Ok(Some(Match {
                        index,
                        batch: batch.id,
                        registration: Arc::clone(registration),
                        accepted,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Removes the batch `id`. Returns `false` if it is already gone.
    pub fn claim(&self, id: BatchId) -> bool {
        let mut inner = self.inner.lock();
        match inner.batches.iter().position(|b| b.id == id) {
            Some(pos) => {
                inner.batches.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of pending batches, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every pending batch.
    pub fn clear(&self) {
        self.inner.lock().batches.clear();
    }

    fn purge_expired(&self, inner: &mut RegistryInner) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let before = inner.batches.len();
        inner.batches.retain(|b| b.created.elapsed() < ttl);
        let purged = before - inner.batches.len();
        if purged > 0 {
            debug!(purged, "Dropped expired continuation batches");
        }
    }
}

impl fmt::Debug for ContinuationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationRegistry")
            .field("pending", &self.len())
            .field("ttl", &self.ttl)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}
