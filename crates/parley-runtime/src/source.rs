//! Where updates come from.
//!
//! The runtime only needs one operation from the outside world: "give me the
//! updates after this cursor". [`UpdateSource`] is that seam. A bot API client
//! implements it with a long-poll HTTP call; [`ChannelSource`] implements it
//! over a tokio channel for tests and push-based transports.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::{Update, UpdateKind, error::DecodeError};
use parley_framework::BoxError;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

/// Errors an update source can report.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source will never yield another update. Ends the polling loop.
    #[error("Update source closed")]
    Closed,

    /// A transient failure; the fetch is retried after a delay.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The source returned an update it could not decode.
    #[error("Malformed update: {0}")]
    Decode(#[from] DecodeError),
}

impl SourceError {
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }
}

/// A long-poll style supplier of updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Returns updates with `update_id >= offset`, at most `limit` of them,
    /// waiting up to `timeout` for the first one. An empty `allowed` slice
    /// means every kind.
    ///
    /// An empty batch is not an error; it means the wait timed out.
    async fn fetch(
        &self,
        offset: i64,
        limit: u32,
        timeout: Duration,
        allowed: &[UpdateKind],
    ) -> Result<Vec<Update>, SourceError>;
}

/// An [`UpdateSource`] fed through a bounded tokio channel.
///
/// Updates below the requested offset or outside the allowed kinds are
/// dropped. Once every sender is gone and the buffer is empty, `fetch`
/// returns [`SourceError::Closed`].
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<Update>>,
}

impl ChannelSource {
    /// Creates a source and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Update>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl UpdateSource for ChannelSource {
    async fn fetch(
        &self,
        offset: i64,
        limit: u32,
        timeout: Duration,
        allowed: &[UpdateKind],
    ) -> Result<Vec<Update>, SourceError> {
        let wanted = |update: &Update| {
            update.update_id >= offset
                && (allowed.is_empty() || update.kind().is_some_and(|k| allowed.contains(&k)))
        };

        let mut rx = self.rx.lock().await;
        let mut batch = Vec::new();

        // Wait for the first wanted update, then take whatever else is buffered.
        // A deadline past the clock's range means waiting without one.
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        while batch.is_empty() {
            let received = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, rx.recv()).await,
                None => Ok(rx.recv().await),
            };
            match received {
                Err(_elapsed) => return Ok(batch),
                Ok(None) => return Err(SourceError::Closed),
                Ok(Some(update)) if wanted(&update) => batch.push(update),
                Ok(Some(_)) => {}
            }
        }
        while batch.len() < limit as usize {
            match rx.try_recv() {
                Ok(update) if wanted(&update) => batch.push(update),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{CallbackQuery, Chat, Message, User};

    fn message(id: i64) -> Update {
        Update::message(id, Message::from_text(id, Chat::private(1), None, "x"))
    }

    #[tokio::test]
    async fn test_fetch_respects_limit_and_offset() {
        let (tx, source) = ChannelSource::channel(16);
        for id in 1..=5 {
            tx.send(message(id)).await.unwrap();
        }

        let batch = source.fetch(2, 3, Duration::from_secs(1), &[]).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|u| u.update_id).collect();
        assert_eq!(ids, [2, 3, 4]);

        let batch = source.fetch(5, 100, Duration::from_secs(1), &[]).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_filters_kinds() {
        let (tx, source) = ChannelSource::channel(16);
        tx.send(message(1)).await.unwrap();
        tx.send(Update::callback_query(
            2,
            CallbackQuery::new("q", User::new(1, "u"), None, Some("data".into())),
        ))
        .await
        .unwrap();

        let batch = source
            .fetch(0, 100, Duration::from_secs(1), &[UpdateKind::CallbackQuery])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind(), Some(UpdateKind::CallbackQuery));
    }

    #[tokio::test]
    async fn test_fetch_with_unbounded_timeout() {
        let (tx, source) = ChannelSource::channel(4);
        tx.send(message(1)).await.unwrap();

        let batch = source
            .fetch(0, 100, Duration::from_secs(u64::MAX / 2), &[])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        drop(tx);
        let err = source
            .fetch(0, 100, Duration::MAX, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_times_out_empty_then_closes() {
        let (tx, source) = ChannelSource::channel(1);

        let batch = source.fetch(0, 100, Duration::from_secs(30), &[]).await.unwrap();
        assert!(batch.is_empty());

        drop(tx);
        let err = source.fetch(0, 100, Duration::from_secs(30), &[]).await.unwrap_err();
        assert!(matches!(err, SourceError::Closed));
    }
}
