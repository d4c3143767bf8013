use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{Chat, Message, Update, UpdateKind, User};
use parley_framework::{Dispatcher, Handler};
use parley_runtime::config::{ParleyConfig, PollingConfig, ProcessorKind};
use parley_runtime::{ChannelSource, Runtime, SourceError, UpdateSource};

fn text(update_id: i64) -> Update {
    Update::message(
        update_id,
        Message::from_text(update_id, Chat::private(1), Some(User::new(1, "u")), "hi"),
    )
}

/// Replays a fixed script of fetch results, then reports `Closed`.
#[derive(Clone, Default)]
struct ScriptedSource {
    script: Arc<Mutex<VecDeque<Result<Vec<Update>, SourceError>>>>,
    offsets: Arc<Mutex<Vec<i64>>>,
    allowed: Arc<Mutex<Vec<Vec<UpdateKind>>>>,
}

impl ScriptedSource {
    fn new(script: impl IntoIterator<Item = Result<Vec<Update>, SourceError>>) -> Self {
        let source = Self::default();
        source.script.lock().extend(script);
        source
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch(
        &self,
        offset: i64,
        _limit: u32,
        _timeout: Duration,
        allowed: &[UpdateKind],
    ) -> Result<Vec<Update>, SourceError> {
        self.offsets.lock().push(offset);
        self.allowed.lock().push(allowed.to_vec());
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Err(SourceError::Closed))
    }
}

fn counting_dispatcher(dispatcher: &Dispatcher) -> Arc<AtomicUsize> {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    dispatcher
        .add_handler(Handler::message("count", move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();
    seen
}

#[tokio::test]
async fn cursor_moves_past_each_fed_update() {
    let source = ScriptedSource::new([Ok(vec![text(1), text(2)]), Ok(vec![]), Ok(vec![text(5)])]);
    let dispatcher = Dispatcher::new();
    let seen = counting_dispatcher(&dispatcher);

    let mut runtime = Runtime::new(dispatcher, source.clone(), PollingConfig::default()).unwrap();
    runtime.run_until(std::future::pending()).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(*source.offsets.lock(), [0, 3, 3, 6]);
    assert_eq!(runtime.offset(), 6);
}

#[tokio::test]
async fn poll_once_reports_batch_size() {
    let source = ScriptedSource::new([Ok(vec![text(7), text(8)])]);
    let dispatcher = Dispatcher::new();
    let seen = counting_dispatcher(&dispatcher);
    let mut runtime = Runtime::new(dispatcher, source, PollingConfig::default()).unwrap();

    assert_eq!(runtime.poll_once().await.unwrap(), 2);
    assert_eq!(runtime.offset(), 9);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert!(matches!(runtime.poll_once().await, Err(SourceError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_is_retried_after_delay() {
    let source = ScriptedSource::new([
        Err(SourceError::transport(std::io::Error::other("connection reset"))),
        Ok(vec![text(1)]),
    ]);
    let dispatcher = Dispatcher::new();
    let seen = counting_dispatcher(&dispatcher);
    let polling = PollingConfig {
        retry_delay_ms: 2_000,
        ..Default::default()
    };

    let started = tokio::time::Instant::now();
    let mut runtime = Runtime::new(dispatcher, source.clone(), polling).unwrap();
    runtime.run_until(std::future::pending()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(2_000));
    assert_eq!(*source.offsets.lock(), [0, 0, 2]);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_pending_long_poll() {
    let (tx, source) = ChannelSource::channel(8);
    let mut runtime = Runtime::new(Dispatcher::new(), source, PollingConfig::default()).unwrap();

    runtime
        .run_until(tokio::time::sleep(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(runtime.offset(), 0);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn parallel_updates_are_drained_before_returning() {
    let mut config = ParleyConfig::default();
    config.dispatcher.processor = ProcessorKind::Parallel;
    config.polling.allowed_updates = vec!["message".into()];

    let source = ScriptedSource::new([Ok(vec![text(1), text(2), text(3)])]);
    let mut runtime = Runtime::from_config(&config, source.clone()).unwrap();
    assert_eq!(runtime.dispatcher().processor_name(), "parallel");

    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    runtime
        .dispatcher()
        .add_handler(Handler::message("slow", move |_ctx| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();

    runtime.run_until(std::future::pending()).await.unwrap();

    assert_eq!(finished.load(Ordering::SeqCst), 3);
    assert!(
        source
            .allowed
            .lock()
            .iter()
            .all(|kinds| kinds == &[UpdateKind::Message])
    );
}

#[test]
fn unknown_allowed_update_is_rejected() {
    let polling = PollingConfig {
        allowed_updates: vec!["shipping_query".into()],
        ..Default::default()
    };
    let result = Runtime::new(Dispatcher::new(), ScriptedSource::default(), polling);
    assert!(result.is_err());
}
