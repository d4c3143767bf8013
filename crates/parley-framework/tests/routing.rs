use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use parley_framework::prelude::*;
use parley_framework::{
    DispatchReport, KeyError, MessageChatId, ParallelProcessor, RegistrationError, Route,
};
use tokio_test::{assert_err, assert_ok};

fn text_from(update_id: i64, user: i64, text: &str) -> Update {
    Update::message(
        update_id,
        Message::from_text(update_id, Chat::private(user), Some(User::new(user, "u")), text),
    )
}

#[tokio::test]
async fn greet_continues_once_for_the_same_sender() {
    let dispatcher = Dispatcher::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let metadata_seen = Arc::new(Mutex::new(Vec::new()));

    let counter = calls.clone();
    let seen = metadata_seen.clone();
    dispatcher
        .add_handler(Handler::message("greet", move |ctx| {
            let counter = counter.clone();
            let seen = seen.clone();
            async move {
                seen.lock().push(ctx.metadata().clone());
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return ctx.continue_with(
                        ContinueWith::message("greet").key(MessageSenderId(42)),
                    );
                }
                Ok(Flow::Stop)
            }
        }))
        .unwrap();

    let first = dispatcher.dispatch(text_from(1, 42, "hi")).await;
    assert_eq!(first.route, Route::Handled { tag: "greet".into() });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(metadata_seen.lock()[0].is_empty());
    assert_eq!(dispatcher.pending_continuations(), 1);

    let second = dispatcher.dispatch(text_from(2, 42, "again")).await;
    assert!(matches!(second.route, Route::Continuation { ref tag, .. } if tag == "greet"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(dispatcher.pending_continuations(), 0);

    let third = dispatcher.dispatch(text_from(3, 42, "and again")).await;
    assert_eq!(third.route, Route::Handled { tag: "greet".into() });
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn continuation_ignores_other_senders() {
    let dispatcher = Dispatcher::new();
    let answers = Arc::new(Mutex::new(Vec::new()));

    dispatcher
        .add_handler(
            Handler::message("ask", |ctx| async move {
                let user = ctx.sender_id().unwrap_or_default();
                ctx.continue_with(
                    ContinueWith::message("answer")
                        .keys(KeyBuilder::for_message().from_user(user).in_chat(ctx.chat.id))
                        .arg(user),
                )
            })
            .filter(message::command("ask")),
        )
        .unwrap();

    let sink = answers.clone();
    dispatcher
        .add_handler(
            Handler::message("answer", move |ctx| {
                let sink = sink.clone();
                async move {
                    let asker: i64 = ctx.arg(0).unwrap_or_default();
                    sink.lock().push((asker, ctx.text.clone().unwrap_or_default()));
                }
            })
            .continue_after(["ask"]),
        )
        .unwrap();

    dispatcher.dispatch(text_from(1, 10, "/ask")).await;
    let other = dispatcher.dispatch(text_from(2, 20, "not me")).await;
    dispatcher.dispatch(text_from(3, 10, "blue")).await;

    assert_eq!(other.route, Route::Exhausted);
    assert_eq!(*answers.lock(), [(10, "blue".to_string())]);
}

#[tokio::test]
async fn failed_registration_leaves_registry_unchanged() {
    let dispatcher = Dispatcher::new();
    assert_ok!(dispatcher.add_handler(Handler::message("dup", |_ctx| async {}).priority(1)));

    let err = assert_err!(
        dispatcher.add_handler(Handler::message("dup", |_ctx| async { Flow::Resume }))
    );
    assert!(matches!(err, RegistrationError::DuplicateTag { .. }));
    assert_eq!(dispatcher.handler_count(), 1);

    let report = dispatcher.dispatch(text_from(1, 1, "x")).await;
    assert_eq!(report.route, Route::Handled { tag: "dup".into() });
}

async fn explode(message: &'static str) {
    panic!("{message}");
}

#[tokio::test]
async fn panicking_body_is_contained() {
    let dispatcher = Dispatcher::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let reported = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    dispatcher
        .add_handler(Handler::message("boom", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            explode("handler exploded")
        }))
        .unwrap();

    let counter = reported.clone();
    dispatcher.on_any_error(move |ctx| {
        let counter = counter.clone();
        async move {
            if matches!(ctx.error(), DispatchError::Panicked { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    dispatcher.feed_update(text_from(1, 1, "x")).await;
    dispatcher.feed_update(text_from(2, 1, "y")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(reported.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_updates_claim_a_batch_once() {
    let processor = ParallelProcessor::new();
    let dispatcher = Dispatcher::builder().processor(processor).build();
    let continued = Arc::new(AtomicUsize::new(0));
    let fallback = Arc::new(AtomicUsize::new(0));

    let counter = continued.clone();
    dispatcher
        .add_handler(
            Handler::message("target", move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
            .continue_after(["origin"]),
        )
        .unwrap();
    let counter = fallback.clone();
    dispatcher
        .add_handler(Handler::message("fallback", move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();

    for round in 0..20 {
        dispatcher
            .register_continuations(
                "origin",
                vec![ContinueWith::message("target").key(MessageSenderId(7))],
            )
            .unwrap();
        for offset in 0..2 {
            dispatcher
                .feed_update(text_from(round * 2 + offset, 7, "race"))
                .await;
        }
        dispatcher.drain().await;
    }

    assert_eq!(continued.load(Ordering::SeqCst), 20);
    assert_eq!(fallback.load(Ordering::SeqCst), 20);
    assert_eq!(dispatcher.pending_continuations(), 0);
}

#[tokio::test]
async fn reports_list_invoked_handlers_in_order() {
    let dispatcher = Dispatcher::new();
    for (tag, priority) in [("third", 1), ("first", 3), ("second", 2)] {
        dispatcher
            .add_handler(Handler::message(tag, |_ctx| async { Flow::Resume }).priority(priority))
            .unwrap();
    }

    let report: DispatchReport = dispatcher.dispatch(text_from(1, 1, "x")).await;
    assert_eq!(report.invoked, ["first", "second", "third"]);
    assert_eq!(report.route, Route::Exhausted);
}

#[tokio::test]
async fn unresolvable_key_skips_only_its_own_batch() {
    let dispatcher = Dispatcher::new();
    let hits = Arc::new(Mutex::new(Vec::new()));

    for tag in ["by_sender", "by_chat"] {
        let hits = hits.clone();
        dispatcher
            .add_handler(
                Handler::message(tag, move |ctx| {
                    let hits = hits.clone();
                    async move {
                        hits.lock().push(ctx.tag().to_string());
                    }
                })
                .continue_after(["ask"]),
            )
            .unwrap();
    }
    dispatcher
        .register_continuations(
            "ask",
            vec![ContinueWith::message("by_sender").key(MessageSenderId(42))],
        )
        .unwrap();
    dispatcher
        .register_continuations(
            "ask",
            vec![ContinueWith::message("by_chat").key(MessageChatId(-100))],
        )
        .unwrap();

    let key_errors = Arc::new(AtomicUsize::new(0));
    let counter = key_errors.clone();
    dispatcher.on_error_exact::<KeyError, _, _, _>(move |ctx| {
        let counter = counter.clone();
        async move {
            assert_eq!(ctx.find::<KeyError>(), Some(&KeyError::Missing { what: "sender" }));
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let anonymous = Update::message(
        1,
        Message::from_text(1, Chat::group(-100, "admins"), None, "posted anonymously"),
    );
    let report = dispatcher.dispatch(anonymous).await;

    assert!(matches!(report.route, Route::Continuation { ref tag, .. } if tag == "by_chat"));
    assert_eq!(*hits.lock(), ["by_chat"]);
    assert_eq!(key_errors.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.pending_continuations(), 1);
}
