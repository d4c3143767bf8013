//! Stdin Bot Example
//!
//! Every line typed on stdin becomes a message update. Prefix a line with
//! `@<id>` to send it as another user, which shows that conversations are
//! keyed per sender:
//!
//! ```text
//! /start
//! bot> What's your name?
//! @7 hello
//! bot> hello
//! Ann
//! bot> Hi Ann! How old are you?
//! forty
//! bot> That's not a number. How old are you?
//! 40
//! bot> Nice to meet you, Ann (40).
//! /whoami
//! bot> You are Ann, 40 years old.
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package stdin-bot -- --user 42
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use parley::framework::{MessageKeys, RegistrationError};
use parley::prelude::*;
use parley::runtime::config::ProcessorKind;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "stdin-bot", about = "Chat with a Parley bot from the terminal")]
struct Args {
    /// Configuration file; `parley.toml` is searched for when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// User id for lines without an `@<id>` prefix
    #[arg(short, long, default_value_t = 42)]
    user: i64,

    /// Route updates concurrently instead of one at a time
    #[arg(long)]
    parallel: bool,
}

// ============================================================================
// Handlers
// ============================================================================

fn reply(text: impl std::fmt::Display) {
    println!("bot> {text}");
}

fn same_sender(ctx: &Context<Message>) -> MessageKeys {
    KeyBuilder::for_message()
        .from_user(ctx.sender_id().unwrap_or_default())
        .in_chat(ctx.chat.id)
}

fn ask_age(ctx: &Context<Message>, name: &str) -> Result<Flow, RegistrationError> {
    ctx.continue_with(
        ContinueWith::message("got_age")
            .keys(same_sender(ctx))
            .kwarg("name", name),
    )
}

fn register_handlers(dispatcher: &Dispatcher) -> Result<(), RegistrationError> {
    dispatcher.add_handler(
        Handler::message("log", |ctx: Context<Message>| async move {
            info!(
                user = ?ctx.sender_id(),
                text = ctx.content().unwrap_or_default(),
                "Received message"
            );
            Flow::Resume
        })
        .priority(100),
    )?;

    dispatcher.add_handler(
        Handler::message("start", |ctx: Context<Message>| async move {
            reply("What's your name?");
            ctx.continue_with(ContinueWith::message("got_name").keys(same_sender(&ctx)))
        })
        .filter(message::command("start")),
    )?;

    dispatcher.add_handler(
        Handler::message("got_name", |ctx: Context<Message>| async move {
            let name = ctx.text.clone().unwrap_or_default();
            reply(format_args!("Hi {name}! How old are you?"));
            ask_age(&ctx, &name)
        })
        .filter(message::text())
        .continue_after(["start"]),
    )?;

    dispatcher.add_handler(
        Handler::message("got_age", |ctx: Context<Message>| async move {
            let name: String = ctx.kwarg("name").unwrap_or_default();
            let Ok(age) = ctx.content().unwrap_or_default().trim().parse::<u32>() else {
                reply("That's not a number. How old are you?");
                return ask_age(&ctx, &name);
            };

            reply(format_args!("Nice to meet you, {name} ({age})."));
            let user = ctx.sender_id().unwrap_or_default();
            ctx.set_shared(format!("profile:{user}"), (name, age));
            Ok(Flow::Stop)
        })
        .filter(message::text())
        .continue_after(["got_name"])
        .continue_after_self(),
    )?;

    dispatcher.add_handler(
        Handler::message("whoami", |ctx: Context<Message>| async move {
            let user = ctx.sender_id().unwrap_or_default();
            match ctx.shared::<(String, u32)>(&format!("profile:{user}")) {
                Some(profile) => reply(format_args!(
                    "You are {}, {} years old.",
                    profile.0, profile.1
                )),
                None => reply("I don't know you yet. Say /start."),
            }
        })
        .filter(message::command("whoami")),
    )?;

    dispatcher.add_handler(
        Handler::message("echo", |ctx: Context<Message>| async move {
            reply(ctx.content().unwrap_or_default());
        })
        .filter(message::text())
        .priority(-10),
    )?;

    dispatcher.on_error::<RegistrationError, _, _, _>(|ctx| async move {
        warn!(error = %ctx.error(), "Could not schedule a follow-up");
    });
    dispatcher.on_any_error(|ctx| async move {
        error!(
            update_id = ctx.update().update_id,
            error = %ctx.error(),
            "Dispatch failed"
        );
    });

    Ok(())
}

// ============================================================================
// Stdin Source
// ============================================================================

/// Turns `@7 hello` into a message from user 7 and anything else into a
/// message from `default_user`.
fn parse_line(update_id: i64, default_user: i64, line: &str) -> Update {
    let (user, text) = line
        .strip_prefix('@')
        .and_then(|rest| rest.split_once(char::is_whitespace))
        .and_then(|(id, text)| Some((id.parse().ok()?, text.trim_start())))
        .unwrap_or((default_user, line));

    let from = User::new(user, format!("user{user}"));
    Update::message(
        update_id,
        Message::from_text(update_id, Chat::private(user), Some(from), text),
    )
}

async fn read_stdin(tx: mpsc::Sender<Update>, default_user: i64) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut update_id = 1;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(parse_line(update_id, default_user, &line)).await.is_err() {
            break;
        }
        update_id += 1;
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if args.parallel {
        config.dispatcher.processor = ProcessorKind::Parallel;
    }

    let (tx, source) = ChannelSource::channel(64);
    let mut runtime = Runtime::from_config(&config, source)?;
    register_handlers(runtime.dispatcher())?;

    let reader = tokio::spawn(read_stdin(tx, args.user));
    runtime.run().await?;

    if reader.is_finished() {
        reader.await??;
    } else {
        reader.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_with_user_prefix() {
        let update = parse_line(3, 42, "@7 hello there");
        let msg = Message::from_update(&update).unwrap();
        assert_eq!(msg.sender_id(), Some(7));
        assert_eq!(msg.text.as_deref(), Some("hello there"));

        let update = parse_line(4, 42, "@x nope");
        let msg = Message::from_update(&update).unwrap();
        assert_eq!(msg.sender_id(), Some(42));
        assert_eq!(msg.text.as_deref(), Some("@x nope"));
    }

    #[tokio::test]
    async fn test_conversation_flow() {
        let dispatcher = Dispatcher::new();
        register_handlers(&dispatcher).unwrap();

        for (id, line) in ["/start", "@7 interrupt", "Ann", "forty", "40"]
            .into_iter()
            .enumerate()
        {
            dispatcher.dispatch(parse_line(id as i64 + 1, 42, line)).await;
        }

        let profile = dispatcher.shared().get::<(String, u32)>("profile:42").unwrap();
        assert_eq!(*profile, ("Ann".to_string(), 40));
        assert_eq!(dispatcher.pending_continuations(), 0);
        assert!(dispatcher.shared().get::<(String, u32)>("profile:7").is_none());
    }
}
