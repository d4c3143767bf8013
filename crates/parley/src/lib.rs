//! # Parley
//!
//! A conversational update-dispatch framework for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────┐     ┌───────────┐     ┌────────────────────────┐
//! │ UpdateSource │────▶│ Runtime │────▶│ Processor │────▶│ Dispatcher             │
//! │ (long poll)  │     │ (cursor)│     │ seq / par │     │  1. continuations      │
//! └──────────────┘     └─────────┘     └───────────┘     │  2. handlers by prio   │
//!                                                         │  3. exception chain    │
//!                                                         └────────────────────────┘
//! ```
//!
//! - **Handlers**: tagged async bodies bound to one update kind, gated by a
//!   [`Filter`](framework::Filter)
//! - **Continuations**: a handler asks for the next matching update from the
//!   same user or chat to be routed to a specific handler, which is how
//!   multi-step conversations are written without a state store
//! - **Exception chain**: every routing error is offered to typed observers
//!   and never escapes the dispatcher
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let mut runtime = Runtime::from_config(&config, MyApiClient::new())?;
//!
//!     runtime.dispatcher().add_handler(
//!         Handler::message("ask", |ctx: Context<Message>| async move {
//!             let user = ctx.sender_id().unwrap_or_default();
//!             ctx.continue_with(ContinueWith::message("answer").key(MessageSenderId(user)))
//!         })
//!         .filter(message::command("ask")),
//!     )?;
//!     runtime.dispatcher().add_handler(
//!         Handler::message("answer", |ctx: Context<Message>| async move {
//!             info!(answer = ctx.text.as_deref().unwrap_or_default(), "Got an answer");
//!         })
//!         .continue_after(["ask"]),
//!     )?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `parley.toml` configuration files
//! - `yaml-config`: `parley.yaml` configuration files
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Update model
    pub use parley_core::prelude::*;

    // Routing
    pub use parley_framework::prelude::*;
    pub use parley_framework::{ErrorMatch, KeyResolver, MessageChatId};

    // Runtime
    pub use parley_runtime::config::{ConfigLoader, ParleyConfig, load_config};
    pub use parley_runtime::prelude::*;
    pub use parley_runtime::{ChannelSource, Runtime, SourceError, UpdateSource};
}
