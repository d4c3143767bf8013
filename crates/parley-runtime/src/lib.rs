//! # Parley Runtime
//!
//! Everything around the dispatcher that a running bot needs:
//!
//! - The [`UpdateSource`] seam and the long-poll [`Runtime`] loop that owns
//!   the update cursor
//! - Layered configuration ([`ParleyConfig`], [`ConfigLoader`])
//! - Logging setup ([`LoggingBuilder`])
//!
//! ```rust,ignore
//! use parley_runtime::{Runtime, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let mut runtime = Runtime::from_config(&config, MyApiClient::new())?;
//!     runtime.dispatcher().add_handler(my_handler)?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod source;

pub use config::{ConfigError, ConfigLoader, ConfigResult, ParleyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::Runtime;
pub use source::{ChannelSource, SourceError, UpdateSource};

// Re-export tracing for use by bot crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for bot code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
