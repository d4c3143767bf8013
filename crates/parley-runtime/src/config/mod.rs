//! Configuration for the Parley runtime.
//!
//! Settings are layered with figment: built-in defaults, then TOML or YAML
//! files, then `PARLEY_*` environment variables. See [`ConfigLoader`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatcherConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, MAX_TIMEOUT_SECS,
    ParleyConfig, PollingConfig, ProcessorKind, SpanEventConfig,
};
pub use validation::validate_config;
