//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use parley_core::UpdateKind;
use parley_framework::{Dispatcher, DispatcherBuilder, ParallelProcessor, SequentialProcessor};
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// How updates are fetched from the source.
    #[serde(default)]
    pub polling: PollingConfig,

    /// How the dispatcher processes updates and bounds continuations.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON. Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Append to `logging.file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base level. `RUST_LOG` overrides it when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line number.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, used when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Per-module levels, e.g. `parley_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

// =============================================================================
// Polling
// =============================================================================

/// Upper bound accepted for [`PollingConfig::timeout_secs`].
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Long-poll settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Server-side long-poll timeout in seconds, at most
    /// [`MAX_TIMEOUT_SECS`]. `0` asks for short polling.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum updates per fetch, 1 to 100.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Update kinds to request. Empty means every kind.
    #[serde(default)]
    pub allowed_updates: Vec<String>,

    /// Pause after a failed fetch, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            limit: default_limit(),
            allowed_updates: Vec::new(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parses `allowed_updates` into update kinds.
    pub fn allowed_kinds(&self) -> ConfigResult<Vec<UpdateKind>> {
        self.allowed_updates
            .iter()
            .map(|name| {
                name.parse()
                    .map_err(|_| ConfigError::UnknownUpdateKind(name.clone()))
            })
            .collect()
    }
}

fn default_timeout_secs() -> u64 {
    290
}

fn default_limit() -> u32 {
    100
}

fn default_retry_delay_ms() -> u64 {
    1000
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Processing strategy selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    #[default]
    Sequential,
    Parallel,
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub processor: ProcessorKind,

    /// Seconds a continuation batch may wait for a match. 0 disables expiry.
    #[serde(default = "default_continuation_ttl_secs")]
    pub continuation_ttl_secs: u64,

    /// Maximum pending continuation batches. 0 disables the cap.
    #[serde(default = "default_max_pending_continuations")]
    pub max_pending_continuations: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorKind::default(),
            continuation_ttl_secs: default_continuation_ttl_secs(),
            max_pending_continuations: default_max_pending_continuations(),
        }
    }
}

impl DispatcherConfig {
    pub fn continuation_ttl(&self) -> Option<Duration> {
        (self.continuation_ttl_secs > 0).then(|| Duration::from_secs(self.continuation_ttl_secs))
    }

    pub fn max_pending(&self) -> Option<usize> {
        (self.max_pending_continuations > 0).then_some(self.max_pending_continuations)
    }

    /// A dispatcher builder carrying these settings.
    pub fn to_builder(&self) -> DispatcherBuilder {
        let builder = Dispatcher::builder()
            .continuation_ttl(self.continuation_ttl())
            .max_pending_continuations(self.max_pending());
        match self.processor {
            ProcessorKind::Sequential => builder.processor(SequentialProcessor),
            ProcessorKind::Parallel => builder.processor(ParallelProcessor::new()),
        }
    }
}

fn default_continuation_ttl_secs() -> u64 {
    3600
}

fn default_max_pending_continuations() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables_continuation_bounds() {
        let config = DispatcherConfig {
            continuation_ttl_secs: 0,
            max_pending_continuations: 0,
            ..Default::default()
        };
        assert_eq!(config.continuation_ttl(), None);
        assert_eq!(config.max_pending(), None);

        let defaults = DispatcherConfig::default();
        assert_eq!(defaults.continuation_ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(defaults.max_pending(), Some(10_000));
    }

    #[test]
    fn test_to_builder_selects_processor() {
        let config = DispatcherConfig {
            processor: ProcessorKind::Parallel,
            ..Default::default()
        };
        assert_eq!(config.to_builder().build().processor_name(), "parallel");
        assert_eq!(
            DispatcherConfig::default().to_builder().build().processor_name(),
            "sequential"
        );
    }

    #[test]
    fn test_allowed_kinds() {
        let mut polling = PollingConfig {
            allowed_updates: vec!["message".into(), "callback_query".into()],
            ..Default::default()
        };
        assert_eq!(
            polling.allowed_kinds().unwrap(),
            [UpdateKind::Message, UpdateKind::CallbackQuery]
        );

        polling.allowed_updates.push("poll".into());
        assert!(matches!(
            polling.allowed_kinds(),
            Err(ConfigError::UnknownUpdateKind(name)) if name == "poll"
        ));
    }
}
