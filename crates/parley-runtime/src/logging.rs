//! Logging setup on top of `tracing-subscriber`.
//!
//! Dispatch passes run inside `dispatch` spans carrying `update_id` and
//! `kind`; enabling [`SpanEvents`] makes their lifecycle visible.
//!
//! ```rust,ignore
//! use parley_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("parley_framework=debug")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Creation and close only: one line when a pass starts, one when it ends.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> fmt::format::FmtSpan {
        let mut span = fmt::format::FmtSpan::NONE;
        if self.new {
            span |= fmt::format::FmtSpan::NEW;
        }
        if self.enter {
            span |= fmt::format::FmtSpan::ENTER;
        }
        if self.exit {
            span |= fmt::format::FmtSpan::EXIT;
        }
        if self.close {
            span |= fmt::format::FmtSpan::CLOSE;
        }
        span
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// Initializes logging from configuration. Does nothing if a global
/// subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// A builder for the global subscriber.
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: tracing::Level,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
    file_path: Option<PathBuf>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
            level: tracing::Level::INFO,
            span_events: SpanEvents::NONE,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            file_path: None,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new()
            .with_level(config.level.to_tracing_level())
            .format(config.format)
            .output(config.output)
            .span_events(SpanEvents::from(&config.span_events))
            .with_thread_ids(config.thread_ids)
            .with_file(config.file_location)
            .with_line_number(config.file_location);
        builder.file_path.clone_from(&config.file_path);

        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));
        for (module, level) in filters {
            builder = builder.directive(&format!("{module}={level}"));
        }
        builder
    }

    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Adds a filter directive such as `parley_framework=trace`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    pub fn with_line_number(mut self, enabled: bool) -> Self {
        self.with_line_number = enabled;
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// `RUST_LOG` wins over the configured level; directives are added on top.
    fn build_filter(&self) -> EnvFilter {
        let base = self.level.to_string().to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base));

        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(err) => eprintln!("Ignoring invalid log directive {directive:?}: {err}"),
            }
        }
        filter
    }

    pub fn init(self) {
        let _ = self.try_init();
    }

    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        let span_events = self.span_events.to_fmt_span();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_span_events(span_events)
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
            };
        }

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_span_events(span_events)
                            .with_writer($writer);
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Compact => {
                        let layer = configure_layer!(fmt::layer().compact().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Full => {
                        let layer = configure_layer!(fmt::layer().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Pretty => {
                        let layer = configure_layer!(fmt::layer().pretty().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                }
            };
        }

        match self.output {
            LogOutput::Stdout => init_with_writer!(std::io::stdout),
            LogOutput::Stderr => init_with_writer!(std::io::stderr),
            LogOutput::File => match &self.file_path {
                Some(path) => {
                    let appender = tracing_appender::rolling::never(
                        path.parent().unwrap_or_else(|| Path::new(".")),
                        path.file_name().unwrap_or_else(|| OsStr::new("parley.log")),
                    );
                    init_with_writer!(appender)
                }
                None => {
                    let result = init_with_writer!(std::io::stdout);
                    warn!("File output requested without a file path, logging to stdout");
                    result
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_from_config() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            file_location: true,
            ..Default::default()
        };
        config
            .filters
            .insert("parley_framework".into(), LogLevel::Trace);
        config.filters.insert("hyper".into(), LogLevel::Warn);
        config.span_events.close = true;

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, tracing::Level::DEBUG);
        assert_eq!(builder.directives, ["hyper=warn", "parley_framework=trace"]);
        assert!(builder.with_file && builder.with_line_number);
        assert_eq!(
            builder.span_events,
            SpanEvents {
                close: true,
                ..SpanEvents::NONE
            }
        );
    }

    #[test]
    fn test_span_event_flags() {
        assert_eq!(SpanEvents::NONE.to_fmt_span(), fmt::format::FmtSpan::NONE);
        assert_eq!(
            SpanEvents::LIFECYCLE.to_fmt_span(),
            fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
        );
        assert_eq!(SpanEvents::FULL.to_fmt_span(), fmt::format::FmtSpan::FULL);
    }
}
