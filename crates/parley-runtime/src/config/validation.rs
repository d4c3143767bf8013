//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, MAX_TIMEOUT_SECS, ParleyConfig, PollingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_polling_config(&config.polling)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.output is \"file\" but logging.file_path is not set",
        ));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter module name: {module:?}"
        )));
    }

    Ok(())
}

fn validate_polling_config(polling: &PollingConfig) -> ConfigResult<()> {
    if !(1..=100).contains(&polling.limit) {
        return Err(ConfigError::validation(format!(
            "polling.limit must be between 1 and 100, got {}",
            polling.limit
        )));
    }

    if polling.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::validation(format!(
            "polling.timeout_secs must be at most {MAX_TIMEOUT_SECS}, got {}",
            polling.timeout_secs
        )));
    }

    if polling.retry_delay_ms == 0 {
        return Err(ConfigError::validation(
            "polling.retry_delay_ms must be greater than 0",
        ));
    }

    polling.allowed_kinds()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_limit_bounds() {
        let mut config = ParleyConfig::default();
        config.polling.limit = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.polling.limit = 101;
        assert!(validate_config(&config).is_err());

        config.polling.limit = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_timeout_upper_bound() {
        let mut config = ParleyConfig::default();
        config.polling.timeout_secs = i64::MAX as u64;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.polling.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(validate_config(&config).is_ok());

        config.polling.timeout_secs = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_requires_path() {
        let mut config = ParleyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("parley.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_unknown_allowed_update() {
        let mut config = ParleyConfig::default();
        config.polling.allowed_updates = vec!["message".into(), "inline_query".into()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnknownUpdateKind(kind)) if kind == "inline_query"
        ));
    }
}
