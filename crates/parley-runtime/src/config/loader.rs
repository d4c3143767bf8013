//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables `parley.toml`
//! - `yaml-config`: enables `parley.yaml` / `parley.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides passed to [`ConfigLoader::merge`]
//! 3. Profile-specific config file (`parley.{profile}.toml`)
//! 4. Main config file (`parley.toml`)
//! 5. Environment variables (`PARLEY_*`)
//!
//! # Environment Variable Mapping
//!
//! Variables use the `PARLEY_` prefix with `__` separating nested keys:
//!
//! - `PARLEY_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `PARLEY_POLLING__TIMEOUT_SECS=60` → `polling.timeout_secs = 60`
//! - `PARLEY_DISPATCHER__PROCESSOR=parallel` → `dispatcher.processor = "parallel"`
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/parley.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::ParleyConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "PARLEY_";
const PROFILE_VAR: &str = "PARLEY_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `dev` and `prod` are accepted as aliases.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `PARLEY_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for configuration files.
    ///
    /// Without any search path, the current directory and the user config
    /// directory (`~/.config/parley` on Linux) are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<ParleyConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: ParleyConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            processor = ?config.dispatcher.processor,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ParleyConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.overrides));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    /// Merges one file, choosing the format by extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("parley"));
        }
        paths
    }

    /// Searches `search_paths` for `base_names`, merging the profile variant
    /// before the base file. Stops at the first directory holding a base file.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for dir in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path = dir.join(format!("{stem}.{}.{ext}", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = dir.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_mut)
    )]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) =
                self.load_format_files(figment, &search_paths, &["parley.toml"], |fig, path| {
                    fig.merge(Toml::file(path))
                });
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["parley.yaml", "parley.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from one file plus `PARLEY_*` overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, ProcessorKind};
    use figment::Jail;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Info);
            assert_eq!(config.polling.timeout_secs, 290);
            assert_eq!(config.polling.limit, 100);
            assert_eq!(config.dispatcher.processor, ProcessorKind::Sequential);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/definitely/not/here/parley.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "parley.toml",
                r#"
                [polling]
                limit = 50
                allowed_updates = ["message"]

                [dispatcher]
                processor = "parallel"
                "#,
            )?;
            jail.set_env("PARLEY_POLLING__LIMIT", "10");
            jail.set_env("PARLEY_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.polling.limit, 10);
            assert_eq!(config.polling.allowed_updates, ["message"]);
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.dispatcher.processor, ProcessorKind::Parallel);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_is_merged() {
        Jail::expect_with(|jail| {
            jail.create_file("parley.production.toml", "[polling]\nretry_delay_ms = 5000\n")?;
            jail.create_file("parley.toml", "[polling]\ntimeout_secs = 30\n")?;
            jail.set_env(PROFILE_VAR, "prod");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.polling.retry_delay_ms, 5000);
            assert_eq!(config.polling.timeout_secs, 30);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("parley.toml", "[polling]\nlimit = 500\n")?;

            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load();
            assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
        assert_eq!(Profile::parse("staging").to_string(), "staging");
    }
}
