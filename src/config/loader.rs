//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles directory discovery,
//! environment detection and layered merging through the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::SequencerConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of environment variables that override file configuration
pub const ENV_PREFIX: &str = "SEQUENCER";

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: SequencerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_env_source(config_dir, environment, None)
    }

    /// Load configuration with an explicit set of override variables instead of
    /// the process environment. Keys use the `SEQUENCER_<SECTION>__<KEY>` form.
    pub fn load_with_env_source(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_source: Option<config::Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if !config_directory.is_dir() {
            if explicit {
                return Err(ConfigurationError::directory_not_found(config_directory));
            }
            warn!(
                directory = %config_directory.display(),
                "Configuration directory missing, using defaults and environment overrides"
            );
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment, env_source)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = environment,
            thing_name = %config.shadow.thing_name,
            speed = config.sequencer.speed,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Environment the configuration was loaded for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory the configuration files were read from
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration for debugging output
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Environments with an override file in the configuration directory
    pub fn available_environments(config_dir: &Path) -> ConfigResult<Vec<String>> {
        let entries = std::fs::read_dir(config_dir)
            .map_err(|_| ConfigurationError::directory_not_found(config_dir))?;

        let mut environments: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_prefix("sequencer.")
                    .and_then(|rest| rest.strip_suffix(".yaml"))
                    .map(str::to_string)
            })
            .collect();
        environments.sort();
        Ok(environments)
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("SEQUENCER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("SEQUENCER_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        env_source: Option<config::Map<String, String>>,
    ) -> ConfigResult<SequencerConfig> {
        let defaults = Config::try_from(&SequencerConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_file = config_directory.join("sequencer.yaml");
        let env_file = config_directory.join(format!("sequencer.{environment}.yaml"));

        let overrides = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_source);

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file.as_path()).required(false))
            .add_source(File::from(env_file.as_path()).required(false))
            .add_source(overrides)
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        merged
            .try_deserialize::<SequencerConfig>()
            .map_err(ConfigurationError::deserialization_error)
    }

    /// Mask sensitive fields before the configuration reaches a log line
    fn sanitize_config_for_logging(config: &SequencerConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = [
            "password",
            "passwd",
            "secret",
            "key",
            "token",
            "credential",
            "credentials",
            "auth",
        ];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    // Only the trailing segment names what the value is:
                    // `auth_token` is a secret, `retired_token_capacity` a count
                    let key_lower = key.to_lowercase();
                    let noun = key_lower
                        .rsplit(['_', '-', '.'])
                        .next()
                        .unwrap_or_default();
                    let is_sensitive = sensitive_patterns.contains(&noun);

                    if is_sensitive {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
