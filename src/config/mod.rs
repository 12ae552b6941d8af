//! # Sequencer Configuration System
//!
//! Layered configuration: compiled-in defaults, `config/sequencer.yaml`, an
//! environment-specific `config/sequencer.<env>.yaml`, then
//! `SEQUENCER_<SECTION>__<KEY>` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sequencer_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let speed = manager.config().sequencer.speed;
//! let thing = &manager.config().shadow.thing_name;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring config/sequencer.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Part scheduling settings
    pub sequencer: SchedulingConfig,

    /// Adaptive deadline timer tuning
    pub timer: DeadlineTimerConfig,

    /// Device shadow client settings
    pub shadow: ShadowClientConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

impl SequencerConfig {
    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.sequencer.validate()?;
        self.timer.validate()?;
        self.shadow.validate()?;
        Ok(())
    }
}

/// Part scheduling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Playback speed multiplier applied to every part
    pub speed: f64,
    /// Re-evaluation interval once the sequence has ended
    pub idle_poll_seconds: u64,
    /// Lead margin added in front of every preload window
    pub preload_margin_ms: u64,
    /// Preload lead used when no per-part metadata is supplied
    pub default_preload_seconds: Option<f64>,
    /// Report the active part type back to the device shadow
    pub report_sequence_part: bool,
    /// Emit the debug summary on every evaluation
    pub debug: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            speed: constants::timeline::DEFAULT_SPEED,
            idle_poll_seconds: constants::timing::IDLE_POLL_SECONDS,
            preload_margin_ms: constants::timing::PRELOAD_MARGIN_MS,
            default_preload_seconds: Some(constants::timing::DEFAULT_PRELOAD_SECONDS),
            report_sequence_part: false,
            debug: false,
        }
    }
}

impl SchedulingConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_seconds)
    }

    pub fn preload_margin(&self) -> Duration {
        Duration::from_millis(self.preload_margin_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "sequencer.speed",
                self.speed.to_string(),
                "speed must be a finite number greater than zero",
            ));
        }
        if self.idle_poll_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "sequencer.idle_poll_seconds",
                "0",
                "idle poll interval must be at least one second",
            ));
        }
        if let Some(preload) = self.default_preload_seconds {
            if !preload.is_finite() || preload < 0.0 {
                return Err(ConfigurationError::invalid_value(
                    "sequencer.default_preload_seconds",
                    preload.to_string(),
                    "preload duration must be a non-negative number",
                ));
            }
        }
        Ok(())
    }
}

/// Adaptive deadline timer configuration
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct DeadlineTimerConfig {
    /// Below this remaining distance the timer sleeps the exact remainder
    pub convergence_threshold_ms: u64,
    /// Share of the remaining distance slept per step
    pub convergence_factor: f64,
}

impl Default for DeadlineTimerConfig {
    fn default() -> Self {
        Self {
            convergence_threshold_ms: constants::timing::CONVERGENCE_THRESHOLD_MS,
            convergence_factor: constants::timing::CONVERGENCE_FACTOR,
        }
    }
}

impl DeadlineTimerConfig {
    pub fn convergence_threshold(&self) -> Duration {
        Duration::from_millis(self.convergence_threshold_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.convergence_threshold_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "timer.convergence_threshold_ms",
                "0",
                "threshold must be positive",
            ));
        }
        if !(self.convergence_factor > 0.0 && self.convergence_factor < 1.0) {
            return Err(ConfigurationError::invalid_value(
                "timer.convergence_factor",
                self.convergence_factor.to_string(),
                "factor must lie strictly between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Device shadow client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShadowClientConfig {
    /// MQTT client id, also the prefix of every correlation token
    pub client_id: String,
    /// Thing whose shadow drives the sequencer
    pub thing_name: String,
    /// Log every packet sent and received
    pub debug: bool,
    /// Pause between failed register attempts; zero retries immediately
    pub register_retry_delay_ms: u64,
    /// Capacity of the client command channel
    pub command_channel_capacity: usize,
    /// Capacity of the application event broadcast channel
    pub event_channel_capacity: usize,
    /// Number of timed-out tokens remembered to recognise late acknowledgments
    pub retired_token_capacity: usize,
    /// Topic prefix for the last-will message
    pub last_will_topic_prefix: String,
}

impl Default for ShadowClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            thing_name: "pod".to_string(),
            debug: false,
            register_retry_delay_ms: 0,
            command_channel_capacity: 128,
            event_channel_capacity: 256,
            retired_token_capacity: 64,
            last_will_topic_prefix: constants::shadow::LAST_WILL_TOPIC_PREFIX.to_string(),
        }
    }
}

/// Last-will message registered with the broker at connect time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastWill {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl ShadowClientConfig {
    /// Client id, generating a random one when none is configured
    pub fn resolved_client_id(&self) -> String {
        if self.client_id.trim().is_empty() {
            format!("sequencer-{}", uuid::Uuid::new_v4())
        } else {
            self.client_id.clone()
        }
    }

    /// Last-will definition for this client
    pub fn last_will(&self, client_id: &str) -> LastWill {
        LastWill {
            topic: format!("{}/{}", self.last_will_topic_prefix, client_id),
            payload: constants::last_will_payload(),
        }
    }

    pub fn register_retry_delay(&self) -> Option<Duration> {
        (self.register_retry_delay_ms > 0)
            .then(|| Duration::from_millis(self.register_retry_delay_ms))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.thing_name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "thing_name",
                "shadow",
            ));
        }
        if self.command_channel_capacity == 0 || self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "shadow.*_channel_capacity",
                "0",
                "channel capacities must be positive",
            ));
        }
        Ok(())
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the JSON log file; console only when absent
    pub directory: Option<String>,
    /// Write JSON lines to the log file
    pub json_file: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SequencerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sequencer.idle_poll(), Duration::from_secs(60));
        assert_eq!(config.timer.convergence_threshold(), Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let mut config = SequencerConfig::default();
        config.sequencer.speed = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_factor_out_of_range() {
        let mut config = SequencerConfig::default();
        config.timer.convergence_factor = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generates_client_id_when_empty() {
        let shadow = ShadowClientConfig::default();
        let id = shadow.resolved_client_id();
        assert!(id.starts_with("sequencer-"));

        let will = shadow.last_will(&id);
        assert_eq!(will.topic, format!("lwt/{id}"));
    }

    #[test]
    fn test_retry_delay_zero_means_none() {
        let mut shadow = ShadowClientConfig::default();
        assert_eq!(shadow.register_retry_delay(), None);
        shadow.register_retry_delay_ms = 500;
        assert_eq!(
            shadow.register_retry_delay(),
            Some(Duration::from_millis(500))
        );
    }
}
