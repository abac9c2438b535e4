//! Environment configuration, loadable from TOML.
//!
//! ```toml
//! seed = 42
//! event_buffer_capacity = 4096
//! default_honor_policy = "RelaxedFCFS"
//!
//! [tracking]
//! trace_events = true
//! queue_statistics = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::resource::HonorPolicy;

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML text could not be deserialized.
    #[error("parse error in {origin}: {detail}")]
    Parse { origin: String, detail: String },

    /// A field holds a value the engine cannot work with.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Config types
// ===========================================================================

/// Which observation channels are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Record trace events into the event bus.
    pub trace_events: bool,
    /// Maintain length-of-stay and queue-length statistics on the
    /// requester, claimer and waiter queues.
    pub queue_statistics: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            trace_events: true,
            queue_statistics: true,
        }
    }
}

/// Top-level settings for an [`Environment`](crate::engine::Environment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed of the environment's random generator.
    pub seed: u64,
    /// Ring buffer capacity per trace event kind.
    pub event_buffer_capacity: usize,
    /// Honor policy used by resources that don't set one explicitly.
    pub default_honor_policy: HonorPolicy,
    pub tracking: TrackingConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            event_buffer_capacity: 1024,
            default_honor_policy: HonorPolicy::StrictFCFS,
            tracking: TrackingConfig::default(),
        }
    }
}

impl SimConfig {
    /// Default config with a different seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Parse a config from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            origin: "<string>".to_string(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            origin: PathBuf::from(path).display().to_string(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render the config back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            reason: e.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.event_buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_buffer_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(weight) = self.default_honor_policy.weight()
            && !(0.0..=1.0).contains(&weight)
        {
            return Err(ConfigError::Invalid {
                field: "default_honor_policy",
                reason: format!("weight {weight} is outside [0, 1]"),
            });
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn parses_all_fields() {
        let text = r#"
            seed = 7
            event_buffer_capacity = 16
            default_honor_policy = "RelaxedFCFS"

            [tracking]
            trace_events = false
            queue_statistics = false
        "#;
        let config = SimConfig::from_toml_str(text).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.event_buffer_capacity, 16);
        assert_eq!(config.default_honor_policy, HonorPolicy::RelaxedFCFS);
        assert!(!config.tracking.trace_events);
        assert!(!config.tracking.queue_statistics);
    }

    #[test]
    fn weighted_policy_from_toml() {
        let text = r#"
            [default_honor_policy]
            WeightedFCFS = 0.25
        "#;
        let config = SimConfig::from_toml_str(text).unwrap();
        assert_eq!(config.default_honor_policy, HonorPolicy::WeightedFCFS(0.25));
    }

    #[test]
    fn rejects_zero_buffer_capacity() {
        let err = SimConfig::from_toml_str("event_buffer_capacity = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "event_buffer_capacity",
                ..
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let text = r#"
            [default_honor_policy]
            WeightedSQF = 1.5
        "#;
        assert!(SimConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = SimConfig::from_toml_str("seed = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn toml_round_trip() {
        let config = SimConfig::with_seed(99);
        let text = config.to_toml_string().unwrap();
        assert_eq!(SimConfig::from_toml_str(&text).unwrap(), config);
    }
}
