// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the batch processor.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{self, Result};

/// Default time a batch may wait before it is flushed.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Default unit count that triggers a flush.
const DEFAULT_SEND_BATCH_SIZE: usize = 8192;

/// Default number of detached buffers waiting for the dispatcher.
const DEFAULT_PENDING_FLUSHES: usize = 4;

/// How much the processors count about themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLevel {
    /// Flushes, batches, units and failures.
    #[default]
    Basic,
    /// Also the encoded size of every forwarded batch, which costs a pass
    /// over each batch.
    Detailed,
}

/// Batching thresholds, shared by every signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Longest time buffered data waits before it is flushed, e.g. `"200ms"`.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Number of units that triggers a flush. Zero flushes on every accepted
    /// batch.
    #[serde(default = "default_send_batch_size")]
    pub send_batch_size: usize,

    /// Upper bound on the units of any forwarded batch. Zero disables
    /// splitting.
    #[serde(default)]
    pub send_batch_max_size: usize,

    /// Flushes that may wait for the dispatcher before producers are slowed
    /// down.
    #[serde(default = "default_pending_flushes")]
    pub pending_flushes: usize,

    /// Which counters are kept, `"basic"` or `"detailed"`.
    #[serde(default)]
    pub telemetry_level: TelemetryLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            send_batch_size: DEFAULT_SEND_BATCH_SIZE,
            send_batch_max_size: 0,
            pending_flushes: DEFAULT_PENDING_FLUSHES,
            telemetry_level: TelemetryLevel::Basic,
        }
    }
}

impl Config {
    /// Creates a configuration with the given thresholds and the default
    /// queue depth.
    #[must_use]
    pub fn new(timeout: Duration, send_batch_size: usize, send_batch_max_size: usize) -> Self {
        Self {
            timeout,
            send_batch_size,
            send_batch_max_size,
            pending_flushes: DEFAULT_PENDING_FLUSHES,
            telemetry_level: TelemetryLevel::Basic,
        }
    }

    /// Sets the number of flushes that may queue up for the dispatcher.
    #[must_use]
    pub fn with_pending_flushes(mut self, pending_flushes: usize) -> Self {
        self.pending_flushes = pending_flushes;
        self
    }

    /// Sets which counters are kept.
    #[must_use]
    pub fn with_telemetry_level(mut self, telemetry_level: TelemetryLevel) -> Self {
        self.telemetry_level = telemetry_level;
        self
    }

    /// Checks the thresholds against each other.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return error::InvalidConfigSnafu {
                reason: "timeout must be greater than zero",
            }
            .fail();
        }
        if self.send_batch_max_size > 0 && self.send_batch_max_size < self.send_batch_size {
            return error::InvalidConfigSnafu {
                reason: format!(
                    "send_batch_max_size ({}) must be greater or equal to send_batch_size ({})",
                    self.send_batch_max_size, self.send_batch_size
                ),
            }
            .fail();
        }
        if self.pending_flushes == 0 {
            return error::InvalidConfigSnafu {
                reason: "pending_flushes must be greater than zero",
            }
            .fail();
        }
        Ok(())
    }

    /// The split limit, if splitting is enabled.
    #[must_use]
    pub fn max_batch_size(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.send_batch_max_size)
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_send_batch_size() -> usize {
    DEFAULT_SEND_BATCH_SIZE
}

fn default_pending_flushes() -> usize {
    DEFAULT_PENDING_FLUSHES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timeout, Duration::from_millis(200));
        assert_eq!(config.send_batch_size, 8192);
        assert_eq!(config.send_batch_max_size, 0);
        assert_eq!(config.max_batch_size(), None);
        assert_eq!(config.telemetry_level, TelemetryLevel::Basic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "timeout": "10s",
            "send_batch_size": 1000,
            "send_batch_max_size": 1500,
            "pending_flushes": 2,
            "telemetry_level": "detailed"
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.send_batch_size, 1000);
        assert_eq!(config.max_batch_size(), NonZeroUsize::new(1500));
        assert_eq!(config.pending_flushes, 2);
        assert_eq!(config.telemetry_level, TelemetryLevel::Detailed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_defaults_in_json() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"send_batch_sizes": 10}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_max_below_size_rejected() {
        let config = Config::new(Duration::from_secs(1), 100, 50);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("send_batch_max_size (50)"));
    }

    #[test]
    fn test_max_equal_to_size_accepted() {
        assert!(Config::new(Duration::from_secs(1), 100, 100).validate().is_ok());
        assert!(Config::new(Duration::from_secs(1), 100, 0).validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config::new(Duration::ZERO, 10, 0);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_zero_pending_flushes_rejected() {
        let config = Config::default().with_pending_flushes(0);
        assert!(config.validate().is_err());
    }
}
