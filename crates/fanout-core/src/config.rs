//! Fan-out configuration types

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Main fan-out configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Wait settings
    #[serde(default)]
    pub wait: WaitConfig,
}

impl FanoutConfig {
    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FanoutConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()?;
        if self.wait.default_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                message: "wait.default_timeout must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Dispatch layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of async I/O threads driving sub-requests
    pub io_threads: usize,

    /// Deadline for a single sub-request before it reports a timeout
    #[serde(with = "duration_ms")]
    pub sub_request_timeout: Duration,

    /// Maximum number of fan-outs outstanding at once
    pub max_in_flight: usize,
}

impl DispatchConfig {
    fn validate(&self) -> Result<()> {
        if self.io_threads == 0 {
            return Err(Error::InvalidConfig {
                message: "dispatch.io_threads must be at least 1".to_string(),
            });
        }
        if self.sub_request_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                message: "dispatch.sub_request_timeout must be non-zero".to_string(),
            });
        }
        if self.max_in_flight == 0 {
            return Err(Error::InvalidConfig {
                message: "dispatch.max_in_flight must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            sub_request_timeout: Duration::from_secs(5),
            max_in_flight: 1024,
        }
    }
}

/// Initiator wait configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// How long an initiator blocks before giving up on a fan-out
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
        }
    }
}

/// Durations travel as integer milliseconds
mod duration_ms {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
