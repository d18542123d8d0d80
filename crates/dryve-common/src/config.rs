//! Configuration structures for the dryve D1 driver.
//!
//! Supports TOML deserialization with defaults matching the drive's
//! factory Modbus TCP settings.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// TCP link settings.
    pub transport: TransportConfig,

    /// SDO retry policy.
    pub sdo: SdoConfig,

    /// CiA-402 polling settings.
    pub state_machine: StateMachineConfig,
}

/// TCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Drive address (host:port).
    pub address: String,

    /// Unit identifier placed in every MBAP header.
    pub unit_id: u8,

    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Read/write timeout for a single exchange.
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,

    /// Attempts per exchange before the transport gives up.
    pub max_attempts: u32,

    /// Backoff between a failed attempt and the reconnect.
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Heartbeat period; `None` disables the heartbeat.
    #[serde(with = "humantime_serde::option")]
    pub heartbeat_interval: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: String::from("192.168.1.230:502"),
            unit_id: 0,
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
            max_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
            heartbeat_interval: Some(Duration::from_secs(2)),
        }
    }
}

impl TransportConfig {
    /// Resolve `address` to a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the address cannot be resolved.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .to_socket_addrs()
            .map_err(|e| ConfigError::Invalid(format!("address {}: {e}", self.address)))?
            .next()
            .ok_or_else(|| ConfigError::Invalid(format!("address {} resolved to nothing", self.address)))
    }
}

/// SDO client retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdoConfig {
    /// Attempts per read/write when the drive answers with an exception.
    pub max_attempts: u32,

    /// Fixed delay between attempts.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for SdoConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// CiA-402 state machine polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    /// Delay between two Statusword polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Default deadline for a state transition.
    #[serde(with = "humantime_serde")]
    pub state_timeout: Duration,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            state_timeout: Duration::from_secs(5),
        }
    }
}

impl DriveConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Reject values that would make the retry or poll loops degenerate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.max_attempts == 0 {
            return Err(ConfigError::Invalid("transport.max_attempts must be >= 1".into()));
        }
        if self.sdo.max_attempts == 0 {
            return Err(ConfigError::Invalid("sdo.max_attempts must be >= 1".into()));
        }
        if self.state_machine.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "state_machine.poll_interval must be non-zero".into(),
            ));
        }
        if matches!(self.transport.heartbeat_interval, Some(d) if d.is_zero()) {
            return Err(ConfigError::Invalid(
                "transport.heartbeat_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Semantically invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Optional durations; the string `"off"` maps to `None`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_str("off"),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            if s == "off" {
                return Ok(None);
            }
            humantime::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}
