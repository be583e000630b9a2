//! Completion configuration.
//!
//! Values are read once (usually at startup) and handed to the completer;
//! nothing in the completion path consults the environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockline_core::CountryCode;
use stockline_inventory::ReservationMode;

pub const ENV_RESERVATIONS_ENABLED: &str = "STOCKLINE_RESERVATIONS_ENABLED";
pub const ENV_CONSISTENCY: &str = "STOCKLINE_CONSISTENCY";
pub const ENV_DEFAULT_COUNTRY: &str = "STOCKLINE_DEFAULT_COUNTRY";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// What happens to the order when some line cannot be allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Order and allocations commit together or not at all.
    #[default]
    Atomic,
    /// Status and shipping changes are saved before allocation and survive a
    /// shortage; lines that allocated stay allocated.
    Partial,
}

impl core::str::FromStr for ConsistencyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Self::Atomic),
            "partial" => Ok(Self::Partial),
            _ => Err(ConfigError::Invalid {
                key: ENV_CONSISTENCY,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Whether active reservations of other checkouts reduce availability.
    pub reservations_enabled: bool,
    pub consistency: ConsistencyMode,
    /// Last-resort country for warehouse selection.
    pub default_country: Option<CountryCode>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            reservations_enabled: true,
            consistency: ConsistencyMode::Atomic,
            default_country: None,
        }
    }
}

impl CompletionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source (unset keys keep their defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_RESERVATIONS_ENABLED) {
            config.reservations_enabled = parse_bool(ENV_RESERVATIONS_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_CONSISTENCY) {
            config.consistency = value.parse()?;
        }
        if let Some(value) = lookup(ENV_DEFAULT_COUNTRY) {
            let country = CountryCode::new(value.trim()).map_err(|_| ConfigError::Invalid {
                key: ENV_DEFAULT_COUNTRY,
                value: value.clone(),
            })?;
            config.default_country = Some(country);
        }

        Ok(config)
    }

    pub fn reservation_mode(&self) -> ReservationMode {
        ReservationMode::from(self.reservations_enabled)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}
