use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Register and I/O pattern a machine starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerOn {
    /// Everything zero, execution starts at 0x0000.
    #[default]
    Zeroed,
    /// The state the DMG boot ROM hands over at 0x0100.
    PostBoot,
}

pub const DEFAULT_SHADES: [u32; 4] = [0xE0F8D0FF, 0x88C070FF, 0x346856FF, 0x081820FF];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub power_on: PowerOn,
    /// RGBA colours for shades 0 (lightest) to 3 (darkest).
    pub shades: [u32; 4],
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            power_on: PowerOn::Zeroed,
            shades: DEFAULT_SHADES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid machine configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unable to read machine configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl MachineConfig {
    pub fn post_boot() -> Self {
        Self {
            power_on: PowerOn::PostBoot,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(ConfigError::from)?;
        let config = Self::from_json(&json)?;
        tracing::info!("[CONFIG] Loaded {:?}: {:?}", path, config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MachineConfig::from_json(r#"{ "power_on": "post_boot" }"#).unwrap();
        assert_eq!(config.power_on, PowerOn::PostBoot);
        assert_eq!(config.shades, DEFAULT_SHADES);
    }

    #[test]
    fn test_json_round_trip() {
        let config = MachineConfig {
            power_on: PowerOn::PostBoot,
            shades: [0xFFFFFFFF, 0xAAAAAAFF, 0x555555FF, 0x000000FF],
        };
        let json = config.to_json().unwrap();
        assert_eq!(MachineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let err = MachineConfig::from_json("{ power_on: 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
