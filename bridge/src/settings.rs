//! Persistent skyflats settings
//!
//! A single JSON document holding the observer site, the Alpaca server and
//! device numbers, and the default configuration of each instruction. Missing
//! fields fall back to their defaults.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use skyflats_alpaca::{AlpacaDevice, AlpacaDeviceType, ALPACA_DEFAULT_PORT};
use skyflats_sequencer::{
    ObserverLocation, SkyflatsError, SlewToNullPointConfig, SqmConditionConfig, WaitUntilSqmConfig,
};
use std::path::{Path, PathBuf};

/// Alpaca server and device numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpacaSettings {
    pub base_url: String,
    pub telescope_number: u32,
    /// Observing conditions device carrying the SQM; `None` when no SQM is attached
    pub observing_conditions_number: Option<u32>,
}

impl Default for AlpacaSettings {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{}", ALPACA_DEFAULT_PORT),
            telescope_number: 0,
            observing_conditions_number: Some(0),
        }
    }
}

impl AlpacaSettings {
    pub fn telescope(&self) -> AlpacaDevice {
        AlpacaDevice::new(AlpacaDeviceType::Telescope, &self.base_url, self.telescope_number)
    }

    pub fn observing_conditions(&self) -> Option<AlpacaDevice> {
        self.observing_conditions_number
            .map(|n| AlpacaDevice::new(AlpacaDeviceType::ObservingConditions, &self.base_url, n))
    }
}

/// Logging options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Directory for daily rolling log files; console only when unset
    pub directory: Option<PathBuf>,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Days of log files to keep
    pub keep_days: i64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directory: None,
            level: "info".to_string(),
            keep_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SkyflatsSettings {
    /// Observer site; read from the mount when unset
    pub location: Option<ObserverLocation>,
    pub alpaca: AlpacaSettings,
    pub slew: SlewToNullPointConfig,
    pub wait_until_sqm: WaitUntilSqmConfig,
    pub loop_while_sqm: SqmConditionConfig,
    pub logging: LogSettings,
}

impl SkyflatsSettings {
    /// Load and validate settings from a JSON file
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BridgeError::SettingsRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let settings: Self = serde_json::from_str(&text).map_err(|e| BridgeError::SettingsRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        settings.validate()?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> BridgeResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        let write_err = |reason: String| BridgeError::SettingsWrite {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| write_err(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), SkyflatsError> {
        if let Some(location) = &self.location {
            location.validate()?;
        }
        if !self.alpaca.base_url.starts_with("http://") && !self.alpaca.base_url.starts_with("https://") {
            return Err(SkyflatsError::InvalidConfig(format!(
                "Alpaca URL '{}' must start with http:// or https://",
                self.alpaca.base_url
            )));
        }
        if !self.slew.position_tolerance_deg.is_finite() || self.slew.position_tolerance_deg <= 0.0 {
            return Err(SkyflatsError::InvalidConfig(
                "slew position tolerance must be positive".to_string(),
            ));
        }
        if self.slew.slew_timeout_secs == 0 {
            return Err(SkyflatsError::InvalidConfig("slew timeout must be positive".to_string()));
        }
        if self.logging.keep_days < 0 {
            return Err(SkyflatsError::InvalidConfig(format!(
                "log retention of {} days must not be negative",
                self.logging.keep_days
            )));
        }
        self.wait_until_sqm.gate()?;
        self.loop_while_sqm.sqm_threshold()?;
        Ok(())
    }
}
