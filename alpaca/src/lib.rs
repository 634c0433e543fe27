//! Alpaca Protocol Client
//!
//! Implements the subset of the ASCOM Alpaca REST API that sky flats need:
//! the Telescope device (park state, alt/az slews) and the ObservingConditions
//! device (sky quality).

mod client;
mod observingconditions;
mod telescope;

pub use client::*;
pub use observingconditions::*;
pub use telescope::*;

/// Alpaca API version
pub const ALPACA_API_VERSION: u32 = 1;

/// Default Alpaca API port
pub const ALPACA_DEFAULT_PORT: u16 = 11111;

/// Alpaca device types used by sky flats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlpacaDeviceType {
    ObservingConditions,
    Telescope,
}

impl AlpacaDeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlpacaDeviceType::ObservingConditions => "observingconditions",
            AlpacaDeviceType::Telescope => "telescope",
        }
    }

    /// Get a display name for the device type
    pub fn display_name(&self) -> &'static str {
        match self {
            AlpacaDeviceType::ObservingConditions => "Observing Conditions",
            AlpacaDeviceType::Telescope => "Telescope",
        }
    }
}

impl std::fmt::Display for AlpacaDeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// An Alpaca device on a known server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlpacaDevice {
    pub device_type: AlpacaDeviceType,
    pub device_number: u32,
    pub device_name: String,
    pub base_url: String,
}

impl AlpacaDevice {
    pub fn new(device_type: AlpacaDeviceType, base_url: impl Into<String>, device_number: u32) -> Self {
        Self {
            device_type,
            device_number,
            device_name: String::new(),
            base_url: base_url.into(),
        }
    }

    /// Get a unique identifier for this device
    pub fn id(&self) -> String {
        format!("alpaca:{}:{}:{}", self.base_url, self.device_type.as_str(), self.device_number)
    }

    /// Get a display name combining device name and type
    pub fn display_name(&self) -> String {
        if self.device_name.is_empty() {
            format!("{} #{}", self.device_type.display_name(), self.device_number)
        } else {
            self.device_name.clone()
        }
    }

    fn expect_type(&self, expected: AlpacaDeviceType) -> Result<(), AlpacaError> {
        if self.device_type != expected {
            return Err(AlpacaError::WrongDeviceType {
                expected,
                actual: self.device_type,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for AlpacaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.display_name(), self.base_url)
    }
}
