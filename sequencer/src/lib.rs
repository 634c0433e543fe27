//! Skyflats sequencer core
//!
//! Computes the anti-solar "null point" used for twilight sky flats and gates
//! acquisition on live sky quality (SQM) readings. Device access goes through
//! the [`DeviceOps`] trait, which the bridge crate implements for real hardware.

pub mod astro;
pub mod brightness_gate;
pub mod clock;
pub mod device_ops;
pub mod error;
pub mod instructions;
pub mod null_point;
pub mod sqm_loop;

pub use brightness_gate::{evaluate, BrightnessGate, BrightnessSource, DeviceSkyQuality, GateState, SqmThreshold};
pub use clock::{Clock, SharedClock, SystemClock};
pub use device_ops::{DeviceOps, DeviceResult, NullDeviceOps, SharedDeviceOps};
pub use error::{SkyflatsError, SkyflatsResult};
pub use instructions::{
    ensure_mount_unparked, execute_calculate_null_point, execute_slew_to_null_point, execute_wait_until_sqm,
    InstructionContext, InstructionResult,
};
pub use null_point::{
    AzimuthDms, EquatorialPosition, LowPrecisionSolarEphemeris, NullPointCalculator, NullPointCoordinate,
    SharedEphemeris, SolarEphemeris, SolarPosition, NULL_POINT_ALTITUDE_DEG,
};
pub use sqm_loop::{check_sqm_condition, execute_loop_while_sqm, execute_sqm_condition};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sequence item category used in item descriptions
pub const SKYFLATS_CATEGORY: &str = "SkyFlats";

/// Status of an executed instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
    Cancelled,
}

/// Observer site, supplied by the host and never mutated by the core
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverLocation {
    /// Geographic latitude in degrees (north positive)
    pub latitude: f64,
    /// Geographic longitude in degrees (east positive)
    pub longitude: f64,
    /// Elevation above sea level in meters
    #[serde(default)]
    pub elevation: f64,
}

impl ObserverLocation {
    /// Create a location, rejecting out-of-range or non-finite coordinates
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> SkyflatsResult<Self> {
        let location = Self { latitude, longitude, elevation };
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> SkyflatsResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(SkyflatsError::InvalidConfig(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(SkyflatsError::InvalidConfig(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        if !self.elevation.is_finite() {
            return Err(SkyflatsError::InvalidConfig("elevation must be finite".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for ObserverLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lat {:.4}°, lon {:.4}°, elev {:.0} m", self.latitude, self.longitude, self.elevation)
    }
}

/// Comparison direction for SQM thresholds.
///
/// A numerically larger SQM reading means a darker sky, so `DarkerThan`
/// passes when the reading is above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqmComparison {
    BrighterThan,
    DarkerThan,
}

impl Default for SqmComparison {
    fn default() -> Self {
        SqmComparison::DarkerThan
    }
}

impl fmt::Display for SqmComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqmComparison::BrighterThan => write!(f, "brighter than"),
            SqmComparison::DarkerThan => write!(f, "darker than"),
        }
    }
}

impl FromStr for SqmComparison {
    type Err = SkyflatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "brighter than" | "brighter" => Ok(SqmComparison::BrighterThan),
            "darker than" | "darker" => Ok(SqmComparison::DarkerThan),
            _ => Err(SkyflatsError::InvalidConfig(format!("unknown SQM comparison '{}'", s))),
        }
    }
}

/// Default SQM threshold for new skyflats items
pub const DEFAULT_SQM_THRESHOLD: f64 = 8.0;

/// Default SQM poll interval in milliseconds
pub const DEFAULT_SQM_POLL_INTERVAL_MS: u64 = 1000;

/// Configuration for the "Slew to null point" instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlewToNullPointConfig {
    /// Wait for the mount to report it stopped slewing
    pub wait_for_slew: bool,
    /// Maximum time to wait for slew completion
    pub slew_timeout_secs: u64,
    /// Maximum accepted difference between target and reported alt/az, in degrees
    pub position_tolerance_deg: f64,
}

impl Default for SlewToNullPointConfig {
    fn default() -> Self {
        Self {
            wait_for_slew: true,
            slew_timeout_secs: 300,
            position_tolerance_deg: 0.5,
        }
    }
}

impl fmt::Display for SlewToNullPointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Category: {}, Item: SlewToNullPoint, WaitForSlew: {}",
            SKYFLATS_CATEGORY, self.wait_for_slew
        )
    }
}

/// Configuration for the "Wait until SQM" instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitUntilSqmConfig {
    pub threshold: f64,
    pub comparison: SqmComparison,
    pub poll_interval_ms: u64,
}

impl Default for WaitUntilSqmConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SQM_THRESHOLD,
            comparison: SqmComparison::DarkerThan,
            poll_interval_ms: DEFAULT_SQM_POLL_INTERVAL_MS,
        }
    }
}

impl WaitUntilSqmConfig {
    /// Validated threshold value object for this config
    pub fn sqm_threshold(&self) -> SkyflatsResult<SqmThreshold> {
        SqmThreshold::new(self.threshold, self.comparison)
    }

    /// Build the gate this instruction waits on
    pub fn gate(&self) -> SkyflatsResult<BrightnessGate> {
        BrightnessGate::new(self.sqm_threshold()?)
            .with_poll_interval(std::time::Duration::from_millis(self.poll_interval_ms))
    }
}

impl fmt::Display for WaitUntilSqmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Category: {}, Item: WaitUntilSQM, SQMOperator: {}, SQMThreshold: {}",
            SKYFLATS_CATEGORY, self.comparison, self.threshold
        )
    }
}

/// Configuration for the "Loop while SQM" condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqmConditionConfig {
    pub threshold: f64,
    pub comparison: SqmComparison,
}

impl Default for SqmConditionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SQM_THRESHOLD,
            comparison: SqmComparison::DarkerThan,
        }
    }
}

impl SqmConditionConfig {
    pub fn sqm_threshold(&self) -> SkyflatsResult<SqmThreshold> {
        SqmThreshold::new(self.threshold, self.comparison)
    }
}

impl fmt::Display for SqmConditionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Category: {}, Item: SkyflatsCondition, SQMThreshold: {}",
            SKYFLATS_CATEGORY, self.threshold
        )
    }
}
