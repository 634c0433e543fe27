//! Device Operations Trait
//!
//! This module defines the interface for device operations that the skyflats
//! instructions need. The actual implementation is provided by the bridge crate.

use crate::ObserverLocation;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, String>;

/// Trait defining all device operations needed by the skyflats instructions
///
/// This trait is implemented by the bridge to provide actual device control.
/// The sequencer calls these methods without knowing the implementation details.
#[async_trait]
pub trait DeviceOps: Send + Sync {
    // =========================================================================
    // MOUNT OPERATIONS
    // =========================================================================

    /// Start an asynchronous slew to horizontal coordinates (degrees)
    async fn mount_slew_to_alt_az(&self, mount_id: &str, azimuth: f64, altitude: f64) -> DeviceResult<()>;

    /// Abort current slew
    async fn mount_abort_slew(&self, mount_id: &str) -> DeviceResult<()>;

    /// Check if mount is slewing
    async fn mount_is_slewing(&self, mount_id: &str) -> DeviceResult<bool>;

    /// Check if mount is parked
    async fn mount_is_parked(&self, mount_id: &str) -> DeviceResult<bool>;

    /// Get current horizontal position as (azimuth, altitude) in degrees
    async fn mount_get_alt_az(&self, mount_id: &str) -> DeviceResult<(f64, f64)>;

    // =========================================================================
    // OBSERVING CONDITIONS
    // =========================================================================

    /// Current sky quality in magnitudes per square arcsecond
    async fn weather_get_sky_quality(&self, weather_id: &str) -> DeviceResult<f64>;

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    /// Send a notification
    async fn send_notification(&self, level: &str, title: &str, message: &str) -> DeviceResult<()>;

    // =========================================================================
    // UTILITY
    // =========================================================================

    /// Get observer location
    fn get_observer_location(&self) -> Option<ObserverLocation>;
}

/// Type alias for shared device ops
pub type SharedDeviceOps = Arc<dyn DeviceOps>;

/// Simulated slew duration of the null implementation
const NULL_SLEW_DURATION: Duration = Duration::from_secs(2);

/// Sky quality the simulated sensor starts at (bright twilight)
const NULL_SQM_START: f64 = 6.0;

/// Darkest value the simulated sensor reaches
const NULL_SQM_LIMIT: f64 = 21.5;

/// Simulated darkening rate in magnitudes per second
const NULL_SQM_RATE: f64 = 0.05;

#[derive(Debug)]
struct NullMountState {
    parked: bool,
    azimuth: f64,
    altitude: f64,
    slew_until: Option<Instant>,
}

/// Null implementation for testing and simulation
///
/// The mount slews instantly in position but reports slewing for a couple of
/// seconds. The sky darkens steadily from twilight unless a fixed sky quality
/// was given.
#[derive(Debug)]
pub struct NullDeviceOps {
    location: ObserverLocation,
    fixed_sky_quality: Option<f64>,
    started: Instant,
    mount: Mutex<NullMountState>,
}

impl Default for NullDeviceOps {
    fn default() -> Self {
        Self::new(ObserverLocation {
            latitude: 45.0,
            longitude: -75.0,
            elevation: 0.0,
        })
    }
}

impl NullDeviceOps {
    pub fn new(location: ObserverLocation) -> Self {
        Self {
            location,
            fixed_sky_quality: None,
            started: Instant::now(),
            mount: Mutex::new(NullMountState {
                parked: false,
                azimuth: 180.0,
                altitude: 45.0,
                slew_until: None,
            }),
        }
    }

    /// Simulated devices reporting a constant sky quality
    pub fn with_sky_quality(sky_quality: f64) -> Self {
        Self {
            fixed_sky_quality: Some(sky_quality),
            ..Self::default()
        }
    }

    pub fn set_parked(&self, parked: bool) {
        if let Ok(mut mount) = self.mount.lock() {
            mount.parked = parked;
        }
    }

    fn mount_state(&self) -> DeviceResult<std::sync::MutexGuard<'_, NullMountState>> {
        self.mount.lock().map_err(|_| "Simulated mount state poisoned".to_string())
    }
}

#[async_trait]
impl DeviceOps for NullDeviceOps {
    async fn mount_slew_to_alt_az(&self, _mount_id: &str, azimuth: f64, altitude: f64) -> DeviceResult<()> {
        let mut mount = self.mount_state()?;
        if mount.parked {
            return Err("Mount is parked".to_string());
        }
        tracing::info!("[NULL] Slew to Az={:.4}°, Alt={:.4}°", azimuth, altitude);
        mount.azimuth = azimuth;
        mount.altitude = altitude;
        mount.slew_until = Some(Instant::now() + NULL_SLEW_DURATION);
        Ok(())
    }

    async fn mount_abort_slew(&self, _mount_id: &str) -> DeviceResult<()> {
        tracing::info!("[NULL] Aborting mount slew");
        self.mount_state()?.slew_until = None;
        Ok(())
    }

    async fn mount_is_slewing(&self, _mount_id: &str) -> DeviceResult<bool> {
        Ok(self
            .mount_state()?
            .slew_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false))
    }

    async fn mount_is_parked(&self, _mount_id: &str) -> DeviceResult<bool> {
        Ok(self.mount_state()?.parked)
    }

    async fn mount_get_alt_az(&self, _mount_id: &str) -> DeviceResult<(f64, f64)> {
        let mount = self.mount_state()?;
        Ok((mount.azimuth, mount.altitude))
    }

    async fn weather_get_sky_quality(&self, _weather_id: &str) -> DeviceResult<f64> {
        if let Some(sqm) = self.fixed_sky_quality {
            return Ok(sqm);
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        Ok((NULL_SQM_START + elapsed * NULL_SQM_RATE).min(NULL_SQM_LIMIT))
    }

    async fn send_notification(&self, level: &str, title: &str, message: &str) -> DeviceResult<()> {
        tracing::info!("[NOTIFICATION][{}] {}: {}", level, title, message);
        Ok(())
    }

    fn get_observer_location(&self) -> Option<ObserverLocation> {
        Some(self.location)
    }
}
