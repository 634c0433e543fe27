//! Alpaca Device Operations Implementation
//!
//! Connects the skyflats instructions to a mount and an SQM served over ASCOM
//! Alpaca. Devices are registered up front and addressed by their Alpaca id.

use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use skyflats_alpaca::{AlpacaDevice, AlpacaObservingConditions, AlpacaTelescope};
use skyflats_sequencer::{DeviceOps, DeviceResult, ObserverLocation};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Production device operations backed by Alpaca clients
pub struct AlpacaDeviceOps {
    telescopes: HashMap<String, Arc<AlpacaTelescope>>,
    observing_conditions: HashMap<String, Arc<AlpacaObservingConditions>>,
    /// Configured site, or the mount's site once read
    location: RwLock<Option<ObserverLocation>>,
}

impl AlpacaDeviceOps {
    pub fn new(location: Option<ObserverLocation>) -> Self {
        Self {
            telescopes: HashMap::new(),
            observing_conditions: HashMap::new(),
            location: RwLock::new(location),
        }
    }

    /// Register a telescope, returning the id instructions address it by
    pub fn add_telescope(&mut self, device: &AlpacaDevice) -> BridgeResult<String> {
        let id = device.id();
        self.telescopes.insert(id.clone(), Arc::new(AlpacaTelescope::new(device)?));
        Ok(id)
    }

    /// Register an observing conditions device carrying an SQM
    pub fn add_observing_conditions(&mut self, device: &AlpacaDevice) -> BridgeResult<String> {
        let id = device.id();
        self.observing_conditions
            .insert(id.clone(), Arc::new(AlpacaObservingConditions::new(device)?));
        Ok(id)
    }

    /// Connect every registered device
    pub async fn connect_all(&self) -> BridgeResult<()> {
        for (id, telescope) in &self.telescopes {
            telescope.connect().await.map_err(|reason| BridgeError::ConnectionFailed {
                device_id: id.clone(),
                reason,
            })?;
            let name = telescope.name().await.unwrap_or_else(|_| id.clone());
            tracing::info!("Connected telescope {} ({})", name, id);
        }
        for (id, conditions) in &self.observing_conditions {
            conditions.connect().await.map_err(|reason| BridgeError::ConnectionFailed {
                device_id: id.clone(),
                reason,
            })?;
            let name = conditions.name().await.unwrap_or_else(|_| id.clone());
            tracing::info!("Connected observing conditions {} ({})", name, id);
        }
        Ok(())
    }

    /// Disconnect every registered device, logging failures
    pub async fn disconnect_all(&self) {
        for (id, telescope) in &self.telescopes {
            if let Err(e) = telescope.disconnect().await {
                tracing::warn!("Failed to disconnect {}: {}", id, e);
            }
        }
        for (id, conditions) in &self.observing_conditions {
            if let Err(e) = conditions.disconnect().await {
                tracing::warn!("Failed to disconnect {}: {}", id, e);
            }
        }
    }

    /// Read the site from the mount when no location was configured
    pub async fn resolve_location(&self, mount_id: &str) -> BridgeResult<ObserverLocation> {
        if let Some(location) = self.get_observer_location() {
            return Ok(location);
        }

        let telescope = self.telescope(mount_id).map_err(|reason| BridgeError::ConnectionFailed {
            device_id: mount_id.to_string(),
            reason,
        })?;
        let site = telescope
            .get_site_info()
            .await
            .map_err(|reason| BridgeError::ConnectionFailed {
                device_id: mount_id.to_string(),
                reason,
            })?;
        let location = ObserverLocation::new(site.site_latitude, site.site_longitude, site.site_elevation)?;
        tracing::info!("Using mount site location {}", location);

        if let Ok(mut cached) = self.location.write() {
            *cached = Some(location);
        }
        Ok(location)
    }

    fn telescope(&self, mount_id: &str) -> DeviceResult<&Arc<AlpacaTelescope>> {
        self.telescopes
            .get(mount_id)
            .ok_or_else(|| format!("Mount {} not found or unsupported", mount_id))
    }

    fn conditions(&self, weather_id: &str) -> DeviceResult<&Arc<AlpacaObservingConditions>> {
        self.observing_conditions
            .get(weather_id)
            .ok_or_else(|| format!("Weather device {} not found or unsupported", weather_id))
    }
}

#[async_trait]
impl DeviceOps for AlpacaDeviceOps {
    async fn mount_slew_to_alt_az(&self, mount_id: &str, azimuth: f64, altitude: f64) -> DeviceResult<()> {
        let telescope = self.telescope(mount_id)?;
        if !telescope.can_slew_alt_az_async().await? {
            return Err(format!("Mount {} cannot slew to alt/az coordinates", mount_id));
        }
        tracing::debug!("Slewing {} to Az {:.4}, Alt {:.4}", mount_id, azimuth, altitude);
        telescope.slew_to_alt_az_async(altitude, azimuth).await
    }

    async fn mount_abort_slew(&self, mount_id: &str) -> DeviceResult<()> {
        self.telescope(mount_id)?.abort_slew().await
    }

    async fn mount_is_slewing(&self, mount_id: &str) -> DeviceResult<bool> {
        self.telescope(mount_id)?.slewing().await
    }

    async fn mount_is_parked(&self, mount_id: &str) -> DeviceResult<bool> {
        self.telescope(mount_id)?.at_park().await
    }

    async fn mount_get_alt_az(&self, mount_id: &str) -> DeviceResult<(f64, f64)> {
        let telescope = self.telescope(mount_id)?;
        let (azimuth, altitude) = tokio::join!(telescope.azimuth(), telescope.altitude());
        Ok((azimuth?, altitude?))
    }

    async fn weather_get_sky_quality(&self, weather_id: &str) -> DeviceResult<f64> {
        self.conditions(weather_id)?.sky_quality().await
    }

    async fn send_notification(&self, level: &str, title: &str, message: &str) -> DeviceResult<()> {
        match level.to_lowercase().as_str() {
            "error" | "critical" => tracing::error!("[NOTIFICATION] {}: {}", title, message),
            "warning" | "warn" => tracing::warn!("[NOTIFICATION] {}: {}", title, message),
            _ => tracing::info!("[NOTIFICATION] {}: {}", title, message),
        }
        Ok(())
    }

    fn get_observer_location(&self) -> Option<ObserverLocation> {
        self.location.read().ok().and_then(|location| *location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyflats_alpaca::AlpacaDeviceType;

    fn registered() -> (AlpacaDeviceOps, String, String) {
        let mut ops = AlpacaDeviceOps::new(None);
        let mount_id = ops
            .add_telescope(&AlpacaDevice::new(AlpacaDeviceType::Telescope, "http://127.0.0.1:9", 0))
            .unwrap();
        let sqm_id = ops
            .add_observing_conditions(&AlpacaDevice::new(
                AlpacaDeviceType::ObservingConditions,
                "http://127.0.0.1:9",
                0,
            ))
            .unwrap();
        (ops, mount_id, sqm_id)
    }

    #[test]
    fn test_register_devices() {
        let (_, mount_id, sqm_id) = registered();
        assert_eq!(mount_id, "alpaca:http://127.0.0.1:9:telescope:0");
        assert_eq!(sqm_id, "alpaca:http://127.0.0.1:9:observingconditions:0");
    }

    #[test]
    fn test_register_wrong_type() {
        let mut ops = AlpacaDeviceOps::new(None);
        let device = AlpacaDevice::new(AlpacaDeviceType::ObservingConditions, "http://127.0.0.1:9", 0);
        assert!(matches!(ops.add_telescope(&device), Err(BridgeError::Alpaca(_))));
    }

    #[tokio::test]
    async fn test_unknown_device_ids() {
        let (ops, _, _) = registered();
        let err = ops.mount_is_parked("alpaca:http://other:11111:telescope:3").await.unwrap_err();
        assert!(err.contains("not found"));
        assert!(ops.weather_get_sky_quality("nope").await.is_err());
        assert!(ops.mount_abort_slew("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_configured_location_wins() {
        let location = ObserverLocation::new(52.0, 4.4, 0.0).unwrap();
        let ops = AlpacaDeviceOps::new(Some(location));
        assert_eq!(ops.get_observer_location(), Some(location));
        assert_eq!(ops.resolve_location("unregistered").await.unwrap(), location);
    }

    #[tokio::test]
    async fn test_resolve_location_requires_mount() {
        let ops = AlpacaDeviceOps::new(None);
        assert!(ops.get_observer_location().is_none());
        assert!(matches!(
            ops.resolve_location("missing").await,
            Err(BridgeError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_notifications_always_succeed() {
        let ops = AlpacaDeviceOps::new(None);
        assert!(ops.send_notification("warning", "Mount parked", "unpark first").await.is_ok());
        assert!(ops.send_notification("info", "Done", "ok").await.is_ok());
    }
}
