//! Alpaca Observing Conditions (Weather Station) API implementation

use crate::{AlpacaClient, AlpacaDevice, AlpacaDeviceType, AlpacaError, RetryConfig, TimeoutConfig};

/// Alpaca Observing Conditions client
pub struct AlpacaObservingConditions {
    client: AlpacaClient,
}

impl AlpacaObservingConditions {
    /// Create a new Alpaca observing conditions client
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Self::with_config(device, TimeoutConfig::for_observing_conditions(), RetryConfig::default())
    }

    pub fn with_config(
        device: &AlpacaDevice,
        timeout_config: TimeoutConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, AlpacaError> {
        device.expect_type(AlpacaDeviceType::ObservingConditions)?;
        Ok(Self {
            client: AlpacaClient::with_config(device, timeout_config, retry_config)?,
        })
    }

    // Connection methods

    pub async fn connect(&self) -> Result<(), String> {
        self.client.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), String> {
        self.client.disconnect().await
    }

    pub async fn name(&self) -> Result<String, String> {
        self.client.get_name().await
    }

    // Sky data

    /// Sky quality in magnitudes per square arcsecond
    pub async fn sky_quality(&self) -> Result<f64, String> {
        self.client.get("skyquality").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_telescope_device() {
        let device = AlpacaDevice::new(AlpacaDeviceType::Telescope, "http://localhost:11111", 0);
        assert!(AlpacaObservingConditions::new(&device).is_err());
    }

    #[test]
    fn test_observing_conditions_endpoints() {
        let device = AlpacaDevice::new(AlpacaDeviceType::ObservingConditions, "http://localhost:11111", 0);
        let sqm = AlpacaObservingConditions::new(&device).unwrap();
        assert_eq!(
            sqm.client.build_url("skyquality"),
            "http://localhost:11111/api/v1/observingconditions/0/skyquality"
        );
    }
}
