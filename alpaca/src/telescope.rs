//! Alpaca Telescope (Mount) API implementation

use crate::{AlpacaClient, AlpacaDevice, AlpacaDeviceType, AlpacaError, RetryConfig, TimeoutConfig};

/// Telescope site information
#[derive(Debug, Clone, PartialEq)]
pub struct TelescopeSiteInfo {
    pub site_latitude: f64,
    pub site_longitude: f64,
    pub site_elevation: f64,
}

/// Alpaca Telescope (Mount) client
pub struct AlpacaTelescope {
    client: AlpacaClient,
}

impl AlpacaTelescope {
    /// Create a new Alpaca telescope client
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Self::with_config(device, TimeoutConfig::for_telescope(), RetryConfig::default())
    }

    /// Create a telescope client with custom configuration
    pub fn with_config(
        device: &AlpacaDevice,
        timeout_config: TimeoutConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, AlpacaError> {
        device.expect_type(AlpacaDeviceType::Telescope)?;
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

    // Position

    pub async fn altitude(&self) -> Result<f64, String> {
        self.client.get("altitude").await
    }

    pub async fn azimuth(&self) -> Result<f64, String> {
        self.client.get("azimuth").await
    }

    // State

    pub async fn slewing(&self) -> Result<bool, String> {
        self.client.get_quick("slewing").await.map_err(|e| e.to_string())
    }

    pub async fn at_park(&self) -> Result<bool, String> {
        self.client.get_quick("atpark").await.map_err(|e| e.to_string())
    }

    // Site

    pub async fn site_latitude(&self) -> Result<f64, String> {
        self.client.get("sitelatitude").await
    }

    pub async fn site_longitude(&self) -> Result<f64, String> {
        self.client.get("sitelongitude").await
    }

    pub async fn site_elevation(&self) -> Result<f64, String> {
        self.client.get("siteelevation").await
    }

    // Capabilities

    pub async fn can_slew_alt_az_async(&self) -> Result<bool, String> {
        self.client.get("canslewaltazasync").await
    }

    // Movement

    /// Abort any slew in progress
    pub async fn abort_slew(&self) -> Result<(), String> {
        self.client.put("abortslew", &[]).await
    }

    /// Slew to alt-az coordinates (async - starts slew and returns immediately)
    pub async fn slew_to_alt_az_async(&self, alt: f64, az: f64) -> Result<(), String> {
        self.client
            .put("slewtoaltazasync", &[("Altitude", &alt.to_string()), ("Azimuth", &az.to_string())])
            .await
    }

    /// Get site information in a single parallel query
    pub async fn get_site_info(&self) -> Result<TelescopeSiteInfo, String> {
        let (site_latitude, site_longitude, site_elevation) = futures::try_join!(
            self.site_latitude(),
            self.site_longitude(),
            self.site_elevation(),
        )?;

        Ok(TelescopeSiteInfo {
            site_latitude,
            site_longitude,
            site_elevation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_device_type() {
        let device = AlpacaDevice::new(AlpacaDeviceType::ObservingConditions, "http://localhost:11111", 0);
        assert!(matches!(
            AlpacaTelescope::new(&device),
            Err(AlpacaError::WrongDeviceType { .. })
        ));
    }

    #[test]
    fn test_telescope_endpoints() {
        let device = AlpacaDevice::new(AlpacaDeviceType::Telescope, "http://localhost:11111", 1);
        let telescope = AlpacaTelescope::new(&device).unwrap();
        assert_eq!(
            telescope.client.build_url("slewtoaltazasync"),
            "http://localhost:11111/api/v1/telescope/1/slewtoaltazasync"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error() {
        let telescope = AlpacaTelescope::with_config(
            &AlpacaDevice::new(AlpacaDeviceType::Telescope, "http://127.0.0.1:9", 0),
            TimeoutConfig {
                quick_query_ms: 500,
                standard_operation_ms: 500,
                connect_ms: 500,
            },
            RetryConfig::no_retry(),
        )
        .unwrap();
        assert!(telescope.at_park().await.is_err());
    }
}
