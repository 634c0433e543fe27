//! Alpaca HTTP Client

use crate::{AlpacaDevice, AlpacaDeviceType, ALPACA_API_VERSION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Client ID sent with every Alpaca call
const CLIENT_ID: u32 = 1;
static TRANSACTION_ID: AtomicU32 = AtomicU32::new(0);

/// Alpaca-specific error types
#[derive(Debug, Error)]
pub enum AlpacaError {
    #[error("Connection timeout after {duration_ms}ms during {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Connection refused: {url} - {cause}")]
    ConnectionRefused { url: String, cause: String },

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("Device error {code}: {message}")]
    DeviceError { code: i32, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Wrong device type: expected {expected}, got {actual}")]
    WrongDeviceType {
        expected: AlpacaDeviceType,
        actual: AlpacaDeviceType,
    },

    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl AlpacaError {
    /// Create a timeout error with operation context
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        AlpacaError::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AlpacaError::Timeout { .. } => true,
            AlpacaError::ConnectionRefused { .. } => true,
            AlpacaError::HttpError { status, .. } => {
                // Retry on 5xx server errors and 429 rate limiting
                *status >= 500 || *status == 429
            }
            AlpacaError::RequestFailed(_) => true,
            // Don't retry device errors, parse errors, configuration mistakes
            AlpacaError::DeviceError { .. } => false,
            AlpacaError::ParseError(_) => false,
            AlpacaError::OperationFailed(_) => false,
            AlpacaError::WrongDeviceType { .. } => false,
            AlpacaError::RetryExhausted { .. } => false,
        }
    }
}

impl From<reqwest::Error> for AlpacaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AlpacaError::Timeout {
                operation: "HTTP request".to_string(),
                duration_ms: TimeoutConfig::default().standard_operation_ms,
            }
        } else if err.is_connect() {
            let url = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            AlpacaError::ConnectionRefused {
                url,
                cause: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            AlpacaError::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            AlpacaError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AlpacaError {
    fn from(err: serde_json::Error) -> Self {
        AlpacaError::ParseError(err.to_string())
    }
}

/// Client id and a fresh transaction id for the next request
pub fn get_client_transaction() -> (u32, u32) {
    (CLIENT_ID, TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
}

/// Timeout configuration for different operation types
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for quick status queries (e.g., at_park, slewing, sky quality)
    pub quick_query_ms: u64,
    /// Timeout for standard operations (e.g., starting an async slew)
    pub standard_operation_ms: u64,
    /// Connection timeout
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quick_query_ms: 5000,         // 5 seconds for quick queries
            standard_operation_ms: 30000, // 30 seconds for standard operations
            connect_ms: 10000,            // 10 seconds for initial connection
        }
    }
}

impl TimeoutConfig {
    /// Create timeout config for telescope/mount operations
    pub fn for_telescope() -> Self {
        Self {
            quick_query_ms: 5000,
            standard_operation_ms: 60000, // 1 minute for slew and abort commands
            connect_ms: 15000,
        }
    }

    /// Create timeout config for observing conditions devices
    /// Weather stations answer from cached values and should be fast
    pub fn for_observing_conditions() -> Self {
        Self {
            quick_query_ms: 3000,
            standard_operation_ms: 15000,
            connect_ms: 10000,
        }
    }
}

/// Retry configuration for failed requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to retry delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.use_jitter {
            // Add +/- 25% jitter
            let jitter_factor = 0.75 + (rand_simple() * 0.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Simple pseudo-random number generator for jitter (0.0 to 1.0)
fn rand_simple() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos as f64 / u32::MAX as f64).fract()
}

/// Alpaca API response wrapper
///
/// Method calls (PUT) carry no `Value`, so it defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlpacaResponse<T: Default> {
    #[serde(default)]
    pub value: T,
    #[serde(rename = "ClientTransactionID", default)]
    pub client_transaction_id: u32,
    #[serde(rename = "ServerTransactionID", default)]
    pub server_transaction_id: u32,
    #[serde(default)]
    pub error_number: i32,
    #[serde(default)]
    pub error_message: String,
}

impl<T: Default> AlpacaResponse<T> {
    /// Value of a successful response, or the device error it reports
    pub fn into_result(self) -> Result<T, AlpacaError> {
        if self.error_number != 0 {
            return Err(AlpacaError::DeviceError {
                code: self.error_number,
                message: self.error_message,
            });
        }
        Ok(self.value)
    }
}

/// Decode an Alpaca JSON body into its value
pub fn decode_response<T: DeserializeOwned + Default>(body: &str) -> Result<T, AlpacaError> {
    let response: AlpacaResponse<T> = serde_json::from_str(body)?;
    response.into_result()
}

/// Alpaca client for communicating with a device
pub struct AlpacaClient {
    http_client: Client,
    quick_client: Client,
    base_url: String,
    device_type: AlpacaDeviceType,
    device_number: u32,
    timeout_config: TimeoutConfig,
    retry_config: RetryConfig,
}

impl AlpacaClient {
    /// Create a new Alpaca client for a device with default configuration
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Self::with_config(device, TimeoutConfig::default(), RetryConfig::default())
    }

    /// Create a new Alpaca client with custom timeout and retry configuration
    pub fn with_config(
        device: &AlpacaDevice,
        timeout_config: TimeoutConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, AlpacaError> {
        let build = |timeout_ms: u64| {
            Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .connect_timeout(Duration::from_millis(timeout_config.connect_ms))
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| AlpacaError::RequestFailed(format!("Failed to create HTTP client: {}", e)))
        };
        let http_client = build(timeout_config.standard_operation_ms)?;
        let quick_client = build(timeout_config.quick_query_ms)?;

        Ok(Self {
            http_client,
            quick_client,
            base_url: device.base_url.trim_end_matches('/').to_string(),
            device_type: device.device_type,
            device_number: device.device_number,
            timeout_config,
            retry_config,
        })
    }

    /// Build the URL for an API endpoint
    pub(crate) fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/v{}/{}/{}/{}",
            self.base_url,
            ALPACA_API_VERSION,
            self.device_type.as_str(),
            self.device_number,
            endpoint
        )
    }

    /// Execute a request with retry logic
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, AlpacaError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AlpacaError>>,
    {
        let mut last_error = AlpacaError::OperationFailed("No attempts made".to_string());

        for attempt in 0..self.retry_config.max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = e;

                    if !last_error.is_retryable() {
                        return Err(last_error);
                    }

                    // If not the last attempt, wait before retrying
                    if attempt + 1 < self.retry_config.max_attempts {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        debug!(
                            "Request failed (attempt {}/{}), retrying in {:?}: {}",
                            attempt + 1,
                            self.retry_config.max_attempts,
                            delay,
                            last_error
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AlpacaError::RetryExhausted {
            attempts: self.retry_config.max_attempts,
            last_error: last_error.to_string(),
        })
    }

    async fn read_response<T: DeserializeOwned + Default>(response: reqwest::Response) -> Result<T, AlpacaError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AlpacaError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }
        decode_response(&body)
    }

    async fn send_get<T: DeserializeOwned + Default>(&self, client: &Client, endpoint: &str) -> Result<T, AlpacaError> {
        let (client_id, transaction_id) = get_client_transaction();
        let url = self.build_url(endpoint);
        let separator = if url.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}ClientID={}&ClientTransactionID={}",
            url, separator, client_id, transaction_id
        );
        let response = client.get(&url).send().await?;
        Self::read_response(response).await
    }

    /// Make a GET request with typed error handling
    pub async fn get_typed<T: DeserializeOwned + Default>(&self, endpoint: &str) -> Result<T, AlpacaError> {
        self.execute_with_retry(|| self.send_get(&self.http_client, endpoint))
            .await
    }

    /// Make a GET request (String errors, for the device ops layer)
    pub async fn get<T: DeserializeOwned + Default>(&self, endpoint: &str) -> Result<T, String> {
        self.get_typed(endpoint).await.map_err(|e| e.to_string())
    }

    /// Make a quick GET request with shorter timeout (no retry)
    pub async fn get_quick<T: DeserializeOwned + Default>(&self, endpoint: &str) -> Result<T, AlpacaError> {
        self.send_get(&self.quick_client, endpoint).await.map_err(|e| match e {
            AlpacaError::Timeout { .. } => AlpacaError::timeout(endpoint, self.timeout_config.quick_query_ms),
            other => other,
        })
    }

    /// Make a PUT request with typed error handling
    pub async fn put_typed<T: DeserializeOwned + Default>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AlpacaError> {
        self.execute_with_retry(|| async move {
            let (client_id, transaction_id) = get_client_transaction();
            let url = self.build_url(endpoint);

            let mut form_params: Vec<(&str, String)> = vec![
                ("ClientID", client_id.to_string()),
                ("ClientTransactionID", transaction_id.to_string()),
            ];
            for (key, value) in params {
                form_params.push((*key, value.to_string()));
            }

            let response = self.http_client.put(&url).form(&form_params).send().await?;
            Self::read_response(response).await
        })
        .await
    }

    /// Make a PUT request (String errors, for the device ops layer)
    pub async fn put<T: DeserializeOwned + Default>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T, String> {
        self.put_typed(endpoint, params).await.map_err(|e| e.to_string())
    }

    // Common device properties

    /// Connect to the device
    pub async fn connect(&self) -> Result<(), String> {
        self.put::<()>("connected", &[("Connected", "true")]).await
    }

    /// Disconnect from the device
    pub async fn disconnect(&self) -> Result<(), String> {
        self.put::<()>("connected", &[("Connected", "false")]).await
    }

    /// Get the device name
    pub async fn get_name(&self) -> Result<String, String> {
        self.get("name").await
    }
}
