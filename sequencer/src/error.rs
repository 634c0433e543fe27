//! Error types for the skyflats sequencer
//!
//! Device operations report failures as plain strings (see [`crate::device_ops::DeviceResult`]).
//! Those strings are mapped into [`SkyflatsError`] at the edge of the core so that callers
//! can tell a parked mount apart from a broken sensor or a failed ephemeris computation.

use thiserror::Error;

/// Errors produced by null point computation and brightness gating
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkyflatsError {
    /// An instruction precondition was not met (e.g. the mount is parked)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Solar ephemeris or coordinate transform could not produce a result
    #[error("Computation unavailable: {0}")]
    ComputationUnavailable(String),

    /// The sky quality reading could not be obtained
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// Configuration value rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Mount slew command or slew completion failed
    #[error("Slew failed: {0}")]
    SlewFailed(String),
}

impl SkyflatsError {
    /// Recovery code the host UI can use to offer recovery options
    pub fn recovery_code(&self) -> &'static str {
        match self {
            SkyflatsError::PreconditionFailed(_) => "MOUNT_PARKED",
            SkyflatsError::ComputationUnavailable(_) => "EPHEMERIS_UNAVAILABLE",
            SkyflatsError::SensorUnavailable(_) => "SQM_UNAVAILABLE",
            SkyflatsError::InvalidConfig(_) => "INVALID_CONFIG",
            SkyflatsError::SlewFailed(_) => "SLEW_FAILED",
        }
    }
}

/// Result alias used throughout the sequencer core
pub type SkyflatsResult<T> = Result<T, SkyflatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SkyflatsError::SensorUnavailable("timeout".to_string());
        assert_eq!(err.to_string(), "Sensor unavailable: timeout");
    }

    #[test]
    fn test_recovery_codes() {
        assert_eq!(
            SkyflatsError::PreconditionFailed("parked".into()).recovery_code(),
            "MOUNT_PARKED"
        );
        assert_eq!(
            SkyflatsError::SensorUnavailable("x".into()).recovery_code(),
            "SQM_UNAVAILABLE"
        );
    }
}
