//! Error types for the skyflats bridge
//!
//! Covers the host side of the system: loading settings, initializing logging
//! and connecting to Alpaca devices.

use skyflats_alpaca::AlpacaError;
use skyflats_sequencer::SkyflatsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to read settings {path}: {reason}")]
    SettingsRead { path: PathBuf, reason: String },

    #[error("Failed to write settings {path}: {reason}")]
    SettingsWrite { path: PathBuf, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SkyflatsError),

    #[error("Alpaca error: {0}")]
    Alpaca(#[from] AlpacaError),

    #[error("Device connection failed: {device_id} - {reason}")]
    ConnectionFailed { device_id: String, reason: String },

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
