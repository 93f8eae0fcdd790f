//! Error types for the BLE driver

use presence_core::PresenceError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE driver
#[derive(Error, Debug)]
pub enum BleDriverError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[cfg(target_os = "linux")]
    #[error("BlueZ error: {0}")]
    BlueZ(#[from] bluer::Error),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Identity service has not been published")]
    NotPublished,

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },
}

impl From<BleDriverError> for PresenceError {
    fn from(err: BleDriverError) -> Self {
        match err {
            BleDriverError::AdapterNotAvailable => {
                PresenceError::TransportUnavailable { role: "adapter" }
            }
            other => PresenceError::Driver(other.to_string()),
        }
    }
}

/// Result type for BLE driver operations
pub type BleResult<T> = core::result::Result<T, BleDriverError>;
