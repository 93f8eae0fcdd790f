//! Bluetooth Low Energy radio driver for the presence engine
//!
//! This crate implements [`presence_core::RadioDriver`] on a real adapter so
//! that a [`presence_core::PresenceEngine`] can advertise its identity and
//! discover nearby peers.
//!
//! ## Architecture
//!
//! - [`config`] - Driver configuration
//! - [`error`] - Error types specific to the driver
//! - [`central`] - Scanning and the identity read handshake (btleplug)
//! - [`peripheral`] - GATT identity service and advertising (bluer on Linux)
//! - [`driver`] - The [`RadioDriver`](presence_core::RadioDriver) implementation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use presence_ble::{BleDriverConfig, BleRadioDriver};
//! use presence_core::{PresenceConfig, PresenceEngineBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (driver, events) = BleRadioDriver::start(BleDriverConfig::new()).await?;
//! let (_task, handle, mut observer) = PresenceEngineBuilder::new(driver, events)
//!     .with_config(PresenceConfig::default())
//!     .with_identity("alice")
//!     .spawn()?;
//!
//! handle.start_advertising().await?;
//! handle.start_scanning().await?;
//! while let Some(event) = observer.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! - **Linux**: Both roles, the peripheral through BlueZ
//! - **Other platforms**: Scanning only; the device is not discoverable

pub mod central;
pub mod config;
pub mod driver;
pub mod error;
pub mod peripheral;

pub use central::{peer_identifier, BleCentral};
pub use config::BleDriverConfig;
pub use driver::BleRadioDriver;
pub use error::{BleDriverError, BleResult};
pub use peripheral::{IdentityPeripheral, PlatformPeripheral};
