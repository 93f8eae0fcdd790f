//! Peripheral role: the GATT identity service and its advertisement
//!
//! btleplug only covers the central side, so the peripheral role is
//! implemented per platform. Linux serves the service through BlueZ; other
//! platforms get a fallback that keeps the value locally and is never seen
//! by remote centrals.

pub mod fallback;
#[cfg(target_os = "linux")]
pub mod linux;

use uuid::Uuid;

use crate::config::BleDriverConfig;
use crate::error::BleResult;

// ----------------------------------------------------------------------------
// Cross-platform Peripheral Trait
// ----------------------------------------------------------------------------

/// Local GATT server holding a single readable identity characteristic
#[async_trait::async_trait]
pub trait IdentityPeripheral: Send + Sync {
    /// Acquire the adapter; the role is ready once this succeeds
    async fn initialize(&mut self, config: &BleDriverConfig) -> BleResult<()>;

    /// Register `service` with one readable `characteristic`, replacing any
    /// previously published service
    async fn publish(&mut self, service: Uuid, characteristic: Uuid, value: Vec<u8>)
        -> BleResult<()>;

    /// Replace the value served by an already published characteristic
    async fn update_value(&mut self, characteristic: Uuid, value: Vec<u8>) -> BleResult<()>;

    async fn start_advertising(&mut self, service: Uuid, local_name: Option<&str>)
        -> BleResult<()>;

    async fn stop_advertising(&mut self) -> BleResult<()>;

    fn is_advertising(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Platform Detection
// ----------------------------------------------------------------------------

/// Peripheral implementation for the current platform
pub enum PlatformPeripheral {
    #[cfg(target_os = "linux")]
    Linux(linux::LinuxPeripheral),
    #[allow(dead_code)]
    Fallback(fallback::FallbackPeripheral),
}

impl PlatformPeripheral {
    pub fn new() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::Linux(linux::LinuxPeripheral::new())
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::Fallback(fallback::FallbackPeripheral::new())
        }
    }
}

impl Default for PlatformPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityPeripheral for PlatformPeripheral {
    async fn initialize(&mut self, config: &BleDriverConfig) -> BleResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(ref mut peripheral) => peripheral.initialize(config).await,
            Self::Fallback(ref mut peripheral) => peripheral.initialize(config).await,
        }
    }

    async fn publish(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> BleResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(ref mut peripheral) => {
                peripheral.publish(service, characteristic, value).await
            }
            Self::Fallback(ref mut peripheral) => {
                peripheral.publish(service, characteristic, value).await
            }
        }
    }

    async fn update_value(&mut self, characteristic: Uuid, value: Vec<u8>) -> BleResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(ref mut peripheral) => peripheral.update_value(characteristic, value).await,
            Self::Fallback(ref mut peripheral) => {
                peripheral.update_value(characteristic, value).await
            }
        }
    }

    async fn start_advertising(
        &mut self,
        service: Uuid,
        local_name: Option<&str>,
    ) -> BleResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(ref mut peripheral) => {
                peripheral.start_advertising(service, local_name).await
            }
            Self::Fallback(ref mut peripheral) => {
                peripheral.start_advertising(service, local_name).await
            }
        }
    }

    async fn stop_advertising(&mut self) -> BleResult<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(ref mut peripheral) => peripheral.stop_advertising().await,
            Self::Fallback(ref mut peripheral) => peripheral.stop_advertising().await,
        }
    }

    fn is_advertising(&self) -> bool {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(ref peripheral) => peripheral.is_advertising(),
            Self::Fallback(ref peripheral) => peripheral.is_advertising(),
        }
    }
}
