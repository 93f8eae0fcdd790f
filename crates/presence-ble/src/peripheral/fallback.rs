//! Fallback peripheral for platforms without a supported GATT server

use tracing::warn;
use uuid::Uuid;

use crate::config::BleDriverConfig;
use crate::error::{BleDriverError, BleResult};

use super::IdentityPeripheral;

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Keeps the published value in memory; nothing is put on the air
#[derive(Debug, Default)]
pub struct FallbackPeripheral {
    published: Option<(Uuid, Vec<u8>)>,
}

impl FallbackPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value currently held for the published characteristic
    pub fn value(&self) -> Option<&[u8]> {
        self.published.as_ref().map(|(_, value)| value.as_slice())
    }
}

#[async_trait::async_trait]
impl IdentityPeripheral for FallbackPeripheral {
    async fn initialize(&mut self, _config: &BleDriverConfig) -> BleResult<()> {
        warn!(
            "BLE peripheral role not supported on this platform. \
            This device will scan for peers but will not be discoverable."
        );
        Ok(())
    }

    async fn publish(
        &mut self,
        _service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> BleResult<()> {
        self.published = Some((characteristic, value));
        Ok(())
    }

    async fn update_value(&mut self, characteristic: Uuid, value: Vec<u8>) -> BleResult<()> {
        match self.published.as_mut() {
            Some((uuid, current)) if *uuid == characteristic => {
                *current = value;
                Ok(())
            }
            Some(_) => Err(BleDriverError::CharacteristicNotFound {
                characteristic: characteristic.to_string(),
            }),
            None => Err(BleDriverError::NotPublished),
        }
    }

    async fn start_advertising(
        &mut self,
        _service: Uuid,
        _local_name: Option<&str>,
    ) -> BleResult<()> {
        warn!("BLE advertising not supported on this platform, peers will not see this device");
        Ok(())
    }

    async fn stop_advertising(&mut self) -> BleResult<()> {
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::{IDENTITY_CHARACTERISTIC_UUID, IDENTITY_SERVICE_UUID};

    #[tokio::test]
    async fn test_update_requires_published_characteristic() {
        let mut peripheral = FallbackPeripheral::new();
        let err = peripheral
            .update_value(IDENTITY_CHARACTERISTIC_UUID, b"alice".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, BleDriverError::NotPublished));

        peripheral
            .publish(
                IDENTITY_SERVICE_UUID,
                IDENTITY_CHARACTERISTIC_UUID,
                b"alice".to_vec(),
            )
            .await
            .unwrap();
        peripheral
            .update_value(IDENTITY_CHARACTERISTIC_UUID, b"alicia".to_vec())
            .await
            .unwrap();
        assert_eq!(peripheral.value(), Some(&b"alicia"[..]));

        let err = peripheral
            .update_value(IDENTITY_SERVICE_UUID, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BleDriverError::CharacteristicNotFound { .. }));
    }

    #[tokio::test]
    async fn test_never_reports_advertising() {
        let mut peripheral = FallbackPeripheral::new();
        peripheral
            .start_advertising(IDENTITY_SERVICE_UUID, Some("presence"))
            .await
            .unwrap();
        assert!(!peripheral.is_advertising());
    }
}
