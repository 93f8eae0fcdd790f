//! [`RadioDriver`] implementation over a real Bluetooth LE adapter

use async_trait::async_trait;
use btleplug::platform::Peripheral;
use presence_core::{
    driver_event_channel, CharacteristicHandle, DriverEvent, DriverEventReceiver,
    PresenceResult, RadioDriver, ServiceHandle,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::central::BleCentral;
use crate::config::BleDriverConfig;
use crate::error::BleResult;
use crate::peripheral::{IdentityPeripheral, PlatformPeripheral};

// ----------------------------------------------------------------------------
// BLE Radio Driver
// ----------------------------------------------------------------------------

/// Both radio roles on one adapter
pub struct BleRadioDriver {
    config: BleDriverConfig,
    central: BleCentral,
    peripheral: PlatformPeripheral,
    event_pump: JoinHandle<()>,
}

impl BleRadioDriver {
    /// Bring up both roles and return the driver with its event stream
    ///
    /// The inbound role is required; failing to open the adapter is an
    /// error. A peripheral that cannot be initialized is only logged, and
    /// `OutboundReady` is then never reported, so advertising stays
    /// deferred.
    pub async fn start(
        config: BleDriverConfig,
    ) -> BleResult<(Self, DriverEventReceiver<Peripheral>)> {
        let (events, receiver) = driver_event_channel(config.event_capacity);

        let central = BleCentral::initialize(config.clone(), events.clone()).await?;
        let event_pump = central.spawn_event_pump().await?;
        // The receiver is still held here, so these sends cannot fail
        let _ = events.send(DriverEvent::InboundReady).await;

        let mut peripheral = PlatformPeripheral::new();
        match peripheral.initialize(&config).await {
            Ok(()) => {
                let _ = events.send(DriverEvent::OutboundReady).await;
            }
            Err(e) => warn!("Peripheral role unavailable, device will not be discoverable: {}", e),
        }

        info!("BLE radio driver started");
        Ok((
            Self {
                config,
                central,
                peripheral,
                event_pump,
            },
            receiver,
        ))
    }

    pub fn config(&self) -> &BleDriverConfig {
        &self.config
    }

    pub fn is_advertising(&self) -> bool {
        self.peripheral.is_advertising()
    }
}

impl Drop for BleRadioDriver {
    fn drop(&mut self) {
        self.event_pump.abort();
    }
}

#[async_trait]
impl RadioDriver for BleRadioDriver {
    type Peer = Peripheral;

    async fn publish_service(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> PresenceResult<()> {
        Ok(self
            .peripheral
            .publish(service, characteristic, value)
            .await?)
    }

    async fn update_value(&mut self, characteristic: Uuid, value: Vec<u8>) -> PresenceResult<()> {
        Ok(self.peripheral.update_value(characteristic, value).await?)
    }

    async fn start_advertising(&mut self, service: Uuid) -> PresenceResult<()> {
        let local_name = self.config.local_name.clone();
        Ok(self
            .peripheral
            .start_advertising(service, local_name.as_deref())
            .await?)
    }

    async fn stop_advertising(&mut self) -> PresenceResult<()> {
        Ok(self.peripheral.stop_advertising().await?)
    }

    async fn start_scan(&mut self, service: Uuid) -> PresenceResult<()> {
        Ok(self.central.start_scan(service).await?)
    }

    async fn stop_scan(&mut self) -> PresenceResult<()> {
        Ok(self.central.stop_scan().await?)
    }

    async fn connect(&mut self, peer: &Peripheral) -> PresenceResult<()> {
        self.central.connect(peer);
        Ok(())
    }

    async fn discover_service(&mut self, peer: &Peripheral, service: Uuid) -> PresenceResult<()> {
        self.central.discover_service(peer, service);
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        peer: &Peripheral,
        service: &ServiceHandle,
    ) -> PresenceResult<()> {
        self.central.discover_characteristics(peer, service);
        Ok(())
    }

    async fn read_value(
        &mut self,
        peer: &Peripheral,
        characteristic: &CharacteristicHandle,
    ) -> PresenceResult<()> {
        self.central.read_value(peer, characteristic);
        Ok(())
    }

    async fn disconnect(&mut self, peer: &Peripheral) -> PresenceResult<()> {
        self.central.disconnect(peer);
        Ok(())
    }
}
