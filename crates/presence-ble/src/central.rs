//! Central role: scanning and the identity read handshake via btleplug
//!
//! Every operation is started on its own task and reports back through the
//! driver event channel, so a slow connect never stalls the engine loop.

use std::future::Future;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use presence_core::{
    CharacteristicHandle, DriverEvent, DriverEventSender, PeerIdentifier, ServiceHandle,
    IDENTITY_SERVICE_UUID,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BleDriverConfig;
use crate::error::{BleDriverError, BleResult};

/// Radio identifier for a btleplug peripheral
pub fn peer_identifier(id: &PeripheralId) -> PeerIdentifier {
    PeerIdentifier::new(format!("{:?}", id))
}

// ----------------------------------------------------------------------------
// Central Implementation
// ----------------------------------------------------------------------------

/// Scanner and GATT client
pub struct BleCentral {
    config: BleDriverConfig,
    adapter: Adapter,
    events: DriverEventSender<Peripheral>,
}

impl BleCentral {
    /// Open the configured adapter
    pub async fn initialize(
        config: BleDriverConfig,
        events: DriverEventSender<Peripheral>,
    ) -> BleResult<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleDriverError::AdapterNotAvailable)?;

        match adapter.adapter_info().await {
            Ok(info) => info!("BLE adapter initialized: {}", info),
            Err(e) => debug!("BLE adapter initialized, no adapter info: {}", e),
        }

        Ok(Self {
            config,
            adapter,
            events,
        })
    }

    /// Forward adapter events to the engine until it goes away
    pub async fn spawn_event_pump(&self) -> BleResult<JoinHandle<()>> {
        let mut stream = self
            .adapter
            .events()
            .await
            .map_err(|e| BleDriverError::EventStreamFailed(e.to_string()))?;
        let adapter = self.adapter.clone();
        let events = self.events.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(event) = translate(&adapter, event).await else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    debug!("Engine gone, stopping adapter event pump");
                    break;
                }
            }
        }))
    }

    pub async fn start_scan(&self, service: Uuid) -> BleResult<()> {
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;
        debug!("BLE scan started for {}", service);
        Ok(())
    }

    pub async fn stop_scan(&self) -> BleResult<()> {
        self.adapter.stop_scan().await?;
        debug!("BLE scan stopped");
        Ok(())
    }

    pub fn connect(&self, peripheral: &Peripheral) {
        let peripheral = peripheral.clone();
        let limit = self.config.connect_timeout;
        self.spawn_op(async move {
            let peer = peer_identifier(&peripheral.id());
            match timeout(limit, peripheral.connect()).await {
                Ok(Ok(())) => DriverEvent::Connected { peer },
                Ok(Err(e)) => DriverEvent::ConnectFailed {
                    peer,
                    reason: e.to_string(),
                },
                Err(_) => {
                    // Cancel the pending connection
                    let _ = peripheral.disconnect().await;
                    DriverEvent::ConnectFailed {
                        peer,
                        reason: format!("connection timed out after {:?}", limit),
                    }
                }
            }
        });
    }

    /// Discover services and keep only `service`
    pub fn discover_service(&self, peripheral: &Peripheral, service: Uuid) {
        let peripheral = peripheral.clone();
        self.spawn_op(async move {
            let peer = peer_identifier(&peripheral.id());
            match peripheral.discover_services().await {
                Ok(()) => DriverEvent::ServicesDiscovered {
                    peer,
                    services: peripheral
                        .services()
                        .into_iter()
                        .filter(|s| s.uuid == service)
                        .map(|s| ServiceHandle { uuid: s.uuid })
                        .collect(),
                },
                Err(e) => DriverEvent::ServiceDiscoveryFailed {
                    peer,
                    reason: e.to_string(),
                },
            }
        });
    }

    /// List the characteristics of an already discovered service
    pub fn discover_characteristics(&self, peripheral: &Peripheral, service: &ServiceHandle) {
        let peripheral = peripheral.clone();
        let service = service.uuid;
        self.spawn_op(async move {
            let characteristics: Vec<CharacteristicHandle> = peripheral
                .services()
                .into_iter()
                .filter(|s| s.uuid == service)
                .flat_map(|s| s.characteristics.into_iter())
                .map(|c| CharacteristicHandle {
                    service: c.service_uuid,
                    uuid: c.uuid,
                })
                .collect();
            DriverEvent::CharacteristicsDiscovered {
                peer: peer_identifier(&peripheral.id()),
                characteristics,
            }
        });
    }

    pub fn read_value(&self, peripheral: &Peripheral, characteristic: &CharacteristicHandle) {
        let peripheral = peripheral.clone();
        let target = characteristic.clone();
        self.spawn_op(async move {
            let peer = peer_identifier(&peripheral.id());
            let found = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == target.uuid && c.service_uuid == target.service);
            let Some(characteristic) = found else {
                return DriverEvent::ReadFailed {
                    peer,
                    reason: BleDriverError::CharacteristicNotFound {
                        characteristic: target.uuid.to_string(),
                    }
                    .to_string(),
                };
            };
            match peripheral.read(&characteristic).await {
                Ok(value) => DriverEvent::ValueRead { peer, value },
                Err(e) => DriverEvent::ReadFailed {
                    peer,
                    reason: e.to_string(),
                },
            }
        });
    }

    /// Request a disconnect; completion arrives as an adapter event
    pub fn disconnect(&self, peripheral: &Peripheral) {
        let peripheral = peripheral.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let peer = peer_identifier(&peripheral.id());
            if let Err(e) = peripheral.disconnect().await {
                // No adapter event will follow a failed disconnect
                debug!("Disconnect from {} failed: {}", peer, e);
                let _ = events.send(DriverEvent::Disconnected { peer }).await;
            }
        });
    }

    fn spawn_op<F>(&self, op: F)
    where
        F: Future<Output = DriverEvent<Peripheral>> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = op.await;
            if events.send(event).await.is_err() {
                warn!("Engine gone, dropping BLE operation result");
            }
        });
    }
}

/// Map an adapter event onto the engine's driver events
async fn translate(adapter: &Adapter, event: CentralEvent) -> Option<DriverEvent<Peripheral>> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let peripheral = adapter.peripheral(&id).await.ok()?;
            let properties = peripheral.properties().await.ok()??;
            if !properties.services.contains(&IDENTITY_SERVICE_UUID) {
                return None;
            }
            let signal_strength = properties.rssi?;
            Some(DriverEvent::Discovered {
                peer: peer_identifier(&id),
                handle: peripheral,
                signal_strength,
            })
        }
        CentralEvent::DeviceDisconnected(id) => Some(DriverEvent::Disconnected {
            peer: peer_identifier(&id),
        }),
        _ => None,
    }
}
