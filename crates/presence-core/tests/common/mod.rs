//! Test utilities: an in-memory radio for driving presence engines
//!
//! Every [`MockDriver`] attached to the same [`Air`] can read the identity
//! values the others publish. A [`MockPeer`] handle pairs the radio
//! identifier with the device it reaches, so identifier rotation can be
//! simulated.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use presence_core::{
    driver_event_channel, CharacteristicHandle, DriverEvent, DriverEventReceiver,
    DriverEventSender, PeerIdentifier, PresenceEvent, PresenceEventReceiver, PresenceResult,
    RadioDriver, ServiceHandle, IDENTITY_CHARACTERISTIC_UUID, IDENTITY_SERVICE_UUID,
};
use tokio::time::timeout;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Shared Air
// ----------------------------------------------------------------------------

/// Identity values currently published, keyed by device name
#[derive(Debug, Clone, Default)]
pub struct Air {
    published: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Air {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, device: &str, value: Vec<u8>) {
        self.published
            .lock()
            .unwrap()
            .insert(device.to_string(), value);
    }

    pub fn value(&self, device: &str) -> Option<Vec<u8>> {
        self.published.lock().unwrap().get(device).cloned()
    }
}

// ----------------------------------------------------------------------------
// Mock Driver
// ----------------------------------------------------------------------------

/// Peer handle: radio identifier plus the device it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPeer {
    pub identifier: PeerIdentifier,
    pub device: String,
}

/// A driver call as observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    PublishService { service: Uuid, value: Vec<u8> },
    UpdateValue { value: Vec<u8> },
    StartAdvertising(Uuid),
    StopAdvertising,
    StartScan(Uuid),
    StopScan,
    Connect(String),
    DiscoverService(String),
    DiscoverCharacteristics(String),
    ReadValue(String),
    Disconnect(String),
}

#[derive(Debug, Default)]
struct Behavior {
    refuse_connect: HashSet<String>,
    stall_connect: HashSet<String>,
}

/// In-memory radio that answers every request through the event channel
pub struct MockDriver {
    name: String,
    air: Air,
    events: DriverEventSender<MockPeer>,
    calls: Arc<Mutex<Vec<DriverCall>>>,
    behavior: Arc<Mutex<Behavior>>,
}

/// Test-side controls for a [`MockDriver`]
#[derive(Clone)]
pub struct MockControl {
    air: Air,
    events: DriverEventSender<MockPeer>,
    calls: Arc<Mutex<Vec<DriverCall>>>,
    behavior: Arc<Mutex<Behavior>>,
}

impl MockDriver {
    pub fn new(name: &str, air: Air) -> (Self, MockControl, DriverEventReceiver<MockPeer>) {
        let (events, receiver) = driver_event_channel(64);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let behavior = Arc::new(Mutex::new(Behavior::default()));
        let driver = Self {
            name: name.to_string(),
            air: air.clone(),
            events: events.clone(),
            calls: Arc::clone(&calls),
            behavior: Arc::clone(&behavior),
        };
        let control = MockControl {
            air,
            events,
            calls,
            behavior,
        };
        (driver, control, receiver)
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn emit(&self, event: DriverEvent<MockPeer>) {
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl RadioDriver for MockDriver {
    type Peer = MockPeer;

    async fn publish_service(
        &mut self,
        service: Uuid,
        _characteristic: Uuid,
        value: Vec<u8>,
    ) -> PresenceResult<()> {
        self.record(DriverCall::PublishService {
            service,
            value: value.clone(),
        });
        self.air.publish(&self.name, value);
        Ok(())
    }

    async fn update_value(&mut self, _characteristic: Uuid, value: Vec<u8>) -> PresenceResult<()> {
        self.record(DriverCall::UpdateValue {
            value: value.clone(),
        });
        self.air.publish(&self.name, value);
        Ok(())
    }

    async fn start_advertising(&mut self, service: Uuid) -> PresenceResult<()> {
        self.record(DriverCall::StartAdvertising(service));
        Ok(())
    }

    async fn stop_advertising(&mut self) -> PresenceResult<()> {
        self.record(DriverCall::StopAdvertising);
        Ok(())
    }

    async fn start_scan(&mut self, service: Uuid) -> PresenceResult<()> {
        self.record(DriverCall::StartScan(service));
        Ok(())
    }

    async fn stop_scan(&mut self) -> PresenceResult<()> {
        self.record(DriverCall::StopScan);
        Ok(())
    }

    async fn connect(&mut self, peer: &MockPeer) -> PresenceResult<()> {
        self.record(DriverCall::Connect(peer.identifier.to_string()));
        let (refused, stalled) = {
            let behavior = self.behavior.lock().unwrap();
            (
                behavior.refuse_connect.contains(&peer.device),
                behavior.stall_connect.contains(&peer.device),
            )
        };
        if stalled {
            return Ok(());
        }
        let id = peer.identifier.clone();
        if refused {
            self.emit(DriverEvent::ConnectFailed {
                peer: id,
                reason: "connection refused".into(),
            })
            .await;
        } else {
            self.emit(DriverEvent::Connected { peer: id }).await;
        }
        Ok(())
    }

    async fn discover_service(&mut self, peer: &MockPeer, service: Uuid) -> PresenceResult<()> {
        self.record(DriverCall::DiscoverService(peer.identifier.to_string()));
        let services = match self.air.value(&peer.device) {
            Some(_) => vec![ServiceHandle { uuid: service }],
            None => Vec::new(),
        };
        self.emit(DriverEvent::ServicesDiscovered {
            peer: peer.identifier.clone(),
            services,
        })
        .await;
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        peer: &MockPeer,
        service: &ServiceHandle,
    ) -> PresenceResult<()> {
        self.record(DriverCall::DiscoverCharacteristics(peer.identifier.to_string()));
        self.emit(DriverEvent::CharacteristicsDiscovered {
            peer: peer.identifier.clone(),
            characteristics: vec![CharacteristicHandle {
                service: service.uuid,
                uuid: IDENTITY_CHARACTERISTIC_UUID,
            }],
        })
        .await;
        Ok(())
    }

    async fn read_value(
        &mut self,
        peer: &MockPeer,
        _characteristic: &CharacteristicHandle,
    ) -> PresenceResult<()> {
        self.record(DriverCall::ReadValue(peer.identifier.to_string()));
        let id = peer.identifier.clone();
        match self.air.value(&peer.device) {
            Some(value) => self.emit(DriverEvent::ValueRead { peer: id, value }).await,
            None => {
                self.emit(DriverEvent::ReadFailed {
                    peer: id,
                    reason: "attribute not found".into(),
                })
                .await
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self, peer: &MockPeer) -> PresenceResult<()> {
        self.record(DriverCall::Disconnect(peer.identifier.to_string()));
        self.emit(DriverEvent::Disconnected {
            peer: peer.identifier.clone(),
        })
        .await;
        Ok(())
    }
}

impl MockControl {
    pub async fn send(&self, event: DriverEvent<MockPeer>) {
        self.events.send(event).await.expect("engine event channel open");
    }

    pub async fn roles_ready(&self) {
        self.send(DriverEvent::OutboundReady).await;
        self.send(DriverEvent::InboundReady).await;
    }

    /// Deliver an advertisement from `device`, whose identifier is the device name
    pub async fn discover(&self, device: &str, signal_strength: i16) {
        self.discover_as(device, device, signal_strength).await;
    }

    /// Deliver an advertisement from `device` under a different radio identifier
    pub async fn discover_as(&self, identifier: &str, device: &str, signal_strength: i16) {
        let identifier = PeerIdentifier::from(identifier);
        self.send(DriverEvent::Discovered {
            peer: identifier.clone(),
            handle: MockPeer {
                identifier,
                device: device.to_string(),
            },
            signal_strength,
        })
        .await;
    }

    pub fn refuse_connect(&self, device: &str, refuse: bool) {
        let mut behavior = self.behavior.lock().unwrap();
        if refuse {
            behavior.refuse_connect.insert(device.to_string());
        } else {
            behavior.refuse_connect.remove(device);
        }
    }

    pub fn stall_connect(&self, device: &str) {
        self.behavior
            .lock()
            .unwrap()
            .stall_connect
            .insert(device.to_string());
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn air(&self) -> &Air {
        &self.air
    }
}

// ----------------------------------------------------------------------------
// Observer Helpers
// ----------------------------------------------------------------------------

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Next observer event, failing the test if none arrives in time
pub async fn next_event(observer: &mut PresenceEventReceiver) -> PresenceEvent {
    timeout(EVENT_TIMEOUT, observer.recv())
        .await
        .expect("observer event should arrive")
        .expect("observer channel open")
}

/// Skip events until a sighting update matching `predicate` arrives
pub async fn wait_for_sighting(
    observer: &mut PresenceEventReceiver,
    predicate: impl Fn(&presence_core::Sighting) -> bool,
) -> presence_core::Sighting {
    loop {
        if let PresenceEvent::SightingUpdated(sighting) = next_event(observer).await {
            if predicate(&sighting) {
                return sighting;
            }
        }
    }
}

/// Assert that nothing is delivered for `duration`
pub async fn assert_quiet(observer: &mut PresenceEventReceiver, duration: Duration) {
    if let Ok(event) = timeout(duration, observer.recv()).await {
        panic!("Expected no observer event, got {:?}", event);
    }
}

/// Poll `condition` until it holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    timeout(EVENT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should become true");
}

pub fn identity_service() -> Uuid {
    IDENTITY_SERVICE_UUID
}
