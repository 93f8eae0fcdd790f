//! Abstract radio driver interface
//!
//! The engine issues commands through [`RadioDriver`]; every asynchronous
//! outcome (discoveries, connect results, discovery results, values,
//! disconnects, role readiness) comes back as a [`DriverEvent`] on a single
//! channel consumed by the engine task, which serializes them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::PresenceResult;
use crate::types::PeerIdentifier;

// ----------------------------------------------------------------------------
// Handles
// ----------------------------------------------------------------------------

/// A service discovered on a connected peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceHandle {
    pub uuid: Uuid,
}

/// A characteristic discovered on a peer's service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicHandle {
    pub service: Uuid,
    pub uuid: Uuid,
}

// ----------------------------------------------------------------------------
// Driver Events
// ----------------------------------------------------------------------------

/// Events delivered by the driver to the engine.
///
/// `P` is the driver's transport-level peer handle. The engine retains the
/// handle from `Discovered` for as long as a handshake needs it.
#[derive(Debug, Clone)]
pub enum DriverEvent<P> {
    /// Outbound (advertiser) role finished powering on
    OutboundReady,
    /// Inbound (scanner) role finished powering on
    InboundReady,
    /// The process resumed a previously active scan/advertise session
    SessionRestored,
    /// An advertisement for the identity service was received
    Discovered {
        peer: PeerIdentifier,
        handle: P,
        signal_strength: i16,
    },
    Connected {
        peer: PeerIdentifier,
    },
    ConnectFailed {
        peer: PeerIdentifier,
        reason: String,
    },
    ServicesDiscovered {
        peer: PeerIdentifier,
        services: Vec<ServiceHandle>,
    },
    ServiceDiscoveryFailed {
        peer: PeerIdentifier,
        reason: String,
    },
    CharacteristicsDiscovered {
        peer: PeerIdentifier,
        characteristics: Vec<CharacteristicHandle>,
    },
    CharacteristicDiscoveryFailed {
        peer: PeerIdentifier,
        reason: String,
    },
    ValueRead {
        peer: PeerIdentifier,
        value: Vec<u8>,
    },
    ReadFailed {
        peer: PeerIdentifier,
        reason: String,
    },
    /// Connection closed, whether requested or spontaneous
    Disconnected {
        peer: PeerIdentifier,
    },
    /// The identity service could not be registered
    PublishFailed {
        reason: String,
    },
    /// Advertising could not be started
    AdvertisingFailed {
        reason: String,
    },
}

impl<P> DriverEvent<P> {
    /// Peer this event concerns, if any
    pub fn peer(&self) -> Option<&PeerIdentifier> {
        match self {
            DriverEvent::Discovered { peer, .. }
            | DriverEvent::Connected { peer }
            | DriverEvent::ConnectFailed { peer, .. }
            | DriverEvent::ServicesDiscovered { peer, .. }
            | DriverEvent::ServiceDiscoveryFailed { peer, .. }
            | DriverEvent::CharacteristicsDiscovered { peer, .. }
            | DriverEvent::CharacteristicDiscoveryFailed { peer, .. }
            | DriverEvent::ValueRead { peer, .. }
            | DriverEvent::ReadFailed { peer, .. }
            | DriverEvent::Disconnected { peer } => Some(peer),
            DriverEvent::OutboundReady
            | DriverEvent::InboundReady
            | DriverEvent::SessionRestored
            | DriverEvent::PublishFailed { .. }
            | DriverEvent::AdvertisingFailed { .. } => None,
        }
    }

    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            DriverEvent::OutboundReady => "OutboundReady",
            DriverEvent::InboundReady => "InboundReady",
            DriverEvent::SessionRestored => "SessionRestored",
            DriverEvent::Discovered { .. } => "Discovered",
            DriverEvent::Connected { .. } => "Connected",
            DriverEvent::ConnectFailed { .. } => "ConnectFailed",
            DriverEvent::ServicesDiscovered { .. } => "ServicesDiscovered",
            DriverEvent::ServiceDiscoveryFailed { .. } => "ServiceDiscoveryFailed",
            DriverEvent::CharacteristicsDiscovered { .. } => "CharacteristicsDiscovered",
            DriverEvent::CharacteristicDiscoveryFailed { .. } => "CharacteristicDiscoveryFailed",
            DriverEvent::ValueRead { .. } => "ValueRead",
            DriverEvent::ReadFailed { .. } => "ReadFailed",
            DriverEvent::Disconnected { .. } => "Disconnected",
            DriverEvent::PublishFailed { .. } => "PublishFailed",
            DriverEvent::AdvertisingFailed { .. } => "AdvertisingFailed",
        }
    }
}

/// Sending half handed to drivers
pub type DriverEventSender<P> = mpsc::Sender<DriverEvent<P>>;
/// Receiving half consumed by the engine task
pub type DriverEventReceiver<P> = mpsc::Receiver<DriverEvent<P>>;

/// Create the channel a driver reports its events on
pub fn driver_event_channel<P>(capacity: usize) -> (DriverEventSender<P>, DriverEventReceiver<P>) {
    mpsc::channel(capacity)
}

// ----------------------------------------------------------------------------
// Driver Trait
// ----------------------------------------------------------------------------

/// Radio primitives the engine consumes.
///
/// Every method only *initiates* the operation. Peer-scoped outcomes are
/// reported later through the driver's [`DriverEventSender`]. An `Err` return
/// means the request could not even be submitted; the engine treats it like
/// the matching failure event.
#[async_trait]
pub trait RadioDriver: Send {
    /// Transport-level peer handle; must stay referenced while connected
    type Peer: Clone + Send + Sync + 'static;

    /// Register the identity service with one readable characteristic
    async fn publish_service(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> PresenceResult<()>;

    /// Replace the value of an already published characteristic
    async fn update_value(&mut self, characteristic: Uuid, value: Vec<u8>) -> PresenceResult<()>;

    /// Begin advertising the service identifier over the air
    async fn start_advertising(&mut self, service: Uuid) -> PresenceResult<()>;

    /// Cease advertising
    async fn stop_advertising(&mut self) -> PresenceResult<()>;

    /// Begin scanning for advertisers of `service`
    async fn start_scan(&mut self, service: Uuid) -> PresenceResult<()>;

    /// Stop scanning
    async fn stop_scan(&mut self) -> PresenceResult<()>;

    /// Connect to a discovered peer
    async fn connect(&mut self, peer: &Self::Peer) -> PresenceResult<()>;

    /// Discover `service` (only) on a connected peer
    async fn discover_service(&mut self, peer: &Self::Peer, service: Uuid) -> PresenceResult<()>;

    /// Discover all characteristics of a discovered service
    async fn discover_characteristics(
        &mut self,
        peer: &Self::Peer,
        service: &ServiceHandle,
    ) -> PresenceResult<()>;

    /// Read a characteristic's value
    async fn read_value(
        &mut self,
        peer: &Self::Peer,
        characteristic: &CharacteristicHandle,
    ) -> PresenceResult<()>;

    /// Disconnect from, or cancel a pending connection to, a peer
    async fn disconnect(&mut self, peer: &Self::Peer) -> PresenceResult<()>;
}
