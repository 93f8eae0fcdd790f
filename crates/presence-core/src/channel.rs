//! Messages flowing into and out of the engine
//!
//! - [`Command`]: app-lifecycle and user requests into the engine
//! - [`Effect`]: what the engine wants done (driver calls, timers, notifications)
//! - [`PresenceEvent`]: notifications for observers

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::{CharacteristicHandle, ServiceHandle};
use crate::sighting::Sighting;
use crate::types::PeerIdentifier;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests processed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the local identity value
    SetIdentity { username: String },
    StartAdvertising,
    StopAdvertising,
    StartScanning,
    StopScanning,
    /// The app moved to the background
    EnterBackground,
    /// The app returned to the foreground
    EnterForeground,
}

// ----------------------------------------------------------------------------
// Observer Events
// ----------------------------------------------------------------------------

/// Notifications delivered to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceEvent {
    ScanningStarted,
    ScanningStopped,
    SightingUpdated(Sighting),
}

// ----------------------------------------------------------------------------
// Effects
// ----------------------------------------------------------------------------

/// Side effects produced by the engine's state machines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PublishIdentity {
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    UpdateIdentity {
        characteristic: Uuid,
        value: Vec<u8>,
    },
    StartAdvertising {
        service: Uuid,
    },
    StopAdvertising,
    StartScan {
        service: Uuid,
    },
    StopScan,
    Connect {
        peer: PeerIdentifier,
    },
    DiscoverService {
        peer: PeerIdentifier,
        service: Uuid,
    },
    DiscoverCharacteristics {
        peer: PeerIdentifier,
        service: ServiceHandle,
    },
    ReadValue {
        peer: PeerIdentifier,
        characteristic: CharacteristicHandle,
    },
    Disconnect {
        peer: PeerIdentifier,
    },
    /// Arm (or re-arm) the repeating duty-cycle timer
    ArmScanTimer {
        period: Duration,
    },
    DisarmScanTimer,
    Notify(PresenceEvent),
}

impl Effect {
    /// Peer targeted by a per-peer driver command
    pub fn peer(&self) -> Option<&PeerIdentifier> {
        match self {
            Effect::Connect { peer }
            | Effect::DiscoverService { peer, .. }
            | Effect::DiscoverCharacteristics { peer, .. }
            | Effect::ReadValue { peer, .. }
            | Effect::Disconnect { peer } => Some(peer),
            _ => None,
        }
    }

    /// Whether the effect is executed by the radio driver
    pub fn is_driver_command(&self) -> bool {
        !matches!(
            self,
            Effect::ArmScanTimer { .. } | Effect::DisarmScanTimer | Effect::Notify(_)
        )
    }
}
