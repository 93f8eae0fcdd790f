//! Peer identity handshake state machine
//!
//! Connect → discover identity service → discover characteristics → read
//! value → disconnect, as an explicit state value. Each transition consumes
//! the current state and yields the next state plus the driver effects to
//! issue, so every stage and its failure path can be driven in isolation.

use std::time::Duration;

use tracing::debug;

use crate::channel::Effect;
use crate::driver::{CharacteristicHandle, ServiceHandle};
use crate::errors::PresenceError;
use crate::protocol::{decode_identity, IDENTITY_SERVICE_UUID};
use crate::types::{PeerIdentifier, Timestamp};

// ----------------------------------------------------------------------------
// Handshake States
// ----------------------------------------------------------------------------

/// Stage of a single peer handshake
#[derive(Debug)]
pub enum HandshakeState {
    /// Advertisement seen, nothing issued yet
    Discovered,
    Connecting,
    DiscoveringService,
    DiscoveringCharacteristic { service: ServiceHandle },
    ReadingValue { characteristic: CharacteristicHandle },
    Done { username: String },
    Failed { error: PresenceError },
}

impl HandshakeState {
    /// Stage name for logging and audit
    pub fn stage_name(&self) -> &'static str {
        match self {
            HandshakeState::Discovered => "Discovered",
            HandshakeState::Connecting => "Connecting",
            HandshakeState::DiscoveringService => "DiscoveringService",
            HandshakeState::DiscoveringCharacteristic { .. } => "DiscoveringCharacteristic",
            HandshakeState::ReadingValue { .. } => "ReadingValue",
            HandshakeState::Done { .. } => "Done",
            HandshakeState::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Done { .. } | HandshakeState::Failed { .. }
        )
    }

    /// Process an event, consuming the current state.
    ///
    /// Events that make no sense in the current stage are rejected and the
    /// untouched state is handed back inside [`Rejected`].
    pub fn transition(
        self,
        peer: &PeerIdentifier,
        event: HandshakeEvent,
    ) -> Result<HandshakeTransition, Rejected> {
        let from_stage = self.stage_name();
        let event_name = event.name();

        let (state, effects) = match (self, event) {
            (HandshakeState::Discovered, HandshakeEvent::Start) => (
                HandshakeState::Connecting,
                vec![Effect::Connect { peer: peer.clone() }],
            ),

            // From Connecting
            (HandshakeState::Connecting, HandshakeEvent::Connected) => (
                HandshakeState::DiscoveringService,
                vec![Effect::DiscoverService {
                    peer: peer.clone(),
                    service: IDENTITY_SERVICE_UUID,
                }],
            ),
            (HandshakeState::Connecting, HandshakeEvent::ConnectFailed { reason }) => {
                // Nothing to disconnect
                let error = PresenceError::ConnectFailed {
                    peer: peer.clone(),
                    reason,
                };
                (HandshakeState::Failed { error }, Vec::new())
            }

            // From DiscoveringService
            (HandshakeState::DiscoveringService, HandshakeEvent::ServicesDiscovered { services }) => {
                match services.into_iter().next() {
                    Some(service) => {
                        let effects = vec![Effect::DiscoverCharacteristics {
                            peer: peer.clone(),
                            service: service.clone(),
                        }];
                        (HandshakeState::DiscoveringCharacteristic { service }, effects)
                    }
                    None => fail_and_disconnect(PresenceError::DiscoveryFailed {
                        peer: peer.clone(),
                        reason: "identity service not found".to_string(),
                    }),
                }
            }
            (
                HandshakeState::DiscoveringService,
                HandshakeEvent::ServiceDiscoveryFailed { reason },
            ) => fail_and_disconnect(PresenceError::DiscoveryFailed {
                peer: peer.clone(),
                reason,
            }),

            // From DiscoveringCharacteristic
            (
                HandshakeState::DiscoveringCharacteristic { .. },
                HandshakeEvent::CharacteristicsDiscovered { characteristics },
            ) => match characteristics.into_iter().next() {
                Some(characteristic) => {
                    let effects = vec![Effect::ReadValue {
                        peer: peer.clone(),
                        characteristic: characteristic.clone(),
                    }];
                    (HandshakeState::ReadingValue { characteristic }, effects)
                }
                None => fail_and_disconnect(PresenceError::DiscoveryFailed {
                    peer: peer.clone(),
                    reason: "identity characteristic not found".to_string(),
                }),
            },
            (
                HandshakeState::DiscoveringCharacteristic { .. },
                HandshakeEvent::CharacteristicDiscoveryFailed { reason },
            ) => fail_and_disconnect(PresenceError::DiscoveryFailed {
                peer: peer.clone(),
                reason,
            }),

            // From ReadingValue
            (HandshakeState::ReadingValue { .. }, HandshakeEvent::ValueRead { value }) => {
                match decode_identity(peer, &value) {
                    // Single-shot: never keep the connection after resolving
                    Ok(username) => (
                        HandshakeState::Done { username },
                        vec![Effect::Disconnect { peer: peer.clone() }],
                    ),
                    Err(error) => fail_and_disconnect(error),
                }
            }
            (HandshakeState::ReadingValue { .. }, HandshakeEvent::ReadFailed { reason }) => {
                fail_and_disconnect(PresenceError::ReadFailed {
                    peer: peer.clone(),
                    reason,
                })
            }

            // Any live stage
            (state, HandshakeEvent::Disconnected) if !state.is_terminal() => {
                let error = PresenceError::ConnectFailed {
                    peer: peer.clone(),
                    reason: format!("disconnected during {}", state.stage_name()),
                };
                (HandshakeState::Failed { error }, Vec::new())
            }
            (state, HandshakeEvent::Timeout)
                if !state.is_terminal() && !matches!(state, HandshakeState::Discovered) =>
            {
                fail_and_disconnect(PresenceError::HandshakeTimeout {
                    peer: peer.clone(),
                    stage: state.stage_name(),
                })
            }

            (state, event) => {
                return Err(Rejected {
                    error: PresenceError::InvalidTransition {
                        from_stage: state.stage_name(),
                        event: event.name().to_string(),
                    },
                    state,
                });
            }
        };

        let audit = AuditEntry {
            peer: peer.clone(),
            from_stage,
            to_stage: state.stage_name(),
            event: event_name,
            effects_count: effects.len(),
        };

        Ok(HandshakeTransition {
            state,
            effects,
            audit,
        })
    }
}

fn fail_and_disconnect(error: PresenceError) -> (HandshakeState, Vec<Effect>) {
    let peer = match &error {
        PresenceError::ConnectFailed { peer, .. }
        | PresenceError::DiscoveryFailed { peer, .. }
        | PresenceError::ReadFailed { peer, .. }
        | PresenceError::MalformedPayload { peer, .. }
        | PresenceError::HandshakeTimeout { peer, .. } => Some(peer.clone()),
        _ => None,
    };
    let effects = peer
        .map(|peer| vec![Effect::Disconnect { peer }])
        .unwrap_or_default();
    (HandshakeState::Failed { error }, effects)
}

// ----------------------------------------------------------------------------
// Events and Transition Results
// ----------------------------------------------------------------------------

/// Inputs that drive a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    Start,
    Connected,
    ConnectFailed { reason: String },
    ServicesDiscovered { services: Vec<ServiceHandle> },
    ServiceDiscoveryFailed { reason: String },
    CharacteristicsDiscovered { characteristics: Vec<CharacteristicHandle> },
    CharacteristicDiscoveryFailed { reason: String },
    ValueRead { value: Vec<u8> },
    ReadFailed { reason: String },
    Disconnected,
    /// The current stage's deadline passed
    Timeout,
}

impl HandshakeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeEvent::Start => "Start",
            HandshakeEvent::Connected => "Connected",
            HandshakeEvent::ConnectFailed { .. } => "ConnectFailed",
            HandshakeEvent::ServicesDiscovered { .. } => "ServicesDiscovered",
            HandshakeEvent::ServiceDiscoveryFailed { .. } => "ServiceDiscoveryFailed",
            HandshakeEvent::CharacteristicsDiscovered { .. } => "CharacteristicsDiscovered",
            HandshakeEvent::CharacteristicDiscoveryFailed { .. } => "CharacteristicDiscoveryFailed",
            HandshakeEvent::ValueRead { .. } => "ValueRead",
            HandshakeEvent::ReadFailed { .. } => "ReadFailed",
            HandshakeEvent::Disconnected => "Disconnected",
            HandshakeEvent::Timeout => "Timeout",
        }
    }
}

/// Result of a successful transition
#[derive(Debug)]
pub struct HandshakeTransition {
    pub state: HandshakeState,
    pub effects: Vec<Effect>,
    pub audit: AuditEntry,
}

/// An event the current stage does not accept
#[derive(Debug)]
pub struct Rejected {
    /// The unchanged state
    pub state: HandshakeState,
    pub error: PresenceError,
}

/// Audit record for one stage transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub peer: PeerIdentifier,
    pub from_stage: &'static str,
    pub to_stage: &'static str,
    pub event: &'static str,
    pub effects_count: usize,
}

// ----------------------------------------------------------------------------
// Handshake Session
// ----------------------------------------------------------------------------

/// Live handshake for one peer.
///
/// Owns the transport-level peer handle for the whole session; the driver
/// may drop connections to handles nobody references.
#[derive(Debug)]
pub struct HandshakeSession<P> {
    peer: PeerIdentifier,
    handle: P,
    state: HandshakeState,
    started_at: Timestamp,
    stage_deadline: Timestamp,
}

impl<P> HandshakeSession<P> {
    /// Create a session and issue the connect request
    pub fn begin(
        peer: PeerIdentifier,
        handle: P,
        now: Timestamp,
        stage_timeout: Duration,
    ) -> (Self, Vec<Effect>) {
        let mut session = Self {
            peer,
            handle,
            state: HandshakeState::Discovered,
            started_at: now,
            stage_deadline: now.saturating_add(stage_timeout),
        };
        let effects = match session.apply(HandshakeEvent::Start, now, stage_timeout) {
            Ok(transition) => transition.effects,
            // Discovered always accepts Start
            Err(_) => Vec::new(),
        };
        (session, effects)
    }

    /// Feed an event; the stage deadline restarts whenever the stage changes
    pub fn apply(
        &mut self,
        event: HandshakeEvent,
        now: Timestamp,
        stage_timeout: Duration,
    ) -> Result<AppliedTransition, PresenceError> {
        let state = std::mem::replace(&mut self.state, HandshakeState::Discovered);
        match state.transition(&self.peer, event) {
            Ok(HandshakeTransition {
                state,
                effects,
                audit,
            }) => {
                debug!(
                    peer = %audit.peer,
                    from = audit.from_stage,
                    to = audit.to_stage,
                    event = audit.event,
                    "handshake transition"
                );
                self.state = state;
                self.stage_deadline = now.saturating_add(stage_timeout);
                Ok(AppliedTransition { effects, audit })
            }
            Err(Rejected { state, error }) => {
                self.state = state;
                Err(error)
            }
        }
    }

    pub fn peer(&self) -> &PeerIdentifier {
        &self.peer
    }

    pub fn handle(&self) -> &P {
        &self.handle
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn stage_deadline(&self) -> Timestamp {
        self.stage_deadline
    }

    /// Whether the current stage has outlived its deadline
    pub fn is_expired(&self, now: Timestamp) -> bool {
        !self.state.is_terminal() && now >= self.stage_deadline
    }

    /// Tear the session down, returning the final state and the peer handle
    pub fn finish(self) -> (HandshakeState, P) {
        (self.state, self.handle)
    }
}

/// Effects and audit record of a transition applied to a session
#[derive(Debug)]
pub struct AppliedTransition {
    pub effects: Vec<Effect>,
    pub audit: AuditEntry,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
