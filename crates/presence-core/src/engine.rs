//! Presence engine
//!
//! Owns the broadcaster, the scan scheduler, the sighting table and every
//! live handshake. All inputs (commands, driver events, timer ticks, deadline
//! sweeps) are plain method calls returning the [`Effect`]s to execute, so
//! the engine is a synchronous state machine; the engine task supplies the
//! serialization and the I/O.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broadcaster::IdentityBroadcaster;
use crate::channel::{Command, Effect, PresenceEvent};
use crate::config::PresenceConfig;
use crate::driver::DriverEvent;
use crate::errors::{PresenceError, PresenceResult};
use crate::handshake::{AuditEntry, HandshakeEvent, HandshakeSession, HandshakeState};
use crate::scheduler::{ScanScheduler, ScanWindow};
use crate::sighting::{DiscoveryOutcome, Sighting, SightingTable};
use crate::types::{PeerIdentifier, SystemTimeSource, TimeSource};

/// Number of handshake transitions kept in the audit trail
pub const MAX_AUDIT_ENTRIES: usize = 1024;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    pub effects_generated: u64,
    pub discoveries: u64,
    pub handshakes_started: u64,
    pub handshakes_resolved: u64,
    pub handshakes_failed: u64,
    pub handshake_timeouts: u64,
    pub state_transitions: u64,
    /// Handshakes in flight when the stats were taken
    pub active_handshakes: usize,
}

// ----------------------------------------------------------------------------
// Presence Engine
// ----------------------------------------------------------------------------

/// Dual-role presence engine.
///
/// `P` is the driver's peer handle type. Handles are held by the live
/// handshake session and, after a requested disconnect of an established
/// link, until the driver reports the disconnect.
pub struct PresenceEngine<P, T: TimeSource = SystemTimeSource> {
    config: PresenceConfig,
    clock: T,
    broadcaster: IdentityBroadcaster,
    scheduler: ScanScheduler,
    table: SightingTable,
    sessions: HashMap<PeerIdentifier, HandshakeSession<P>>,
    closing: HashMap<PeerIdentifier, ClosingLink<P>>,
    audit_trail: VecDeque<AuditEntry>,
    stats: EngineStats,
}

/// Handle retained while a requested disconnect is outstanding
struct ClosingLink<P> {
    handle: P,
    // False when cancelling a connection attempt; no event may follow
    awaits_event: bool,
}

impl<P, T: TimeSource> PresenceEngine<P, T> {
    /// Create an engine; fails if the configuration is unusable
    pub fn new(config: PresenceConfig, clock: T) -> PresenceResult<Self> {
        config.validate()?;
        let scheduler = ScanScheduler::new(config.scan_period);
        Ok(Self {
            config,
            clock,
            broadcaster: IdentityBroadcaster::new(),
            scheduler,
            table: SightingTable::new(),
            sessions: HashMap::new(),
            closing: HashMap::new(),
            audit_trail: VecDeque::new(),
            stats: EngineStats::default(),
        })
    }

    /// Start from a process that resumed a previous scanning session
    pub fn with_restored_session(mut self, restored: bool) -> Self {
        self.scheduler = self.scheduler.with_restored_session(restored);
        self
    }

    /// Cache an initial identity, published once the outbound role is ready
    pub fn with_identity(mut self, username: impl Into<String>) -> Self {
        self.broadcaster = IdentityBroadcaster::with_identity(username);
        self
    }

    // ------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------

    /// Process an app or user request
    pub fn handle_command(&mut self, command: Command) -> Vec<Effect> {
        self.stats.commands_processed += 1;
        debug!("Processing command: {:?}", command);

        let effects = match command {
            Command::SetIdentity { username } => self.broadcaster.set_identity(username),
            Command::StartAdvertising => self.broadcaster.start_advertising(),
            Command::StopAdvertising => self.broadcaster.stop_advertising(),
            Command::StartScanning => self.scheduler.start(),
            Command::StopScanning => self.scheduler.stop(),
            Command::EnterBackground => self.scheduler.enter_continuous_mode(),
            Command::EnterForeground => self.scheduler.enter_intermittent_mode(),
        };
        self.account(effects)
    }

    /// Process one driver event
    pub fn handle_driver_event(&mut self, event: DriverEvent<P>) -> Vec<Effect> {
        self.stats.events_processed += 1;
        debug!(event = event.name(), peer = ?event.peer(), "Processing driver event");

        let effects = match event {
            DriverEvent::OutboundReady => self.broadcaster.on_outbound_ready(),
            DriverEvent::InboundReady => self.scheduler.on_inbound_ready(),
            DriverEvent::SessionRestored => {
                self.scheduler.on_session_restored();
                Vec::new()
            }
            DriverEvent::PublishFailed { reason } => {
                self.broadcaster.on_publish_failed(&reason);
                Vec::new()
            }
            DriverEvent::AdvertisingFailed { reason } => {
                self.broadcaster.on_advertising_failed(&reason);
                Vec::new()
            }
            DriverEvent::Discovered {
                peer,
                handle,
                signal_strength,
            } => self.on_discovered(peer, handle, signal_strength),
            DriverEvent::Connected { peer } => {
                self.advance_handshake(&peer, HandshakeEvent::Connected)
            }
            DriverEvent::ConnectFailed { peer, reason } => {
                self.advance_handshake(&peer, HandshakeEvent::ConnectFailed { reason })
            }
            DriverEvent::ServicesDiscovered { peer, services } => {
                self.advance_handshake(&peer, HandshakeEvent::ServicesDiscovered { services })
            }
            DriverEvent::ServiceDiscoveryFailed { peer, reason } => {
                self.advance_handshake(&peer, HandshakeEvent::ServiceDiscoveryFailed { reason })
            }
            DriverEvent::CharacteristicsDiscovered {
                peer,
                characteristics,
            } => self.advance_handshake(
                &peer,
                HandshakeEvent::CharacteristicsDiscovered { characteristics },
            ),
            DriverEvent::CharacteristicDiscoveryFailed { peer, reason } => self
                .advance_handshake(
                    &peer,
                    HandshakeEvent::CharacteristicDiscoveryFailed { reason },
                ),
            DriverEvent::ValueRead { peer, value } => {
                self.advance_handshake(&peer, HandshakeEvent::ValueRead { value })
            }
            DriverEvent::ReadFailed { peer, reason } => {
                self.advance_handshake(&peer, HandshakeEvent::ReadFailed { reason })
            }
            DriverEvent::Disconnected { peer } => self.on_disconnected(&peer),
        };
        self.account(effects)
    }

    /// Duty-cycle timer tick
    pub fn on_scan_timer(&mut self) -> Vec<Effect> {
        let effects = self.scheduler.on_timer_fired();
        self.account(effects)
    }

    /// Fail every handshake whose current stage outlived its deadline
    pub fn sweep_deadlines(&mut self) -> Vec<Effect> {
        let now = self.clock.now();
        let expired: Vec<PeerIdentifier> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now))
            .map(|(peer, _)| peer.clone())
            .collect();

        let mut effects = Vec::new();
        for peer in expired {
            self.stats.handshake_timeouts += 1;
            effects.extend(self.advance_handshake(&peer, HandshakeEvent::Timeout));
        }
        self.account(effects)
    }

    /// A driver call for `effect` could not be submitted.
    ///
    /// Peer-scoped commands are converted into the matching failure event so
    /// the handshake terminates the same way it would on a reported failure.
    pub fn driver_command_failed(&mut self, effect: &Effect, error: PresenceError) -> Vec<Effect> {
        warn!("Driver rejected {:?}: {}", effect, error);
        let reason = error.to_string();

        let event = match effect {
            Effect::Connect { peer } => DriverEvent::ConnectFailed {
                peer: peer.clone(),
                reason,
            },
            Effect::DiscoverService { peer, .. } => DriverEvent::ServiceDiscoveryFailed {
                peer: peer.clone(),
                reason,
            },
            Effect::DiscoverCharacteristics { peer, .. } => {
                DriverEvent::CharacteristicDiscoveryFailed {
                    peer: peer.clone(),
                    reason,
                }
            }
            Effect::ReadValue { peer, .. } => DriverEvent::ReadFailed {
                peer: peer.clone(),
                reason,
            },
            Effect::Disconnect { peer } => DriverEvent::Disconnected { peer: peer.clone() },
            Effect::PublishIdentity { .. } | Effect::UpdateIdentity { .. } => {
                DriverEvent::PublishFailed { reason }
            }
            Effect::StartAdvertising { .. } => DriverEvent::AdvertisingFailed { reason },
            _ => return Vec::new(),
        };
        self.handle_driver_event(event)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Peer handle for a driver command targeting `peer`
    pub fn handle_for(&self, peer: &PeerIdentifier) -> Option<&P> {
        self.sessions
            .get(peer)
            .map(HandshakeSession::handle)
            .or_else(|| self.closing.get(peer).map(|link| &link.handle))
    }

    /// The driver accepted the `Disconnect` for `peer`.
    ///
    /// A cancelled connection attempt has no link to report on, so its
    /// handle is released here rather than on a `Disconnected` event.
    pub fn disconnect_submitted(&mut self, peer: &PeerIdentifier) {
        if matches!(self.closing.get(peer), Some(link) if !link.awaits_event) {
            self.closing.remove(peer);
            debug!("Released handle for {} after cancelling connect", peer);
        }
    }

    /// Current sightings, ordered by identifier
    pub fn snapshot(&self) -> Vec<Sighting> {
        self.table.snapshot()
    }

    pub fn sighting(&self, peer: &PeerIdentifier) -> Option<&Sighting> {
        self.table.get(peer)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_handshakes: self.sessions.len(),
            ..self.stats.clone()
        }
    }

    pub fn audit_trail(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit_trail.iter()
    }

    pub fn scan_window(&self) -> ScanWindow {
        self.scheduler.window()
    }

    pub fn broadcaster(&self) -> &IdentityBroadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Stage of the live handshake with `peer`, if any
    pub fn handshake_stage(&self, peer: &PeerIdentifier) -> Option<&'static str> {
        self.sessions.get(peer).map(|s| s.state().stage_name())
    }

    // ------------------------------------------------------------------------
    // Handshake Driving
    // ------------------------------------------------------------------------

    fn on_discovered(&mut self, peer: PeerIdentifier, handle: P, signal_strength: i16) -> Vec<Effect> {
        self.stats.discoveries += 1;
        let now = self.clock.now();
        let outcome = self.table.record_discovery(
            &peer,
            signal_strength,
            now,
            self.config.restart_pending_on_rediscovery,
        );

        match outcome {
            DiscoveryOutcome::Refreshed => self
                .table
                .get(&peer)
                .map(|sighting| {
                    vec![Effect::Notify(PresenceEvent::SightingUpdated(
                        sighting.clone(),
                    ))]
                })
                .unwrap_or_default(),
            DiscoveryOutcome::AlreadyPending => {
                debug!("Handshake with {} already in flight", peer);
                Vec::new()
            }
            DiscoveryOutcome::StartHandshake => {
                if self.sessions.remove(&peer).is_some() {
                    debug!("Discarding in-flight handshake with {}", peer);
                }
                // Later disconnects belong to the new session
                if self.closing.remove(&peer).is_some() {
                    debug!("Dropping stale close of {}", peer);
                }
                info!("Discovered {} ({} dBm), starting handshake", peer, signal_strength);
                let (session, effects) = HandshakeSession::begin(
                    peer.clone(),
                    handle,
                    now,
                    self.config.handshake_stage_timeout,
                );
                self.sessions.insert(peer, session);
                self.stats.handshakes_started += 1;
                effects
            }
        }
    }

    fn on_disconnected(&mut self, peer: &PeerIdentifier) -> Vec<Effect> {
        // A disconnect we asked for only releases the retained handle
        if self.closing.remove(peer).is_some() {
            debug!("Released handle for {}", peer);
            return Vec::new();
        }
        self.advance_handshake(peer, HandshakeEvent::Disconnected)
    }

    fn advance_handshake(&mut self, peer: &PeerIdentifier, event: HandshakeEvent) -> Vec<Effect> {
        let now = self.clock.now();
        let Some(session) = self.sessions.get_mut(peer) else {
            debug!("Ignoring {} for {}: no handshake in flight", event.name(), peer);
            return Vec::new();
        };

        let was_connecting = matches!(session.state(), HandshakeState::Connecting);
        let applied = match session.apply(event, now, self.config.handshake_stage_timeout) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("{}", e);
                return Vec::new();
            }
        };
        let terminal = session.state().is_terminal();

        self.stats.state_transitions += 1;
        self.record_audit(applied.audit);
        let mut effects = applied.effects;

        if terminal {
            let holds_connection = effects
                .iter()
                .any(|effect| matches!(effect, Effect::Disconnect { .. }));
            let link = holds_connection.then_some(!was_connecting);
            effects.extend(self.finish_handshake(peer, link));
        }
        effects
    }

    /// `closing` is `Some(awaits_event)` when a `Disconnect` was emitted
    fn finish_handshake(&mut self, peer: &PeerIdentifier, closing: Option<bool>) -> Vec<Effect> {
        let Some(session) = self.sessions.remove(peer) else {
            return Vec::new();
        };
        let (state, handle) = session.finish();
        if let Some(awaits_event) = closing {
            self.closing
                .insert(peer.clone(), ClosingLink { handle, awaits_event });
        }

        match state {
            HandshakeState::Done { username } => {
                self.stats.handshakes_resolved += 1;
                info!("Resolved {} as {}", peer, username);
                match self.table.record_resolution(peer, username) {
                    Some(sighting) => vec![Effect::Notify(PresenceEvent::SightingUpdated(
                        sighting.clone(),
                    ))],
                    None => Vec::new(),
                }
            }
            HandshakeState::Failed { error } => {
                self.stats.handshakes_failed += 1;
                debug!("Handshake failed: {}", error);
                self.table.clear_pending(peer);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn record_audit(&mut self, entry: AuditEntry) {
        if self.audit_trail.len() == MAX_AUDIT_ENTRIES {
            self.audit_trail.pop_front();
        }
        self.audit_trail.push_back(entry);
    }

    fn account(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        self.stats.effects_generated += effects.len() as u64;
        effects
    }
}

impl<P, T: TimeSource> std::fmt::Debug for PresenceEngine<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceEngine")
            .field("config", &self.config)
            .field("sightings", &self.table.len())
            .field("handshakes", &self.sessions.len())
            .field("closing", &self.closing.len())
            .field("scan_window", &self.scheduler.window())
            .finish()
    }
}
