//! Sighting table
//!
//! One [`Sighting`] per distinct peer identifier. Sightings are mutated in
//! place and never evicted within a session; staleness is judged by observers
//! from `last_seen_at`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{PeerIdentifier, Timestamp};

// ----------------------------------------------------------------------------
// Sighting
// ----------------------------------------------------------------------------

/// Local record of one discovered peer and its resolution state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    identifier: PeerIdentifier,
    resolved_username: Option<String>,
    last_signal_strength: i16,
    last_seen_at: Timestamp,
    handshake_pending: bool,
}

impl Sighting {
    fn pending(identifier: PeerIdentifier, signal_strength: i16, seen_at: Timestamp) -> Self {
        Self {
            identifier,
            resolved_username: None,
            last_signal_strength: signal_strength,
            last_seen_at: seen_at,
            handshake_pending: true,
        }
    }

    pub fn identifier(&self) -> &PeerIdentifier {
        &self.identifier
    }

    pub fn resolved_username(&self) -> Option<&str> {
        self.resolved_username.as_deref()
    }

    pub fn last_signal_strength(&self) -> i16 {
        self.last_signal_strength
    }

    pub fn last_seen_at(&self) -> Timestamp {
        self.last_seen_at
    }

    /// A username has been read from this peer
    pub fn is_resolved(&self) -> bool {
        self.resolved_username.is_some()
    }

    /// A handshake for this peer is in flight (mutual-exclusion marker)
    pub fn is_pending(&self) -> bool {
        self.handshake_pending
    }

    /// Time since the peer was last heard
    pub fn age(&self, now: Timestamp) -> Duration {
        now.duration_since(self.last_seen_at)
    }

    fn refresh(&mut self, signal_strength: i16, seen_at: Timestamp) {
        self.last_signal_strength = signal_strength;
        self.last_seen_at = seen_at;
    }
}

/// What the engine should do after a discovery event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Known and resolved; strength and time refreshed, no connection needed
    Refreshed,
    /// A handshake for this peer is already in flight; ignore
    AlreadyPending,
    /// Pending sighting created; start a handshake
    StartHandshake,
}

// ----------------------------------------------------------------------------
// Sighting Table
// ----------------------------------------------------------------------------

/// Deduplicated store of discovered peers keyed by radio identifier
#[derive(Debug, Default)]
pub struct SightingTable {
    sightings: HashMap<PeerIdentifier, Sighting>,
}

impl SightingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advertisement from `identifier`.
    ///
    /// An unresolved sighting whose handshake is no longer in flight is
    /// discarded and replaced by a fresh pending one. With
    /// `restart_pending` set, an in-flight handshake is replaced as well.
    pub fn record_discovery(
        &mut self,
        identifier: &PeerIdentifier,
        signal_strength: i16,
        seen_at: Timestamp,
        restart_pending: bool,
    ) -> DiscoveryOutcome {
        if let Some(sighting) = self.sightings.get_mut(identifier) {
            if sighting.is_resolved() {
                sighting.refresh(signal_strength, seen_at);
                return DiscoveryOutcome::Refreshed;
            }
            if sighting.is_pending() && !restart_pending {
                sighting.refresh(signal_strength, seen_at);
                return DiscoveryOutcome::AlreadyPending;
            }
        }

        self.sightings.insert(
            identifier.clone(),
            Sighting::pending(identifier.clone(), signal_strength, seen_at),
        );
        DiscoveryOutcome::StartHandshake
    }

    /// Set the username resolved by a handshake.
    ///
    /// Returns `None` without effect if the identifier is no longer known.
    pub fn record_resolution(
        &mut self,
        identifier: &PeerIdentifier,
        username: String,
    ) -> Option<&Sighting> {
        let sighting = self.sightings.get_mut(identifier)?;
        sighting.resolved_username = Some(username);
        sighting.handshake_pending = false;
        Some(sighting)
    }

    /// Drop the pending marker after a failed handshake so the next
    /// advertisement can retry. Returns whether a marker was cleared.
    pub fn clear_pending(&mut self, identifier: &PeerIdentifier) -> bool {
        match self.sightings.get_mut(identifier) {
            Some(sighting) if sighting.handshake_pending => {
                sighting.handshake_pending = false;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, identifier: &PeerIdentifier) -> Option<&Sighting> {
        self.sightings.get(identifier)
    }

    /// All current sightings, ordered by identifier
    pub fn snapshot(&self) -> Vec<Sighting> {
        let mut sightings: Vec<Sighting> = self.sightings.values().cloned().collect();
        sightings.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        sightings
    }

    pub fn len(&self) -> usize {
        self.sightings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.sightings.values().filter(|s| s.is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn peer(id: &str) -> PeerIdentifier {
        PeerIdentifier::from(id)
    }

    #[test]
    fn test_first_discovery_starts_handshake() {
        let mut table = SightingTable::new();
        let outcome = table.record_discovery(&peer("p1"), -60, Timestamp::new(1_000), false);

        assert_eq!(outcome, DiscoveryOutcome::StartHandshake);
        let sighting = table.get(&peer("p1")).unwrap();
        assert!(sighting.is_pending());
        assert!(!sighting.is_resolved());
        assert_eq!(sighting.last_signal_strength(), -60);
    }

    #[test]
    fn test_pending_discovery_is_ignored() {
        let mut table = SightingTable::new();
        table.record_discovery(&peer("p1"), -60, Timestamp::new(1_000), false);
        let outcome = table.record_discovery(&peer("p1"), -58, Timestamp::new(2_000), false);

        assert_eq!(outcome, DiscoveryOutcome::AlreadyPending);
        assert_eq!(table.pending_count(), 1);
        assert_eq!(table.get(&peer("p1")).unwrap().last_seen_at(), Timestamp::new(2_000));
    }

    #[test]
    fn test_restart_policy_replaces_pending() {
        let mut table = SightingTable::new();
        table.record_discovery(&peer("p1"), -60, Timestamp::new(1_000), false);
        let outcome = table.record_discovery(&peer("p1"), -58, Timestamp::new(2_000), true);
        assert_eq!(outcome, DiscoveryOutcome::StartHandshake);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolution_then_refresh() {
        let mut table = SightingTable::new();
        table.record_discovery(&peer("p1"), -60, Timestamp::new(1_000), false);
        let resolved = table
            .record_resolution(&peer("p1"), "alice".to_string())
            .cloned()
            .unwrap();
        assert_eq!(resolved.resolved_username(), Some("alice"));
        assert!(!resolved.is_pending());

        let outcome = table.record_discovery(&peer("p1"), -55, Timestamp::new(3_000), false);
        assert_eq!(outcome, DiscoveryOutcome::Refreshed);
        let sighting = table.get(&peer("p1")).unwrap();
        assert_eq!(sighting.resolved_username(), Some("alice"));
        assert_eq!(sighting.last_signal_strength(), -55);
        assert_eq!(sighting.last_seen_at(), Timestamp::new(3_000));
    }

    #[test]
    fn test_resolution_for_unknown_peer_is_noop() {
        let mut table = SightingTable::new();
        assert!(table.record_resolution(&peer("ghost"), "bob".into()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_cleared_pending_allows_retry() {
        let mut table = SightingTable::new();
        table.record_discovery(&peer("p1"), -60, Timestamp::new(1_000), false);
        assert!(table.clear_pending(&peer("p1")));
        assert!(!table.clear_pending(&peer("p1")));
        assert_eq!(table.pending_count(), 0);
        // Unresolved sightings stay in the table
        assert_eq!(table.len(), 1);

        let outcome = table.record_discovery(&peer("p1"), -61, Timestamp::new(2_000), false);
        assert_eq!(outcome, DiscoveryOutcome::StartHandshake);
        assert!(table.get(&peer("p1")).unwrap().is_pending());
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let mut table = SightingTable::new();
        table.record_discovery(&peer("c"), -1, Timestamp::new(1), false);
        table.record_discovery(&peer("a"), -1, Timestamp::new(1), false);
        table.record_discovery(&peer("b"), -1, Timestamp::new(1), false);
        let ids: Vec<_> = table
            .snapshot()
            .iter()
            .map(|s| s.identifier().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    proptest! {
        #[test]
        fn prop_resolved_sighting_never_restarts(
            events in prop::collection::vec((-100i16..0, 0u64..1_000_000), 1..50)
        ) {
            let mut table = SightingTable::new();
            let id = peer("p1");
            table.record_discovery(&id, -70, Timestamp::new(0), false);
            table.record_resolution(&id, "alice".into());

            for (rssi, at) in events {
                let outcome = table.record_discovery(&id, rssi, Timestamp::new(at), false);
                prop_assert_eq!(outcome, DiscoveryOutcome::Refreshed);
                let sighting = table.get(&id).unwrap();
                prop_assert_eq!(sighting.last_signal_strength(), rssi);
                prop_assert_eq!(sighting.last_seen_at(), Timestamp::new(at));
                prop_assert_eq!(sighting.resolved_username(), Some("alice"));
            }
        }

        #[test]
        fn prop_at_most_one_pending_per_peer(
            ops in prop::collection::vec((0usize..3, 0u8..3), 1..100)
        ) {
            let ids = [peer("a"), peer("b"), peer("c")];
            let mut table = SightingTable::new();
            let mut in_flight = [false; 3];

            for (idx, op) in ops {
                let id = &ids[idx];
                match op {
                    0 => {
                        let outcome = table.record_discovery(id, -50, Timestamp::new(1), false);
                        if outcome == DiscoveryOutcome::StartHandshake {
                            // A second start while one is in flight would break exclusion
                            prop_assert!(!in_flight[idx]);
                            in_flight[idx] = true;
                        }
                    }
                    1 => {
                        if table.clear_pending(id) {
                            in_flight[idx] = false;
                        }
                    }
                    _ => {
                        if in_flight[idx] {
                            table.record_resolution(id, "name".into());
                            in_flight[idx] = false;
                        }
                    }
                }
                prop_assert!(table.pending_count() <= ids.len());
                for (i, id) in ids.iter().enumerate() {
                    let pending = table.get(id).map(|s| s.is_pending()).unwrap_or(false);
                    prop_assert_eq!(pending, in_flight[i]);
                }
            }
        }
    }
}
