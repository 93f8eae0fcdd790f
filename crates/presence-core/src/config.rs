//! Presence engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PresenceError, PresenceResult};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the presence engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Length of one scan window and of one idle window in intermittent mode
    pub scan_period: Duration,
    /// Maximum time a handshake may spend in any single stage
    pub handshake_stage_timeout: Duration,
    /// How often stalled handshakes are swept
    pub deadline_sweep_interval: Duration,
    /// Capacity of the control, driver event and observer channels
    pub channel_capacity: usize,
    /// Discard an in-flight handshake when its peer is rediscovered.
    ///
    /// Off by default: a stalled handshake is already failed by its stage
    /// deadline, and drivers that report every advertisement (btleplug's
    /// `DeviceUpdated`) would otherwise restart the handshake before it
    /// can finish. An unresolved sighting whose handshake has ended is
    /// always replaced by a fresh handshake on rediscovery.
    pub restart_pending_on_rediscovery: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            scan_period: Duration::from_secs(5),
            handshake_stage_timeout: Duration::from_secs(10),
            deadline_sweep_interval: Duration::from_secs(1),
            channel_capacity: 256,
            restart_pending_on_rediscovery: false,
        }
    }
}

impl PresenceConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duty-cycle period
    pub fn with_scan_period(mut self, period: Duration) -> Self {
        self.scan_period = period;
        self
    }

    /// Set the per-stage handshake timeout
    pub fn with_handshake_stage_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_stage_timeout = timeout;
        self
    }

    /// Set the stalled-handshake sweep interval
    pub fn with_deadline_sweep_interval(mut self, interval: Duration) -> Self {
        self.deadline_sweep_interval = interval;
        self
    }

    /// Set channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Enable or disable restarting in-flight handshakes on rediscovery
    pub fn with_restart_pending_on_rediscovery(mut self, enabled: bool) -> Self {
        self.restart_pending_on_rediscovery = enabled;
        self
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> PresenceResult<()> {
        if self.scan_period.is_zero() {
            return Err(PresenceError::configuration(
                "scan period must be greater than 0",
            ));
        }
        if self.handshake_stage_timeout.is_zero() {
            return Err(PresenceError::configuration(
                "handshake stage timeout must be greater than 0",
            ));
        }
        if self.deadline_sweep_interval.is_zero() {
            return Err(PresenceError::configuration(
                "deadline sweep interval must be greater than 0",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PresenceError::configuration(
                "channel capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PresenceConfig::default();
        assert_eq!(config.scan_period, Duration::from_secs(5));
        assert!(!config.restart_pending_on_rediscovery);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = PresenceConfig::new().with_scan_period(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = PresenceConfig::new().with_channel_capacity(0);
        assert!(config.validate().is_err());

        let config = PresenceConfig::new().with_handshake_stage_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: PresenceConfig =
            serde_json::from_str(r#"{ "restart_pending_on_rediscovery": true }"#).unwrap();
        assert!(config.restart_pending_on_rediscovery);
        assert_eq!(config.scan_period, Duration::from_secs(5));
    }
}
