//! Error types for the presence engine
//!
//! Per-peer failures (connect, discovery, read, payload, timeout) terminate a
//! single handshake and are never surfaced to the user. Transport
//! unavailability defers the requested operation. Channel and configuration
//! errors are the only ones that stop the engine task.

use thiserror::Error;

use crate::types::PeerIdentifier;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors produced by the presence engine and its drivers
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("Radio role not available: {role}")]
    TransportUnavailable { role: &'static str },

    #[error("Failed to connect to peer {peer}: {reason}")]
    ConnectFailed { peer: PeerIdentifier, reason: String },

    #[error("Identity service discovery failed on peer {peer}: {reason}")]
    DiscoveryFailed { peer: PeerIdentifier, reason: String },

    #[error("Failed to read identity from peer {peer}: {reason}")]
    ReadFailed { peer: PeerIdentifier, reason: String },

    #[error("Malformed identity payload from peer {peer}: {source}")]
    MalformedPayload {
        peer: PeerIdentifier,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Handshake with peer {peer} timed out in stage {stage}")]
    HandshakeTimeout { peer: PeerIdentifier, stage: &'static str },

    #[error("Invalid handshake transition from {from_stage} on {event}")]
    InvalidTransition { from_stage: &'static str, event: String },

    #[error("Engine channel closed: {reason}")]
    Channel { reason: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Driver error: {0}")]
    Driver(String),
}

impl PresenceError {
    /// Create a channel error
    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether this error only concerns a single peer's handshake
    pub fn is_peer_local(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::DiscoveryFailed { .. }
                | Self::ReadFailed { .. }
                | Self::MalformedPayload { .. }
                | Self::HandshakeTimeout { .. }
        )
    }

    /// Whether the engine task cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Channel { .. } | Self::Configuration { .. })
    }
}

/// Result type for presence operations
pub type PresenceResult<T> = core::result::Result<T, PresenceError>;
