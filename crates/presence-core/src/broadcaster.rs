//! Identity broadcaster (outbound role)
//!
//! Publishes the local username as the value of a readable characteristic
//! inside the identity service and advertises that service identifier.
//! Requests made before the outbound role is ready are remembered and
//! replayed once it reports ready.

use tracing::{debug, info, warn};

use crate::channel::Effect;
use crate::protocol::{encode_identity, IDENTITY_CHARACTERISTIC_UUID, IDENTITY_SERVICE_UUID};

/// Outbound role state
#[derive(Debug, Default)]
pub struct IdentityBroadcaster {
    identity: Option<String>,
    outbound_ready: bool,
    service_published: bool,
    advertise_requested: bool,
    advertising: bool,
}

impl IdentityBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a cached identity, published once the role is ready
    pub fn with_identity(username: impl Into<String>) -> Self {
        Self {
            identity: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.outbound_ready
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn is_published(&self) -> bool {
        self.service_published
    }

    /// Whether a start request is waiting for the role to become ready
    pub fn is_start_deferred(&self) -> bool {
        self.advertise_requested && !self.advertising
    }

    /// Replace the local username.
    ///
    /// The first value published registers the service; later values update
    /// the characteristic in place.
    pub fn set_identity(&mut self, username: String) -> Vec<Effect> {
        self.identity = Some(username);
        if !self.outbound_ready {
            debug!("Outbound role not ready, caching identity");
            return Vec::new();
        }
        self.publish_effects()
    }

    /// Begin advertising; deferred until the outbound role is ready
    pub fn start_advertising(&mut self) -> Vec<Effect> {
        if self.advertising {
            return Vec::new();
        }
        self.advertise_requested = true;
        if !self.outbound_ready {
            warn!("Outbound role not ready, deferring advertising");
            return Vec::new();
        }
        self.advertising = true;
        info!("Advertising identity service {}", IDENTITY_SERVICE_UUID);
        vec![Effect::StartAdvertising {
            service: IDENTITY_SERVICE_UUID,
        }]
    }

    /// Stop advertising and drop any deferred start
    pub fn stop_advertising(&mut self) -> Vec<Effect> {
        self.advertise_requested = false;
        if !self.advertising {
            return Vec::new();
        }
        self.advertising = false;
        info!("Advertising stopped");
        vec![Effect::StopAdvertising]
    }

    /// The outbound role powered on; replay cached requests
    pub fn on_outbound_ready(&mut self) -> Vec<Effect> {
        if self.outbound_ready {
            return Vec::new();
        }
        self.outbound_ready = true;

        let mut effects = Vec::new();
        if self.identity.is_some() {
            effects.extend(self.publish_effects());
        }
        if self.advertise_requested {
            effects.extend(self.start_advertising());
        }
        effects
    }

    /// Registration failed; the next identity update registers again
    pub fn on_publish_failed(&mut self, reason: &str) {
        warn!("Identity service registration failed: {}", reason);
        self.service_published = false;
    }

    /// Advertising failed; a later start request may try again
    pub fn on_advertising_failed(&mut self, reason: &str) {
        warn!("Advertising failed: {}", reason);
        self.advertising = false;
        self.advertise_requested = false;
    }

    fn publish_effects(&mut self) -> Vec<Effect> {
        let Some(username) = self.identity.as_deref() else {
            return Vec::new();
        };
        let value = encode_identity(username);

        if self.service_published {
            vec![Effect::UpdateIdentity {
                characteristic: IDENTITY_CHARACTERISTIC_UUID,
                value,
            }]
        } else {
            self.service_published = true;
            vec![Effect::PublishIdentity {
                service: IDENTITY_SERVICE_UUID,
                characteristic: IDENTITY_CHARACTERISTIC_UUID,
                value,
            }]
        }
    }
}
