//! Dual-role presence engine
//!
//! Every device advertises a small identity service carrying its username and
//! scans for the same service on other devices. Each newly discovered peer is
//! connected to once, its username is read, and the connection is dropped.
//!
//! ## Architecture
//!
//! - [`broadcaster`] - Outbound role: identity publishing and advertising
//! - [`scheduler`] - Inbound role: duty-cycled and continuous scanning
//! - [`handshake`] - Per-peer connect/discover/read state machine
//! - [`sighting`] - Deduplicated table of discovered peers
//! - [`engine`] - Orchestration of the above as a synchronous state machine
//! - [`task`] - The serialized event loop, its handle and builder
//! - [`driver`] - The radio primitives the engine consumes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use presence_core::{PresenceConfig, PresenceEngineBuilder, RadioDriver, DriverEventReceiver};
//!
//! # async fn example<D: RadioDriver + 'static>(
//! #     driver: D,
//! #     events: DriverEventReceiver<D::Peer>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let (task, handle, mut observer) = PresenceEngineBuilder::new(driver, events)
//!     .with_config(PresenceConfig::default())
//!     .with_identity("alice")
//!     .spawn()?;
//!
//! handle.start_advertising().await?;
//! handle.start_scanning().await?;
//!
//! while let Some(event) = observer.recv().await {
//!     println!("{:?}", event);
//! }
//! # task.await??;
//! # Ok(())
//! # }
//! ```

pub mod broadcaster;
pub mod channel;
pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod handshake;
pub mod protocol;
pub mod scheduler;
pub mod sighting;
pub mod task;
pub mod types;

// Public API exports
pub use broadcaster::IdentityBroadcaster;
pub use channel::{Command, Effect, PresenceEvent};
pub use config::PresenceConfig;
pub use driver::{
    driver_event_channel, CharacteristicHandle, DriverEvent, DriverEventReceiver,
    DriverEventSender, RadioDriver, ServiceHandle,
};
pub use engine::{EngineStats, PresenceEngine};
pub use errors::{PresenceError, PresenceResult};
pub use handshake::{AuditEntry, HandshakeEvent, HandshakeSession, HandshakeState};
pub use protocol::{
    decode_identity, encode_identity, APP_PERIPHERAL_UUID, IDENTITY_CHARACTERISTIC_UUID,
    IDENTITY_SERVICE_UUID,
};
pub use scheduler::{ScanMode, ScanScheduler, ScanWindow};
pub use sighting::{DiscoveryOutcome, Sighting, SightingTable};
pub use task::{
    PresenceEngineBuilder, PresenceEngineTask, PresenceEventReceiver, PresenceHandle, Request,
};
pub use types::{ManualTimeSource, PeerIdentifier, SystemTimeSource, TimeSource, Timestamp};
