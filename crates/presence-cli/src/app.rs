//! The `run` command: wires the BLE driver to a presence engine

use std::collections::BTreeMap;

use presence_ble::BleRadioDriver;
use presence_core::{
    PeerIdentifier, PresenceEngineBuilder, PresenceEvent, PresenceHandle, Sighting, Timestamp,
};
use tracing::{debug, info, warn};

use crate::config::CliAppConfig;
use crate::error::{CliError, Result};
use crate::presenter::Presenter;

/// What the engine should do once started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub username: String,
    pub advertise: bool,
    pub scan: bool,
    pub background: bool,
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.advertise && !self.scan {
            return Err(CliError::Config(
                "Nothing to do: both advertising and scanning are disabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Run until interrupted
pub async fn run(config: &CliAppConfig, options: RunOptions) -> Result<()> {
    options.validate()?;

    let (driver, events) = BleRadioDriver::start(config.ble.clone()).await?;
    let (task, handle, mut observer) = PresenceEngineBuilder::new(driver, events)
        .with_config(config.engine.clone())
        .with_identity(options.username.clone())
        .spawn()?;

    if options.advertise {
        handle.start_advertising().await?;
    }
    if options.scan {
        handle.start_scanning().await?;
    }
    if options.background {
        handle.enter_background().await?;
    }
    info!(
        "Presence running as '{}' (advertise: {}, scan: {})",
        options.username, options.advertise, options.scan
    );

    let presenter = Presenter::new(config.output.json);
    let mut sightings = SightingView::default();
    let mut lifecycle = LifecycleSignals::new()?;

    loop {
        tokio::select! {
            event = observer.recv() => match event {
                Some(PresenceEvent::SightingUpdated(sighting)) => {
                    debug!("Sighting updated: {}", sighting.identifier());
                    sightings.update(sighting);
                    println!("{}", presenter.render(&sightings.rows(), Timestamp::now())?);
                }
                Some(PresenceEvent::ScanningStarted) => debug!("Scan window opened"),
                Some(PresenceEvent::ScanningStopped) => debug!("Scan window closed"),
                None => {
                    warn!("Presence engine stopped");
                    break;
                }
            },
            signal = lifecycle.next() => {
                if !apply_signal(&handle, signal).await? {
                    break;
                }
            }
        }
    }

    if let Ok(stats) = handle.stats().await {
        info!(
            "Discoveries: {}, handshakes resolved: {}, failed: {}, timed out: {}",
            stats.discoveries,
            stats.handshakes_resolved,
            stats.handshakes_failed,
            stats.handshake_timeouts
        );
    }
    if let Err(e) = handle.shutdown().await {
        debug!("Engine already stopped: {}", e);
    }

    match task.await {
        Ok(result) => Ok(result?),
        Err(e) => Err(CliError::Environment(format!("Engine task failed: {}", e))),
    }
}

/// Latest sighting per peer, as reported to the observer
#[derive(Debug, Default)]
pub struct SightingView {
    sightings: BTreeMap<PeerIdentifier, Sighting>,
}

impl SightingView {
    pub fn update(&mut self, sighting: Sighting) {
        self.sightings.insert(sighting.identifier().clone(), sighting);
    }

    /// Sightings ordered by identifier
    pub fn rows(&self) -> Vec<Sighting> {
        self.sightings.values().cloned().collect()
    }
}

/// Returns false once the app should exit
async fn apply_signal(handle: &PresenceHandle, signal: LifecycleSignal) -> Result<bool> {
    match signal {
        LifecycleSignal::Background => {
            info!("Entering background");
            handle.enter_background().await?;
        }
        LifecycleSignal::Foreground => {
            info!("Entering foreground");
            handle.enter_foreground().await?;
        }
        LifecycleSignal::Shutdown => {
            info!("Shutting down");
            return Ok(false);
        }
    }
    Ok(true)
}

// ----------------------------------------------------------------------------
// App Lifecycle Signals
// ----------------------------------------------------------------------------

/// Process-level stand-ins for app lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// SIGUSR1
    Background,
    /// SIGUSR2
    Foreground,
    /// Ctrl-C
    Shutdown,
}

#[cfg(unix)]
pub struct LifecycleSignals {
    background: tokio::signal::unix::Signal,
    foreground: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl LifecycleSignals {
    pub fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            background: signal(SignalKind::user_defined1())?,
            foreground: signal(SignalKind::user_defined2())?,
        })
    }

    pub async fn next(&mut self) -> LifecycleSignal {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => LifecycleSignal::Shutdown,
            Some(()) = self.background.recv() => LifecycleSignal::Background,
            Some(()) = self.foreground.recv() => LifecycleSignal::Foreground,
        }
    }
}

#[cfg(not(unix))]
pub struct LifecycleSignals;

#[cfg(not(unix))]
impl LifecycleSignals {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }

    pub async fn next(&mut self) -> LifecycleSignal {
        let _ = tokio::signal::ctrl_c().await;
        LifecycleSignal::Shutdown
    }
}
