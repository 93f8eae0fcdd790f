//! Presence engine task
//!
//! A single task owns the [`PresenceEngine`] and the [`RadioDriver`]. It
//! serializes app requests, driver events, duty-cycle ticks and deadline
//! sweeps onto one `select!` loop, executes the resulting effects and
//! forwards notifications to the observer channel.
//!
//! The task never waits on the observer. Notifications that do not fit in
//! the observer channel are parked in a backlog that keeps only the latest
//! sighting per peer, and are flushed as the observer catches up.

use std::collections::VecDeque;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::channel::{Command, Effect, PresenceEvent};
use crate::config::PresenceConfig;
use crate::driver::{DriverEventReceiver, RadioDriver};
use crate::engine::{EngineStats, PresenceEngine};
use crate::errors::{PresenceError, PresenceResult};
use crate::scheduler::ScanWindow;
use crate::sighting::Sighting;
use crate::types::{PeerIdentifier, SystemTimeSource, TimeSource};

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// Messages accepted by the engine task
#[derive(Debug)]
pub enum Request {
    Command(Command),
    Snapshot(oneshot::Sender<Vec<Sighting>>),
    Stats(oneshot::Sender<EngineStats>),
    ScanWindow(oneshot::Sender<ScanWindow>),
    Shutdown,
}

/// Receiving half of the observer channel
pub type PresenceEventReceiver = mpsc::Receiver<PresenceEvent>;

// ----------------------------------------------------------------------------
// Engine Task
// ----------------------------------------------------------------------------

/// The task that owns the engine and drives the radio
pub struct PresenceEngineTask<D: RadioDriver, T: TimeSource = SystemTimeSource> {
    engine: PresenceEngine<D::Peer, T>,
    driver: D,
    request_receiver: mpsc::Receiver<Request>,
    event_receiver: DriverEventReceiver<D::Peer>,
    observer_sender: mpsc::Sender<PresenceEvent>,
    backlog: ObserverBacklog,
    scan_timer: Option<Interval>,
    running: bool,
}

impl<D: RadioDriver, T: TimeSource> PresenceEngineTask<D, T> {
    pub fn engine(&self) -> &PresenceEngine<D::Peer, T> {
        &self.engine
    }

    /// Run until shutdown is requested, every handle is dropped, or the
    /// driver closes its event channel
    pub async fn run(mut self) -> PresenceResult<()> {
        info!("Presence engine task starting");

        let mut sweep = interval(self.engine.config().deadline_sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let observer_sender = self.observer_sender.clone();

        while self.running {
            let result = tokio::select! {
                request = self.request_receiver.recv() => match request {
                    Some(request) => self.process_request(request).await,
                    None => {
                        info!("All presence handles dropped, shutting down");
                        self.running = false;
                        Ok(())
                    }
                },

                event = self.event_receiver.recv() => match event {
                    Some(event) => {
                        let effects = self.engine.handle_driver_event(event);
                        self.execute(effects).await
                    }
                    None => {
                        warn!("Driver event channel closed, shutting down");
                        self.running = false;
                        Ok(())
                    }
                },

                _ = next_scan_tick(&mut self.scan_timer) => {
                    let effects = self.engine.on_scan_timer();
                    self.execute(effects).await
                }

                _ = sweep.tick() => {
                    let effects = self.engine.sweep_deadlines();
                    self.execute(effects).await
                }

                Ok(permit) = observer_sender.reserve(), if !self.backlog.is_empty() => {
                    if let Some(event) = self.backlog.pop() {
                        permit.send(event);
                    }
                    Ok(())
                }
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    error!("Unrecoverable error, shutting down presence engine: {}", e);
                    return Err(e);
                }
                warn!("Error in presence engine: {}", e);
            }
        }

        info!("Presence engine task stopped");
        Ok(())
    }

    async fn process_request(&mut self, request: Request) -> PresenceResult<()> {
        match request {
            Request::Command(command) => {
                let effects = self.engine.handle_command(command);
                self.execute(effects).await?;
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot());
            }
            Request::Stats(reply) => {
                let _ = reply.send(self.engine.stats());
            }
            Request::ScanWindow(reply) => {
                let _ = reply.send(self.engine.scan_window());
            }
            Request::Shutdown => {
                info!("Shutdown requested");
                self.running = false;
            }
        }
        Ok(())
    }

    /// Execute effects in order; failures to submit a driver command feed
    /// back into the engine and their follow-up effects run in turn
    async fn execute(&mut self, effects: Vec<Effect>) -> PresenceResult<()> {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::ArmScanTimer { period } => {
                    let mut timer = interval_at(Instant::now() + period, period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.scan_timer = Some(timer);
                }
                Effect::DisarmScanTimer => {
                    self.scan_timer = None;
                }
                Effect::Notify(event) => self.notify(event),
                effect => {
                    if let Err(e) = self.dispatch(&effect).await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        queue.extend(self.engine.driver_command_failed(&effect, e));
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, effect: &Effect) -> PresenceResult<()> {
        debug!("Dispatching {:?}", effect);
        match effect {
            Effect::PublishIdentity {
                service,
                characteristic,
                value,
            } => {
                self.driver
                    .publish_service(*service, *characteristic, value.clone())
                    .await
            }
            Effect::UpdateIdentity {
                characteristic,
                value,
            } => self.driver.update_value(*characteristic, value.clone()).await,
            Effect::StartAdvertising { service } => self.driver.start_advertising(*service).await,
            Effect::StopAdvertising => self.driver.stop_advertising().await,
            Effect::StartScan { service } => self.driver.start_scan(*service).await,
            Effect::StopScan => self.driver.stop_scan().await,
            Effect::Connect { peer } => {
                let handle = self.peer_handle(peer)?;
                self.driver.connect(&handle).await
            }
            Effect::DiscoverService { peer, service } => {
                let handle = self.peer_handle(peer)?;
                self.driver.discover_service(&handle, *service).await
            }
            Effect::DiscoverCharacteristics { peer, service } => {
                let handle = self.peer_handle(peer)?;
                self.driver.discover_characteristics(&handle, service).await
            }
            Effect::ReadValue {
                peer,
                characteristic,
            } => {
                let handle = self.peer_handle(peer)?;
                self.driver.read_value(&handle, characteristic).await
            }
            Effect::Disconnect { peer } => {
                let handle = self.peer_handle(peer)?;
                self.driver.disconnect(&handle).await?;
                self.engine.disconnect_submitted(peer);
                Ok(())
            }
            Effect::ArmScanTimer { .. } | Effect::DisarmScanTimer | Effect::Notify(_) => Ok(()),
        }
    }

    fn peer_handle(&self, peer: &PeerIdentifier) -> PresenceResult<D::Peer> {
        self.engine
            .handle_for(peer)
            .cloned()
            .ok_or_else(|| PresenceError::Driver(format!("no handle retained for peer {}", peer)))
    }

    fn notify(&mut self, event: PresenceEvent) {
        if self.observer_sender.is_closed() {
            debug!("Observer channel closed, dropping notification");
            self.backlog.clear();
            return;
        }
        if !self.backlog.is_empty() {
            self.backlog.push(event);
            return;
        }
        match self.observer_sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Observer is falling behind, coalescing notifications");
                self.backlog.push(event);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Observer channel closed, dropping notification");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Observer Backlog
// ----------------------------------------------------------------------------

/// Notifications waiting for room in the observer channel.
///
/// Holds at most one `SightingUpdated` per peer, replaced in place by newer
/// ones, and at most one scanning transition: an opposite transition cancels
/// the queued one, so the observer still ends on the current state.
#[derive(Debug, Default)]
struct ObserverBacklog {
    events: VecDeque<PresenceEvent>,
}

impl ObserverBacklog {
    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.len()
    }

    fn clear(&mut self) {
        self.events.clear();
    }

    fn pop(&mut self) -> Option<PresenceEvent> {
        self.events.pop_front()
    }

    fn push(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::SightingUpdated(sighting) => {
                let queued = self.events.iter_mut().find(|queued| match queued {
                    PresenceEvent::SightingUpdated(s) => s.identifier() == sighting.identifier(),
                    _ => false,
                });
                match queued {
                    Some(queued) => *queued = PresenceEvent::SightingUpdated(sighting),
                    None => self.events.push_back(PresenceEvent::SightingUpdated(sighting)),
                }
            }
            transition => {
                let queued = self.events.iter().position(|queued| {
                    matches!(
                        queued,
                        PresenceEvent::ScanningStarted | PresenceEvent::ScanningStopped
                    )
                });
                match queued {
                    Some(index) if self.events[index] != transition => {
                        self.events.remove(index);
                    }
                    Some(_) => {}
                    None => self.events.push_back(transition),
                }
            }
        }
    }
}

async fn next_scan_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ----------------------------------------------------------------------------
// Presence Handle
// ----------------------------------------------------------------------------

/// Cloneable handle for talking to a running engine task
#[derive(Debug, Clone)]
pub struct PresenceHandle {
    sender: mpsc::Sender<Request>,
}

impl PresenceHandle {
    pub fn new(sender: mpsc::Sender<Request>) -> Self {
        Self { sender }
    }

    pub async fn send_command(&self, command: Command) -> PresenceResult<()> {
        self.send(Request::Command(command)).await
    }

    pub async fn set_identity(&self, username: impl Into<String>) -> PresenceResult<()> {
        self.send_command(Command::SetIdentity {
            username: username.into(),
        })
        .await
    }

    pub async fn start_advertising(&self) -> PresenceResult<()> {
        self.send_command(Command::StartAdvertising).await
    }

    pub async fn stop_advertising(&self) -> PresenceResult<()> {
        self.send_command(Command::StopAdvertising).await
    }

    pub async fn start_scanning(&self) -> PresenceResult<()> {
        self.send_command(Command::StartScanning).await
    }

    pub async fn stop_scanning(&self) -> PresenceResult<()> {
        self.send_command(Command::StopScanning).await
    }

    pub async fn enter_background(&self) -> PresenceResult<()> {
        self.send_command(Command::EnterBackground).await
    }

    pub async fn enter_foreground(&self) -> PresenceResult<()> {
        self.send_command(Command::EnterForeground).await
    }

    /// Current sightings, ordered by identifier
    pub async fn snapshot(&self) -> PresenceResult<Vec<Sighting>> {
        let (reply, response) = oneshot::channel();
        self.send(Request::Snapshot(reply)).await?;
        response
            .await
            .map_err(|_| PresenceError::channel("engine task dropped snapshot request"))
    }

    pub async fn stats(&self) -> PresenceResult<EngineStats> {
        let (reply, response) = oneshot::channel();
        self.send(Request::Stats(reply)).await?;
        response
            .await
            .map_err(|_| PresenceError::channel("engine task dropped stats request"))
    }

    pub async fn scan_window(&self) -> PresenceResult<ScanWindow> {
        let (reply, response) = oneshot::channel();
        self.send(Request::ScanWindow(reply)).await?;
        response
            .await
            .map_err(|_| PresenceError::channel("engine task dropped scan window request"))
    }

    /// Ask the task to stop; in-flight handshakes are not aborted
    pub async fn shutdown(&self) -> PresenceResult<()> {
        self.send(Request::Shutdown).await
    }

    async fn send(&self, request: Request) -> PresenceResult<()> {
        self.sender
            .send(request)
            .await
            .map_err(|_| PresenceError::channel("presence engine task is not running"))
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Builder wiring a driver, its event channel and the engine together
pub struct PresenceEngineBuilder<D: RadioDriver, T: TimeSource = SystemTimeSource> {
    driver: D,
    event_receiver: DriverEventReceiver<D::Peer>,
    config: PresenceConfig,
    clock: T,
    restored_session: bool,
    identity: Option<String>,
}

impl<D: RadioDriver> PresenceEngineBuilder<D, SystemTimeSource> {
    /// Create a builder for `driver`, which reports on `event_receiver`
    pub fn new(driver: D, event_receiver: DriverEventReceiver<D::Peer>) -> Self {
        Self {
            driver,
            event_receiver,
            config: PresenceConfig::default(),
            clock: SystemTimeSource,
            restored_session: false,
            identity: None,
        }
    }
}

impl<D: RadioDriver, T: TimeSource> PresenceEngineBuilder<D, T> {
    pub fn with_config(mut self, config: PresenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the clock used for sighting timestamps and stage deadlines
    pub fn with_clock<U: TimeSource>(self, clock: U) -> PresenceEngineBuilder<D, U> {
        PresenceEngineBuilder {
            driver: self.driver,
            event_receiver: self.event_receiver,
            config: self.config,
            clock,
            restored_session: self.restored_session,
            identity: self.identity,
        }
    }

    /// The process resumed a previous scanning session
    pub fn restored_session(mut self, restored: bool) -> Self {
        self.restored_session = restored;
        self
    }

    /// Identity to publish once the outbound role is ready
    pub fn with_identity(mut self, username: impl Into<String>) -> Self {
        self.identity = Some(username.into());
        self
    }

    /// Build the task without spawning it
    pub fn build(
        self,
    ) -> PresenceResult<(PresenceEngineTask<D, T>, PresenceHandle, PresenceEventReceiver)> {
        let capacity = self.config.channel_capacity;
        let mut engine = PresenceEngine::new(self.config, self.clock)?
            .with_restored_session(self.restored_session);
        if let Some(identity) = self.identity {
            engine = engine.with_identity(identity);
        }

        let (request_sender, request_receiver) = mpsc::channel(capacity);
        let (observer_sender, observer_receiver) = mpsc::channel(capacity);

        let task = PresenceEngineTask {
            engine,
            driver: self.driver,
            request_receiver,
            event_receiver: self.event_receiver,
            observer_sender,
            backlog: ObserverBacklog::default(),
            scan_timer: None,
            running: true,
        };
        Ok((task, PresenceHandle::new(request_sender), observer_receiver))
    }
}

impl<D, T> PresenceEngineBuilder<D, T>
where
    D: RadioDriver + 'static,
    T: TimeSource + 'static,
{
    /// Build the task and spawn it on the current tokio runtime
    pub fn spawn(
        self,
    ) -> PresenceResult<(JoinHandle<PresenceResult<()>>, PresenceHandle, PresenceEventReceiver)> {
        let (task, handle, events) = self.build()?;
        let join = tokio::spawn(task.run());
        Ok((join, handle, events))
    }
}
