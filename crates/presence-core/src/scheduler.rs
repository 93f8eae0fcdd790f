//! Scan scheduler (inbound role)
//!
//! Duty-cycles scanning with a repeating timer of period P while in
//! intermittent mode: each firing toggles between a P-long scan window and a
//! P-long idle window. Backgrounding switches to continuous scanning and
//! foregrounding restarts the cycle from a fresh scan window.
//!
//! The scheduler owns no timer itself. It emits [`Effect::ArmScanTimer`] and
//! [`Effect::DisarmScanTimer`] and the engine task calls
//! [`ScanScheduler::on_timer_fired`] on every tick.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{Effect, PresenceEvent};
use crate::protocol::IDENTITY_SERVICE_UUID;

/// Scanning mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Symmetric on/off duty cycle
    Intermittent,
    /// Scan until told otherwise
    Continuous,
}

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub is_scanning: bool,
    pub period: Duration,
    pub mode: ScanMode,
}

/// Duty-cycle state machine for the inbound role
#[derive(Debug)]
pub struct ScanScheduler {
    window: ScanWindow,
    timer_armed: bool,
    inbound_ready: bool,
    deferred_start: bool,
    restored_session: bool,
}

impl ScanScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            window: ScanWindow {
                is_scanning: false,
                period,
                mode: ScanMode::Intermittent,
            },
            timer_armed: false,
            inbound_ready: false,
            deferred_start: false,
            restored_session: false,
        }
    }

    /// Treat the process as having resumed a scanning session
    pub fn with_restored_session(mut self, restored: bool) -> Self {
        self.restored_session = restored;
        self
    }

    pub fn window(&self) -> ScanWindow {
        self.window
    }

    pub fn is_scanning(&self) -> bool {
        self.window.is_scanning
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn is_start_deferred(&self) -> bool {
        self.deferred_start
    }

    pub fn is_session_restored(&self) -> bool {
        self.restored_session
    }

    /// Open a scan window now and arm the duty-cycle timer
    pub fn start(&mut self) -> Vec<Effect> {
        if !self.inbound_ready {
            warn!("Inbound role not ready, deferring scan start");
            self.deferred_start = true;
            return Vec::new();
        }
        if self.timer_armed || self.window.is_scanning {
            debug!("Scanning already active");
            return Vec::new();
        }

        self.window.mode = ScanMode::Intermittent;
        let mut effects = self.begin_window();
        self.timer_armed = true;
        effects.push(Effect::ArmScanTimer {
            period: self.window.period,
        });
        effects
    }

    /// Disarm the timer and close any open scan window
    pub fn stop(&mut self) -> Vec<Effect> {
        self.deferred_start = false;
        let mut effects = Vec::new();
        if self.timer_armed {
            self.timer_armed = false;
            effects.push(Effect::DisarmScanTimer);
        }
        if self.window.is_scanning {
            effects.extend(self.end_window());
        }
        self.window.mode = ScanMode::Intermittent;
        effects
    }

    /// One duty-cycle tick: toggle between scan and idle windows
    pub fn on_timer_fired(&mut self) -> Vec<Effect> {
        if !self.timer_armed {
            return Vec::new();
        }
        if self.window.is_scanning {
            self.end_window()
        } else {
            self.begin_window()
        }
    }

    /// App moved to the background: scan continuously.
    ///
    /// Only acts while the duty cycle is running.
    pub fn enter_continuous_mode(&mut self) -> Vec<Effect> {
        if self.deferred_start {
            self.window.mode = ScanMode::Continuous;
            return Vec::new();
        }
        if !self.timer_armed {
            return Vec::new();
        }

        info!("Switching to continuous scanning");
        self.timer_armed = false;
        self.window.mode = ScanMode::Continuous;
        let mut effects = vec![Effect::DisarmScanTimer];
        if !self.window.is_scanning {
            effects.extend(self.begin_window());
        }
        effects
    }

    /// App returned to the foreground: restart the duty cycle from a fresh
    /// window, but only if scanning was active or the session was restored.
    pub fn enter_intermittent_mode(&mut self) -> Vec<Effect> {
        if self.deferred_start {
            self.window.mode = ScanMode::Intermittent;
            return Vec::new();
        }
        let restored = std::mem::take(&mut self.restored_session);
        if !(restored || self.window.is_scanning) {
            debug!("Scanning not active, staying stopped");
            return Vec::new();
        }

        info!("Restoring intermittent scanning");
        let mut effects = self.stop();
        effects.extend(self.start());
        effects
    }

    /// The radio stack resumed a previous scanning session
    pub fn on_session_restored(&mut self) {
        self.restored_session = true;
    }

    /// The inbound role powered on; run a deferred start
    pub fn on_inbound_ready(&mut self) -> Vec<Effect> {
        if self.inbound_ready {
            return Vec::new();
        }
        self.inbound_ready = true;
        if !std::mem::take(&mut self.deferred_start) {
            return Vec::new();
        }

        match self.window.mode {
            ScanMode::Intermittent => self.start(),
            ScanMode::Continuous => self.begin_window(),
        }
    }

    fn begin_window(&mut self) -> Vec<Effect> {
        self.window.is_scanning = true;
        debug!("Scan window opened");
        vec![
            Effect::StartScan {
                service: IDENTITY_SERVICE_UUID,
            },
            Effect::Notify(PresenceEvent::ScanningStarted),
        ]
    }

    fn end_window(&mut self) -> Vec<Effect> {
        self.window.is_scanning = false;
        debug!("Scan window closed");
        vec![
            Effect::StopScan,
            Effect::Notify(PresenceEvent::ScanningStopped),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(5);

    fn ready_scheduler() -> ScanScheduler {
        let mut scheduler = ScanScheduler::new(PERIOD);
        scheduler.on_inbound_ready();
        scheduler
    }

    fn started() -> Vec<Effect> {
        vec![
            Effect::StartScan {
                service: IDENTITY_SERVICE_UUID,
            },
            Effect::Notify(PresenceEvent::ScanningStarted),
        ]
    }

    fn stopped() -> Vec<Effect> {
        vec![
            Effect::StopScan,
            Effect::Notify(PresenceEvent::ScanningStopped),
        ]
    }

    #[test]
    fn test_start_opens_window_and_arms_timer() {
        let mut scheduler = ready_scheduler();
        let mut expected = started();
        expected.push(Effect::ArmScanTimer { period: PERIOD });
        assert_eq!(scheduler.start(), expected);
        assert!(scheduler.is_scanning());
        assert!(scheduler.is_timer_armed());
        assert!(scheduler.start().is_empty());
    }

    #[test]
    fn test_timer_toggles_windows() {
        let mut scheduler = ready_scheduler();
        scheduler.start();
        assert_eq!(scheduler.on_timer_fired(), stopped());
        assert_eq!(scheduler.on_timer_fired(), started());
        assert_eq!(scheduler.on_timer_fired(), stopped());
    }

    #[test]
    fn test_stop_matches_natural_stop() {
        let mut scheduler = ready_scheduler();
        scheduler.start();
        let mut expected = vec![Effect::DisarmScanTimer];
        expected.extend(stopped());
        assert_eq!(scheduler.stop(), expected);

        // Late tick after stop is ignored
        assert!(scheduler.on_timer_fired().is_empty());
    }

    #[test]
    fn test_stop_during_idle_window_only_disarms() {
        let mut scheduler = ready_scheduler();
        scheduler.start();
        scheduler.on_timer_fired();
        assert_eq!(scheduler.stop(), vec![Effect::DisarmScanTimer]);
    }

    #[test]
    fn test_start_deferred_until_inbound_ready() {
        let mut scheduler = ScanScheduler::new(PERIOD);
        assert!(scheduler.start().is_empty());
        assert!(scheduler.is_start_deferred());

        let effects = scheduler.on_inbound_ready();
        assert_eq!(effects.len(), 3);
        assert!(scheduler.is_timer_armed());
        assert!(!scheduler.is_start_deferred());
    }

    #[test]
    fn test_stop_cancels_deferred_start() {
        let mut scheduler = ScanScheduler::new(PERIOD);
        scheduler.start();
        scheduler.stop();
        assert!(scheduler.on_inbound_ready().is_empty());
        assert!(!scheduler.is_scanning());
    }

    #[test]
    fn test_background_while_idle_forces_scan_on() {
        let mut scheduler = ready_scheduler();
        scheduler.start();
        scheduler.on_timer_fired();

        let mut expected = vec![Effect::DisarmScanTimer];
        expected.extend(started());
        assert_eq!(scheduler.enter_continuous_mode(), expected);
        assert_eq!(scheduler.window().mode, ScanMode::Continuous);
        assert!(scheduler.is_scanning());
    }

    #[test]
    fn test_background_while_scanning_keeps_scan() {
        let mut scheduler = ready_scheduler();
        scheduler.start();
        assert_eq!(scheduler.enter_continuous_mode(), vec![Effect::DisarmScanTimer]);
        assert!(scheduler.is_scanning());
    }

    #[test]
    fn test_background_when_stopped_is_noop() {
        let mut scheduler = ready_scheduler();
        assert!(scheduler.enter_continuous_mode().is_empty());
        assert!(scheduler.enter_intermittent_mode().is_empty());
        assert!(!scheduler.is_scanning());
    }

    #[test]
    fn test_foreground_restarts_cycle() {
        let mut scheduler = ready_scheduler();
        scheduler.start();
        scheduler.enter_continuous_mode();

        let mut expected = stopped();
        expected.extend(started());
        expected.push(Effect::ArmScanTimer { period: PERIOD });
        assert_eq!(scheduler.enter_intermittent_mode(), expected);
        assert_eq!(scheduler.window().mode, ScanMode::Intermittent);
        assert!(scheduler.is_timer_armed());
    }

    #[test]
    fn test_restored_session_resumes_on_foreground() {
        let mut scheduler = ScanScheduler::new(PERIOD).with_restored_session(true);
        scheduler.on_inbound_ready();

        let effects = scheduler.enter_intermittent_mode();
        assert_eq!(effects.len(), 3);
        assert!(scheduler.is_timer_armed());
        assert!(!scheduler.is_session_restored());
    }

    #[test]
    fn test_background_before_ready_scans_continuously_on_ready() {
        let mut scheduler = ScanScheduler::new(PERIOD);
        scheduler.start();
        scheduler.enter_continuous_mode();
        assert_eq!(scheduler.on_inbound_ready(), started());
        assert!(!scheduler.is_timer_armed());
    }
}
