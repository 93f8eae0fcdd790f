//! Property tests for the scan duty cycle and lifecycle transitions

use std::time::Duration;

use presence_core::{Effect, PresenceEvent, ScanScheduler};
use proptest::prelude::*;

fn ready(period: Duration) -> ScanScheduler {
    let mut scheduler = ScanScheduler::new(period);
    scheduler.on_inbound_ready();
    scheduler
}

/// Scanning state after each of `ticks` timer firings, starting from `start()`
fn timeline(scheduler: &mut ScanScheduler, ticks: usize) -> Vec<bool> {
    scheduler.start();
    let mut states = vec![scheduler.is_scanning()];
    for _ in 0..ticks {
        scheduler.on_timer_fired();
        states.push(scheduler.is_scanning());
    }
    states
}

fn notifications(effects: &[Effect]) -> Vec<PresenceEvent> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_scanning_covers_half_of_every_two_period_window(
        period_secs in 1u64..60,
        offset in 0usize..40,
    ) {
        let period = Duration::from_secs(period_secs);
        let mut scheduler = ready(period);
        // states[k] is the state over [kP, (k+1)P)
        let states = timeline(&mut scheduler, offset + 2);

        let scanning: Duration = states[offset..offset + 2]
            .iter()
            .filter(|scanning| **scanning)
            .map(|_| period)
            .sum();
        prop_assert_eq!(scanning, period);
    }

    #[test]
    fn prop_every_window_change_is_notified(ticks in 1usize..50) {
        let mut scheduler = ready(Duration::from_secs(5));
        let start = scheduler.start();
        prop_assert_eq!(notifications(&start), vec![PresenceEvent::ScanningStarted]);
        let mut scanning = true;

        for _ in 0..ticks {
            let effects = scheduler.on_timer_fired();
            let expected = if scanning {
                PresenceEvent::ScanningStopped
            } else {
                PresenceEvent::ScanningStarted
            };
            prop_assert_eq!(notifications(&effects), vec![expected]);
            scanning = !scanning;
        }
    }

    #[test]
    fn prop_foreground_restores_cycle_only_after_active_scanning(
        started in any::<bool>(),
        ticks in 0usize..10,
        restored in any::<bool>(),
    ) {
        let mut scheduler = ScanScheduler::new(Duration::from_secs(5)).with_restored_session(restored);
        scheduler.on_inbound_ready();
        if started {
            scheduler.start();
            for _ in 0..ticks {
                scheduler.on_timer_fired();
            }
        }

        scheduler.enter_continuous_mode();
        scheduler.enter_intermittent_mode();

        let active = started || restored;
        prop_assert_eq!(scheduler.is_timer_armed(), active);
        prop_assert_eq!(scheduler.is_scanning(), active);
    }
}
