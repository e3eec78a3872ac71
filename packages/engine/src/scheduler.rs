//! # Regeneration Scheduler
//!
//! Debounces rapid edits into a single regeneration trigger and drives the
//! staleness countdown from the same timer, so a forced refresh can never
//! leave a countdown running on its own.
//!
//! The scheduler never sleeps. Callers pass `now` in, ask for
//! [`RegenerationScheduler::next_deadline`] and call
//! [`RegenerationScheduler::poll`] once it passes.

use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_QUIESCENCE_MS: u64 = 2000;
const DEFAULT_TICK_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    CountingDown,
    /// Window expired while a regeneration was in flight
    PendingTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Dispatch exactly one regeneration
    Fire { forced: bool },

    /// Whole seconds left before the window expires
    Tick { remaining_secs: u64 },

    StalenessChanged(bool),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    CountingDown { deadline: Instant, next_tick: Instant },
    PendingTrigger,
}

#[derive(Debug)]
pub struct RegenerationScheduler {
    quiescence: Duration,
    tick: Duration,
    phase: Phase,
    in_flight: bool,
    stale: bool,
    initial_load: bool,
    forced_pending: bool,
}

impl RegenerationScheduler {
    /// Scheduler with the 2 s quiescence window and 1 s countdown ticks
    pub fn new() -> Self {
        Self::with_timing(
            Duration::from_millis(DEFAULT_QUIESCENCE_MS),
            Duration::from_millis(DEFAULT_TICK_MS),
        )
    }

    pub fn with_timing(quiescence: Duration, tick: Duration) -> Self {
        Self {
            quiescence,
            tick: tick.max(Duration::from_millis(1)),
            phase: Phase::Idle,
            in_flight: false,
            stale: false,
            initial_load: true,
            forced_pending: false,
        }
    }

    /// Disable the initial-load grace period
    pub fn without_grace(mut self) -> Self {
        self.initial_load = false;
        self
    }

    pub fn phase(&self) -> SchedulerPhase {
        match self.phase {
            Phase::Idle => SchedulerPhase::Idle,
            Phase::CountingDown { .. } => SchedulerPhase::CountingDown,
            Phase::PendingTrigger => SchedulerPhase::PendingTrigger,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_initial_load(&self) -> bool {
        self.initial_load
    }

    /// Input changed: (re)start the quiescence window.
    ///
    /// Edits made while the initial population is still running are not
    /// user-driven staleness and are ignored.
    pub fn notify_change(&mut self, now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();

        if self.initial_load && matches!(self.phase, Phase::Idle) {
            debug!("Change during initial load ignored");
            return events;
        }

        self.set_stale(true, &mut events);
        if self.forced_pending && matches!(self.phase, Phase::PendingTrigger) {
            // The parked forced refresh already covers this edit
            return events;
        }
        self.phase = Phase::CountingDown {
            deadline: now + self.quiescence,
            next_tick: now + self.tick,
        };
        events.push(SchedulerEvent::Tick {
            remaining_secs: ceil_secs(self.quiescence),
        });

        events
    }

    /// Advance the timer to `now`
    pub fn poll(&mut self, now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();

        let Phase::CountingDown {
            deadline,
            mut next_tick,
        } = self.phase
        else {
            return events;
        };

        while next_tick <= now && next_tick < deadline {
            events.push(SchedulerEvent::Tick {
                remaining_secs: ceil_secs(deadline - next_tick),
            });
            next_tick += self.tick;
        }

        if now >= deadline {
            if self.in_flight {
                debug!("Quiescence window expired while a regeneration is in flight");
                self.phase = Phase::PendingTrigger;
            } else {
                let forced = std::mem::take(&mut self.forced_pending);
                self.fire(forced, &mut events);
            }
        } else {
            self.phase = Phase::CountingDown {
                deadline,
                next_tick,
            };
        }

        events
    }

    /// Explicit "refresh now": cancel any window and fire immediately
    pub fn force_now(&mut self, _now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();

        if self.in_flight {
            self.phase = Phase::PendingTrigger;
            self.forced_pending = true;
        } else {
            self.forced_pending = false;
            self.fire(true, &mut events);
        }

        events
    }

    /// A regeneration was accepted by the generator
    pub fn mark_clean(&mut self, _now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        self.in_flight = false;
        self.initial_load = false;

        match self.phase {
            Phase::Idle => self.set_stale(false, &mut events),
            // A newer edit is already waiting for its own window
            Phase::CountingDown { .. } => {}
            Phase::PendingTrigger => {
                let forced = std::mem::take(&mut self.forced_pending);
                self.fire(forced, &mut events);
            }
        }

        events
    }

    /// A regeneration failed; staleness is kept so the user still sees the
    /// preview is out of date.
    pub fn mark_failed(&mut self, _now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        self.in_flight = false;

        if matches!(self.phase, Phase::PendingTrigger) {
            let forced = std::mem::take(&mut self.forced_pending);
            self.fire(forced, &mut events);
        }

        events
    }

    /// A fired regeneration turned out to be unnecessary (nothing changed)
    pub fn mark_skipped(&mut self, now: Instant) -> Vec<SchedulerEvent> {
        self.mark_clean(now)
    }

    /// When the timer next needs a `poll`
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::CountingDown {
                deadline,
                next_tick,
            } => Some(next_tick.min(deadline)),
            _ => None,
        }
    }

    fn fire(&mut self, forced: bool, events: &mut Vec<SchedulerEvent>) {
        self.phase = Phase::Idle;
        self.in_flight = true;
        events.push(SchedulerEvent::Fire { forced });
    }

    fn set_stale(&mut self, stale: bool, events: &mut Vec<SchedulerEvent>) {
        if self.stale != stale {
            self.stale = stale;
            events.push(SchedulerEvent::StalenessChanged(stale));
        }
    }
}

impl Default for RegenerationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn fires(events: &[SchedulerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::Fire { .. }))
            .count()
    }

    fn ready_scheduler() -> RegenerationScheduler {
        RegenerationScheduler::new().without_grace()
    }

    #[test]
    fn test_initial_load_ignores_changes() {
        let mut scheduler = RegenerationScheduler::new();
        let t0 = Instant::now();

        assert!(scheduler.notify_change(t0).is_empty());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert!(!scheduler.is_stale());
    }

    #[test]
    fn test_grace_ends_after_first_clean_regeneration() {
        let mut scheduler = RegenerationScheduler::new();
        let t0 = Instant::now();

        assert_eq!(fires(&scheduler.force_now(t0)), 1);
        scheduler.mark_clean(t0);
        assert!(!scheduler.is_initial_load());

        let events = scheduler.notify_change(t0);
        assert!(events.contains(&SchedulerEvent::StalenessChanged(true)));
        assert_eq!(scheduler.phase(), SchedulerPhase::CountingDown);
    }

    #[test]
    fn test_rapid_changes_fire_once_from_last_call() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        let mut all = Vec::new();
        for i in 0..10 {
            let t = t0 + ms(i * 500);
            all.extend(scheduler.notify_change(t));
            all.extend(scheduler.poll(t));
        }
        let last = t0 + ms(9 * 500);

        // Just before the window closes, nothing has fired
        all.extend(scheduler.poll(last + ms(1999)));
        assert_eq!(fires(&all), 0);

        all.extend(scheduler.poll(last + ms(2000)));
        assert_eq!(fires(&all), 1);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        // Nothing more without a new change
        all.extend(scheduler.poll(last + ms(10_000)));
        assert_eq!(fires(&all), 1);
    }

    #[test]
    fn test_countdown_ticks() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        let events = scheduler.notify_change(t0);
        assert!(events.contains(&SchedulerEvent::Tick { remaining_secs: 2 }));
        assert_eq!(scheduler.next_deadline(), Some(t0 + ms(1000)));

        let events = scheduler.poll(t0 + ms(1000));
        assert_eq!(events, vec![SchedulerEvent::Tick { remaining_secs: 1 }]);
        assert_eq!(scheduler.next_deadline(), Some(t0 + ms(2000)));

        let events = scheduler.poll(t0 + ms(2000));
        assert_eq!(events, vec![SchedulerEvent::Fire { forced: false }]);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_force_cancels_window_and_countdown() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.notify_change(t0);
        let events = scheduler.force_now(t0 + ms(300));
        assert_eq!(events, vec![SchedulerEvent::Fire { forced: true }]);
        assert_eq!(scheduler.next_deadline(), None);

        // The old window must not fire again
        assert_eq!(fires(&scheduler.poll(t0 + ms(5000))), 0);
    }

    #[test]
    fn test_change_during_flight_waits_for_completion() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.force_now(t0);
        assert!(scheduler.is_in_flight());

        scheduler.notify_change(t0 + ms(100));
        let events = scheduler.poll(t0 + ms(2100));
        assert_eq!(fires(&events), 0);
        assert_eq!(scheduler.phase(), SchedulerPhase::PendingTrigger);

        let events = scheduler.mark_clean(t0 + ms(2500));
        assert_eq!(events, vec![SchedulerEvent::Fire { forced: false }]);
        assert!(scheduler.is_in_flight());
        // Still stale: the fresh regeneration hasn't landed yet
        assert!(scheduler.is_stale());
    }

    #[test]
    fn test_mark_clean_keeps_staleness_for_newer_edit() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.notify_change(t0);
        scheduler.poll(t0 + ms(2000));
        scheduler.notify_change(t0 + ms(2100));

        let events = scheduler.mark_clean(t0 + ms(2200));
        assert!(events.is_empty());
        assert!(scheduler.is_stale());
        assert_eq!(scheduler.phase(), SchedulerPhase::CountingDown);
    }

    #[test]
    fn test_mark_clean_clears_staleness() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.notify_change(t0);
        scheduler.poll(t0 + ms(2000));

        let events = scheduler.mark_clean(t0 + ms(2100));
        assert_eq!(events, vec![SchedulerEvent::StalenessChanged(false)]);
        assert!(!scheduler.is_stale());
    }

    #[test]
    fn test_failure_keeps_staleness_and_releases_flight() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.notify_change(t0);
        scheduler.poll(t0 + ms(2000));
        assert!(scheduler.mark_failed(t0 + ms(2100)).is_empty());

        assert!(scheduler.is_stale());
        assert!(!scheduler.is_in_flight());
    }

    #[test]
    fn test_force_during_flight_is_deferred() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.force_now(t0);
        assert!(scheduler.force_now(t0 + ms(10)).is_empty());

        let events = scheduler.mark_failed(t0 + ms(20));
        assert_eq!(events, vec![SchedulerEvent::Fire { forced: true }]);
    }

    #[test]
    fn test_edit_keeps_deferred_force() {
        let mut scheduler = ready_scheduler();
        let t0 = Instant::now();

        scheduler.force_now(t0);
        scheduler.force_now(t0 + ms(10));

        let events = scheduler.notify_change(t0 + ms(20));
        assert_eq!(events, vec![SchedulerEvent::StalenessChanged(true)]);
        assert_eq!(scheduler.phase(), SchedulerPhase::PendingTrigger);
        assert_eq!(scheduler.next_deadline(), None);

        let events = scheduler.mark_clean(t0 + ms(500));
        assert_eq!(events, vec![SchedulerEvent::Fire { forced: true }]);
        assert_eq!(fires(&scheduler.poll(t0 + ms(5000))), 0);
    }
}
