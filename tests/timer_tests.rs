#![no_std]

use core::cell::Cell;

use lora_sync::timer::{Alarm, SyncTimer, TimerError, TimerShared};

/// Scripted state of the simulated hardware alarm, shared with the test so
/// the arming history stays observable after the alarm is moved into the
/// timer.
struct AlarmState {
    period: Cell<Option<u64>>,
    starts: Cell<u32>,
    remaining_us: Cell<u64>,
}

impl AlarmState {
    fn new() -> Self {
        Self {
            period: Cell::new(None),
            starts: Cell::new(0),
            remaining_us: Cell::new(0),
        }
    }
}

struct MockAlarm<'a> {
    state: &'a AlarmState,
}

impl Alarm for MockAlarm<'_> {
    type Error = ();

    fn start_periodic(&mut self, period_us: u64) -> Result<(), ()> {
        self.state.period.set(Some(period_us));
        self.state.starts.set(self.state.starts.get() + 1);
        self.state.remaining_us.set(period_us);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), ()> {
        self.state.period.set(None);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.state.period.get().is_some()
    }

    fn time_until_fire_us(&self) -> u64 {
        if self.is_active() {
            self.state.remaining_us.get()
        } else {
            0
        }
    }
}

/// Alarm whose arming always fails.
struct BrokenAlarm;

impl Alarm for BrokenAlarm {
    type Error = ();

    fn start_periodic(&mut self, _period_us: u64) -> Result<(), ()> {
        Err(())
    }

    fn cancel(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }

    fn time_until_fire_us(&self) -> u64 {
        0
    }
}

#[test]
fn start_arms_the_alarm() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);

    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    assert!(timer.is_running());
    assert_eq!(timer.current_period_us(), 1_000_000);
    assert_eq!(state.period.get(), Some(1_000_000));
}

#[test]
fn firings_are_delivered_from_process() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    // No firing yet.
    assert_eq!(timer.process(), Ok(false));
    assert_eq!(fires.get(), 0);

    shared.on_alarm();
    assert_eq!(timer.process(), Ok(true));
    assert_eq!(fires.get(), 1);

    // The wake was consumed.
    assert_eq!(timer.process(), Ok(false));
    assert_eq!(fires.get(), 1);
}

#[test]
fn idle_firings_are_not_lost() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    shared.on_alarm();
    timer.process().unwrap();
    shared.on_alarm();
    timer.process().unwrap();

    assert_eq!(fires.get(), 2);
}

#[test]
fn overlapping_firings_coalesce() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    // Three firings pile up before the worker gets around to them; the
    // wake is level-triggered, so exactly one delivery results.
    shared.on_alarm();
    shared.on_alarm();
    shared.on_alarm();

    assert_eq!(timer.process(), Ok(true));
    assert_eq!(timer.process(), Ok(false));
    assert_eq!(fires.get(), 1);
}

#[test]
fn resync_defers_to_next_firing() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    timer.resync(1_200_000).unwrap();

    // Nothing changes until the alarm actually fires.
    assert_eq!(timer.current_period_us(), 1_000_000);
    assert_eq!(state.period.get(), Some(1_000_000));
    assert_eq!(timer.process(), Ok(false));
    assert_eq!(timer.current_period_us(), 1_000_000);

    shared.on_alarm();
    assert_eq!(timer.process(), Ok(true));
    assert_eq!(fires.get(), 1);
    assert_eq!(timer.current_period_us(), 1_200_000);
    assert_eq!(state.period.get(), Some(1_200_000));
}

#[test]
fn resync_requested_from_the_callback() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(500_000, || shared.request_resync(750_000)).unwrap();

    // The callback parks the resync during the first firing.
    shared.on_alarm();
    timer.process().unwrap();
    assert_eq!(timer.current_period_us(), 500_000);

    // It is applied when the following firing is processed.
    shared.on_alarm();
    timer.process().unwrap();
    assert_eq!(timer.current_period_us(), 750_000);
}

#[test]
fn stop_cuts_off_delivery() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    shared.on_alarm();
    timer.stop().unwrap();

    assert_eq!(timer.process(), Ok(false));
    assert_eq!(fires.get(), 0);
    assert!(!timer.is_running());
    assert_eq!(state.period.get(), None);
    assert_eq!(timer.time_until_fire_us(), 0);
}

#[test]
fn start_replaces_previous_schedule() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let bump = || fires.set(fires.get() + 1);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, bump).unwrap();

    // A wake addressed to the old schedule must not leak into the new one.
    shared.on_alarm();
    timer.start(2_000_000, bump).unwrap();

    assert_eq!(state.starts.get(), 2);
    assert_eq!(timer.current_period_us(), 2_000_000);
    assert_eq!(timer.process(), Ok(false));
    assert_eq!(fires.get(), 0);
}

#[test]
fn zero_periods_are_rejected() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let bump = || fires.set(fires.get() + 1);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);

    assert_eq!(timer.start(0, bump), Err(TimerError::InvalidPeriod));
    assert!(!timer.is_running());

    timer.start(1_000_000, bump).unwrap();
    assert_eq!(timer.resync(0), Err(TimerError::InvalidPeriod));

    // The rejected resync left nothing pending.
    shared.on_alarm();
    timer.process().unwrap();
    assert_eq!(timer.current_period_us(), 1_000_000);
}

#[test]
fn alarm_failure_is_fatal() {
    let shared = TimerShared::new();
    let mut timer = SyncTimer::new(BrokenAlarm, &shared);

    assert_eq!(timer.start(1_000_000, || {}), Err(TimerError::Alarm(())));
    assert!(!timer.is_running());
}

#[test]
fn introspection_follows_the_alarm() {
    let state = AlarmState::new();
    let shared = TimerShared::new();
    let fires = Cell::new(0u32);
    let mut timer = SyncTimer::new(MockAlarm { state: &state }, &shared);
    timer.start(1_000_000, || fires.set(fires.get() + 1)).unwrap();

    state.remaining_us.set(250_000);
    assert_eq!(timer.time_until_fire_us(), 250_000);

    timer.stop().unwrap();
    assert_eq!(timer.time_until_fire_us(), 0);
}
