//! Sync timer implementation
//!
//! Split into two halves: [`TimerShared`] is the interrupt-facing state the
//! alarm handler reports into, [`SyncTimer`] is the normal-domain object the
//! deferred execution context drives. The hardware alarm must not be
//! re-armed from an arbitrary context while it is live, so period changes
//! are parked in a pending slot and applied from the firing path.

use core::cell::Cell;

use critical_section::Mutex;

use crate::irq::IrqSignal;
use crate::timer::traits::Alarm;

/// Sync timer failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError<E> {
    /// The backing hardware alarm failed; the timer cannot function
    /// without it.
    Alarm(E),
    /// A zero period was requested.
    InvalidPeriod,
}

/// Interrupt-facing half of the sync timer.
///
/// Lives in a `static` so the alarm interrupt can reach it:
///
/// ```ignore
/// static SYNC: TimerShared = TimerShared::new();
///
/// #[interrupt]
/// fn ALARM() {
///     SYNC.on_alarm();
/// }
/// ```
///
/// The interrupt domain may only call [`on_alarm`](Self::on_alarm) and
/// [`request_resync`](Self::request_resync); everything else belongs to the
/// context driving [`SyncTimer::process`].
pub struct TimerShared {
    fired: IrqSignal,
    pending_period: Mutex<Cell<Option<u64>>>,
}

impl TimerShared {
    /// Create idle shared state.
    pub const fn new() -> Self {
        Self {
            fired: IrqSignal::new(),
            pending_period: Mutex::new(Cell::new(None)),
        }
    }

    /// Record one alarm firing. Interrupt-side; never blocks.
    ///
    /// The wake is level-triggered: firings arriving while a previous one
    /// is still unprocessed coalesce into a single pending wake, so a slow
    /// callback skips invocations instead of queueing them.
    pub fn on_alarm(&self) {
        self.fired.raise();
    }

    /// Ask for `period_us` to become the timer period starting from the
    /// next firing.
    ///
    /// Callable from any context, including from inside the fired callback.
    /// A zero period is ignored.
    pub fn request_resync(&self, period_us: u64) {
        if period_us == 0 {
            return;
        }
        critical_section::with(|cs| self.pending_period.borrow(cs).set(Some(period_us)));
    }

    /// Consume the pending period, if any. Firing-path only.
    fn take_pending(&self) -> Option<u64> {
        critical_section::with(|cs| self.pending_period.borrow(cs).take())
    }

    fn clear(&self) {
        self.fired.reset();
        critical_section::with(|cs| self.pending_period.borrow(cs).set(None));
    }
}

impl Default for TimerShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic timer delivering a callback from a deferred execution context.
///
/// The callback never runs with interrupts masked: the alarm interrupt only
/// raises the wake in [`TimerShared`], and the context that owns this value
/// delivers the callback by calling [`process`](Self::process) in its loop.
pub struct SyncTimer<'a, A: Alarm, F: FnMut()> {
    alarm: A,
    shared: &'a TimerShared,
    on_fire: Option<F>,
    period_us: u64,
    running: bool,
}

impl<'a, A: Alarm, F: FnMut()> SyncTimer<'a, A, F> {
    /// Wrap a hardware alarm. `shared` must be the same state the alarm
    /// interrupt reports into.
    pub fn new(alarm: A, shared: &'a TimerShared) -> Self {
        Self {
            alarm,
            shared,
            on_fire: None,
            period_us: 0,
            running: false,
        }
    }

    /// Arm the timer to run `on_fire` every `period_us` microseconds,
    /// replacing any previously running schedule.
    pub fn start(&mut self, period_us: u64, on_fire: F) -> Result<(), TimerError<A::Error>> {
        if period_us == 0 {
            return Err(TimerError::InvalidPeriod);
        }
        if self.alarm.is_active() {
            self.alarm.cancel().map_err(TimerError::Alarm)?;
        }
        // Wakes and resyncs addressed to the previous schedule are stale.
        self.shared.clear();
        self.alarm.start_periodic(period_us).map_err(TimerError::Alarm)?;
        self.period_us = period_us;
        self.on_fire = Some(on_fire);
        self.running = true;
        Ok(())
    }

    /// Schedule `period_us` to take effect at the next firing.
    ///
    /// The current period is unchanged until that firing has been
    /// processed.
    pub fn resync(&self, period_us: u64) -> Result<(), TimerError<A::Error>> {
        if period_us == 0 {
            return Err(TimerError::InvalidPeriod);
        }
        self.shared.request_resync(period_us);
        Ok(())
    }

    /// Deliver at most one pending firing.
    ///
    /// Called from the deferred execution context's loop. A pending resync
    /// is applied before the callback runs, so the callback already
    /// observes the new period. Returns whether a firing was delivered.
    pub fn process(&mut self) -> Result<bool, TimerError<A::Error>> {
        if !self.running || !self.shared.fired.take() {
            return Ok(false);
        }
        if let Some(new_period) = self.shared.take_pending() {
            self.alarm.cancel().map_err(TimerError::Alarm)?;
            self.alarm
                .start_periodic(new_period)
                .map_err(TimerError::Alarm)?;
            self.period_us = new_period;
        }
        if let Some(on_fire) = self.on_fire.as_mut() {
            on_fire();
        }
        Ok(true)
    }

    /// Cancel the alarm and drop any pending wake or resync.
    ///
    /// An in-progress callback is not interrupted, but no further firings
    /// are delivered once this returns.
    pub fn stop(&mut self) -> Result<(), TimerError<A::Error>> {
        if self.alarm.is_active() {
            self.alarm.cancel().map_err(TimerError::Alarm)?;
        }
        self.shared.clear();
        self.running = false;
        self.on_fire = None;
        Ok(())
    }

    /// The period currently armed, in microseconds.
    pub fn current_period_us(&self) -> u64 {
        self.period_us
    }

    /// Microseconds until the next firing, `0` when stopped.
    pub fn time_until_fire_us(&self) -> u64 {
        self.alarm.time_until_fire_us()
    }

    /// Whether the timer is armed.
    pub fn is_running(&self) -> bool {
        self.running
    }
}
