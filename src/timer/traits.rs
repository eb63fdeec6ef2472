//! Hardware alarm abstraction
//!
//! The sync timer consumes exactly one periodic alarm source. The
//! application's composition root implements [`Alarm`] over its platform
//! timer and wires the alarm interrupt to
//! [`TimerShared::on_alarm`](crate::timer::TimerShared::on_alarm).

/// A periodic hardware alarm.
///
/// Arming failures are fatal for the synchronization experiment: without
/// its clock the transmitter/receiver pair cannot rendezvous, so callers
/// abort initialization instead of degrading silently.
pub trait Alarm {
    /// Platform error for alarm operations.
    type Error;

    /// Arm the alarm to fire every `period_us` microseconds, replacing any
    /// previous schedule.
    fn start_periodic(&mut self, period_us: u64) -> Result<(), Self::Error>;

    /// Disarm the alarm; no further interrupts are generated.
    fn cancel(&mut self) -> Result<(), Self::Error>;

    /// Whether the alarm is currently armed.
    fn is_active(&self) -> bool;

    /// Microseconds until the next firing, `0` when the alarm is idle.
    fn time_until_fire_us(&self) -> u64;
}
