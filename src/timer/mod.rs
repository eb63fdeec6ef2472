//! Periodic synchronization timer
//!
//! A hardware alarm wrapped so that its interrupt never runs user code:
//! the interrupt raises a single-slot wake, a deferred execution context
//! consumes it and runs the callback, and period changes requested through
//! `resync` take effect at the next firing.

pub mod sync;
pub mod traits;

pub use sync::{SyncTimer, TimerError, TimerShared};
pub use traits::Alarm;
