//! Radio hardware abstraction layer
//!
//! One driver per supported transceiver chip behind the [`Radio`] trait,
//! the shared transport error taxonomy, and the on-air-time calculator.
//! Backends are selected at build time; the SX126x driver sits behind the
//! `sx126x` feature.

pub mod airtime;
pub mod traits;

pub mod sx127x;
#[cfg(feature = "sx126x")]
pub mod sx126x;

pub use traits::{Radio, RadioError, RadioParameters, SetupError};

pub use sx127x::SX127x;
#[cfg(feature = "sx126x")]
pub use sx126x::SX126x;

use embedded_hal::blocking::delay::DelayMs;

use crate::irq::IrqSignal;

/// Block until `irq` is raised or `timeout_ms` elapses, polling at 1 ms
/// granularity. A timeout of `0` waits indefinitely.
pub(crate) fn wait_completion<D: DelayMs<u32>>(
    irq: &IrqSignal,
    delay: &mut D,
    timeout_ms: u32,
) -> Result<(), RadioError> {
    let mut waited_ms = 0u32;
    loop {
        if irq.take() {
            return Ok(());
        }
        if timeout_ms != 0 && waited_ms >= timeout_ms {
            return Err(RadioError::Timeout);
        }
        delay.delay_ms(1);
        waited_ms += 1;
    }
}
