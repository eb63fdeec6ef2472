//! Single-bit completion signalling between interrupt and normal context
//!
//! Radio operations and the sync timer both learn that an asynchronous
//! operation finished through a hardware interrupt. The interrupt handler
//! owns the writing side of an [`IrqSignal`]; the blocking caller owns the
//! read-and-clear side. The signal must be lowered before the next operation
//! is issued, otherwise a completion left over from an earlier operation
//! would be attributed to the new one.

use core::cell::Cell;

use critical_section::Mutex;

/// One-bit completion signal shared between an interrupt handler and the
/// execution context waiting on it.
///
/// `const`-constructible so it can live in a `static` reachable from the
/// interrupt vector:
///
/// ```ignore
/// static RADIO_DONE: IrqSignal = IrqSignal::new();
///
/// #[interrupt]
/// fn DIO1() {
///     RADIO_DONE.raise();
/// }
/// ```
pub struct IrqSignal {
    flag: Mutex<Cell<bool>>,
}

impl IrqSignal {
    /// Create a lowered signal.
    pub const fn new() -> Self {
        Self {
            flag: Mutex::new(Cell::new(false)),
        }
    }

    /// Mark the pending operation complete. Interrupt-side; never blocks.
    pub fn raise(&self) {
        critical_section::with(|cs| self.flag.borrow(cs).set(true));
    }

    /// Read and clear the signal in one step.
    ///
    /// Returns `true` exactly once per completion event.
    pub fn take(&self) -> bool {
        critical_section::with(|cs| self.flag.borrow(cs).replace(false))
    }

    /// Lower the signal without reading it.
    ///
    /// Called before issuing an operation so that a stale completion cannot
    /// satisfy the new wait.
    pub fn reset(&self) {
        critical_section::with(|cs| self.flag.borrow(cs).set(false));
    }

    /// Whether the signal is currently raised, without consuming it.
    pub fn is_raised(&self) -> bool {
        critical_section::with(|cs| self.flag.borrow(cs).get())
    }
}

impl Default for IrqSignal {
    fn default() -> Self {
        Self::new()
    }
}
