//! Hardware-abstraction core for a time-synchronized LoRa link experiment
//!
//! This crate provides the two primitives the experiment's control loop is
//! built on:
//! - A radio capability set over half-duplex LoRa transceivers, with one
//!   driver per supported chip, a shared transport error taxonomy and an
//!   exact on-air-time calculator.
//! - A periodic synchronization timer that hands its hardware alarm
//!   interrupt off to a deferred execution context and can re-arm its
//!   period at the next firing, used to correct clock drift between a
//!   transmitter/receiver pair.
//!
//! # Features
//! - `sx126x` - build the SX126x backend in addition to the SX127x one
//! - `defmt` - derive `defmt::Format` on public value types
//! - `std` - host-side demo programs
//!
//! # Example
//! ```
//! use lora_sync::radio::{airtime, RadioParameters};
//!
//! // SF7 / 125 kHz / CR 4-5, explicit header, CRC on.
//! let params = RadioParameters::default();
//!
//! // A 10-byte payload occupies the channel for 41.216 ms.
//! assert_eq!(airtime::time_on_air_us(&params, 10), 41_216);
//! ```

#![warn(missing_docs)]
#![no_std]

/// Interrupt-to-caller completion signalling
pub mod irq;

/// Radio hardware abstraction layer
pub mod radio;

/// Periodic synchronization timer
pub mod timer;
