#![no_std]

use core::cell::RefCell;

use heapless::Vec;
use lora_sync::radio::{airtime, Radio, RadioError, RadioParameters, SetupError};

/// A packet in flight: the transmitter's sync word plus the payload.
type Frame = (u8, Vec<u8, 256>);

/// Shared medium joining two simulated endpoints. Each side owns a
/// one-deep mailbox the other side transmits into.
pub struct Air {
    mailboxes: RefCell<[Option<Frame>; 2]>,
}

impl Air {
    /// Create an empty medium.
    pub fn new() -> Self {
        Self {
            mailboxes: RefCell::new([None, None]),
        }
    }

    /// The two endpoints of a loopback link.
    pub fn endpoints(&self) -> (SimRadio<'_>, SimRadio<'_>) {
        (SimRadio::new(self, 0), SimRadio::new(self, 1))
    }
}

/// Simulated radio endpoint for trait-level tests.
pub struct SimRadio<'a> {
    air: &'a Air,
    id: usize,
    params: RadioParameters,
    initialized: bool,
    last_rssi: i16,
    last_snr: f32,
}

impl<'a> SimRadio<'a> {
    fn new(air: &'a Air, id: usize) -> Self {
        Self {
            air,
            id,
            params: RadioParameters::default(),
            initialized: false,
            last_rssi: 0,
            last_snr: 0.0,
        }
    }
}

impl Radio for SimRadio<'_> {
    fn init(&mut self) -> Result<(), SetupError> {
        self.initialized = true;
        Ok(())
    }

    fn configure(&mut self, params: &RadioParameters) -> Result<(), SetupError> {
        if !self.initialized {
            return Err(SetupError::Chip);
        }
        params.validate()?;
        self.params = *params;
        Ok(())
    }

    fn send(&mut self, payload: &[u8], _timeout_ms: u32) -> Result<(), RadioError> {
        if payload.is_empty() || payload.len() > 255 {
            return Err(RadioError::Unknown);
        }
        let mut frame = Vec::new();
        frame.extend_from_slice(payload).map_err(|_| RadioError::Unknown)?;
        self.air.mailboxes.borrow_mut()[1 - self.id] = Some((self.params.sync_word, frame));
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8], _timeout_ms: u32) -> Result<usize, RadioError> {
        match self.air.mailboxes.borrow_mut()[self.id].take() {
            Some((sync_word, frame)) if sync_word == self.params.sync_word => {
                let count = frame.len().min(buffer.len());
                buffer[..count].copy_from_slice(&frame[..count]);
                self.last_rssi = -42;
                self.last_snr = 9.75;
                Ok(count)
            }
            // Nothing on the air for this endpoint within the window; a
            // frame on a foreign sync word is invisible.
            _ => Err(RadioError::Timeout),
        }
    }

    fn rssi(&self) -> i16 {
        self.last_rssi
    }

    fn snr(&self) -> f32 {
        self.last_snr
    }

    fn time_on_air_us(&self, payload_len: u32) -> u32 {
        airtime::time_on_air_us(&self.params, payload_len)
    }
}
