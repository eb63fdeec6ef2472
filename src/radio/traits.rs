//! Radio hardware abstraction
//!
//! The transceiver is modelled as a fixed capability set implemented once
//! per supported chip and selected at build time. All drivers share one
//! transport error taxonomy so the experiment's control loop never sees a
//! chip-specific status vocabulary.

/// Modifiable parameters of the LoRa transceiver.
///
/// Owned by the caller and applied atomically by [`Radio::configure`]; the
/// driver keeps its own copy for on-air-time estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioParameters {
    /// Transmit power in dBm (-9 to 22, clamped to the chip's real range)
    pub power: i8,
    /// Carrier frequency in MHz
    pub frequency_mhz: f32,
    /// Bandwidth in kHz
    pub bandwidth_khz: f32,
    /// Spreading factor, 5 to 12
    pub spreading_factor: u8,
    /// Coding rate denominator, 4 to 8
    pub coding_rate: u8,
    /// Append an error-detection code to every transmitted packet
    pub crc: bool,
    /// Invert I/Q polarity
    pub invert_iq: bool,
    /// Extra receiver sensitivity, `false` for the power-saving mode
    pub boosted_rx_gain: bool,
    /// Preamble length in symbols
    pub preamble_length: u16,
    /// Fixed packet length; greater than 0 switches to implicit headers
    pub packet_length: u32,
    /// Sync word distinguishing logical networks sharing a frequency
    pub sync_word: u8,
}

impl Default for RadioParameters {
    fn default() -> Self {
        Self {
            power: 17,
            frequency_mhz: 915.0,
            bandwidth_khz: 125.0,
            spreading_factor: 7,
            coding_rate: 5,
            crc: true,
            invert_iq: false,
            boosted_rx_gain: false,
            preamble_length: 8,
            packet_length: 0,
            sync_word: 0x12,
        }
    }
}

impl RadioParameters {
    /// Check the modulation invariants the on-air timing depends on.
    ///
    /// A spreading factor or coding rate outside the supported range would
    /// produce undefined on-air timing, so it is rejected here before any
    /// register is touched.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(5..=12).contains(&self.spreading_factor) {
            return Err(SetupError::SpreadingFactor(self.spreading_factor));
        }
        if !(4..=8).contains(&self.coding_rate) {
            return Err(SetupError::CodingRate(self.coding_rate));
        }
        Ok(())
    }
}

/// Transport-level outcome of a send or receive operation.
///
/// This is the only error channel of the transport; native chip status codes
/// are folded into it and unmapped ones are logged rather than carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The received message arrived corrupted.
    Crc,
    /// The received message carried an invalid header.
    Header,
    /// The operation timed out.
    Timeout,
    /// An unexpected chip status; the raw code is logged as a diagnostic.
    Unknown,
}

/// Errors raised while bringing the radio up or applying parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupError {
    /// SPI transfer error
    Bus,
    /// Control/status line error
    Gpio,
    /// Chip absent, stuck busy or wrong silicon revision
    Chip,
    /// Spreading factor outside the supported 5-12 range
    SpreadingFactor(u8),
    /// Coding rate denominator outside the supported 4-8 range
    CodingRate(u8),
}

/// Low-level fault on the SPI bus or a control line.
///
/// Folded into [`SetupError`] during initialization/configuration and into
/// [`RadioError::Unknown`] during transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BusFault {
    Spi,
    Gpio,
    /// The chip's busy line never released.
    Busy,
}

impl From<BusFault> for SetupError {
    fn from(fault: BusFault) -> Self {
        match fault {
            BusFault::Spi => SetupError::Bus,
            BusFault::Gpio => SetupError::Gpio,
            BusFault::Busy => SetupError::Chip,
        }
    }
}

impl From<BusFault> for RadioError {
    fn from(fault: BusFault) -> Self {
        log::warn!("bus fault {:?} during radio operation", fault);
        RadioError::Unknown
    }
}

/// Capability set of a half-duplex LoRa transceiver.
///
/// One implementation exists per supported chip. A single instance must be
/// driven from one execution context, and only one operation may be in
/// flight at a time; issuing a second operation while one is outstanding
/// violates the caller contract.
pub trait Radio {
    /// Power up the chip and its bus.
    ///
    /// Must be called once before any other operation.
    fn init(&mut self) -> Result<(), SetupError>;

    /// Apply `params` to the chip.
    ///
    /// All parameters are applied before this returns and the chip is left
    /// in standby; no partial-parameter state is observable afterwards.
    fn configure(&mut self, params: &RadioParameters) -> Result<(), SetupError>;

    /// Transmit `payload`, blocking until the completion interrupt fires or
    /// `timeout_ms` elapses.
    ///
    /// A timeout of `0` waits indefinitely. The chip is returned to standby
    /// on every path, success or not.
    fn send(&mut self, payload: &[u8], timeout_ms: u32) -> Result<(), RadioError>;

    /// Wait for a packet and copy it into `buffer`, returning the number of
    /// bytes written.
    ///
    /// A message longer than `buffer` is truncated to the buffer's length
    /// and the excess discarded; truncation is not an error. A timeout of
    /// `0` waits indefinitely. The chip is returned to standby on every
    /// path.
    fn receive(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<usize, RadioError>;

    /// RSSI of the last received packet, in dBm.
    ///
    /// Undefined before the first successful receive.
    fn rssi(&self) -> i16;

    /// SNR of the last received packet, in dB.
    ///
    /// Undefined before the first successful receive.
    fn snr(&self) -> f32;

    /// Expected on-air duration, in microseconds, of a `payload_len`-byte
    /// packet under the currently configured parameters.
    fn time_on_air_us(&self, payload_len: u32) -> u32;
}
