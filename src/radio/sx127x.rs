//! SX127x radio driver
//!
//! Register-level driver for the SX1276/77/78/79 family. Completion of the
//! asynchronous transmit/receive operations is reported through an
//! [`IrqSignal`] the application raises from its DIO0 interrupt handler;
//! the driver itself never runs in interrupt context.

use embedded_hal::{
    blocking::delay::DelayMs,
    blocking::spi::{Transfer, Write},
    digital::v2::OutputPin,
};

use crate::irq::IrqSignal;
use crate::radio::airtime;
use crate::radio::traits::{BusFault, Radio, RadioError, RadioParameters, SetupError};

// SX127x Register Map
const REG_FIFO: u8 = 0x00;
const REG_OP_MODE: u8 = 0x01;
const REG_FRF_MSB: u8 = 0x06;
const REG_FRF_MID: u8 = 0x07;
const REG_FRF_LSB: u8 = 0x08;
const REG_PA_CONFIG: u8 = 0x09;
const REG_LNA: u8 = 0x0C;
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_RX_NB_BYTES: u8 = 0x13;
const REG_PKT_SNR_VALUE: u8 = 0x19;
const REG_PKT_RSSI_VALUE: u8 = 0x1A;
const REG_MODEM_CONFIG_1: u8 = 0x1D;
const REG_MODEM_CONFIG_2: u8 = 0x1E;
const REG_PREAMBLE_MSB: u8 = 0x20;
const REG_PREAMBLE_LSB: u8 = 0x21;
const REG_PAYLOAD_LENGTH: u8 = 0x22;
const REG_MODEM_CONFIG_3: u8 = 0x26;
const REG_INVERTIQ: u8 = 0x33;
const REG_SYNC_WORD: u8 = 0x39;
const REG_INVERTIQ2: u8 = 0x3B;
const REG_DIO_MAPPING_1: u8 = 0x40;
const REG_VERSION: u8 = 0x42;
const REG_PA_DAC: u8 = 0x4D;

// Operating Mode bits
const MODE_LONG_RANGE_MODE: u8 = 0x80;
const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_RX_CONTINUOUS: u8 = 0x05;

// PA Config
const PA_BOOST: u8 = 0x80;

// IRQ Flags
const IRQ_RX_TIMEOUT_MASK: u8 = 0x80;
const IRQ_RX_DONE_MASK: u8 = 0x40;
const IRQ_PAYLOAD_CRC_ERROR_MASK: u8 = 0x20;
const IRQ_VALID_HEADER_MASK: u8 = 0x10;
const IRQ_TX_DONE_MASK: u8 = 0x08;

// DIO0 routing
const DIO0_RX_DONE: u8 = 0x00;
const DIO0_TX_DONE: u8 = 0x40;

/// Expected content of the version register.
const SILICON_REVISION: u8 = 0x12;

/// SX127x radio driver.
///
/// Owns the SPI bus, the chip-select and reset lines and a millisecond
/// delay source. The DIO0 line is owned by the application, whose interrupt
/// handler must raise `irq` when the chip signals completion.
pub struct SX127x<'a, SPI, CS, RESET, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    RESET: OutputPin,
    DELAY: DelayMs<u32>,
{
    spi: SPI,
    cs: CS,
    reset: RESET,
    delay: DELAY,
    irq: &'a IrqSignal,
    params: RadioParameters,
    last_rssi: i16,
    last_snr: f32,
}

impl<'a, SPI, CS, RESET, DELAY> SX127x<'a, SPI, CS, RESET, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    RESET: OutputPin,
    DELAY: DelayMs<u32>,
{
    /// Create a new driver instance.
    ///
    /// `irq` is the completion signal wired to the DIO0 interrupt; it must
    /// be dedicated to this radio instance.
    pub fn new(spi: SPI, cs: CS, reset: RESET, delay: DELAY, irq: &'a IrqSignal) -> Self {
        Self {
            spi,
            cs,
            reset,
            delay,
            irq,
            params: RadioParameters::default(),
            last_rssi: 0,
            last_snr: 0.0,
        }
    }

    /// Read a radio register
    fn read_register(&mut self, addr: u8) -> Result<u8, BusFault> {
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let mut buffer = [addr & 0x7F, 0];
        let result = self.spi.transfer(&mut buffer).map(|_| ()).map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result?;
        Ok(buffer[1])
    }

    /// Write to a radio register
    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), BusFault> {
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let buffer = [addr | 0x80, value];
        let result = self.spi.write(&buffer).map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result
    }

    /// Set operating mode
    fn set_mode(&mut self, mode: u8) -> Result<(), BusFault> {
        self.write_register(REG_OP_MODE, MODE_LONG_RANGE_MODE | mode)
    }

    /// Block until the completion interrupt is raised or `timeout_ms`
    /// elapses. A timeout of `0` waits indefinitely.
    fn wait_for_irq(&mut self, timeout_ms: u32) -> Result<(), RadioError> {
        super::wait_completion(self.irq, &mut self.delay, timeout_ms)
    }

    fn send_inner(&mut self, payload: &[u8], timeout_ms: u32) -> Result<(), RadioError> {
        if payload.is_empty() || payload.len() > 255 {
            log::warn!("rejecting {}-byte payload", payload.len());
            return Err(RadioError::Unknown);
        }

        self.irq.reset();
        self.set_mode(MODE_STDBY)?;
        self.write_register(REG_DIO_MAPPING_1, DIO0_TX_DONE)?;
        self.write_register(REG_IRQ_FLAGS, 0xFF)?;
        self.write_register(REG_FIFO_ADDR_PTR, 0x00)?;
        self.write_register(REG_PAYLOAD_LENGTH, payload.len() as u8)?;

        // Burst-write the payload into the FIFO.
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let result = self
            .spi
            .write(&[REG_FIFO | 0x80])
            .and_then(|_| self.spi.write(payload))
            .map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result?;

        self.set_mode(MODE_TX)?;
        self.wait_for_irq(timeout_ms)?;

        let flags = self.read_register(REG_IRQ_FLAGS)?;
        let outcome = translate_irq_flags(flags, IRQ_TX_DONE_MASK, false);
        self.write_register(REG_IRQ_FLAGS, 0xFF)?;
        outcome
    }

    fn receive_inner(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<usize, RadioError> {
        self.irq.reset();
        self.set_mode(MODE_STDBY)?;
        self.write_register(REG_DIO_MAPPING_1, DIO0_RX_DONE)?;
        self.write_register(REG_IRQ_FLAGS, 0xFF)?;

        self.set_mode(MODE_RX_CONTINUOUS)?;
        self.wait_for_irq(timeout_ms)?;

        let flags = self.read_register(REG_IRQ_FLAGS)?;
        let outcome = translate_irq_flags(flags, IRQ_RX_DONE_MASK, self.params.packet_length == 0);
        self.write_register(REG_IRQ_FLAGS, 0xFF)?;
        outcome?;

        // Link quality of this packet, cached for the accessors.
        let snr_raw = self.read_register(REG_PKT_SNR_VALUE)? as i8;
        self.last_snr = snr_raw as f32 / 4.0;
        self.last_rssi = -137 + self.read_register(REG_PKT_RSSI_VALUE)? as i16;

        let received = self.read_register(REG_RX_NB_BYTES)? as usize;
        let rx_start = self.read_register(REG_FIFO_RX_CURRENT_ADDR)?;
        self.write_register(REG_FIFO_ADDR_PTR, rx_start)?;

        // Copy out at most the caller's capacity; a longer message is
        // truncated, not an error.
        let count = received.min(buffer.len());
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let result = self
            .spi
            .write(&[REG_FIFO & 0x7F])
            .map_err(|_| BusFault::Spi)
            .and_then(|_| {
                self.spi
                    .transfer(&mut buffer[..count])
                    .map(|_| ())
                    .map_err(|_| BusFault::Spi)
            });
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result?;

        Ok(count)
    }
}

impl<'a, SPI, CS, RESET, DELAY> Radio for SX127x<'a, SPI, CS, RESET, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    RESET: OutputPin,
    DELAY: DelayMs<u32>,
{
    fn init(&mut self) -> Result<(), SetupError> {
        // Hardware reset pulse, then give the chip time to boot.
        self.reset.set_low().map_err(|_| SetupError::Gpio)?;
        self.delay.delay_ms(1);
        self.reset.set_high().map_err(|_| SetupError::Gpio)?;
        self.delay.delay_ms(10);

        let version = self.read_register(REG_VERSION)?;
        if version != SILICON_REVISION {
            log::warn!("SX127x probe failed, version register reads {:#04x}", version);
            return Err(SetupError::Chip);
        }

        // LoRa mode can only be entered from sleep.
        self.write_register(REG_OP_MODE, MODE_SLEEP)?;
        self.set_mode(MODE_SLEEP)?;

        self.write_register(REG_FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_register(REG_FIFO_RX_BASE_ADDR, 0x00)?;

        self.set_mode(MODE_STDBY)?;
        Ok(())
    }

    fn configure(&mut self, params: &RadioParameters) -> Result<(), SetupError> {
        params.validate()?;
        self.set_mode(MODE_STDBY)?;

        // Carrier frequency, in 32 MHz / 2^19 steps.
        let freq_hz = (params.frequency_mhz * 1_000_000.0) as u64;
        let frf = (freq_hz << 19) / 32_000_000;
        self.write_register(REG_FRF_MSB, ((frf >> 16) & 0xFF) as u8)?;
        self.write_register(REG_FRF_MID, ((frf >> 8) & 0xFF) as u8)?;
        self.write_register(REG_FRF_LSB, (frf & 0xFF) as u8)?;

        // PA_BOOST output; the +20 dBm option needs the PA DAC.
        let power = params.power.clamp(2, 20);
        if power > 17 {
            self.write_register(REG_PA_DAC, 0x87)?;
            self.write_register(REG_PA_CONFIG, PA_BOOST | 0x0F)?;
        } else {
            self.write_register(REG_PA_DAC, 0x84)?;
            self.write_register(REG_PA_CONFIG, PA_BOOST | (power as u8 - 2))?;
        }

        let bw = match (params.bandwidth_khz * 1_000.0) as u32 {
            b if b <= 7_800 => 0,
            b if b <= 10_400 => 1,
            b if b <= 15_600 => 2,
            b if b <= 20_800 => 3,
            b if b <= 31_250 => 4,
            b if b <= 41_700 => 5,
            b if b <= 62_500 => 6,
            b if b <= 125_000 => 7,
            b if b <= 250_000 => 8,
            _ => 9,
        };
        // The chip cannot express an uncoded 4/4 rate; 4/5 is its minimum.
        let cr = params.coding_rate.max(5) - 4;
        let implicit = if params.packet_length > 0 { 0x01 } else { 0x00 };
        self.write_register(REG_MODEM_CONFIG_1, (bw << 4) | (cr << 1) | implicit)?;

        // SF5 is not available on this family.
        let sf = params.spreading_factor.clamp(6, 12);
        let crc_on = if params.crc { 0x04 } else { 0x00 };
        self.write_register(REG_MODEM_CONFIG_2, (sf << 4) | crc_on)?;

        // Auto AGC, plus the low-data-rate optimization whenever the symbol
        // duration exceeds 16 ms.
        let chips = (1u32 << sf) as f32;
        let ldro = if chips / params.bandwidth_khz > 16.0 { 0x08 } else { 0x00 };
        self.write_register(REG_MODEM_CONFIG_3, ldro | 0x04)?;

        let lna = self.read_register(REG_LNA)?;
        if params.boosted_rx_gain {
            self.write_register(REG_LNA, lna | 0x03)?;
        } else {
            self.write_register(REG_LNA, lna & !0x03)?;
        }

        self.write_register(REG_PREAMBLE_MSB, (params.preamble_length >> 8) as u8)?;
        self.write_register(REG_PREAMBLE_LSB, (params.preamble_length & 0xFF) as u8)?;

        if params.packet_length > 0 {
            self.write_register(REG_PAYLOAD_LENGTH, params.packet_length as u8)?;
        }

        if params.invert_iq {
            self.write_register(REG_INVERTIQ, 0x66)?;
            self.write_register(REG_INVERTIQ2, 0x19)?;
        } else {
            self.write_register(REG_INVERTIQ, 0x27)?;
            self.write_register(REG_INVERTIQ2, 0x1D)?;
        }

        self.write_register(REG_SYNC_WORD, params.sync_word)?;

        self.set_mode(MODE_STDBY)?;
        self.params = *params;
        Ok(())
    }

    fn send(&mut self, payload: &[u8], timeout_ms: u32) -> Result<(), RadioError> {
        let result = self.send_inner(payload, timeout_ms);
        // Standby is restored whatever the outcome was.
        let _ = self.set_mode(MODE_STDBY);
        result
    }

    fn receive(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<usize, RadioError> {
        let result = self.receive_inner(buffer, timeout_ms);
        let _ = self.set_mode(MODE_STDBY);
        result
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

/// Map the chip's IRQ flag byte to the shared transport taxonomy.
///
/// Precedence: payload damage, then header damage (explicit-header receive
/// only), then timeout, then the expected completion flag; any other
/// combination is unmapped and logged.
fn translate_irq_flags(flags: u8, done_mask: u8, expect_header: bool) -> Result<(), RadioError> {
    if flags & IRQ_PAYLOAD_CRC_ERROR_MASK != 0 {
        return Err(RadioError::Crc);
    }
    if expect_header && flags & IRQ_RX_DONE_MASK != 0 && flags & IRQ_VALID_HEADER_MASK == 0 {
        return Err(RadioError::Header);
    }
    if flags & IRQ_RX_TIMEOUT_MASK != 0 {
        return Err(RadioError::Timeout);
    }
    if flags & done_mask != 0 {
        return Ok(());
    }
    log::warn!("unmapped SX127x irq flags {:#04x}", flags);
    Err(RadioError::Unknown)
}
