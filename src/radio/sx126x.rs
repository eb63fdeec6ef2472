//! SX126x radio driver
//!
//! Command-level driver for the SX1261/62 family. Unlike the SX127x this
//! chip takes a hard operation timeout in its `SetTx`/`SetRx` commands, so
//! the caller's timeout is passed through to the hardware and the wait only
//! ends on the DIO1 interrupt, which the application forwards through an
//! [`IrqSignal`].

use embedded_hal::{
    blocking::delay::DelayMs,
    blocking::spi::{Transfer, Write},
    digital::v2::{InputPin, OutputPin},
};

use crate::irq::IrqSignal;
use crate::radio::airtime;
use crate::radio::traits::{BusFault, Radio, RadioError, RadioParameters, SetupError};

mod commands {
    pub const SET_STANDBY: u8 = 0x80;
    pub const SET_TX: u8 = 0x83;
    pub const SET_RX: u8 = 0x82;
    pub const CALIBRATE: u8 = 0x89;
    pub const SET_PA_CONFIG: u8 = 0x95;
    pub const WRITE_REGISTER: u8 = 0x0D;
    pub const READ_REGISTER: u8 = 0x1D;
    pub const WRITE_BUFFER: u8 = 0x0E;
    pub const READ_BUFFER: u8 = 0x1E;
    pub const SET_DIO_IRQ_PARAMS: u8 = 0x08;
    pub const GET_IRQ_STATUS: u8 = 0x12;
    pub const CLR_IRQ_STATUS: u8 = 0x02;
    pub const SET_DIO2_AS_RF_SWITCH_CTRL: u8 = 0x9D;
    pub const SET_RF_FREQUENCY: u8 = 0x86;
    pub const SET_PKT_TYPE: u8 = 0x8A;
    pub const SET_TX_PARAMS: u8 = 0x8E;
    pub const SET_MODULATION_PARAMS: u8 = 0x8B;
    pub const SET_PKT_PARAMS: u8 = 0x8C;
    pub const GET_PKT_STATUS: u8 = 0x14;
    pub const GET_RX_BUFFER_STATUS: u8 = 0x13;
    pub const SET_BUFFER_BASE_ADDRESS: u8 = 0x8F;
}

mod registers {
    pub const REG_LORA_SYNC_WORD_MSB: u16 = 0x0740;
    pub const REG_LORA_SYNC_WORD_LSB: u16 = 0x0741;
    pub const REG_RX_GAIN: u16 = 0x08AC;
}

// IRQ status bits
const IRQ_TX_DONE: u16 = 0x0001;
const IRQ_RX_DONE: u16 = 0x0002;
const IRQ_HEADER_ERR: u16 = 0x0020;
const IRQ_CRC_ERR: u16 = 0x0040;
const IRQ_TIMEOUT: u16 = 0x0200;

/// IRQ lines routed to DIO1: both completions plus every failure the
/// translation layer distinguishes.
const DIO1_IRQ_MASK: u16 = IRQ_TX_DONE | IRQ_RX_DONE | IRQ_HEADER_ERR | IRQ_CRC_ERR | IRQ_TIMEOUT;

/// Reset value of the LoRa sync word MSB register, used as a liveness probe.
const SYNC_WORD_MSB_RESET: u8 = 0x14;

/// `SetRx` timeout word selecting continuous reception.
const RX_CONTINUOUS: u32 = 0x00FF_FFFF;

/// SX126x radio driver.
///
/// Owns the SPI bus, the chip-select, reset and busy lines and a
/// millisecond delay source. The DIO1 line is owned by the application,
/// whose interrupt handler must raise `irq` on completion.
pub struct SX126x<'a, SPI, CS, RESET, BUSY, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    RESET: OutputPin,
    BUSY: InputPin,
    DELAY: DelayMs<u32>,
{
    spi: SPI,
    cs: CS,
    reset: RESET,
    busy: BUSY,
    delay: DELAY,
    irq: &'a IrqSignal,
    params: RadioParameters,
    last_rssi: i16,
    last_snr: f32,
}

impl<'a, SPI, CS, RESET, BUSY, DELAY> SX126x<'a, SPI, CS, RESET, BUSY, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    RESET: OutputPin,
    BUSY: InputPin,
    DELAY: DelayMs<u32>,
{
    /// Create a new driver instance.
    ///
    /// `irq` is the completion signal wired to the DIO1 interrupt; it must
    /// be dedicated to this radio instance.
    pub fn new(spi: SPI, cs: CS, reset: RESET, busy: BUSY, delay: DELAY, irq: &'a IrqSignal) -> Self {
        Self {
            spi,
            cs,
            reset,
            busy,
            delay,
            irq,
            params: RadioParameters::default(),
            last_rssi: 0,
            last_snr: 0.0,
        }
    }

    /// Wait for the busy line to release before touching the bus.
    fn wait_busy(&mut self) -> Result<(), BusFault> {
        for _ in 0..10 {
            if self.busy.is_low().map_err(|_| BusFault::Gpio)? {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(BusFault::Busy)
    }

    /// Issue a command with its argument bytes.
    fn command(&mut self, opcode: u8, args: &[u8]) -> Result<(), BusFault> {
        self.wait_busy()?;
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let result = self
            .spi
            .write(&[opcode])
            .and_then(|_| self.spi.write(args))
            .map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result
    }

    /// Issue a read command, filling `response` (first byte is the chip's
    /// status, the rest the payload).
    fn read_command(&mut self, opcode: u8, response: &mut [u8]) -> Result<(), BusFault> {
        self.wait_busy()?;
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let result = self
            .spi
            .write(&[opcode])
            .and_then(|_| self.spi.transfer(response).map(|_| ()))
            .map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result
    }

    fn write_register(&mut self, addr: u16, value: u8) -> Result<(), BusFault> {
        self.command(
            commands::WRITE_REGISTER,
            &[(addr >> 8) as u8, (addr & 0xFF) as u8, value],
        )
    }

    fn read_register(&mut self, addr: u16) -> Result<u8, BusFault> {
        self.wait_busy()?;
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let mut value = [0u8];
        let result = self
            .spi
            .write(&[
                commands::READ_REGISTER,
                (addr >> 8) as u8,
                (addr & 0xFF) as u8,
                0x00,
            ])
            .and_then(|_| self.spi.transfer(&mut value).map(|_| ()))
            .map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result?;
        Ok(value[0])
    }

    fn set_standby(&mut self) -> Result<(), BusFault> {
        self.command(commands::SET_STANDBY, &[0x00])
    }

    fn clear_irq_status(&mut self) -> Result<(), BusFault> {
        self.command(commands::CLR_IRQ_STATUS, &[0x03, 0xFF])
    }

    fn irq_status(&mut self) -> Result<u16, BusFault> {
        let mut response = [0u8; 3];
        self.read_command(commands::GET_IRQ_STATUS, &mut response)?;
        Ok(((response[1] as u16) << 8) | response[2] as u16)
    }

    /// Apply the packet shape; `payload_len` is the transmit length for the
    /// current operation (the fixed packet length or the receive maximum).
    fn apply_packet_params(&mut self, payload_len: u8) -> Result<(), BusFault> {
        let preamble = self.params.preamble_length;
        let implicit = self.params.packet_length > 0;
        let crc = self.params.crc;
        let invert_iq = self.params.invert_iq;
        self.command(
            commands::SET_PKT_PARAMS,
            &[
                (preamble >> 8) as u8,
                (preamble & 0xFF) as u8,
                if implicit { 0x01 } else { 0x00 },
                payload_len,
                if crc { 0x01 } else { 0x00 },
                if invert_iq { 0x01 } else { 0x00 },
            ],
        )
    }

    /// Receive-side packet length: the fixed length in implicit mode, the
    /// 255-byte maximum in explicit mode.
    fn rx_payload_len(&self) -> u8 {
        if self.params.packet_length > 0 {
            self.params.packet_length as u8
        } else {
            0xFF
        }
    }

    fn wait_for_irq(&mut self, timeout_ms: u32) -> Result<(), RadioError> {
        super::wait_completion(self.irq, &mut self.delay, timeout_ms)
    }

    fn send_inner(&mut self, payload: &[u8], timeout_ms: u32) -> Result<(), RadioError> {
        if payload.is_empty() || payload.len() > 255 {
            log::warn!("rejecting {}-byte payload", payload.len());
            return Err(RadioError::Unknown);
        }

        self.irq.reset();
        self.set_standby()?;
        self.clear_irq_status()?;
        self.apply_packet_params(payload.len() as u8)?;

        self.wait_busy()?;
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let result = self
            .spi
            .write(&[commands::WRITE_BUFFER, 0x00])
            .and_then(|_| self.spi.write(payload))
            .map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result?;

        let ticks = tx_timeout_ticks(timeout_ms);
        self.command(
            commands::SET_TX,
            &[(ticks >> 16) as u8, (ticks >> 8) as u8, ticks as u8],
        )?;

        // The chip enforces the timeout and reports it as an IRQ, so the
        // software wait has no deadline of its own.
        self.wait_for_irq(0)?;

        let status = self.irq_status()?;
        let outcome = translate_irq_status(status, IRQ_TX_DONE);
        self.clear_irq_status()?;
        outcome
    }

    fn receive_inner(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<usize, RadioError> {
        self.irq.reset();
        self.set_standby()?;
        self.clear_irq_status()?;
        let rx_len = self.rx_payload_len();
        self.apply_packet_params(rx_len)?;

        let ticks = rx_timeout_ticks(timeout_ms);
        self.command(
            commands::SET_RX,
            &[(ticks >> 16) as u8, (ticks >> 8) as u8, ticks as u8],
        )?;
        self.wait_for_irq(0)?;

        let status = self.irq_status()?;
        let outcome = translate_irq_status(status, IRQ_RX_DONE);
        self.clear_irq_status()?;
        outcome?;

        // Link quality of this packet, cached for the accessors.
        let mut packet_status = [0u8; 4];
        self.read_command(commands::GET_PKT_STATUS, &mut packet_status)?;
        self.last_rssi = -((packet_status[1] as i16) / 2);
        self.last_snr = (packet_status[2] as i8) as f32 / 4.0;

        let mut rx_status = [0u8; 3];
        self.read_command(commands::GET_RX_BUFFER_STATUS, &mut rx_status)?;
        let received = rx_status[1] as usize;
        let offset = rx_status[2];

        // Copy out at most the caller's capacity; a longer message is
        // truncated, not an error.
        let count = received.min(buffer.len());
        self.wait_busy()?;
        self.cs.set_low().map_err(|_| BusFault::Gpio)?;
        let result = self
            .spi
            .write(&[commands::READ_BUFFER, offset, 0x00])
            .and_then(|_| self.spi.transfer(&mut buffer[..count]).map(|_| ()))
            .map_err(|_| BusFault::Spi);
        self.cs.set_high().map_err(|_| BusFault::Gpio)?;
        result?;

        Ok(count)
    }
}

impl<'a, SPI, CS, RESET, BUSY, DELAY> Radio for SX126x<'a, SPI, CS, RESET, BUSY, DELAY>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    RESET: OutputPin,
    BUSY: InputPin,
    DELAY: DelayMs<u32>,
{
    fn init(&mut self) -> Result<(), SetupError> {
        // Hardware reset pulse, then give the chip time to boot.
        self.reset.set_low().map_err(|_| SetupError::Gpio)?;
        self.delay.delay_ms(1);
        self.reset.set_high().map_err(|_| SetupError::Gpio)?;
        self.delay.delay_ms(10);
        self.wait_busy()?;

        self.set_standby()?;
        self.command(commands::SET_PKT_TYPE, &[0x01])?;

        // The sync word registers hold a known reset value; anything else
        // means the chip is absent or not talking.
        let probe = self.read_register(registers::REG_LORA_SYNC_WORD_MSB)?;
        if probe != SYNC_WORD_MSB_RESET {
            log::warn!("SX126x probe failed, sync register reads {:#04x}", probe);
            return Err(SetupError::Chip);
        }

        self.command(commands::SET_DIO2_AS_RF_SWITCH_CTRL, &[0x01])?;
        self.command(commands::CALIBRATE, &[0x7F])?;
        self.delay.delay_ms(5);
        self.command(commands::SET_BUFFER_BASE_ADDRESS, &[0x00, 0x00])?;

        let mask = DIO1_IRQ_MASK;
        self.command(
            commands::SET_DIO_IRQ_PARAMS,
            &[
                (mask >> 8) as u8,
                (mask & 0xFF) as u8,
                (mask >> 8) as u8,
                (mask & 0xFF) as u8,
                0x00,
                0x00,
                0x00,
                0x00,
            ],
        )?;
        Ok(())
    }

    fn configure(&mut self, params: &RadioParameters) -> Result<(), SetupError> {
        params.validate()?;
        self.set_standby()?;

        // Carrier frequency, in 32 MHz / 2^25 steps.
        let freq_hz = (params.frequency_mhz * 1_000_000.0) as u64;
        let frf = ((freq_hz << 25) / 32_000_000) as u32;
        self.command(
            commands::SET_RF_FREQUENCY,
            &[
                (frf >> 24) as u8,
                (frf >> 16) as u8,
                (frf >> 8) as u8,
                frf as u8,
            ],
        )?;

        // Full-power PA configuration for the SX1262.
        self.command(commands::SET_PA_CONFIG, &[0x04, 0x07, 0x00, 0x01])?;
        let power = params.power.clamp(-9, 22);
        self.command(commands::SET_TX_PARAMS, &[power as u8, 0x04])?;

        // The chip cannot express an uncoded 4/4 rate; 4/5 is its minimum.
        let cr = params.coding_rate.max(5) - 4;
        let chips = (1u32 << params.spreading_factor) as f32;
        let ldro = if chips / params.bandwidth_khz > 16.0 { 0x01 } else { 0x00 };
        self.command(
            commands::SET_MODULATION_PARAMS,
            &[
                params.spreading_factor,
                bandwidth_code(params.bandwidth_khz),
                cr,
                ldro,
            ],
        )?;

        self.params = *params;
        let rx_len = self.rx_payload_len();
        self.apply_packet_params(rx_len)?;

        let [sync_msb, sync_lsb] = lora_sync_word(params.sync_word);
        self.write_register(registers::REG_LORA_SYNC_WORD_MSB, sync_msb)?;
        self.write_register(registers::REG_LORA_SYNC_WORD_LSB, sync_lsb)?;

        let gain = if params.boosted_rx_gain { 0x96 } else { 0x94 };
        self.write_register(registers::REG_RX_GAIN, gain)?;

        self.set_standby()?;
        Ok(())
    }

    fn send(&mut self, payload: &[u8], timeout_ms: u32) -> Result<(), RadioError> {
        let result = self.send_inner(payload, timeout_ms);
        // Standby is restored whatever the outcome was.
        let _ = self.set_standby();
        result
    }

    fn receive(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<usize, RadioError> {
        let result = self.receive_inner(buffer, timeout_ms);
        let _ = self.set_standby();
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

/// Map a 16-bit IRQ status word to the shared transport taxonomy.
///
/// Precedence: payload damage, then header damage, then timeout, then the
/// expected completion bit; any other combination is unmapped and logged.
fn translate_irq_status(status: u16, done_mask: u16) -> Result<(), RadioError> {
    if status & IRQ_CRC_ERR != 0 {
        return Err(RadioError::Crc);
    }
    if status & IRQ_HEADER_ERR != 0 {
        return Err(RadioError::Header);
    }
    if status & IRQ_TIMEOUT != 0 {
        return Err(RadioError::Timeout);
    }
    if status & done_mask != 0 {
        return Ok(());
    }
    log::warn!("unmapped SX126x irq status {:#06x}", status);
    Err(RadioError::Unknown)
}

/// Bandwidth register code for the closest supported bandwidth.
fn bandwidth_code(bandwidth_khz: f32) -> u8 {
    match (bandwidth_khz * 1_000.0) as u32 {
        b if b <= 7_810 => 0x00,
        b if b <= 10_420 => 0x08,
        b if b <= 15_630 => 0x01,
        b if b <= 20_830 => 0x09,
        b if b <= 31_250 => 0x02,
        b if b <= 41_670 => 0x0A,
        b if b <= 62_500 => 0x03,
        b if b <= 125_000 => 0x04,
        b if b <= 250_000 => 0x05,
        _ => 0x06,
    }
}

/// Spread the single-byte sync word into the chip's two-register form.
fn lora_sync_word(sync_word: u8) -> [u8; 2] {
    [
        (sync_word & 0xF0) | 0x04,
        ((sync_word & 0x0F) << 4) | 0x04,
    ]
}

/// `SetTx` timeout in 15.625 us ticks; `0` disables the hard timeout.
fn tx_timeout_ticks(timeout_ms: u32) -> u32 {
    timeout_ms.saturating_mul(64).min(0x00FF_FFFE)
}

/// `SetRx` timeout in 15.625 us ticks; `0` selects continuous reception so
/// an unbounded wait keeps listening.
fn rx_timeout_ticks(timeout_ms: u32) -> u32 {
    if timeout_ms == 0 {
        RX_CONTINUOUS
    } else {
        timeout_ms.saturating_mul(64).min(0x00FF_FFFE)
    }
}
