//! LoRa time-on-air calculation
//!
//! Transmit windows are scheduled from this estimate, so it reproduces the
//! datasheet formula term for term; any drift here turns directly into
//! missed rendezvous between the transmitter and the receiver.

use crate::radio::traits::RadioParameters;

/// Expected on-air duration, in microseconds, of a `payload_len`-byte packet
/// modulated with `params`.
pub fn time_on_air_us(params: &RadioParameters, payload_len: u32) -> u32 {
    let sf = params.spreading_factor as i32;
    let chips = (1u32 << params.spreading_factor) as f32;

    // Symbol duration in milliseconds; above 16 ms the chip mandates the
    // low-data-rate optimization, which costs two bits per symbol.
    let low_data_rate = chips / params.bandwidth_khz > 16.0;

    let header_symbols: i32 = if params.packet_length == 0 { 20 } else { 0 };
    let crc_bits: i32 = if params.crc { 16 } else { 0 };

    let mut numerator = 8 * payload_len as i32 + crc_bits - 4 * sf + header_symbols;
    if params.spreading_factor >= 7 {
        numerator += 8;
    }
    let numerator = numerator.max(0);
    let denominator = 4 * (sf - if low_data_rate { 2 } else { 0 });
    let payload_symbols = (numerator + denominator - 1) / denominator * params.coding_rate as i32;

    // SF5 and SF6 frames carry two extra sync symbols.
    let sync_symbols: f32 = if params.spreading_factor <= 6 { 2.0 } else { 0.0 };
    let total_symbols =
        params.preamble_length as f32 + 4.25 + sync_symbols + 8.0 + payload_symbols as f32;

    (1000.0 * total_symbols * chips / params.bandwidth_khz) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_params() -> RadioParameters {
        RadioParameters {
            spreading_factor: 7,
            bandwidth_khz: 125.0,
            coding_rate: 5,
            crc: true,
            preamble_length: 8,
            packet_length: 0,
            ..RadioParameters::default()
        }
    }

    #[test]
    fn matches_datasheet_reference_value() {
        // SF7 / 125 kHz / CR 4-5 / CRC on / preamble 8 / explicit header,
        // 10-byte payload: 40.25 symbols of 1.024 ms each.
        assert_eq!(time_on_air_us(&reference_params(), 10), 41_216);
    }

    #[test]
    fn monotonic_in_payload_length() {
        let params = reference_params();
        let mut previous = 0;
        for len in 0..=255 {
            let duration = time_on_air_us(&params, len);
            assert!(duration >= previous, "duration dipped at {} bytes", len);
            previous = duration;
        }
    }

    #[test]
    fn low_data_rate_optimize_engages() {
        // SF12 at 125 kHz has a 32.768 ms symbol, so the denominator loses
        // two bits per symbol: ceil(76/40) * 5 = 10 payload symbols.
        let params = RadioParameters {
            spreading_factor: 12,
            ..reference_params()
        };
        assert_eq!(time_on_air_us(&params, 10), 991_232);
    }

    #[test]
    fn short_spreading_factors_add_sync_symbols() {
        // SF5 / 500 kHz / implicit header, 16-byte fixed packets:
        // ceil(124/20) * 5 = 35 payload symbols plus the 2-symbol tax.
        let params = RadioParameters {
            spreading_factor: 5,
            bandwidth_khz: 500.0,
            preamble_length: 12,
            packet_length: 16,
            ..reference_params()
        };
        assert_eq!(time_on_air_us(&params, 16), 3_920);
    }

    #[test]
    fn symbol_count_clamps_at_zero() {
        // An empty uncoded payload cannot subtract symbols from the frame.
        let params = RadioParameters {
            spreading_factor: 12,
            crc: false,
            ..reference_params()
        };
        assert_eq!(time_on_air_us(&params, 0), 663_552);
    }
}
