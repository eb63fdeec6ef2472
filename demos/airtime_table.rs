//! Prints the on-air-time table used to plan the experiment's transmit
//! windows.

use lora_sync::radio::{airtime, RadioParameters};

fn main() {
    let payloads = [4u32, 16, 64, 255];

    println!("on-air time in ms at 125 kHz, CR 4/5, CRC on, explicit header");
    print!("{:>4}", "sf");
    for payload in payloads {
        print!("{:>10}", payload);
    }
    println!();

    for sf in 7..=12 {
        let params = RadioParameters {
            spreading_factor: sf,
            ..RadioParameters::default()
        };
        print!("{:>4}", sf);
        for payload in payloads {
            let us = airtime::time_on_air_us(&params, payload);
            print!("{:>10.1}", us as f64 / 1000.0);
        }
        println!();
    }
}
