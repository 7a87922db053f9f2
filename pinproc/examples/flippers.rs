//! Wires two flippers and a pop bumper on an attached board, then polls for
//! switch events until interrupted. Pass a serial port name to skip
//! discovery.

use anyhow::Context;
use pinproc::machine::{
    configure_bumper_rule, configure_flipper_rule, BUMPER_PULSE_MS, FLIPPER_PULSE_MS,
};
use pinproc::prelude::*;
use std::time::{Duration, Instant};

// WPC conventions: flipper buttons on the dedicated column, coils 0x20+.
const LEFT_FLIPPER_SWITCH: u16 = 0;
const RIGHT_FLIPPER_SWITCH: u16 = 1;
const LEFT_FLIPPER_MAIN: u8 = 0x20;
const LEFT_FLIPPER_HOLD: u8 = 0x21;
const RIGHT_FLIPPER_MAIN: u8 = 0x22;
const RIGHT_FLIPPER_HOLD: u8 = 0x23;
const BUMPER_SWITCH: u16 = 40;
const BUMPER_COIL: u8 = 0x28;

const WATCHDOG_PERIOD: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let link = match std::env::args().nth(1) {
        Some(name) => Serial::connect(&name)?,
        None => Serial::connect_first().context("no board attached")?,
    };
    println!("using {}", link.port_name());

    let mut device = Device::new(link, MachineType::Wpc)?;
    configure_flipper_rule(
        &mut device,
        LEFT_FLIPPER_SWITCH,
        LEFT_FLIPPER_MAIN,
        LEFT_FLIPPER_HOLD,
        FLIPPER_PULSE_MS,
    )?;
    configure_flipper_rule(
        &mut device,
        RIGHT_FLIPPER_SWITCH,
        RIGHT_FLIPPER_MAIN,
        RIGHT_FLIPPER_HOLD,
        FLIPPER_PULSE_MS,
    )?;
    configure_bumper_rule(&mut device, BUMPER_SWITCH, BUMPER_COIL, BUMPER_PULSE_MS)?;
    println!("flippers live; close switches to see events");

    let mut last_tickle = Instant::now();
    loop {
        for event in device.get_events(16)? {
            println!(
                "switch {:3} {:?} at t={}ms",
                event.switch_num, event.event_type, event.time
            );
        }
        if last_tickle.elapsed() >= WATCHDOG_PERIOD {
            device.driver_watchdog_tickle()?;
            last_tickle = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
