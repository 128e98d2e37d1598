//! Firmware entry point: bring up the board, hand every peripheral to the
//! supervisor and let it cycle between idle and sweep forever.
//!
//! Pin map (Arduino Uno/Nano form factor):
//!   D2  primary relay / SSR1      D5  SSR4 (cap bypass + bleed, cell)
//!   D3  second relay / SSR5       D6  SSR6 (complement of SSR5)
//!   D4  SSR3 (cap bypass, module) D7  SSR2 (complement of primary)
//!   D10 ADC chip select, D11/D12/D13 SPI to the MCP3202

#![no_std]
#![no_main]

use panic_halt as _;

use ivtrace_algo::supervisor::Supervisor;
use ivtrace_drivers::adc::Mcp3202;
use ivtrace_drivers::clock::Tc1Micros;
use ivtrace_drivers::eeprom::EepromStore;
use ivtrace_drivers::relay::RelayPinSet;
use ivtrace_drivers::serial::HostUsart;

use ivtrace_algo::config::CLK_DIV_DEFAULT;

#[arduino_hal::entry]
fn main() -> ! {
    let dp = arduino_hal::Peripherals::take().unwrap();
    let pins = arduino_hal::pins!(dp);

    let serial = arduino_hal::default_serial!(dp, pins, 57600);

    let (spi, cs) = arduino_hal::Spi::new(
        dp.SPI,
        pins.d13.into_output(),
        pins.d11.into_output(),
        pins.d12.into_pull_up_input(),
        pins.d10.into_output(),
        Mcp3202::settings_for_divider(CLK_DIV_DEFAULT),
    );

    let relay_pins = RelayPinSet::new(
        pins.d2.into_output().downgrade(),
        pins.d3.into_output().downgrade(),
        pins.d7.into_output().downgrade(),
        pins.d4.into_output().downgrade(),
        pins.d5.into_output().downgrade(),
        pins.d6.into_output().downgrade(),
    );

    let mut supervisor = Supervisor::new(
        Mcp3202::new(spi, cs),
        relay_pins,
        Tc1Micros::new(dp.TC1),
        HostUsart::new(serial),
        EepromStore::new(arduino_hal::Eeprom::new(dp.EEPROM)),
    );

    loop {
        supervisor.tick();
    }
}
