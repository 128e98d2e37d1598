//! MCP3202 driver: 12-bit two-channel SPI ADC, one conversion per
//! three-byte transaction.

use arduino_hal::hal::port::PB2;
use arduino_hal::spi::{ChipSelectPin, DataOrder, SerialClockRate, Settings};
use arduino_hal::Spi;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::spi::MODE_0;

use ivtrace_algo::hw::{AdcChannel, CurveAdc};

/// Command framing: start bit, then single-ended / channel-select / MSB
/// first in the second byte. The reply carries bits 11:8 in its second
/// byte and bits 7:0 in its third.
const START: u8 = 0x01;
const SINGLE_ENDED_MSB_FIRST: u8 = 0xA0;

pub struct Mcp3202 {
    spi: Spi,
    cs: ChipSelectPin<PB2>,
}

impl Mcp3202 {
    pub fn new(spi: Spi, cs: ChipSelectPin<PB2>) -> Self {
        Mcp3202 { spi, cs }
    }

    /// SPI settings for a given power-of-two clock divider. Values the
    /// hardware cannot do fall back to the default divider of 8.
    pub fn settings_for_divider(divider: u8) -> Settings {
        let clock = match divider {
            2 => SerialClockRate::OscfOver2,
            4 => SerialClockRate::OscfOver4,
            8 => SerialClockRate::OscfOver8,
            16 => SerialClockRate::OscfOver16,
            32 => SerialClockRate::OscfOver32,
            64 => SerialClockRate::OscfOver64,
            128 => SerialClockRate::OscfOver128,
            _ => SerialClockRate::OscfOver8,
        };
        Settings {
            data_order: DataOrder::MostSignificantFirst,
            clock,
            mode: MODE_0,
        }
    }
}

impl CurveAdc for Mcp3202 {
    fn read(&mut self, channel: AdcChannel) -> u16 {
        let mut frame = [START, SINGLE_ENDED_MSB_FIRST | ((channel as u8) << 6), 0x00];
        let _ = self.cs.set_low();
        let _ = self.spi.transfer(&mut frame);
        let _ = self.cs.set_high();
        (((frame[1] & 0x0F) as u16) << 8) | frame[2] as u16
    }

    fn set_clock_divider(&mut self, divider: u8) {
        let _ = self.spi.reconfigure(Self::settings_for_divider(divider));
    }
}
