//! Relay output bank: six type-erased output pins, one per logical line.
//! Boards that do not wire a given line just leave the pin unconnected.

use arduino_hal::port::{mode::Output, Pin};

use ivtrace_algo::hw::{RelayLine, RelayPins};

pub struct RelayPinSet {
    primary: Pin<Output>,
    secondary: Pin<Output>,
    ssr2: Pin<Output>,
    ssr3: Pin<Output>,
    ssr4: Pin<Output>,
    ssr6: Pin<Output>,
}

impl RelayPinSet {
    pub fn new(
        primary: Pin<Output>,
        secondary: Pin<Output>,
        ssr2: Pin<Output>,
        ssr3: Pin<Output>,
        ssr4: Pin<Output>,
        ssr6: Pin<Output>,
    ) -> Self {
        RelayPinSet {
            primary,
            secondary,
            ssr2,
            ssr3,
            ssr4,
            ssr6,
        }
    }
}

fn drive(pin: &mut Pin<Output>, high: bool) {
    if high {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

impl RelayPins for RelayPinSet {
    fn write(&mut self, line: RelayLine, high: bool) {
        let pin = match line {
            RelayLine::Primary => &mut self.primary,
            RelayLine::Secondary => &mut self.secondary,
            RelayLine::Ssr2 => &mut self.ssr2,
            RelayLine::Ssr3 => &mut self.ssr3,
            RelayLine::Ssr4 => &mut self.ssr4,
            RelayLine::Ssr6 => &mut self.ssr6,
        };
        drive(pin, high);
    }
}
