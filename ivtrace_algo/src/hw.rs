//! Hardware seams. The measurement pipeline only ever touches the ADC, the
//! relay control lines, the microsecond clock, the host serial port and the
//! persistent byte store through these traits, so the `ivtrace_drivers`
//! crate provides the AVR implementations and the tests provide mocks.

use ufmt::uWrite;

/// Input channel of the two-channel external ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcChannel {
    /// CH0, scaled PV voltage.
    Voltage = 0,
    /// CH1, amplified shunt (current) voltage.
    Current = 1,
}

/// Single-conversion access to the external 12-bit ADC.
pub trait CurveAdc {
    /// Read one conversion of the selected channel. Counts are in
    /// [0, 4095]; a wire fault shows up as a constant count, never as an
    /// error.
    fn read(&mut self, channel: AdcChannel) -> u16;

    /// Apply a new SPI clock divider (power of two, 2..=128). Takes effect
    /// on the next conversion.
    fn set_clock_divider(&mut self, divider: u8);
}

/// Logical relay/SSR control lines. Every variant of the analog board wires
/// up a subset of these; driving an unconnected line is a no-op, so the
/// sequencer always drives all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayLine {
    /// Primary relay (or SSR1). Connects the PV source to the capacitor
    /// circuit. Polarity follows the persisted active-high flag.
    Primary,
    /// Second relay (or SSR5), for dual-string setups. Same polarity flag.
    Secondary,
    /// Complement of the primary on SSR module boards (bleed-side switch).
    /// Active-high.
    Ssr2,
    /// Capacitor bypass on module boards. Active-low.
    Ssr3,
    /// Capacitor bypass plus bleed on cell boards. Active-low.
    Ssr4,
    /// Complement of the second relay on SSR cell boards. Active-low.
    Ssr6,
}

/// Raw drive of the relay control lines. `high` is the electrical level;
/// polarity resolution happens in the sequencer above this trait.
pub trait RelayPins {
    fn write(&mut self, line: RelayLine, high: bool);
}

/// Monotonic microsecond time source plus busy-wait delays.
///
/// `micros` must be called at least once per hardware timer wrap for the
/// wrap extension to stay live; the sweep loop reads it every iteration
/// anyway, so this only matters to implementations.
pub trait Clock {
    fn micros(&mut self) -> u32;

    fn delay_us(&mut self, us: u32);

    fn delay_ms(&mut self, ms: u16) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}

/// Host-facing serial port: formatted line output plus a non-blocking
/// single-byte poll for the inbound direction.
pub trait HostPort: uWrite {
    /// Take one received byte if one is waiting.
    fn poll_byte(&mut self) -> Option<u8>;
}

/// Flat byte-addressed persistent store (EEPROM on the target).
pub trait PersistentStore {
    fn read_byte(&mut self, addr: u16) -> u8;
    fn write_byte(&mut self, addr: u16, value: u8);
}
