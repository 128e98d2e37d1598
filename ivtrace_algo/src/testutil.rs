//! Mock hardware for host-side tests: a scripted ADC, a recording pin
//! bank, a synthetic clock and an in-memory serial port / byte store.

use std::collections::VecDeque;
use std::convert::Infallible;

use ufmt::uWrite;

use crate::hw::{AdcChannel, Clock, CurveAdc, HostPort, PersistentStore, RelayLine, RelayPins};

/// ADC whose conversions come from a closure, so each test scripts its own
/// signal shapes.
pub struct ScriptAdc<F: FnMut(AdcChannel) -> u16> {
    script: F,
    pub last_divider: Option<u8>,
}

impl<F: FnMut(AdcChannel) -> u16> ScriptAdc<F> {
    pub fn new(script: F) -> Self {
        ScriptAdc {
            script,
            last_divider: None,
        }
    }
}

impl<F: FnMut(AdcChannel) -> u16> CurveAdc for ScriptAdc<F> {
    fn read(&mut self, channel: AdcChannel) -> u16 {
        (self.script)(channel).min(4095)
    }

    fn set_clock_divider(&mut self, divider: u8) {
        self.last_divider = Some(divider);
    }
}

/// Records every line drive and the last level of each line.
pub struct PinLog {
    pub events: Vec<(RelayLine, bool)>,
    levels: [Option<bool>; 6],
}

impl PinLog {
    pub fn new() -> Self {
        PinLog {
            events: Vec::new(),
            levels: [None; 6],
        }
    }

    fn index(line: RelayLine) -> usize {
        match line {
            RelayLine::Primary => 0,
            RelayLine::Secondary => 1,
            RelayLine::Ssr2 => 2,
            RelayLine::Ssr3 => 3,
            RelayLine::Ssr4 => 4,
            RelayLine::Ssr6 => 5,
        }
    }

    /// Last electrical level driven on a line, if it was driven at all.
    pub fn level(&self, line: RelayLine) -> Option<bool> {
        self.levels[Self::index(line)]
    }
}

impl RelayPins for PinLog {
    fn write(&mut self, line: RelayLine, high: bool) {
        self.events.push((line, high));
        self.levels[Self::index(line)] = Some(high);
    }
}

/// Deterministic clock: every `micros` call advances time by a fixed step,
/// delays advance it by their nominal duration.
pub struct TestClock {
    now: u32,
    step: u32,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock::with_step(50)
    }

    pub fn with_step(step: u32) -> Self {
        TestClock { now: 0, step }
    }

    pub fn elapsed_us(&self) -> u32 {
        self.now
    }
}

impl Clock for TestClock {
    fn micros(&mut self) -> u32 {
        self.now = self.now.wrapping_add(self.step);
        self.now
    }

    fn delay_us(&mut self, us: u32) {
        self.now = self.now.wrapping_add(us);
    }
}

/// Serial port with an in-memory receive queue and transmit capture.
pub struct TestPort {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
}

impl TestPort {
    pub fn new() -> Self {
        TestPort {
            tx: Vec::new(),
            rx: VecDeque::new(),
        }
    }

    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn tx_string(&self) -> String {
        String::from_utf8_lossy(&self.tx).into_owned()
    }

    /// Drain the capture, handy between protocol phases.
    pub fn take_tx(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.tx).into_owned();
        self.tx.clear();
        out
    }
}

impl uWrite for TestPort {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        self.tx.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl HostPort for TestPort {
    fn poll_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }
}

/// Byte store that forgets nothing and starts erased.
pub struct MemStore {
    bytes: [u8; 1024],
}

impl MemStore {
    pub fn new() -> Self {
        MemStore { bytes: [0xFF; 1024] }
    }
}

impl PersistentStore for MemStore {
    fn read_byte(&mut self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }
}

// Lets a test pre-program a store and then hand it to a fresh supervisor,
// the way contents persist across a real reboot.
impl PersistentStore for &mut MemStore {
    fn read_byte(&mut self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }
}
