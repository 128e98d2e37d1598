//! Host serial port adapter. Output goes through `ufmt`, input is a
//! non-blocking single-byte poll so the messenger can count idle time.

use embedded_hal::serial::Read;
use ufmt::uWrite;

use ivtrace_algo::hw::HostPort;

pub struct HostUsart<S> {
    serial: S,
}

impl<S> HostUsart<S> {
    pub fn new(serial: S) -> Self {
        HostUsart { serial }
    }
}

impl<S: uWrite> uWrite for HostUsart<S> {
    type Error = S::Error;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        self.serial.write_str(s)
    }
}

impl<S: uWrite + Read<u8>> HostPort for HostUsart<S> {
    fn poll_byte(&mut self) -> Option<u8> {
        self.serial.read().ok()
    }
}
