//! Microsecond clock on timer 1. The timer free-runs at clk/8 (two ticks
//! per microsecond at 16 MHz) and the overflow flag is polled, not
//! interrupt-driven, so the sweep loop stays the only thing running. The
//! 16-bit extension stays correct as long as `micros` is called at least
//! once per 32.77 ms wrap, which every polling loop in the firmware does.

use arduino_hal::pac::TC1;

use ivtrace_algo::hw::Clock;

pub struct Tc1Micros {
    tc1: TC1,
    overflows: u16,
}

impl Tc1Micros {
    pub fn new(tc1: TC1) -> Self {
        // Normal mode is the reset state; only the prescaler needs setting.
        tc1.tccr1b.write(|w| w.cs1().prescale_8());
        Tc1Micros { tc1, overflows: 0 }
    }

    fn now(&mut self) -> u32 {
        let mut count = self.tc1.tcnt1.read().bits();
        if self.tc1.tifr1.read().tov1().bit_is_set() {
            // Consume the pending wrap and re-read so the halves agree.
            self.tc1.tifr1.write(|w| w.tov1().set_bit());
            self.overflows = self.overflows.wrapping_add(1);
            count = self.tc1.tcnt1.read().bits();
        }
        let ticks = ((self.overflows as u32) << 16) | count as u32;
        ticks >> 1 // two timer ticks per microsecond
    }
}

impl Clock for Tc1Micros {
    fn micros(&mut self) -> u32 {
        self.now()
    }

    fn delay_us(&mut self, us: u32) {
        arduino_hal::delay_us(us);
    }

    fn delay_ms(&mut self, ms: u16) {
        arduino_hal::delay_ms(ms);
    }
}
