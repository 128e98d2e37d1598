//! AVR implementations of the ivtrace hardware seams: the MCP3202 SPI ADC,
//! the relay output bank, the TC1 microsecond clock, the USART host port
//! and the EEPROM byte store. Everything behavioral lives in
//! `ivtrace_algo`; this crate only moves bytes and toggles pins.

#![no_std]

pub mod adc;
pub mod clock;
pub mod eeprom;
pub mod relay;
pub mod serial;
