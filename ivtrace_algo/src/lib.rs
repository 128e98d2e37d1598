//! Measurement core for the ivtrace photovoltaic I-V curve tracer.
//!
//! A sweep discharges a pre-charged capacitor through the PV circuit and
//! samples voltage and current while the capacitor charges from
//! near-short-circuit to near-open-circuit. Everything timing-critical in
//! here is integer-only and allocation-free; the hardware is reached through
//! the narrow traits in [`hw`], so the whole pipeline runs unmodified on the
//! target and on the host (under test, against mock implementations).

#![cfg_attr(not(test), no_std)]

pub mod calibrate;
pub mod config;
pub mod hw;
pub mod measure;
pub mod message;
pub mod relay;
pub mod report;
pub mod supervisor;

#[cfg(test)]
mod testutil;

/// Version reported on the boot banner line.
pub const FIRMWARE_VERSION: &str = "1.0.0";

/// Capacity of the retained point buffers (compile-time upper bound for the
/// runtime MAX_IV_POINTS tunable).
pub const MAX_IV_POINTS_LIM: usize = 275;

/// Fallback cap on sweep-loop measurements when the tail is never reached.
pub const MAX_IV_MEAS: u32 = 1_000_000;

/// Number of (CH0, CH1) sample pairs taken while estimating Voc and the
/// current-channel noise floor, before any relay is actuated.
pub const VOC_POLLING_LOOPS: u16 = 400;

/// Voc estimates below this count mean no PV source is connected.
pub const MIN_VOC_ADC: i16 = 10;

/// Idle 1 ms poll ticks before an unfinished host line is abandoned.
pub const MSG_TIMER_TIMEOUT: u16 = 50_000;

/// Full-scale count of the 12-bit ADC.
pub const ADC_MAX: i16 = 4095;

/// Settling time after the primary relay is driven, sized for the slowest
/// solid-state variant (harmless surplus for electromechanical ones).
pub const RELAY_SETTLE_MS: u16 = 20;

/// Cap on the voltage-stable polls taken between presenting the short and
/// releasing the capacitor; falls through to release when exhausted.
pub const SHORT_STABLE_POLL_LIMIT: u16 = 1000;

const _: () = assert!(MAX_IV_POINTS_LIM >= 10);
const _: () = assert!(MAX_IV_POINTS_LIM <= i16::MAX as usize);
