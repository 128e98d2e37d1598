//! SSR current calibration. The host can ask the firmware to hold the
//! primary switch closed against the bypassed capacitor and report the
//! steady-state current, which calibrates the shunt path without running a
//! sweep. The long hold lets a solid-state relay reach thermal equilibrium
//! before anything is averaged.

use crate::hw::{AdcChannel, Clock, CurveAdc, RelayPins};
use crate::relay::RelaySequencer;
use crate::ADC_MAX;

/// Total time the short is held, in microseconds.
pub const SSR_CAL_USECS: u32 = 3_000_000;
/// Averaging window at the end of the hold.
pub const SSR_CAL_RD_USECS: u32 = 100_000;

/// Averaged reading plus a validity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsrCurrentCal {
    pub average: i16,
    pub valid: bool,
}

/// Hold the short and average CH1 over the final read window. The result
/// is invalid when any read saturated the ADC or when the spread across
/// the window exceeds one percent of the average.
pub fn run<A, P, C>(adc: &mut A, relays: &mut RelaySequencer<P>, clock: &mut C) -> SsrCurrentCal
where
    A: CurveAdc,
    P: RelayPins,
    C: Clock,
{
    relays.arm_short(clock);

    let t_start = clock.micros();
    let read_from = SSR_CAL_USECS - SSR_CAL_RD_USECS;
    let mut sum: u32 = 0;
    let mut count: u32 = 0;
    let mut min: i16 = ADC_MAX;
    let mut max: i16 = 0;
    let mut saturated = false;

    loop {
        let elapsed = clock.micros().wrapping_sub(t_start);
        if elapsed >= SSR_CAL_USECS {
            break;
        }
        if elapsed < read_from {
            continue; // still settling, keep the timer serviced
        }
        let current = adc.read(AdcChannel::Current) as i16;
        if current >= ADC_MAX {
            saturated = true;
        }
        if current < min {
            min = current;
        }
        if current > max {
            max = current;
        }
        sum += current as u32;
        count += 1;
    }

    relays.return_to_bleed();

    let average = if count > 0 { (sum / count) as i16 } else { 0 };
    let valid = count > 0 && !saturated && (max - min) <= average / 100;
    SsrCurrentCal { average, valid }
}
