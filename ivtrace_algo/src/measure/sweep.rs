//! The sweep loop. Once the capacitor starts charging the sweep rate is
//! set entirely by physics (i = C dv/dt), so this loop cannot pace the
//! curve; all it can do is sample as fast as possible and choose what to
//! keep. Per-iteration work is two ADC reads plus 16-bit integer
//! arithmetic, nothing else: every extra cycle here directly costs
//! resolution at the knee of the curve.

use crate::hw::{AdcChannel, Clock, CurveAdc};
use crate::{MAX_IV_MEAS, MAX_IV_POINTS_LIM};

/// Weights of the retroactive CH1 interpolation. The voltage and current
/// of a retained point are read back to back, not simultaneously; once the
/// next sample exists, the point's current is shifted toward it so the pair
/// approximates one instant. The weight sum is a power of two so the
/// divide is a shift, and the worst-case numerator 4095 * 8 + 4 still fits
/// a signed 16-bit word.
const CH1_AVG_W1: i16 = 5;
const CH1_AVG_W2: i16 = 3;
const CH1_AVG_HALF: i16 = (CH1_AVG_W1 + CH1_AVG_W2) / 2;
const CH1_AVG_SHIFT: u32 = 3;

const _: () = assert!(CH1_AVG_W1 + CH1_AVG_W2 <= 16);
const _: () = assert!((CH1_AVG_W1 + CH1_AVG_W2) as u32 == 1 << CH1_AVG_SHIFT);

/// Raw measurement capture, retained alongside the filtered curve when the
/// `unfiltered-capture` feature is on.
#[cfg(feature = "unfiltered-capture")]
pub struct RawCapture {
    pub ch0: [i16; RawCapture::CAPACITY],
    pub ch1: [i16; RawCapture::CAPACITY],
    pub len: usize,
}

#[cfg(feature = "unfiltered-capture")]
impl RawCapture {
    pub const CAPACITY: usize = 300;

    pub fn new() -> Self {
        RawCapture {
            ch0: [0; Self::CAPACITY],
            ch1: [0; Self::CAPACITY],
            len: 0,
        }
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }

    fn push(&mut self, ch0: i16, ch1: i16) {
        if self.len < Self::CAPACITY {
            self.ch0[self.len] = ch0;
            self.ch1[self.len] = ch1;
            self.len += 1;
        }
    }
}

#[cfg(feature = "unfiltered-capture")]
impl Default for RawCapture {
    fn default() -> Self {
        RawCapture::new()
    }
}

/// Inputs the loop needs, fixed for the duration of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub max_iv_points: u16,
    pub max_discards: i16,
    pub v_scale: i16,
    pub i_scale: i16,
    pub min_manhattan: i16,
    /// Current threshold under which the tail is considered reached.
    pub done_ch1: i16,
    /// Isc stabilization never converged; finish after one iteration.
    pub poll_timeout: bool,
}

/// What the loop did, for the report's diagnostic tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepTally {
    /// Retained points, including point 0 from the Isc stabilizer.
    pub pt_num: usize,
    /// Measurement pairs taken, counting the stabilizer's final pair.
    pub num_meas: u32,
    pub elapsed_us: u32,
}

/// Run the sweep. `ch0_vals`/`ch1_vals` hold the retained curve; slot 0
/// must already contain the last pair from the Isc stabilizer.
pub fn run<A, C>(
    adc: &mut A,
    clock: &mut C,
    ch0_vals: &mut [i16; MAX_IV_POINTS_LIM],
    ch1_vals: &mut [i16; MAX_IV_POINTS_LIM],
    #[cfg(feature = "unfiltered-capture")] raw: &mut RawCapture,
    params: &SweepParams,
) -> SweepTally
where
    A: CurveAdc,
    C: Clock,
{
    let mut pt_num: usize = 1;
    let mut num_meas: u32 = 1;
    let mut num_discarded: i16 = 0;
    let mut update_prev_ch1 = false;
    let mut prev_ch1: i16 = ch1_vals[0];

    let max_points = params.max_iv_points as usize;
    let t_start = clock.micros();

    loop {
        // The read also keeps the timer's wrap extension alive on long
        // sweeps; the value itself is not needed until the loop exits.
        clock.micros();

        let adc_ch1_val = adc.read(AdcChannel::Current) as i16;
        let adc_ch0_val = adc.read(AdcChannel::Voltage) as i16;
        num_meas += 1;

        #[cfg(feature = "unfiltered-capture")]
        raw.push(adc_ch0_val, adc_ch1_val);

        // Land the pending interpolation on the previous point now that
        // its successor sample exists.
        if update_prev_ch1 {
            ch1_vals[pt_num - 1] = (prev_ch1 * CH1_AVG_W1
                + adc_ch1_val * CH1_AVG_W2
                + CH1_AVG_HALF)
                >> CH1_AVG_SHIFT;
        }

        ch0_vals[pt_num] = adc_ch0_val;

        let delta_v = adc_ch0_val - ch0_vals[pt_num - 1];
        let delta_i = ch1_vals[pt_num - 1] - adc_ch1_val;
        let delta_i_recent = prev_ch1 - adc_ch1_val;
        prev_ch1 = adc_ch1_val;

        // Tail reached: current is in the noise and no longer falling.
        if (adc_ch1_val < params.done_ch1 && delta_i_recent < 3) || params.poll_timeout {
            break;
        }

        // Relay bounce rewind. A voltage below the previous point means
        // the relay chattered; drop every retained point above the new
        // voltage and re-anchor there. Point 0 is never revised.
        if pt_num > 1 && adc_ch0_val < ch0_vals[pt_num - 1] {
            while pt_num > 1 && ch0_vals[pt_num - 1] > adc_ch0_val {
                pt_num -= 1;
            }
            ch0_vals[pt_num - 1] = adc_ch0_val;
            ch1_vals[pt_num - 1] = adc_ch1_val;
            update_prev_ch1 = true;
            continue;
        }

        // Keep the sample only if it moved far enough along the curve, or
        // if the discard budget forces a keep.
        let dist = delta_v * params.v_scale + delta_i * params.i_scale;
        if dist >= params.min_manhattan || num_discarded >= params.max_discards {
            pt_num += 1;
            update_prev_ch1 = true;
            num_discarded = 0;
            if pt_num >= max_points {
                break;
            }
        } else {
            update_prev_ch1 = false;
            num_discarded += 1;
        }

        if num_meas >= MAX_IV_MEAS {
            break;
        }
    }

    // A point kept on the very last iteration has no successor sample to
    // interpolate against; it keeps its own raw current.
    if update_prev_ch1 {
        ch1_vals[pt_num - 1] = prev_ch1;
    }

    SweepTally {
        pt_num,
        num_meas,
        elapsed_us: clock.micros().wrapping_sub(t_start),
    }
}
