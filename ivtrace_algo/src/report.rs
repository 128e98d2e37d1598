//! Sweep report. After the relays are safely back on the bleed path, the
//! whole result set goes to the host as one fixed-order block of lines so
//! the host side can parse it with a handful of anchored matches.

use ufmt::uwriteln;

use crate::hw::HostPort;

#[cfg(feature = "unfiltered-capture")]
use crate::measure::sweep::RawCapture;

/// Everything the report needs beyond the retained point buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub isc: i16,
    pub voc: i16,
    pub noise_floor: i16,
    pub noise_floor_max: i16,
    pub isc_poll_loops: u32,
    pub poll_timeout: bool,
    pub pt_num: usize,
    pub num_meas: u32,
    pub v_scale: i16,
    pub i_scale: i16,
    pub min_manhattan: i16,
    pub elapsed_us: u32,
}

impl SweepStats {
    /// Stats of a sweep that never ran, for the not-connected case.
    pub fn empty() -> Self {
        SweepStats {
            isc: 0,
            voc: 0,
            noise_floor: 0,
            noise_floor_max: 0,
            isc_poll_loops: 0,
            poll_timeout: true,
            pt_num: 0,
            num_meas: 0,
            v_scale: 1,
            i_scale: 1,
            min_manhattan: 0,
            elapsed_us: 0,
        }
    }
}

/// Emit the full report in its fixed line order, ending with the
/// `Output complete` terminator the host waits for.
pub fn emit<H: HostPort>(
    host: &mut H,
    stats: &SweepStats,
    ch0_vals: &[i16],
    ch1_vals: &[i16],
    #[cfg(feature = "unfiltered-capture")] raw: &RawCapture,
) {
    if stats.poll_timeout {
        uwriteln!(host, "Polling for stable Isc timed out").ok();
    }
    uwriteln!(
        host,
        "CH1 ADC noise floor (min/max): {}/{}",
        stats.noise_floor,
        stats.noise_floor_max
    )
    .ok();
    uwriteln!(host, "Isc CH0:0 CH1:{}", stats.isc).ok();
    for i in 0..stats.pt_num {
        uwriteln!(host, "{} CH0:{} CH1:{}", i, ch0_vals[i], ch1_vals[i]).ok();
    }
    uwriteln!(host, "Voc CH0:{} CH1:{}", stats.voc, stats.noise_floor).ok();

    #[cfg(feature = "unfiltered-capture")]
    for i in 0..raw.len {
        uwriteln!(
            host,
            "Unfiltered CH0:{} Unfiltered CH1:{}",
            raw.ch0[i],
            raw.ch1[i]
        )
        .ok();
    }

    uwriteln!(host, "Isc poll loops: {}", stats.isc_poll_loops).ok();
    uwriteln!(host, "Number of measurements: {}", stats.num_meas).ok();
    uwriteln!(host, "Number of recorded points: {}", stats.pt_num).ok();
    uwriteln!(host, "i_scale: {}", stats.i_scale).ok();
    uwriteln!(host, "v_scale: {}", stats.v_scale).ok();
    uwriteln!(host, "min_manhattan_distance: {}", stats.min_manhattan).ok();
    uwriteln!(host, "Elapsed usecs: {}", stats.elapsed_us).ok();
    let per_reading = if stats.num_meas > 0 {
        stats.elapsed_us / stats.num_meas
    } else {
        0
    };
    uwriteln!(host, "Time (usecs) per i/v reading: {}", per_reading).ok();
    uwriteln!(host, "Output complete").ok();
}
