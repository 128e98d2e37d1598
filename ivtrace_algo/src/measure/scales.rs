//! Axis weight derivation. The discard filter in the sweep loop measures
//! point spacing as `dv * v_scale + di * i_scale`; these weights map that
//! sum onto pixel spacing for the plot's aspect ratio, so equal sums mean
//! visually equal gaps along the curve.

/// Per-axis Manhattan weights. Always `>= 1` each and `<= 16` together, so
/// every product in the sweep loop stays inside 16-bit arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scales {
    pub v_scale: i16,
    pub i_scale: i16,
}

/// Derive the weights from the sweep endpoints.
///
/// The raw magnitudes deliberately cross axes: the voltage span (Voc)
/// scaled by the plot height weights voltage deltas, and the current span
/// (Isc) scaled by the plot width weights current deltas, so the axis with
/// the larger ADC span ends up with the larger weight. Both magnitudes are
/// then normalized to a 5-bit range off the same shift, derived from the
/// top set bit of the larger one.
pub fn compute(isc: i16, voc: i16, aspect_width: i16, aspect_height: i16) -> Scales {
    let initial_v = (aspect_width * isc) as u16;
    let initial_i = (aspect_height * voc) as u16;

    let v_larger = initial_v >= initial_i;
    let (lg, sm) = if v_larger {
        (initial_v, initial_i)
    } else {
        (initial_i, initial_v)
    };

    // Top set bit of the larger magnitude, floored at bit 4 so the shift
    // below never goes negative.
    let mut top_bit: u8 = 4;
    let mut probe: u8 = 15;
    while probe > 4 {
        if lg & (1u16 << probe) != 0 {
            top_bit = probe;
            break;
        }
        probe -= 1;
    }

    let shift = top_bit - 3;
    let round_up_mask = 1u16 << (top_bit - 4);

    let mut lg_scale = (lg >> shift) as i16 + ((lg & round_up_mask != 0) as i16);
    let mut sm_scale = (sm >> shift) as i16 + ((sm & round_up_mask != 0) as i16);

    if lg_scale + sm_scale > 16 {
        lg_scale >>= 1;
        sm_scale >>= 1;
    }
    if sm_scale == 0 {
        sm_scale = 1;
        if lg_scale == 16 {
            lg_scale = 15;
        }
    }
    if lg_scale == 0 {
        lg_scale = 1; // degenerate all-zero input
    }

    // Undo the axis crossing: the width/Isc magnitude weights current.
    if v_larger {
        Scales {
            i_scale: lg_scale,
            v_scale: sm_scale,
        }
    } else {
        Scales {
            v_scale: lg_scale,
            i_scale: sm_scale,
        }
    }
}

/// Spacing threshold for the discard filter: the weighted length of the
/// whole curve split across the point budget. The numerator is at most
/// 4095 * 16, which a `u16` holds exactly.
pub fn min_manhattan(isc: i16, voc: i16, scales: &Scales, max_iv_points: u16) -> i16 {
    let total = (isc as u16) * (scales.i_scale as u16) + (voc as u16) * (scales.v_scale as u16);
    (total / max_iv_points) as i16
}
