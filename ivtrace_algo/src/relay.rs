//! Relay sequencing. The capacitor is moved between its bleed path and the
//! PV circuit by up to six control lines whose wiring differs per board
//! variant; this module hides all of that behind the three semantic steps
//! the sweep needs (present a short, release onto the capacitor, return to
//! bleed) plus unconditional manual drive for bench testing.

use crate::hw::{Clock, RelayLine, RelayPins};
use crate::RELAY_SETTLE_MS;

/// Where the capacitor currently sits in the sweep sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Capacitor draining through the bleed path, PV disconnected.
    Bleed,
    /// PV connected with the capacitor bypassed, so the source sees a
    /// controlled short circuit.
    ShortPresent,
    /// Bypass released, capacitor charging through the PV circuit.
    Charging,
}

/// Variant-independent relay state machine.
pub struct RelaySequencer<P: RelayPins> {
    pins: P,
    active_high: bool, // persisted polarity of the primary/secondary pair
    state: RelayState,
}

impl<P: RelayPins> RelaySequencer<P> {
    /// Build the sequencer and drive every line to the bleed state so the
    /// hardware is in a known condition from the first instruction on.
    pub fn new(pins: P, active_high: bool) -> Self {
        let mut seq = RelaySequencer {
            pins,
            active_high,
            state: RelayState::Bleed,
        };
        seq.apply_bleed();
        seq
    }

    /// Drive one logical line to its active or inactive level. The primary
    /// pair follows the persisted polarity flag; the SSR lines have fixed
    /// polarities set by the board.
    fn drive(&mut self, line: RelayLine, active: bool) {
        let high = match line {
            RelayLine::Primary | RelayLine::Secondary => active == self.active_high,
            RelayLine::Ssr2 => active,
            RelayLine::Ssr3 | RelayLine::Ssr4 | RelayLine::Ssr6 => !active,
        };
        self.pins.write(line, high);
    }

    fn apply_bleed(&mut self) {
        self.drive(RelayLine::Primary, false);
        self.drive(RelayLine::Secondary, false);
        self.drive(RelayLine::Ssr2, true); // bleed-side switch on
        self.drive(RelayLine::Ssr3, true); // capacitor bypassed while idle
        self.drive(RelayLine::Ssr4, true);
        self.drive(RelayLine::Ssr6, true);
    }

    /// Present a short circuit to the PV source: capacitor bypass on, bleed
    /// off, primary on. Waits out the turn-on time of the slowest switch
    /// before returning.
    pub fn arm_short<C: Clock>(&mut self, clock: &mut C) {
        self.drive(RelayLine::Ssr3, true);
        self.drive(RelayLine::Ssr4, true);
        self.drive(RelayLine::Ssr2, false);
        self.drive(RelayLine::Primary, true);
        clock.delay_ms(RELAY_SETTLE_MS);
        self.state = RelayState::ShortPresent;
    }

    /// Release the capacitor bypass; the capacitor now charges through the
    /// PV circuit and the sweep is under way.
    pub fn release_to_capacitor(&mut self) {
        self.drive(RelayLine::Ssr3, false);
        self.drive(RelayLine::Ssr4, false);
        self.state = RelayState::Charging;
    }

    /// Disconnect the PV source and drain the capacitor for the next sweep.
    pub fn return_to_bleed(&mut self) {
        self.apply_bleed();
        self.state = RelayState::Bleed;
    }

    /// Unconditional primary drive, host-requested for manual testing.
    /// Keeps the complement line consistent.
    pub fn set_primary(&mut self, active: bool) {
        self.drive(RelayLine::Primary, active);
        self.drive(RelayLine::Ssr2, !active);
    }

    /// Unconditional secondary drive, host-requested for manual testing.
    pub fn set_secondary(&mut self, active: bool) {
        self.drive(RelayLine::Secondary, active);
        self.drive(RelayLine::Ssr6, !active);
    }

    /// Adopt a freshly persisted polarity flag. When idle the primary pair
    /// is re-driven so the electrical level matches the new polarity
    /// immediately.
    pub fn set_active_high(&mut self, active_high: bool) {
        self.active_high = active_high;
        if self.state == RelayState::Bleed {
            self.drive(RelayLine::Primary, false);
            self.drive(RelayLine::Secondary, false);
        }
    }

    pub fn active_high(&self) -> bool {
        self.active_high
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{PinLog, TestClock};

    fn sequencer(active_high: bool) -> RelaySequencer<PinLog> {
        RelaySequencer::new(PinLog::new(), active_high)
    }

    #[test]
    fn boot_drives_bleed_state() {
        let seq = sequencer(false);
        // Active-low primary pair is inactive, so electrically high.
        assert_eq!(seq.pins().level(RelayLine::Primary), Some(true));
        assert_eq!(seq.pins().level(RelayLine::Secondary), Some(true));
        // Bleed switch active (active-high line).
        assert_eq!(seq.pins().level(RelayLine::Ssr2), Some(true));
        // Bypass lines active (active-low lines).
        assert_eq!(seq.pins().level(RelayLine::Ssr3), Some(false));
        assert_eq!(seq.pins().level(RelayLine::Ssr4), Some(false));
        assert_eq!(seq.state(), RelayState::Bleed);
    }

    #[test]
    fn sweep_sequence_transitions() {
        let mut clock = TestClock::new();
        let mut seq = sequencer(false);

        seq.arm_short(&mut clock);
        assert_eq!(seq.state(), RelayState::ShortPresent);
        // Primary active and active-low, so driven low.
        assert_eq!(seq.pins().level(RelayLine::Primary), Some(false));
        // Bleed switch off, bypass on.
        assert_eq!(seq.pins().level(RelayLine::Ssr2), Some(false));
        assert_eq!(seq.pins().level(RelayLine::Ssr3), Some(false));
        // The settle delay actually elapsed.
        assert!(clock.elapsed_us() >= 20_000);

        seq.release_to_capacitor();
        assert_eq!(seq.state(), RelayState::Charging);
        // Bypass released (active-low lines now high).
        assert_eq!(seq.pins().level(RelayLine::Ssr3), Some(true));
        assert_eq!(seq.pins().level(RelayLine::Ssr4), Some(true));
        // Primary still engaged.
        assert_eq!(seq.pins().level(RelayLine::Primary), Some(false));

        seq.return_to_bleed();
        assert_eq!(seq.state(), RelayState::Bleed);
        assert_eq!(seq.pins().level(RelayLine::Primary), Some(true));
        assert_eq!(seq.pins().level(RelayLine::Ssr2), Some(true));
    }

    #[test]
    fn polarity_flip_reverses_primary_pair_only() {
        let mut clock = TestClock::new();

        let mut low = sequencer(false);
        let mut high = sequencer(true);
        low.arm_short(&mut clock);
        high.arm_short(&mut clock);

        for line in [
            RelayLine::Primary,
            RelayLine::Secondary,
            RelayLine::Ssr2,
            RelayLine::Ssr3,
            RelayLine::Ssr4,
            RelayLine::Ssr6,
        ] {
            let (a, b) = (low.pins().level(line), high.pins().level(line));
            match line {
                RelayLine::Primary | RelayLine::Secondary => {
                    assert_eq!(a.map(|v| !v), b, "{:?} should invert", line)
                }
                _ => assert_eq!(a, b, "{:?} should not change", line),
            }
        }
    }

    #[test]
    fn manual_drive_is_unconditional() {
        let mut seq = sequencer(false);
        seq.set_primary(true);
        assert_eq!(seq.pins().level(RelayLine::Primary), Some(false));
        assert_eq!(seq.pins().level(RelayLine::Ssr2), Some(false));
        seq.set_secondary(true);
        assert_eq!(seq.pins().level(RelayLine::Secondary), Some(false));
        // SSR6 is the secondary's complement: inactive now, and the line is
        // active-low, so it idles high.
        assert_eq!(seq.pins().level(RelayLine::Ssr6), Some(true));
        seq.set_primary(false);
        assert_eq!(seq.pins().level(RelayLine::Primary), Some(true));
    }
}
