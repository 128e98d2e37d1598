//! Top-level sequencing. One supervisor owns all the hardware and walks
//! the device through boot, handshake, idle and sweep; there is no
//! terminal state, the firmware cycles between idle and sweep until power
//! is removed.

use ufmt::{uwrite, uwriteln};

use crate::calibrate;
use crate::config::{
    ConfigKey, ParamStore, Tunables, EEPROM_ENTRIES_ADDR, EEPROM_RELAY_ACTIVE_HIGH_ADDR,
    EEPROM_VALID_ADDR, EEPROM_VALID_COUNT_ADDR,
};
use crate::hw::{AdcChannel, Clock, CurveAdc, HostPort, PersistentStore, RelayPins};
use crate::measure::{isc_poll, scales, sweep, voc_scan};
use crate::message::{parse_line, uwrite_float4, Command, Messenger, ParseError, MSG_BUF_LEN};
use crate::relay::RelaySequencer;
use crate::report::{self, SweepStats};
use crate::{FIRMWARE_VERSION, MAX_IV_POINTS_LIM, SHORT_STABLE_POLL_LIMIT};

#[cfg(feature = "unfiltered-capture")]
use crate::measure::sweep::RawCapture;

/// Host-visible device states. Boot work happens in [`Supervisor::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    /// Announcing `Ready` until the host acknowledges.
    Handshake,
    /// Waiting for a go or config message.
    Idle,
}

/// Owns every peripheral and the retained point buffers.
pub struct Supervisor<A, P, C, H, S>
where
    A: CurveAdc,
    P: RelayPins,
    C: Clock,
    H: HostPort,
    S: PersistentStore,
{
    adc: A,
    relays: RelaySequencer<P>,
    clock: C,
    host: H,
    store: ParamStore<S>,
    messenger: Messenger,
    tunables: Tunables,
    state: DeviceState,
    // Retained curve, shared with the Voc scan's mode table. Slot 0 is the
    // last pair read during Isc stabilization.
    ch0_vals: [i16; MAX_IV_POINTS_LIM],
    ch1_vals: [i16; MAX_IV_POINTS_LIM],
    #[cfg(feature = "unfiltered-capture")]
    raw: RawCapture,
}

impl<A, P, C, H, S> Supervisor<A, P, C, H, S>
where
    A: CurveAdc,
    P: RelayPins,
    C: Clock,
    H: HostPort,
    S: PersistentStore,
{
    /// Boot: load the persisted relay polarity, put the relays on the
    /// bleed path and announce the firmware version.
    pub fn new(adc: A, pins: P, clock: C, mut host: H, store: S) -> Self {
        let mut store = ParamStore::new(store);
        let relays = RelaySequencer::new(pins, store.relay_active_high());
        uwriteln!(&mut host, "ivtrace firmware version {}", FIRMWARE_VERSION).ok();
        Supervisor {
            adc,
            relays,
            clock,
            host,
            store,
            messenger: Messenger::new(),
            tunables: Tunables::default(),
            state: DeviceState::Handshake,
            ch0_vals: [0; MAX_IV_POINTS_LIM],
            ch1_vals: [0; MAX_IV_POINTS_LIM],
            #[cfg(feature = "unfiltered-capture")]
            raw: RawCapture::new(),
        }
    }

    /// One pass of the outer loop: announce the current state, then read
    /// and act on at most one host line. Call forever.
    pub fn tick(&mut self) {
        match self.state {
            DeviceState::Handshake => {
                uwriteln!(&mut self.host, "Ready").ok();
            }
            DeviceState::Idle => {
                uwriteln!(&mut self.host, "Waiting for go message or config message").ok();
            }
        }
        self.poll_and_dispatch();
    }

    fn poll_and_dispatch(&mut self) {
        // The received line is copied out so the messenger buffer is free
        // again while the command runs.
        let mut line_buf = [0u8; MSG_BUF_LEN];
        let line_len = match self.messenger.read_line(&mut self.host, &mut self.clock) {
            Some(line) => {
                let bytes = line.as_bytes();
                line_buf[..bytes.len()].copy_from_slice(bytes);
                bytes.len()
            }
            None => return,
        };
        if let Ok(line) = core::str::from_utf8(&line_buf[..line_len]) {
            self.dispatch(line);
        }
    }

    fn dispatch(&mut self, line: &str) {
        match parse_line(line) {
            Ok(Command::Ready) => {
                if self.state == DeviceState::Handshake {
                    self.state = DeviceState::Idle;
                }
            }
            Ok(Command::Go) => match self.state {
                DeviceState::Idle => self.run_sweep(),
                DeviceState::Handshake => {
                    uwriteln!(&mut self.host, "ERROR: Not ready for go message").ok();
                }
            },
            Ok(Command::Config { key, arg1, arg2 }) => {
                if self.apply_config(key, arg1, arg2) {
                    uwriteln!(&mut self.host, "Config processed").ok();
                } else {
                    uwriteln!(&mut self.host, "Config not processed").ok();
                }
            }
            Err(ParseError::Empty) => {}
            Err(ParseError::UnknownMessage(msg)) => {
                uwriteln!(&mut self.host, "ERROR: Unknown message: {}", msg).ok();
            }
            Err(ParseError::MissingConfigKey) => {
                uwriteln!(&mut self.host, "ERROR: Missing config type").ok();
                uwriteln!(&mut self.host, "Config not processed").ok();
            }
            Err(ParseError::UnknownConfigKey(key)) => {
                uwriteln!(&mut self.host, "ERROR: Unknown config type: {}", key).ok();
                uwriteln!(&mut self.host, "Config not processed").ok();
            }
            Err(ParseError::ArgCount { key, got }) => {
                uwriteln!(
                    &mut self.host,
                    "ERROR: Expected {} args for config type {}, got {}",
                    key.arg_count(),
                    key.name(),
                    got
                )
                .ok();
                uwriteln!(&mut self.host, "Config not processed").ok();
            }
        }
    }

    /// Apply one config command. Returns false when a value fails to
    /// parse or lands outside its permitted range; nothing is changed in
    /// that case.
    fn apply_config(&mut self, key: ConfigKey, arg1: Option<&str>, arg2: Option<&str>) -> bool {
        let bad_value = |host: &mut H| {
            uwriteln!(host, "ERROR: Bad value for config type {}", key.name()).ok();
            false
        };
        match key {
            ConfigKey::ClkDiv => match parse_i32(arg1) {
                Some(v) if (2..=128).contains(&v) => {
                    self.tunables.clk_div = v as u8;
                    self.adc.set_clock_divider(v as u8);
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::MaxIvPoints => match parse_i32(arg1) {
                Some(v) if v >= 10 => {
                    // Clamp to the buffer capacity rather than reject.
                    self.tunables.max_iv_points = (v as usize).min(MAX_IV_POINTS_LIM) as u16;
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::MinIscAdc => match parse_i32(arg1) {
                Some(v) if (0..=4095).contains(&v) => {
                    self.tunables.min_isc_adc = v as i16;
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::MaxIscPoll => match parse_i32(arg1) {
                Some(v) => {
                    self.tunables.max_isc_poll = v;
                    true
                }
                None => bad_value(&mut self.host),
            },
            ConfigKey::IscStableAdc => match parse_i32(arg1) {
                Some(v) if (0..=4095).contains(&v) => {
                    self.tunables.isc_stable_adc = v as i16;
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::MaxDiscards => match parse_i32(arg1) {
                Some(v) if (0..=i16::MAX as i32).contains(&v) => {
                    self.tunables.max_discards = v as i16;
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::AspectHeight => match parse_i32(arg1) {
                Some(v) if (1..=8).contains(&v) => {
                    self.tunables.aspect_height = v as i16;
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::AspectWidth => match parse_i32(arg1) {
                Some(v) if (1..=8).contains(&v) => {
                    self.tunables.aspect_width = v as i16;
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::WriteEeprom => {
                let addr = parse_i32(arg1);
                let value = parse_f32(arg2);
                match (addr, value) {
                    (Some(addr), Some(value)) if (0..=1020).contains(&addr) => {
                        let addr = addr as u16;
                        self.store.write_float(addr, value);
                        if addr == EEPROM_RELAY_ACTIVE_HIGH_ADDR {
                            self.relays.set_active_high(value != 0.0);
                        }
                        true
                    }
                    _ => bad_value(&mut self.host),
                }
            }
            ConfigKey::DumpEeprom => {
                self.dump_eeprom();
                true
            }
            ConfigKey::RelayState => match parse_i32(arg1) {
                Some(v) if v == 0 || v == 1 => {
                    self.relays.set_primary(v != 0);
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::SecondRelayState => match parse_i32(arg1) {
                Some(v) if v == 0 || v == 1 => {
                    self.relays.set_secondary(v != 0);
                    true
                }
                _ => bad_value(&mut self.host),
            },
            ConfigKey::DoSsrCurrCal => {
                let cal = calibrate::run(&mut self.adc, &mut self.relays, &mut self.clock);
                if !cal.valid {
                    uwriteln!(&mut self.host, "WARNING: SSR current cal reading is not valid")
                        .ok();
                }
                uwriteln!(&mut self.host, "SSR current cal ADC average: {}", cal.average).ok();
                true
            }
        }
    }

    /// Emit every meaningful entry of the persistent store. An
    /// unprogrammed store dumps nothing, which is how the host detects
    /// first-time devices.
    fn dump_eeprom(&mut self) {
        if !self.store.is_programmed() {
            return;
        }
        self.dump_entry(EEPROM_VALID_ADDR);
        self.dump_entry(EEPROM_VALID_COUNT_ADDR);
        let count = self.store.entry_count();
        for i in 0..count {
            self.dump_entry(EEPROM_ENTRIES_ADDR + i * 4);
        }
    }

    fn dump_entry(&mut self, addr: u16) {
        let value = self.store.read_float(addr);
        uwrite!(&mut self.host, "EEPROM addr: {} value: ", addr).ok();
        uwrite_float4(&mut self.host, value).ok();
        uwriteln!(&mut self.host, "").ok();
    }

    /// One full sweep: open-circuit scan, relay sequence, Isc
    /// stabilization, the sweep loop, then the report. Ends back on the
    /// bleed path no matter which of those degraded.
    fn run_sweep(&mut self) {
        self.ch0_vals.fill(0);
        self.ch1_vals.fill(0);
        #[cfg(feature = "unfiltered-capture")]
        self.raw.reset();

        let scan = voc_scan::scan(&mut self.adc, &mut self.ch0_vals, &mut self.ch1_vals);

        let stats = if scan.voc == 0 {
            // Nothing connected. Leave the relays alone and report an
            // empty curve.
            let mut stats = SweepStats::empty();
            stats.noise_floor = scan.noise_floor;
            stats.noise_floor_max = scan.noise_floor_max;
            stats
        } else {
            self.relays.arm_short(&mut self.clock);
            self.wait_short_stable();
            self.relays.release_to_capacitor();

            let min_isc_adc_effective = self.tunables.min_isc_adc + scan.noise_floor;
            let poll = isc_poll::poll(
                &mut self.adc,
                self.tunables.max_isc_poll,
                self.tunables.isc_stable_adc,
                min_isc_adc_effective,
            );
            self.ch0_vals[0] = poll.last_ch0;
            self.ch1_vals[0] = poll.last_ch1;

            let scales = scales::compute(
                poll.isc,
                scan.voc,
                self.tunables.aspect_width,
                self.tunables.aspect_height,
            );
            let min_manhattan =
                scales::min_manhattan(poll.isc, scan.voc, &scales, self.tunables.max_iv_points);
            let params = sweep::SweepParams {
                max_iv_points: self.tunables.max_iv_points,
                max_discards: self.tunables.max_discards,
                v_scale: scales.v_scale,
                i_scale: scales.i_scale,
                min_manhattan,
                done_ch1: scan.done_ch1,
                poll_timeout: poll.timeout,
            };
            #[cfg(feature = "unfiltered-capture")]
            let tally = sweep::run(
                &mut self.adc,
                &mut self.clock,
                &mut self.ch0_vals,
                &mut self.ch1_vals,
                &mut self.raw,
                &params,
            );
            #[cfg(not(feature = "unfiltered-capture"))]
            let tally = sweep::run(
                &mut self.adc,
                &mut self.clock,
                &mut self.ch0_vals,
                &mut self.ch1_vals,
                &params,
            );

            SweepStats {
                isc: poll.isc,
                voc: scan.voc,
                noise_floor: scan.noise_floor,
                noise_floor_max: scan.noise_floor_max,
                isc_poll_loops: poll.poll_loops,
                poll_timeout: poll.timeout,
                pt_num: tally.pt_num,
                num_meas: tally.num_meas,
                v_scale: scales.v_scale,
                i_scale: scales.i_scale,
                min_manhattan,
                elapsed_us: tally.elapsed_us,
            }
        };

        self.relays.return_to_bleed();

        #[cfg(feature = "unfiltered-capture")]
        report::emit(
            &mut self.host,
            &stats,
            &self.ch0_vals,
            &self.ch1_vals,
            &self.raw,
        );
        #[cfg(not(feature = "unfiltered-capture"))]
        report::emit(&mut self.host, &stats, &self.ch0_vals, &self.ch1_vals);
    }

    /// Between presenting the short and releasing the capacitor, wait for
    /// the voltage to sit still across three consecutive reads. Slow
    /// solid-state switches are still turning on when this starts; for
    /// electromechanical boards it converges immediately and costs three
    /// conversions.
    fn wait_short_stable(&mut self) {
        let mut prev: i16 = -1;
        let mut prev_prev: i16 = -2;
        for _ in 0..SHORT_STABLE_POLL_LIMIT {
            let v = self.adc.read(AdcChannel::Voltage) as i16;
            if v == prev && v == prev_prev {
                return;
            }
            prev_prev = prev;
            prev = v;
        }
    }
}

fn parse_i32(arg: Option<&str>) -> Option<i32> {
    arg.and_then(|s| s.parse().ok())
}

fn parse_f32(arg: Option<&str>) -> Option<f32> {
    arg.and_then(|s| s.parse().ok())
}
