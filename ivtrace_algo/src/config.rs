//! Runtime tunables and the EEPROM-backed parameter store.
//!
//! Tunables are only ever changed by `Config` lines from the host and keep
//! their values across sweeps. The persistent store holds 32-bit floats at
//! fixed byte offsets; the only one the firmware itself interprets is the
//! relay polarity flag.

use crate::hw::PersistentStore;
use crate::MAX_IV_POINTS_LIM;

/// Offset of the magic value marking the store as programmed.
pub const EEPROM_VALID_ADDR: u16 = 0;
/// Offset of the count of valid float entries starting at offset 8.
pub const EEPROM_VALID_COUNT_ADDR: u16 = 4;
/// First host-owned calibration entry.
pub const EEPROM_ENTRIES_ADDR: u16 = 8;
/// Relay polarity flag: 0.0 means active-low, anything else active-high.
pub const EEPROM_RELAY_ACTIVE_HIGH_ADDR: u16 = 44;
/// Magic value expected at offset 0 of a programmed store.
pub const EEPROM_VALID_VALUE: f32 = 123456.7890;
/// Upper bound on dumped entries, in case the count cell holds garbage.
pub const EEPROM_MAX_FLOATS: u16 = 64;

pub const CLK_DIV_DEFAULT: u8 = 8;
pub const MAX_IV_POINTS_DEFAULT: u16 = 140;
pub const MIN_ISC_ADC_DEFAULT: i16 = 10;
pub const MAX_ISC_POLL_DEFAULT: i32 = 5000;
pub const ISC_STABLE_ADC_DEFAULT: i16 = 5;
pub const MAX_DISCARDS_DEFAULT: i16 = 300;
pub const ASPECT_HEIGHT_DEFAULT: i16 = 2;
pub const ASPECT_WIDTH_DEFAULT: i16 = 3;

const _: () = assert!(MAX_IV_POINTS_DEFAULT as usize <= MAX_IV_POINTS_LIM);
const _: () = assert!(MAX_IV_POINTS_DEFAULT >= 10);
const _: () = assert!(ASPECT_HEIGHT_DEFAULT >= 1 && ASPECT_HEIGHT_DEFAULT <= 8);
const _: () = assert!(ASPECT_WIDTH_DEFAULT >= 1 && ASPECT_WIDTH_DEFAULT <= 8);

/// Host-settable sweep parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub clk_div: u8,        // ADC SPI clock divider (power of two)
    pub max_iv_points: u16, // point budget for one curve
    pub min_isc_adc: i16,   // floor under which a current reading is noise
    pub max_isc_poll: i32,  // Isc stabilization poll cap; negative = debug
    pub isc_stable_adc: i16, // max step between stable Isc samples
    pub max_discards: i16,  // consecutive discards before a forced keep
    pub aspect_height: i16, // rendered plot height weight
    pub aspect_width: i16,  // rendered plot width weight
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            clk_div: CLK_DIV_DEFAULT,
            max_iv_points: MAX_IV_POINTS_DEFAULT,
            min_isc_adc: MIN_ISC_ADC_DEFAULT,
            max_isc_poll: MAX_ISC_POLL_DEFAULT,
            isc_stable_adc: ISC_STABLE_ADC_DEFAULT,
            max_discards: MAX_DISCARDS_DEFAULT,
            aspect_height: ASPECT_HEIGHT_DEFAULT,
            aspect_width: ASPECT_WIDTH_DEFAULT,
        }
    }
}

/// Config message keys understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ClkDiv,
    MaxIvPoints,
    MinIscAdc,
    MaxIscPoll,
    IscStableAdc,
    MaxDiscards,
    AspectHeight,
    AspectWidth,
    WriteEeprom,
    DumpEeprom,
    RelayState,
    SecondRelayState,
    DoSsrCurrCal,
}

impl ConfigKey {
    /// Resolve the key token of a `Config` line.
    pub fn lookup(token: &str) -> Option<ConfigKey> {
        Some(match token {
            "CLK_DIV" => ConfigKey::ClkDiv,
            "MAX_IV_POINTS" => ConfigKey::MaxIvPoints,
            "MIN_ISC_ADC" => ConfigKey::MinIscAdc,
            "MAX_ISC_POLL" => ConfigKey::MaxIscPoll,
            "ISC_STABLE_ADC" => ConfigKey::IscStableAdc,
            "MAX_DISCARDS" => ConfigKey::MaxDiscards,
            "ASPECT_HEIGHT" => ConfigKey::AspectHeight,
            "ASPECT_WIDTH" => ConfigKey::AspectWidth,
            "WRITE_EEPROM" => ConfigKey::WriteEeprom,
            "DUMP_EEPROM" => ConfigKey::DumpEeprom,
            "RELAY_STATE" => ConfigKey::RelayState,
            "SECOND_RELAY_STATE" => ConfigKey::SecondRelayState,
            "DO_SSR_CURR_CAL" => ConfigKey::DoSsrCurrCal,
            _ => return None,
        })
    }

    /// Wire name, used when echoing errors back to the host.
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::ClkDiv => "CLK_DIV",
            ConfigKey::MaxIvPoints => "MAX_IV_POINTS",
            ConfigKey::MinIscAdc => "MIN_ISC_ADC",
            ConfigKey::MaxIscPoll => "MAX_ISC_POLL",
            ConfigKey::IscStableAdc => "ISC_STABLE_ADC",
            ConfigKey::MaxDiscards => "MAX_DISCARDS",
            ConfigKey::AspectHeight => "ASPECT_HEIGHT",
            ConfigKey::AspectWidth => "ASPECT_WIDTH",
            ConfigKey::WriteEeprom => "WRITE_EEPROM",
            ConfigKey::DumpEeprom => "DUMP_EEPROM",
            ConfigKey::RelayState => "RELAY_STATE",
            ConfigKey::SecondRelayState => "SECOND_RELAY_STATE",
            ConfigKey::DoSsrCurrCal => "DO_SSR_CURR_CAL",
        }
    }

    /// Number of value tokens the key requires.
    pub fn arg_count(self) -> u8 {
        match self {
            ConfigKey::DumpEeprom | ConfigKey::DoSsrCurrCal => 0,
            ConfigKey::WriteEeprom => 2,
            _ => 1,
        }
    }
}

/// Float-typed view of the persistent byte store.
pub struct ParamStore<S: PersistentStore> {
    store: S,
}

impl<S: PersistentStore> ParamStore<S> {
    pub fn new(store: S) -> Self {
        ParamStore { store }
    }

    pub fn read_float(&mut self, addr: u16) -> f32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.store.read_byte(addr + i as u16);
        }
        f32::from_le_bytes(bytes)
    }

    pub fn write_float(&mut self, addr: u16, value: f32) {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.store.write_byte(addr + i as u16, *b);
        }
    }

    /// True when the magic value has been written, i.e. the store contents
    /// are meaningful.
    pub fn is_programmed(&mut self) -> bool {
        self.read_float(EEPROM_VALID_ADDR).to_bits() == EEPROM_VALID_VALUE.to_bits()
    }

    /// Number of host-owned entries following the header, bounded so a
    /// corrupt count cell cannot run the dump away.
    pub fn entry_count(&mut self) -> u16 {
        let count = self.read_float(EEPROM_VALID_COUNT_ADDR);
        if count >= 1.0 && count < EEPROM_MAX_FLOATS as f32 {
            count as u16
        } else if count >= EEPROM_MAX_FLOATS as f32 {
            EEPROM_MAX_FLOATS
        } else {
            0
        }
    }

    /// Relay polarity at boot. An unprogrammed store silently means
    /// active-low.
    pub fn relay_active_high(&mut self) -> bool {
        self.is_programmed() && self.read_float(EEPROM_RELAY_ACTIVE_HIGH_ADDR) != 0.0
    }
}
