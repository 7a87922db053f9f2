//! Driver (coil, lamp, flasher) state and configuration registers.

use packed_struct::prelude::*;

/// Number of individually addressable drivers.
pub const MAX_DRIVERS: usize = 256;
/// Number of driver groups.
pub const MAX_DRIVER_GROUPS: usize = 26;

// Register map inside `Module::DriverCtrl`.
pub(crate) const ADDR_GLOBAL_CONFIG: u16 = 0x0000;
pub(crate) const GROUP_CONFIG_BASE: u16 = 0x0010;
pub(crate) const DRIVER_STATE_BASE: u16 = 0x0100;
pub(crate) const WORDS_PER_GROUP: u16 = 2;
pub(crate) const WORDS_PER_DRIVER: u16 = 2;

// Mode tags in the first state word.
const MODE_DISABLED: u32 = 0;
const MODE_PULSED: u32 = 1;
const MODE_SCHEDULED: u32 = 2;
const MODE_PATTER: u32 = 3;

const POLARITY_BIT: u32 = 1 << 8;
const WAIT_TIMESLOT_BIT: u32 = 1 << 9;
const MODE_SHIFT: u32 = 10;
const PARAM_A_SHIFT: u32 = 12;
const PARAM_B_SHIFT: u32 = 20;
const NOW_BIT: u32 = 1 << 28;

/// How a driver is being driven. Exactly one mode is active at a time; the
/// setter methods on [`DriverState`] replace the whole variant rather than
/// toggling independent fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DriveMode {
    #[default]
    Disabled,
    /// Drive for a fixed time; zero milliseconds means on until disabled.
    Pulsed { milliseconds: u8 },
    /// Repeat a 32-slot on/off pattern, one cycle per `cycle_seconds`.
    Scheduled {
        timeslots: u32,
        cycle_seconds: u8,
        now: bool,
    },
    /// Rapid on/off alternation, optionally preceded by a solid on time.
    Patter {
        on_ms: u8,
        off_ms: u8,
        initial_on_ms: u8,
    },
}

/// The full drive state of one driver. Plain data: nothing here touches
/// hardware until the value is applied with `driver_update_state` or linked
/// into a switch rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DriverState {
    pub driver_num: u8,
    pub polarity: bool,
    pub wait_for_first_timeslot: bool,
    pub mode: DriveMode,
}

impl DriverState {
    #[must_use]
    pub fn new(driver_num: u8) -> Self {
        Self {
            driver_num,
            ..Self::default()
        }
    }

    /// Turns the driver off.
    pub fn disable(&mut self) {
        self.mode = DriveMode::Disabled;
    }

    /// Drives for `milliseconds`; zero holds the driver on indefinitely.
    pub fn pulse(&mut self, milliseconds: u8) {
        self.mode = DriveMode::Pulsed { milliseconds };
    }

    /// Assigns a repeating schedule.
    pub fn schedule(&mut self, timeslots: u32, cycle_seconds: u8, now: bool) {
        self.mode = DriveMode::Scheduled {
            timeslots,
            cycle_seconds,
            now,
        };
    }

    /// Assigns a pitter-patter (repeating on/off) schedule, pulsing for
    /// `initial_on_ms` first.
    pub fn patter(&mut self, on_ms: u8, off_ms: u8, initial_on_ms: u8) {
        self.mode = DriveMode::Patter {
            on_ms,
            off_ms,
            initial_on_ms,
        };
    }
}

/// Packs a driver state into its two-word register form.
pub(crate) fn encode_state(state: &DriverState) -> [u32; 2] {
    let (tag, param_a, param_b, now, second) = match state.mode {
        DriveMode::Disabled => (MODE_DISABLED, 0, 0, false, 0),
        DriveMode::Pulsed { milliseconds } => (MODE_PULSED, milliseconds, 0, false, 0),
        DriveMode::Scheduled {
            timeslots,
            cycle_seconds,
            now,
        } => (MODE_SCHEDULED, cycle_seconds, 0, now, timeslots),
        DriveMode::Patter {
            on_ms,
            off_ms,
            initial_on_ms,
        } => (MODE_PATTER, on_ms, off_ms, false, u32::from(initial_on_ms)),
    };
    let mut word = u32::from(state.driver_num)
        | u32::from(param_a) << PARAM_A_SHIFT
        | u32::from(param_b) << PARAM_B_SHIFT
        | tag << MODE_SHIFT;
    if state.polarity {
        word |= POLARITY_BIT;
    }
    if state.wait_for_first_timeslot {
        word |= WAIT_TIMESLOT_BIT;
    }
    if now {
        word |= NOW_BIT;
    }
    [word, second]
}

/// Reassembles a driver state from its register form.
pub(crate) fn decode_state(words: [u32; 2]) -> DriverState {
    let param_a = (words[0] >> PARAM_A_SHIFT & 0xFF) as u8;
    let param_b = (words[0] >> PARAM_B_SHIFT & 0xFF) as u8;
    let mode = match words[0] >> MODE_SHIFT & 0x3 {
        MODE_PULSED => DriveMode::Pulsed {
            milliseconds: param_a,
        },
        MODE_SCHEDULED => DriveMode::Scheduled {
            timeslots: words[1],
            cycle_seconds: param_a,
            now: words[0] & NOW_BIT != 0,
        },
        MODE_PATTER => DriveMode::Patter {
            on_ms: param_a,
            off_ms: param_b,
            initial_on_ms: (words[1] & 0xFF) as u8,
        },
        _ => DriveMode::Disabled,
    };
    DriverState {
        driver_num: (words[0] & 0xFF) as u8,
        polarity: words[0] & POLARITY_BIT != 0,
        wait_for_first_timeslot: words[0] & WAIT_TIMESLOT_BIT != 0,
        mode,
    }
}

/// Global driver-board configuration, mirrored locally and pushed verbatim.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "8")]
pub struct DriverGlobalConfig {
    #[packed_field(bits = "0")]
    pub enable_outputs: bool,
    #[packed_field(bits = "1")]
    pub global_polarity: bool,
    #[packed_field(bits = "2")]
    pub use_clear: bool,
    #[packed_field(bits = "3")]
    pub strobe_start_select: bool,
    #[packed_field(bits = "8..=15")]
    pub start_strobe_time: u8,
    #[packed_field(bits = "16..=23")]
    pub matrix_row_enable_index_1: u8,
    #[packed_field(bits = "24..=31")]
    pub matrix_row_enable_index_0: u8,
    #[packed_field(bits = "32")]
    pub active_low_matrix_rows: bool,
    #[packed_field(bits = "33")]
    pub encode_enables: bool,
    #[packed_field(bits = "34")]
    pub tickle_stern_watchdog: bool,
    #[packed_field(bits = "35")]
    pub watchdog_expired: bool,
    #[packed_field(bits = "36")]
    pub watchdog_enable: bool,
    #[packed_field(bits = "40..=55", endian = "msb")]
    pub watchdog_reset_time: u16,
}

/// Per-group driver configuration.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "8")]
pub struct DriverGroupConfig {
    #[packed_field(bits = "0..=7")]
    pub group_num: u8,
    #[packed_field(bits = "8..=23", endian = "msb")]
    pub slow_time: u16,
    #[packed_field(bits = "24..=31")]
    pub enable_index: u8,
    #[packed_field(bits = "32..=39")]
    pub row_activate_index: u8,
    #[packed_field(bits = "40..=47")]
    pub row_enable_select: u8,
    #[packed_field(bits = "48")]
    pub matrixed: bool,
    #[packed_field(bits = "49")]
    pub polarity: bool,
    #[packed_field(bits = "50")]
    pub active: bool,
    #[packed_field(bits = "51")]
    pub disable_strobe_after: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use paste::paste;

    macro_rules! test_mode_replaces_prior {
        ($name:ident, $set:expr, $expected:pat) => {
            paste! {
                #[test]
                fn [<test_ $name _replaces_prior_mode>]() {
                    let mut state = DriverState::new(47);
                    // Start from a different mode so leftovers would show.
                    state.pulse(10);
                    state.patter(2, 18, 34);
                    let set: fn(&mut DriverState) = $set;
                    set(&mut state);
                    assert!(matches!(state.mode, $expected));
                }
            }
        };
    }

    test_mode_replaces_prior!(disable, |s| s.disable(), DriveMode::Disabled);
    test_mode_replaces_prior!(
        pulse,
        |s| s.pulse(34),
        DriveMode::Pulsed { milliseconds: 34 }
    );
    test_mode_replaces_prior!(
        schedule,
        |s| s.schedule(0x00FF_00FF, 2, true),
        DriveMode::Scheduled {
            timeslots: 0x00FF_00FF,
            cycle_seconds: 2,
            now: true,
        }
    );
    test_mode_replaces_prior!(
        patter,
        |s| s.patter(3, 7, 20),
        DriveMode::Patter {
            on_ms: 3,
            off_ms: 7,
            initial_on_ms: 20,
        }
    );

    #[test]
    fn test_pulse_then_schedule_clears_pulse_fields() {
        let mut state = DriverState::new(8);
        state.pulse(10);
        state.schedule(0xF0F0_F0F0, 1, false);
        assert_eq!(
            state.mode,
            DriveMode::Scheduled {
                timeslots: 0xF0F0_F0F0,
                cycle_seconds: 1,
                now: false,
            }
        );
        // The encoded form must carry no trace of the earlier pulse.
        let words = encode_state(&state);
        assert_eq!(decode_state(words), state);
    }

    #[test]
    fn test_state_word_roundtrip() {
        let mut state = DriverState::new(200);
        state.polarity = true;
        state.wait_for_first_timeslot = true;
        for mode in [
            DriveMode::Disabled,
            DriveMode::Pulsed { milliseconds: 0 },
            DriveMode::Pulsed { milliseconds: 255 },
            DriveMode::Scheduled {
                timeslots: 0xAAAA_5555,
                cycle_seconds: 4,
                now: true,
            },
            DriveMode::Patter {
                on_ms: 2,
                off_ms: 18,
                initial_on_ms: 34,
            },
        ] {
            state.mode = mode;
            assert_eq!(decode_state(encode_state(&state)), state);
        }
    }

    #[test]
    fn test_global_config_packs_to_two_words() {
        let config = DriverGlobalConfig {
            enable_outputs: true,
            watchdog_enable: true,
            watchdog_reset_time: 1000,
            ..DriverGlobalConfig::default()
        };
        let bytes = config.pack().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(DriverGlobalConfig::unpack(&bytes).unwrap(), config);
    }

    #[test]
    fn test_group_config_roundtrip() {
        let config = DriverGroupConfig {
            group_num: 4,
            slow_time: 400,
            enable_index: 3,
            row_activate_index: 6,
            row_enable_select: 1,
            matrixed: true,
            polarity: false,
            active: true,
            disable_strobe_after: false,
        };
        let bytes = config.pack().unwrap();
        assert_eq!(DriverGroupConfig::unpack(&bytes).unwrap(), config);
    }
}
