//! Dot-matrix display configuration and frame encoding.

/// Subframe timing channels carried by the display controller.
pub const DMD_SUBFRAME_CHANNELS: usize = 8;

// Register map inside `Module::Dmd`.
pub(crate) const ADDR_DMD_CONFIG: u16 = 0x0000;
pub(crate) const FRAME_BASE: u16 = 0x0100;

/// Display timing configuration, mirrored locally and pushed verbatim.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DmdConfig {
    pub num_rows: u8,
    pub num_columns: u16,
    pub num_sub_frames: u8,
    pub cycles_per_row: u16,
    pub enable: bool,
    pub rclk_low_cycles: [u8; DMD_SUBFRAME_CHANNELS],
    pub latch_high_cycles: [u8; DMD_SUBFRAME_CHANNELS],
    pub de_high_cycles: [u16; DMD_SUBFRAME_CHANNELS],
    pub dotclk_half_period: [u8; DMD_SUBFRAME_CHANNELS],
}

impl Default for DmdConfig {
    /// Timing for the common 128x32 four-subframe display.
    fn default() -> Self {
        Self {
            num_rows: 32,
            num_columns: 128,
            num_sub_frames: 4,
            cycles_per_row: 90,
            enable: true,
            rclk_low_cycles: [15; DMD_SUBFRAME_CHANNELS],
            latch_high_cycles: [15; DMD_SUBFRAME_CHANNELS],
            de_high_cycles: [90; DMD_SUBFRAME_CHANNELS],
            dotclk_half_period: [1; DMD_SUBFRAME_CHANNELS],
        }
    }
}

/// Packs the config block into its register words: a geometry word, an
/// enable word, then two words per subframe timing channel.
pub(crate) fn encode_config(config: &DmdConfig) -> Vec<u32> {
    let mut words = Vec::with_capacity(2 + 2 * DMD_SUBFRAME_CHANNELS);
    words.push(
        u32::from(config.num_rows)
            | u32::from(config.num_columns) << 8
            | u32::from(config.num_sub_frames) << 24,
    );
    words.push(u32::from(config.cycles_per_row) | u32::from(config.enable) << 16);
    for channel in 0..DMD_SUBFRAME_CHANNELS {
        words.push(
            u32::from(config.rclk_low_cycles[channel])
                | u32::from(config.latch_high_cycles[channel]) << 8
                | u32::from(config.de_high_cycles[channel]) << 16,
        );
        words.push(u32::from(config.dotclk_half_period[channel]));
    }
    words
}

/// Bits of frame data implied by a geometry, at one bit per pixel per
/// subframe.
pub(crate) fn frame_bits(columns: u16, rows: u8, sub_frames: u8) -> usize {
    usize::from(columns) * usize::from(rows) * usize::from(sub_frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_word_count() {
        let words = encode_config(&DmdConfig::default());
        assert_eq!(words.len(), 18);
    }

    #[test]
    fn test_geometry_word_fields() {
        let words = encode_config(&DmdConfig::default());
        assert_eq!(words[0] & 0xFF, 32);
        assert_eq!(words[0] >> 8 & 0xFFFF, 128);
        assert_eq!(words[0] >> 24, 4);
        assert_eq!(words[1] & 0xFFFF, 90);
        assert_ne!(words[1] & 1 << 16, 0);
    }

    #[test]
    fn test_frame_bits() {
        assert_eq!(frame_bits(128, 32, 4), 16384);
        assert_eq!(frame_bits(128, 32, 1), 4096);
    }
}
