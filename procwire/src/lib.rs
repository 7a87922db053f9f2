//! Word-level wire formats for the P-ROC register bus.
//!
//! The board speaks 32-bit words over a serial-over-USB link, big-endian on
//! the wire. Host-to-board traffic is a sequence of bursts: a header word
//! carrying a module select, a payload word count, and a start address,
//! followed by the payload (writes) or nothing (read commands). Board-to-host
//! traffic is a bare word stream: either the raw data answering a read
//! command, or unsolicited switch-event words. Nothing in this crate performs
//! I/O; it only packs and unpacks words.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;
use thiserror::Error;

/// Bytes per protocol word.
pub const WORD_BYTES: usize = 4;

/// Identification value held in the manager module's first register.
pub const CHIP_ID: u32 = 0xFEED_BEEF;

/// Largest payload a single burst header can describe.
pub const MAX_BURST_COUNT: usize = 0xFFF;

/// Switch number of the first physical switch.
pub const SWITCH_PHYSICAL_FIRST: u16 = 0;
/// Switch number of the last physical switch.
pub const SWITCH_PHYSICAL_LAST: u16 = 223;
/// Switch number of the first virtual (software-only) switch.
pub const SWITCH_VIRTUAL_FIRST: u16 = 224;
/// Switch number of the last virtual switch.
pub const SWITCH_VIRTUAL_LAST: u16 = 255;

const READ_FLAG: u32 = 1 << 31;
const MODULE_SHIFT: u32 = 28;
const MODULE_MASK: u32 = 0x7;
const COUNT_SHIFT: u32 = 16;
const COUNT_MASK: u32 = 0xFFF;
const ADDR_MASK: u32 = 0xFFFF;

const EVENT_SWITCH_MASK: u32 = 0x3FF;
const EVENT_OPEN_BIT: u32 = 1 << 10;
const EVENT_NONDEBOUNCED_BIT: u32 = 1 << 11;
const EVENT_TIME_SHIFT: u32 = 12;
const EVENT_TIME_MASK: u32 = 0xF_FFFF;

/// Errors raised while packing or unpacking protocol words.
#[derive(Error, Debug)]
pub enum Error {
    #[error("burst of {0} words exceeds the header count field")]
    BurstTooLong(usize),
    #[error("unknown module select {0}")]
    BadModule(u32),
}

/// Register-space module selects addressed by burst headers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Module {
    /// Chip identification, firmware version, watchdog reset.
    Manager = 0,
    /// Driver (coil/lamp) global, group, and per-driver state registers.
    DriverCtrl = 1,
    /// Switch matrix scan configuration and current switch levels.
    SwitchCtrl = 2,
    /// Switch-rule table and linked-driver storage.
    StateChangeProc = 3,
    /// Dot-matrix display configuration and frame buffer.
    Dmd = 4,
}

/// A decoded burst header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub read: bool,
    pub module: Module,
    pub count: usize,
    pub addr: u16,
}

fn header(read: bool, module: Module, addr: u16, count: usize) -> Result<u32, Error> {
    if count > MAX_BURST_COUNT {
        return Err(Error::BurstTooLong(count));
    }
    let mut word = (module as u32 & MODULE_MASK) << MODULE_SHIFT
        | (count as u32 & COUNT_MASK) << COUNT_SHIFT
        | u32::from(addr);
    if read {
        word |= READ_FLAG;
    }
    Ok(word)
}

/// Builds the header word for a write burst of `count` payload words starting
/// at `addr` in `module`.
/// # Errors
/// Returns [`Error::BurstTooLong`] if `count` does not fit the header field.
pub fn write_header(module: Module, addr: u16, count: usize) -> Result<u32, Error> {
    header(false, module, addr, count)
}

/// Builds a read command word asking the board to return `count` words
/// starting at `addr` in `module`.
/// # Errors
/// Returns [`Error::BurstTooLong`] if `count` does not fit the header field.
pub fn read_header(module: Module, addr: u16, count: usize) -> Result<u32, Error> {
    header(true, module, addr, count)
}

/// Splits a header word back into its fields.
/// # Errors
/// Returns [`Error::BadModule`] for a module select outside the known set.
pub fn parse_header(word: u32) -> Result<Header, Error> {
    let raw_module = word >> MODULE_SHIFT & MODULE_MASK;
    let module = Module::from_u32(raw_module).ok_or(Error::BadModule(raw_module))?;
    Ok(Header {
        read: word & READ_FLAG != 0,
        module,
        count: (word >> COUNT_SHIFT & COUNT_MASK) as usize,
        addr: (word & ADDR_MASK) as u16,
    })
}

// Events
// Closed == 0, Open == 1 in the event word's level bit.

/// Switch transition kinds. The ordinals are part of the wire contract and
/// index the per-switch rule table; they must never be renumbered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum EventType {
    /// The switch went from open to closed and the signal has been debounced.
    SwitchClosedDebounced = 1,
    /// The switch went from closed to open and the signal has been debounced.
    SwitchOpenDebounced = 2,
    /// Open to closed, reported before the debounce filter settles.
    SwitchClosedNondebounced = 3,
    /// Closed to open, reported before the debounce filter settles.
    SwitchOpenNondebounced = 4,
}

impl EventType {
    #[must_use]
    pub fn is_debounced(self) -> bool {
        matches!(
            self,
            EventType::SwitchClosedDebounced | EventType::SwitchOpenDebounced
        )
    }

    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            EventType::SwitchClosedDebounced | EventType::SwitchClosedNondebounced
        )
    }
}

/// An asynchronous switch transition reported by the board.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: EventType,
    /// The switch number that changed.
    pub switch_num: u16,
    /// Millisecond timestamp from the board's free-running counter. Wraps at
    /// 20 bits.
    pub time: u32,
}

/// Packs an event into its unsolicited-word form.
#[must_use]
pub fn encode_event(event: &Event) -> u32 {
    let mut word = u32::from(event.switch_num) & EVENT_SWITCH_MASK;
    if !event.event_type.is_closed() {
        word |= EVENT_OPEN_BIT;
    }
    if !event.event_type.is_debounced() {
        word |= EVENT_NONDEBOUNCED_BIT;
    }
    word | (event.time & EVENT_TIME_MASK) << EVENT_TIME_SHIFT
}

/// Unpacks an unsolicited word into an [`Event`]. Every bit pattern decodes
/// to one of the four event kinds, so this cannot fail.
#[must_use]
pub fn decode_event(word: u32) -> Event {
    let open = word & EVENT_OPEN_BIT != 0;
    let nondebounced = word & EVENT_NONDEBOUNCED_BIT != 0;
    let ordinal = 1 + u32::from(open) + 2 * u32::from(nondebounced);
    Event {
        event_type: EventType::from_u32(ordinal).expect("ordinal is always 1..=4"),
        switch_num: (word & EVENT_SWITCH_MASK) as u16,
        time: word >> EVENT_TIME_SHIFT & EVENT_TIME_MASK,
    }
}

/// Serializes words into their on-the-wire byte order.
#[must_use]
pub fn bytes_from_words(words: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * WORD_BYTES);
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Packs raw bytes into words, zero-padding a trailing partial word.
#[must_use]
pub fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(WORD_BYTES)
        .map(|chunk| {
            let mut padded = [0u8; WORD_BYTES];
            padded[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(padded)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_header_fields() {
        let word = write_header(Module::DriverCtrl, 0x0142, 2).unwrap();
        let header = parse_header(word).unwrap();
        assert!(!header.read);
        assert_eq!(header.module, Module::DriverCtrl);
        assert_eq!(header.count, 2);
        assert_eq!(header.addr, 0x0142);
    }

    #[test]
    fn test_read_header_sets_flag() {
        let word = read_header(Module::Manager, 0, 2).unwrap();
        assert!(parse_header(word).unwrap().read);
        assert_eq!(word & (1 << 31), 1 << 31);
    }

    #[test]
    fn test_header_count_limit() {
        assert!(write_header(Module::Dmd, 0, MAX_BURST_COUNT).is_ok());
        assert!(matches!(
            write_header(Module::Dmd, 0, MAX_BURST_COUNT + 1),
            Err(Error::BurstTooLong(_))
        ));
    }

    #[test]
    fn test_parse_header_bad_module() {
        // Module select 7 is unassigned.
        let word = 7 << MODULE_SHIFT;
        assert!(matches!(parse_header(word), Err(Error::BadModule(7))));
    }

    #[test]
    fn test_event_ordinals() {
        assert_eq!(EventType::SwitchClosedDebounced as u32, 1);
        assert_eq!(EventType::SwitchOpenDebounced as u32, 2);
        assert_eq!(EventType::SwitchClosedNondebounced as u32, 3);
        assert_eq!(EventType::SwitchOpenNondebounced as u32, 4);
    }

    #[test]
    fn test_event_roundtrip() {
        for event_type in [
            EventType::SwitchClosedDebounced,
            EventType::SwitchOpenDebounced,
            EventType::SwitchClosedNondebounced,
            EventType::SwitchOpenNondebounced,
        ] {
            let event = Event {
                event_type,
                switch_num: 137,
                time: 0x4_B1D0,
            };
            assert_eq!(decode_event(encode_event(&event)), event);
        }
    }

    #[test]
    fn test_event_time_wraps() {
        let event = Event {
            event_type: EventType::SwitchClosedDebounced,
            switch_num: 3,
            time: 0x12F_FFFF,
        };
        // Only the low 20 bits of the timestamp survive the wire.
        assert_eq!(decode_event(encode_event(&event)).time, 0xF_FFFF);
    }

    #[test]
    fn test_bytes_from_words_is_big_endian() {
        assert_eq!(
            bytes_from_words(&[0xDEAD_BEEF, 0x0000_0001]),
            vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_words_from_bytes_pads_tail() {
        assert_eq!(
            words_from_bytes(&[0xDE, 0xAD, 0xBE, 0xEF, 0xAB]),
            vec![0xDEAD_BEEF, 0xAB00_0000]
        );
    }
}
