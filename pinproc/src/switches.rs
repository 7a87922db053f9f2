//! Switch rules, the linked-driver pool, and switch scan configuration.

use crate::drivers::DriverState;
use crate::error::{Error, Result};
use crate::machine::MachineType;
use num_traits::FromPrimitive as _;
use packed_struct::prelude::*;
use procwire::EventType;
use std::collections::VecDeque;

/// One rule slot per (switch number, event type) pair: 256 switch numbers
/// with debounced/nondebounced open and closed transitions each.
pub const MAX_SWITCH_RULES: usize = 256 << 2;

/// Longest linked-driver chain a single rule may carry.
pub const MAX_LINKED_DRIVERS: usize = 8;

// Register map inside `Module::SwitchCtrl`.
pub(crate) const ADDR_SWITCH_CONFIG: u16 = 0x0000;
pub(crate) const ADDR_SWITCH_STATES: u16 = 0x0020;
/// Current debounced switch levels, one bit per physical switch.
pub(crate) const SWITCH_STATE_WORDS: usize = 7;

// Register map inside `Module::StateChangeProc`: the rule table occupies the
// low addresses, linked-driver storage sits above it in fixed-stride slots.
pub(crate) const RULE_BASE: u16 = 0x0000;
pub(crate) const POOL_BASE: u16 = 0x0400;
pub(crate) const POOL_SLOT_STRIDE: u16 = 32;

const RULE_NOTIFY_BIT: u32 = 1 << 0;
const RULE_RELOAD_BIT: u32 = 1 << 1;
const RULE_LINK_BIT: u32 = 1 << 2;
const RULE_SLOT_SHIFT: u32 = 3;
const RULE_CHAIN_LEN_SHIFT: u32 = 13;

/// How one switch transition should be handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SwitchRule {
    /// Report this transition to the host through the event queue.
    pub notify_host: bool,
    /// Rearm the linked drivers every time the rule fires.
    pub reload_active: bool,
}

/// Dense table index for a (switch, event type) pair. Event ordinal 1 maps
/// to the first of the four slots a switch owns.
pub(crate) fn rule_index(switch_num: u16, event_type: EventType) -> usize {
    usize::from(switch_num) * 4 + (event_type as usize - 1)
}

/// Recovers the (switch, event type) pair a table index encodes.
pub(crate) fn rule_index_parts(index: usize) -> (u16, EventType) {
    let event_type = EventType::from_usize(index % 4 + 1).expect("ordinal is always 1..=4");
    ((index / 4) as u16, event_type)
}

/// One mirrored table entry: the rule flags plus the linked-driver chain and
/// the pool slot backing it, if any.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleEntry {
    pub rule: SwitchRule,
    pub slot: Option<u16>,
    pub linked: Vec<DriverState>,
}

/// The dense, pre-allocated rule table. Entries are never absent, only reset
/// to the default (no notify, no linkage).
#[derive(Debug)]
pub(crate) struct RuleTable {
    entries: Vec<RuleEntry>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self {
            entries: vec![RuleEntry::default(); MAX_SWITCH_RULES],
        }
    }

    pub fn entry(&self, index: usize) -> &RuleEntry {
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut RuleEntry {
        &mut self.entries[index]
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            *entry = RuleEntry::default();
        }
    }
}

/// Bounded free-list allocator for the out-of-line linked-driver storage.
/// A rule holds at most one live slot; replacing its linkage releases the
/// prior slot before a new one is acquired.
#[derive(Debug)]
pub(crate) struct LinkedDriverPool {
    free: VecDeque<u16>,
    capacity: usize,
}

impl LinkedDriverPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: (0..capacity as u16).collect(),
            capacity,
        }
    }

    pub fn acquire(&mut self) -> Result<u16> {
        self.free.pop_front().ok_or(Error::PoolExhausted)
    }

    pub fn release(&mut self, slot: u16) {
        debug_assert!(!self.free.contains(&slot), "double release of pool slot");
        self.free.push_back(slot);
    }

    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Packs rule flags and linkage metadata into the table's register word.
pub(crate) fn encode_rule_word(rule: &SwitchRule, slot: Option<u16>, chain_len: usize) -> u32 {
    let mut word = 0;
    if rule.notify_host {
        word |= RULE_NOTIFY_BIT;
    }
    if rule.reload_active {
        word |= RULE_RELOAD_BIT;
    }
    if let Some(slot) = slot {
        word |= RULE_LINK_BIT
            | u32::from(slot) << RULE_SLOT_SHIFT
            | (chain_len as u32) << RULE_CHAIN_LEN_SHIFT;
    }
    word
}

/// Register address of a pool slot's chain storage.
pub(crate) fn pool_slot_addr(slot: u16) -> u16 {
    POOL_BASE + slot * POOL_SLOT_STRIDE
}

/// Switch-matrix scan timing, written once at startup.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "8")]
pub struct SwitchConfig {
    #[packed_field(bits = "0")]
    pub clear: bool,
    #[packed_field(bits = "1")]
    pub use_column_8: bool,
    #[packed_field(bits = "2")]
    pub use_column_9: bool,
    #[packed_field(bits = "3")]
    pub host_events_enable: bool,
    /// Direct matrix scan loop time in milliseconds.
    #[packed_field(bits = "8..=15")]
    pub direct_matrix_scan_loop_time: u8,
    #[packed_field(bits = "16..=23")]
    pub pulses_before_checking_rx: u8,
    #[packed_field(bits = "24..=31")]
    pub inactive_pulses_after_burst: u8,
    #[packed_field(bits = "32..=39")]
    pub pulses_per_burst: u8,
    /// Burst pulse half period in milliseconds.
    #[packed_field(bits = "40..=47")]
    pub pulse_half_period_time: u8,
}

impl SwitchConfig {
    /// Scan timing conventions for a machine kind. WPC cabinets scan the
    /// ninth switch column; nothing shipping uses the tenth.
    #[must_use]
    pub fn for_machine(machine: MachineType) -> Self {
        Self {
            clear: false,
            use_column_8: machine == MachineType::Wpc,
            use_column_9: false,
            host_events_enable: true,
            direct_matrix_scan_loop_time: 2,
            pulses_before_checking_rx: 10,
            inactive_pulses_after_burst: 12,
            pulses_per_burst: 6,
            pulse_half_period_time: 13,
        }
    }
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self::for_machine(MachineType::Custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_index_bijection() {
        let mut seen = vec![false; MAX_SWITCH_RULES];
        for switch_num in 0..=procwire::SWITCH_VIRTUAL_LAST {
            for event_type in [
                EventType::SwitchClosedDebounced,
                EventType::SwitchOpenDebounced,
                EventType::SwitchClosedNondebounced,
                EventType::SwitchOpenNondebounced,
            ] {
                let index = rule_index(switch_num, event_type);
                assert!(index < MAX_SWITCH_RULES);
                assert!(!seen[index], "index {index} mapped twice");
                seen[index] = true;
                assert_eq!(rule_index_parts(index), (switch_num, event_type));
            }
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn test_pool_acquire_release_accounting() {
        let mut pool = LinkedDriverPool::new(4);
        assert_eq!(pool.free_slots(), 4);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.free_slots(), 2);
        pool.release(a);
        assert_eq!(pool.free_slots(), 3);
        let c = pool.acquire().unwrap();
        let d = pool.acquire().unwrap();
        let e = pool.acquire().unwrap();
        assert_eq!(pool.free_slots(), 0);
        assert!(matches!(pool.acquire(), Err(Error::PoolExhausted)));
        // All four live slots are distinct.
        let mut live = [b, c, d, e];
        live.sort_unstable();
        live.windows(2).for_each(|w| assert_ne!(w[0], w[1]));
    }

    #[test]
    fn test_rule_word_linkage_fields() {
        let rule = SwitchRule {
            notify_host: true,
            reload_active: false,
        };
        let unlinked = encode_rule_word(&rule, None, 0);
        assert_eq!(unlinked, RULE_NOTIFY_BIT);
        let linked = encode_rule_word(&rule, Some(5), 2);
        assert_ne!(linked & RULE_LINK_BIT, 0);
        assert_eq!(linked >> RULE_SLOT_SHIFT & 0x3FF, 5);
        assert_eq!(linked >> RULE_CHAIN_LEN_SHIFT & 0xF, 2);
    }

    #[test]
    fn test_config_for_wpc_scans_column_8() {
        assert!(SwitchConfig::for_machine(MachineType::Wpc).use_column_8);
        assert!(!SwitchConfig::for_machine(MachineType::SternSam).use_column_8);
    }

    #[test]
    fn test_switch_config_roundtrip() {
        let config = SwitchConfig::for_machine(MachineType::Wpc);
        let bytes = config.pack().unwrap();
        assert_eq!(SwitchConfig::unpack(&bytes).unwrap(), config);
    }
}
