//! The device session: owns the transport and all protocol state, and
//! exposes the public operation set.
//!
//! Every mutating operation encodes its register writes, stages them, and
//! flushes before returning, so a successful call means the board has seen
//! the change and the local mirror matches it. The session is single
//! threaded; `request_read` is the only point that blocks, polling the link
//! under a bounded retry budget.

use crate::batch::WriteBatcher;
use crate::demux::{ReadDemux, DEFAULT_READ_RETRIES};
use crate::dmd::{self, DmdConfig};
use crate::drivers::{
    self, DriverGlobalConfig, DriverGroupConfig, DriverState, MAX_DRIVERS, MAX_DRIVER_GROUPS,
};
use crate::error::{Error, Result};
use crate::machine::MachineType;
use crate::switches::{
    self, LinkedDriverPool, RuleTable, SwitchConfig, SwitchRule, MAX_LINKED_DRIVERS,
    MAX_SWITCH_RULES,
};
use crate::transport::Transport;
use packed_struct::PackedStruct;
use procwire::{Event, EventType, Module};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

// Register map inside `Module::Manager`. The firmware version register sits
// directly after the chip ID, so the handshake covers both in one read.
const ADDR_CHIP_ID: u16 = 0x0000;
const ADDR_WATCHDOG: u16 = 0x0002;

const POLL_SLEEP: Duration = Duration::from_millis(1);

/// Last transition seen for one physical switch, per session.
#[derive(Debug, Copy, Clone, Default)]
pub struct SwitchStatus {
    pub last_event: Option<EventType>,
    pub last_event_time: u32,
}

/// A session with one physical board.
pub struct Device<T: Transport> {
    transport: T,
    machine: MachineType,
    batcher: WriteBatcher,
    demux: ReadDemux,
    read_retries: usize,
    rules: RuleTable,
    pool: LinkedDriverPool,
    driver_global: DriverGlobalConfig,
    driver_groups: Vec<DriverGroupConfig>,
    drivers: Vec<DriverState>,
    dmd_config: DmdConfig,
    switch_config: SwitchConfig,
    switch_states: Vec<SwitchStatus>,
}

impl<T: Transport> Device<T> {
    /// Opens a session: verifies the chip ID and resets all state to
    /// defaults, locally and on the board. The transport is expected to be
    /// free of stale data; [`Serial::connect`](crate::transport::serial::Serial::connect)
    /// drains leftovers from a previous session before handing the port over.
    /// # Errors
    /// Fails with [`Error::BadChipId`] when the identification register does
    /// not match, or with any transport/timeout error from the handshake.
    pub fn new(transport: T, machine: MachineType) -> Result<Self> {
        let mut device = Self {
            transport,
            machine,
            batcher: WriteBatcher::new(),
            demux: ReadDemux::new(),
            read_retries: DEFAULT_READ_RETRIES,
            rules: RuleTable::new(),
            pool: LinkedDriverPool::new(MAX_SWITCH_RULES),
            driver_global: DriverGlobalConfig::default(),
            driver_groups: (0..MAX_DRIVER_GROUPS)
                .map(|group| DriverGroupConfig {
                    group_num: group as u8,
                    ..DriverGroupConfig::default()
                })
                .collect(),
            drivers: (0..MAX_DRIVERS)
                .map(|num| DriverState::new(num as u8))
                .collect(),
            dmd_config: DmdConfig::default(),
            switch_config: SwitchConfig::for_machine(machine),
            switch_states: vec![
                SwitchStatus::default();
                usize::from(procwire::SWITCH_PHYSICAL_LAST) + 1
            ],
        };
        device.verify_chip_id()?;
        device.reset()?;
        info!(?machine, "device session open");
        Ok(device)
    }

    #[must_use]
    pub fn machine(&self) -> MachineType {
        self.machine
    }

    /// Adjusts the bounded retry budget used while waiting for reply data.
    pub fn set_read_retries(&mut self, retries: usize) {
        self.read_retries = retries;
    }

    fn verify_chip_id(&mut self) -> Result<()> {
        let words = self.request_read(Module::Manager, ADDR_CHIP_ID, 2)?;
        if words[0] != procwire::CHIP_ID {
            return Err(Error::BadChipId(words[0]));
        }
        info!(version = words[1], "board verified");
        Ok(())
    }

    /// Restores every local mirror to its default and pushes the default
    /// switch configuration and rules to the board.
    pub fn reset(&mut self) -> Result<()> {
        self.driver_global = DriverGlobalConfig::default();
        for (group, config) in self.driver_groups.iter_mut().enumerate() {
            *config = DriverGroupConfig {
                group_num: group as u8,
                ..DriverGroupConfig::default()
            };
        }
        for (num, state) in self.drivers.iter_mut().enumerate() {
            *state = DriverState::new(num as u8);
        }
        self.dmd_config = DmdConfig::default();
        self.rules.reset();
        self.pool = LinkedDriverPool::new(MAX_SWITCH_RULES);
        let config = SwitchConfig::for_machine(self.machine);
        self.switch_update_config(&config)?;
        self.switch_configure_defaults()
    }

    // Write plumbing: one burst = header word plus payload, staged atomically.

    fn stage_burst(&mut self, module: Module, addr: u16, payload: &[u32]) -> Result<()> {
        let mut words = Vec::with_capacity(1 + payload.len());
        words.push(procwire::write_header(module, addr, payload.len())?);
        words.extend_from_slice(payload);
        self.batcher.stage(&words)
    }

    fn flush(&mut self) -> Result<()> {
        self.batcher.flush(&mut self.transport)
    }

    fn write_burst(&mut self, module: Module, addr: u16, payload: &[u32]) -> Result<()> {
        self.stage_burst(module, addr, payload)?;
        self.flush()
    }

    /// Issues a read command and blocks until `count` reply words arrive or
    /// the retry budget runs out. The only blocking synchronous operation;
    /// every "get state" call is built on it.
    /// # Errors
    /// Fails with [`Error::ReadTimeout`] when the budget is exhausted; the
    /// outstanding-request marker is cleared either way.
    pub fn request_read(&mut self, module: Module, addr: u16, count: usize) -> Result<Vec<u32>> {
        // A zero-word read owes nothing; marking it outstanding would make
        // the next inbound event word look like reply data.
        if count == 0 {
            return Ok(Vec::new());
        }
        let command = procwire::read_header(module, addr, count)?;
        self.batcher.stage(&[command])?;
        self.flush()?;
        self.demux.begin_request(count);
        let mut attempts = 0;
        loop {
            if let Err(e) = self.demux.collect(&mut self.transport) {
                self.demux.abort_request();
                return Err(e);
            }
            self.demux.sort();
            if self.demux.requested_len() >= count {
                debug!(?module, addr, count, "read request satisfied");
                return Ok(self.demux.take_requested(count));
            }
            attempts += 1;
            if attempts > self.read_retries {
                self.demux.abort_request();
                warn!(?module, addr, count, "read request timed out");
                return Err(Error::ReadTimeout);
            }
            thread::sleep(POLL_SLEEP);
        }
    }

    // Events

    /// Drains the link and returns up to `max_events` decoded switch events
    /// in arrival order, updating the per-switch last-state mirror. Never
    /// blocks beyond one bounded transport read.
    pub fn get_events(&mut self, max_events: usize) -> Result<Vec<Event>> {
        self.demux.collect(&mut self.transport)?;
        self.demux.sort();
        let mut events = Vec::new();
        while events.len() < max_events {
            let Some(word) = self.demux.pop_unrequested() else {
                break;
            };
            let event = procwire::decode_event(word);
            if let Some(status) = self.switch_states.get_mut(usize::from(event.switch_num)) {
                status.last_event = Some(event.event_type);
                status.last_event_time = event.time;
            }
            events.push(event);
        }
        Ok(events)
    }

    /// The last transition this session observed for a physical switch.
    #[must_use]
    pub fn switch_status(&self, switch_num: u16) -> Option<SwitchStatus> {
        self.switch_states.get(usize::from(switch_num)).copied()
    }

    // Drivers

    pub fn driver_update_global_config(&mut self, config: &DriverGlobalConfig) -> Result<()> {
        let words = procwire::words_from_bytes(&config.pack()?);
        self.write_burst(Module::DriverCtrl, drivers::ADDR_GLOBAL_CONFIG, &words)?;
        self.driver_global = *config;
        Ok(())
    }

    #[must_use]
    pub fn driver_global_config(&self) -> &DriverGlobalConfig {
        &self.driver_global
    }

    /// Reads a group's configuration back from the board.
    pub fn driver_get_group_config(&mut self, group_num: u8) -> Result<DriverGroupConfig> {
        if usize::from(group_num) >= MAX_DRIVER_GROUPS {
            return Err(Error::InvalidArgument("driver group out of range"));
        }
        let addr = drivers::GROUP_CONFIG_BASE + u16::from(group_num) * drivers::WORDS_PER_GROUP;
        let words = self.request_read(Module::DriverCtrl, addr, 2)?;
        let bytes: [u8; 8] = procwire::bytes_from_words(&words)
            .try_into()
            .expect("two words always yield eight bytes");
        Ok(DriverGroupConfig::unpack(&bytes)?)
    }

    pub fn driver_update_group_config(&mut self, config: &DriverGroupConfig) -> Result<()> {
        if usize::from(config.group_num) >= MAX_DRIVER_GROUPS {
            return Err(Error::InvalidArgument("driver group out of range"));
        }
        let addr =
            drivers::GROUP_CONFIG_BASE + u16::from(config.group_num) * drivers::WORDS_PER_GROUP;
        let words = procwire::words_from_bytes(&config.pack()?);
        self.write_burst(Module::DriverCtrl, addr, &words)?;
        self.driver_groups[usize::from(config.group_num)] = *config;
        Ok(())
    }

    /// Reads a driver's live state back from the board.
    pub fn driver_get_state(&mut self, driver_num: u8) -> Result<DriverState> {
        let addr = drivers::DRIVER_STATE_BASE + u16::from(driver_num) * drivers::WORDS_PER_DRIVER;
        let words = self.request_read(Module::DriverCtrl, addr, 2)?;
        Ok(drivers::decode_state([words[0], words[1]]))
    }

    /// The mirrored state last applied to a driver.
    #[must_use]
    pub fn driver_state(&self, driver_num: u8) -> DriverState {
        self.drivers[usize::from(driver_num)]
    }

    /// Applies a driver state: identical inputs produce identical bursts and
    /// leave the mirror unchanged on repeat.
    pub fn driver_update_state(&mut self, state: &DriverState) -> Result<()> {
        let addr =
            drivers::DRIVER_STATE_BASE + u16::from(state.driver_num) * drivers::WORDS_PER_DRIVER;
        let words = drivers::encode_state(state);
        self.write_burst(Module::DriverCtrl, addr, &words)?;
        self.drivers[usize::from(state.driver_num)] = *state;
        Ok(())
    }

    /// Disables (turns off) the given driver.
    pub fn driver_disable(&mut self, driver_num: u8) -> Result<()> {
        let mut state = self.driver_state(driver_num);
        state.disable();
        self.driver_update_state(&state)
    }

    /// Pulses the given driver for `milliseconds` (zero holds it on).
    pub fn driver_pulse(&mut self, driver_num: u8, milliseconds: u8) -> Result<()> {
        let mut state = self.driver_state(driver_num);
        state.pulse(milliseconds);
        self.driver_update_state(&state)
    }

    /// Assigns a repeating schedule to the given driver.
    pub fn driver_schedule(
        &mut self,
        driver_num: u8,
        timeslots: u32,
        cycle_seconds: u8,
        now: bool,
    ) -> Result<()> {
        let mut state = self.driver_state(driver_num);
        state.schedule(timeslots, cycle_seconds, now);
        self.driver_update_state(&state)
    }

    /// Assigns a pitter-patter schedule to the given driver.
    pub fn driver_patter(
        &mut self,
        driver_num: u8,
        on_ms: u8,
        off_ms: u8,
        initial_on_ms: u8,
    ) -> Result<()> {
        let mut state = self.driver_state(driver_num);
        state.patter(on_ms, off_ms, initial_on_ms);
        self.driver_update_state(&state)
    }

    /// Resets the hardware watchdog timer. Callers must invoke this on a
    /// period shorter than the configured timeout; no timer runs here.
    pub fn driver_watchdog_tickle(&mut self) -> Result<()> {
        self.write_burst(Module::Manager, ADDR_WATCHDOG, &[1])
    }

    // Switches

    pub fn switch_update_config(&mut self, config: &SwitchConfig) -> Result<()> {
        let words = procwire::words_from_bytes(&config.pack()?);
        self.write_burst(Module::SwitchCtrl, switches::ADDR_SWITCH_CONFIG, &words)?;
        self.switch_config = *config;
        Ok(())
    }

    #[must_use]
    pub fn switch_config(&self) -> &SwitchConfig {
        &self.switch_config
    }

    /// Installs the rule for one (switch, event type) pair, replacing any
    /// prior linkage. The mirror is updated only after a successful flush;
    /// if the write fails the entry reverts to the default (no flags, no
    /// linkage) and its pool slot is returned.
    /// # Errors
    /// Fails with [`Error::InvalidArgument`] before any hardware access for
    /// an out-of-range switch or an over-long chain, and with
    /// [`Error::PoolExhausted`] when no linked-driver slots remain.
    pub fn switch_update_rule(
        &mut self,
        switch_num: u16,
        event_type: EventType,
        rule: &SwitchRule,
        linked_drivers: &[DriverState],
    ) -> Result<()> {
        if switch_num > procwire::SWITCH_VIRTUAL_LAST {
            return Err(Error::InvalidArgument("switch number out of range"));
        }
        if linked_drivers.len() > MAX_LINKED_DRIVERS {
            return Err(Error::InvalidArgument("linked-driver chain too long"));
        }
        let index = switches::rule_index(switch_num, event_type);

        // Replacing linkage: give back the old slot before taking a new one,
        // so a full pool never blocks replacing an already-linked rule.
        let entry = self.rules.entry_mut(index);
        if let Some(slot) = entry.slot.take() {
            self.pool.release(slot);
        }
        entry.linked.clear();
        let slot = if linked_drivers.is_empty() {
            None
        } else {
            Some(self.pool.acquire()?)
        };

        let outcome = self.stage_rule(index, rule, slot, linked_drivers);
        if let Err(e) = outcome {
            // Keep the pool accounting matched to the mirror, drop any
            // half-staged words so the next flush cannot ship them, and
            // leave the whole entry at the default rather than a mix of old
            // flags and no linkage.
            self.batcher.clear();
            if let Some(slot) = slot {
                self.pool.release(slot);
            }
            self.rules.entry_mut(index).rule = SwitchRule::default();
            return Err(e);
        }

        let entry = self.rules.entry_mut(index);
        entry.rule = *rule;
        entry.slot = slot;
        entry.linked = linked_drivers.to_vec();
        Ok(())
    }

    fn stage_rule(
        &mut self,
        index: usize,
        rule: &SwitchRule,
        slot: Option<u16>,
        linked_drivers: &[DriverState],
    ) -> Result<()> {
        if let Some(slot) = slot {
            let mut chain = Vec::with_capacity(linked_drivers.len() * 2);
            for state in linked_drivers {
                chain.extend_from_slice(&drivers::encode_state(state));
            }
            self.stage_burst(
                Module::StateChangeProc,
                switches::pool_slot_addr(slot),
                &chain,
            )?;
        }
        let word = switches::encode_rule_word(rule, slot, linked_drivers.len());
        self.stage_burst(
            Module::StateChangeProc,
            switches::RULE_BASE + index as u16,
            &[word],
        )?;
        self.flush()
    }

    /// The mirrored rule and linked-driver chain for one (switch, event
    /// type) pair.
    #[must_use]
    pub fn switch_rule(&self, switch_num: u16, event_type: EventType) -> (SwitchRule, &[DriverState]) {
        let entry = self.rules.entry(switches::rule_index(switch_num, event_type));
        (entry.rule, &entry.linked)
    }

    /// Free linked-driver slots remaining in the pool.
    #[must_use]
    pub fn free_link_slots(&self) -> usize {
        self.pool.free_slots()
    }

    /// Clears the last-known state of every physical switch and installs the
    /// default debounced rules (notify host, no linkage) for both
    /// transitions. Nondebounced rules are deliberately left untouched.
    /// The whole batch goes out as a single flush.
    pub fn switch_configure_defaults(&mut self) -> Result<()> {
        let default_rule = SwitchRule {
            notify_host: true,
            reload_active: false,
        };
        let word = switches::encode_rule_word(&default_rule, None, 0);
        for switch_num in procwire::SWITCH_PHYSICAL_FIRST..=procwire::SWITCH_PHYSICAL_LAST {
            for event_type in [
                EventType::SwitchClosedDebounced,
                EventType::SwitchOpenDebounced,
            ] {
                let index = switches::rule_index(switch_num, event_type);
                self.stage_burst(
                    Module::StateChangeProc,
                    switches::RULE_BASE + index as u16,
                    &[word],
                )?;
            }
        }
        self.flush()?;
        for switch_num in procwire::SWITCH_PHYSICAL_FIRST..=procwire::SWITCH_PHYSICAL_LAST {
            self.switch_states[usize::from(switch_num)] = SwitchStatus::default();
            for event_type in [
                EventType::SwitchClosedDebounced,
                EventType::SwitchOpenDebounced,
            ] {
                let index = switches::rule_index(switch_num, event_type);
                if let Some(slot) = self.rules.entry_mut(index).slot.take() {
                    self.pool.release(slot);
                }
                let entry = self.rules.entry_mut(index);
                entry.rule = default_rule;
                entry.linked.clear();
            }
        }
        Ok(())
    }

    /// Reads the current debounced level of every physical switch.
    pub fn switch_get_states(&mut self) -> Result<Vec<EventType>> {
        let words = self.request_read(
            Module::SwitchCtrl,
            switches::ADDR_SWITCH_STATES,
            switches::SWITCH_STATE_WORDS,
        )?;
        let count = usize::from(procwire::SWITCH_PHYSICAL_LAST) + 1;
        let mut states = Vec::with_capacity(count);
        for switch_num in 0..count {
            let closed = words[switch_num / 32] >> (switch_num % 32) & 1 != 0;
            states.push(if closed {
                EventType::SwitchClosedDebounced
            } else {
                EventType::SwitchOpenDebounced
            });
        }
        Ok(states)
    }

    // DMD

    pub fn dmd_update_global_config(&mut self, config: &DmdConfig) -> Result<()> {
        let words = dmd::encode_config(config);
        self.write_burst(Module::Dmd, dmd::ADDR_DMD_CONFIG, &words)?;
        self.dmd_config = *config;
        Ok(())
    }

    #[must_use]
    pub fn dmd_config(&self) -> &DmdConfig {
        &self.dmd_config
    }

    /// Pushes one whole display frame. The frame always travels as a single
    /// burst; the hardware double-buffers complete frames only.
    /// # Errors
    /// Fails with [`Error::InvalidArgument`] before any transport write when
    /// `dots` does not match the stated geometry at one bit per pixel per
    /// subframe.
    pub fn dmd_draw(&mut self, dots: &[u8], columns: u16, rows: u8, sub_frames: u8) -> Result<()> {
        if dots.len() * 8 != dmd::frame_bits(columns, rows, sub_frames) {
            return Err(Error::InvalidArgument(
                "dot buffer does not match frame geometry",
            ));
        }
        let words = procwire::words_from_bytes(dots);
        self.write_burst(Module::Dmd, dmd::FRAME_BASE, &words)
    }
}
