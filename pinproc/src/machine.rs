//! Machine-kind conventions and canned switch-rule wiring.
//!
//! These helpers are call-pattern specializations over the generic
//! `switch_update_rule` primitive: they read the mirrored driver states,
//! transform them with the mode setters, and install the linked rules a
//! flipper or bumper needs to react without a host round trip.

use crate::device::Device;
use crate::error::Result;
use crate::switches::SwitchRule;
use crate::transport::Transport;
use procwire::EventType;

/// Selects switch-column and flipper-wiring conventions used by the wiring
/// helpers; the core protocol itself is machine-agnostic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MachineType {
    #[default]
    Custom,
    Wpc,
    SternWhitestar,
    SternSam,
}

impl MachineType {
    #[must_use]
    pub fn is_stern(self) -> bool {
        matches!(self, MachineType::SternWhitestar | MachineType::SternSam)
    }
}

/// Main-coil pulse time for flipper rules, in milliseconds.
pub const FLIPPER_PULSE_MS: u8 = 34;
/// Patter on time for Stern single-wound flipper coils.
pub const FLIPPER_PATTER_ON_MS: u8 = 2;
/// Patter off time for Stern single-wound flipper coils.
pub const FLIPPER_PATTER_OFF_MS: u8 = 18;
/// Coil pulse time for pop bumpers and slingshots.
pub const BUMPER_PULSE_MS: u8 = 25;

const NOTIFY: SwitchRule = SwitchRule {
    notify_host: true,
    reload_active: false,
};
const SILENT: SwitchRule = SwitchRule {
    notify_host: false,
    reload_active: false,
};

/// Wires a flipper button: hardware-linked coil drive on the nondebounced
/// transitions, host notification on the debounced ones. WPC machines drive
/// a main and a hold winding; Stern machines patter a single winding and
/// ignore `hold_coil`.
pub fn configure_flipper_rule<T: Transport>(
    device: &mut Device<T>,
    switch_num: u16,
    main_coil: u8,
    hold_coil: u8,
    pulse_ms: u8,
) -> Result<()> {
    if device.machine().is_stern() {
        configure_stern_flipper(device, switch_num, main_coil, pulse_ms)
    } else {
        configure_wpc_flipper(device, switch_num, main_coil, hold_coil, pulse_ms)
    }
}

fn configure_wpc_flipper<T: Transport>(
    device: &mut Device<T>,
    switch_num: u16,
    main_coil: u8,
    hold_coil: u8,
    pulse_ms: u8,
) -> Result<()> {
    // Button pressed: pulse the main winding, hold the hold winding on.
    let mut on_drivers = [
        device.driver_state(main_coil),
        device.driver_state(hold_coil),
    ];
    on_drivers[0].pulse(pulse_ms);
    on_drivers[1].pulse(0);
    device.switch_update_rule(
        switch_num,
        EventType::SwitchClosedNondebounced,
        &SILENT,
        &on_drivers,
    )?;
    device.switch_update_rule(switch_num, EventType::SwitchClosedDebounced, &NOTIFY, &[])?;

    // Button released: drop both windings.
    let mut off_drivers = on_drivers;
    off_drivers[0].disable();
    off_drivers[1].disable();
    device.switch_update_rule(
        switch_num,
        EventType::SwitchOpenNondebounced,
        &SILENT,
        &off_drivers,
    )?;
    device.switch_update_rule(switch_num, EventType::SwitchOpenDebounced, &NOTIFY, &[])
}

fn configure_stern_flipper<T: Transport>(
    device: &mut Device<T>,
    switch_num: u16,
    main_coil: u8,
    pulse_ms: u8,
) -> Result<()> {
    let mut on_driver = device.driver_state(main_coil);
    on_driver.patter(FLIPPER_PATTER_ON_MS, FLIPPER_PATTER_OFF_MS, pulse_ms);
    device.switch_update_rule(
        switch_num,
        EventType::SwitchClosedNondebounced,
        &SILENT,
        &[on_driver],
    )?;
    device.switch_update_rule(switch_num, EventType::SwitchClosedDebounced, &NOTIFY, &[])?;

    let mut off_driver = on_driver;
    off_driver.disable();
    device.switch_update_rule(
        switch_num,
        EventType::SwitchOpenNondebounced,
        &SILENT,
        &[off_driver],
    )?;
    device.switch_update_rule(switch_num, EventType::SwitchOpenDebounced, &NOTIFY, &[])
}

/// Wires a pop bumper or slingshot: the coil fires from hardware on the
/// nondebounced closure (rearming on every hit), while scoring happens in
/// software off the debounced closure.
pub fn configure_bumper_rule<T: Transport>(
    device: &mut Device<T>,
    switch_num: u16,
    coil: u8,
    pulse_ms: u8,
) -> Result<()> {
    let mut driver = device.driver_state(coil);
    driver.pulse(pulse_ms);
    device.switch_update_rule(
        switch_num,
        EventType::SwitchClosedNondebounced,
        &SwitchRule {
            notify_host: false,
            reload_active: true,
        },
        &[driver],
    )?;
    device.switch_update_rule(switch_num, EventType::SwitchClosedDebounced, &NOTIFY, &[])
}
