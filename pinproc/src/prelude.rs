//! Prelude (helpful reexports) for this package

pub use crate::device::Device;
pub use crate::dmd::DmdConfig;
pub use crate::drivers::{DriveMode, DriverState};
pub use crate::error::{Error, Result};
pub use crate::machine::{configure_bumper_rule, configure_flipper_rule, MachineType};
pub use crate::switches::{SwitchConfig, SwitchRule};
pub use crate::transport::{serial::Serial, Transport};
pub use procwire::{Event, EventType};
