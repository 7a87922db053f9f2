//! Host-side driver for the P-ROC pinball machine I/O controller.
//!
//! The P-ROC sits between game software and the playfield hardware: it scans
//! the switch matrix, drives coils and lamps, and refreshes the dot-matrix
//! display, all over one serial-over-USB link. This crate owns that link and
//! exposes it as a [`Device`] session: mutations are batched register writes,
//! reads are synchronous request/reply exchanges, and switch transitions
//! arrive as events the caller polls for.
//!
//! The session is deliberately single threaded. Nothing here spawns; the
//! caller's main loop polls [`Device::get_events`] and tickles the watchdog
//! on its own schedule.

pub mod batch;
mod demux;
pub mod device;
pub mod dmd;
pub mod drivers;
pub mod error;
pub mod machine;
pub mod prelude;
pub mod switches;
pub mod transport;

pub use device::Device;
pub use error::{Error, Result};
