//! Failure kinds surfaced by the session layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can be thrown by device operations. Local validation failures
/// (`InvalidArgument`, `CapacityExceeded`, `PoolExhausted`) are detected
/// before any hardware access; after a `ShortTransfer` the local mirrors and
/// the board may disagree and the caller should re-read the affected state.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("pending write buffer is at capacity")]
    CapacityExceeded,
    #[error("no free linked-driver slots remain")]
    PoolExhausted,
    #[error("transport moved fewer bytes than required")]
    ShortTransfer,
    #[error("no reply from the board within the retry budget")]
    ReadTimeout,
    #[error("board identification returned {0:#010x}")]
    BadChipId(u32),
    #[error("wire protocol error")]
    Wire(#[from] procwire::Error),
    #[error("register packing error")]
    Packing(#[from] packed_struct::PackingError),
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}
