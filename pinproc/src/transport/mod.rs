//! The byte-level seam between the session and the physical board.

pub mod mock;
pub mod serial;

use std::io;

/// The trait implemented by links to a P-ROC board. The methods assume the
/// link is already open; the session owns exactly one implementation for its
/// whole lifetime.
///
/// Both directions are bounded and may move fewer bytes than asked: a read
/// returns whatever is currently pending (possibly nothing), and a short
/// write is reported through the returned count rather than retried here.
pub trait Transport {
    /// Pulls pending bytes into `buf`, returning how many arrived.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Pushes `bytes` toward the board, returning how many were accepted.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize>;
}
