//! Outbound register-write batching.

use crate::error::{Error, Result};
use crate::transport::Transport;
use tracing::debug;

/// Hard cap on staged words. The hardware accepts 2048-word bursts; staying
/// well below leaves margin for the header overhead of queued bursts.
pub const MAX_WRITE_WORDS: usize = 1536;

/// Register words staged between a mutation call and the next flush.
#[derive(Debug)]
pub(crate) struct WriteBatcher {
    words: Vec<u32>,
}

impl WriteBatcher {
    pub fn new() -> Self {
        Self {
            words: Vec::with_capacity(MAX_WRITE_WORDS),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Discards everything staged but not yet flushed.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Appends `words` to the pending buffer. Rejection is atomic: if the cap
    /// would be crossed, nothing is appended.
    pub fn stage(&mut self, words: &[u32]) -> Result<()> {
        if self.words.len() + words.len() > MAX_WRITE_WORDS {
            return Err(Error::CapacityExceeded);
        }
        self.words.extend_from_slice(words);
        Ok(())
    }

    /// Transmits everything staged as one burst write and clears the buffer.
    /// Succeeds trivially when nothing is staged. The buffer is cleared even
    /// on failure; a short transfer leaves the board out of sync with the
    /// local mirrors, which the caller must resolve by re-reading state.
    pub fn flush<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        if self.words.is_empty() {
            return Ok(());
        }
        let bytes = procwire::bytes_from_words(&self.words);
        self.words.clear();
        debug!(bytes = bytes.len(), "flushing write burst");
        let written = transport.write_bytes(&bytes)?;
        if written != bytes.len() {
            return Err(Error::ShortTransfer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::Mock;

    #[test]
    fn test_stage_to_exact_capacity() {
        let mut batcher = WriteBatcher::new();
        let words = vec![0u32; MAX_WRITE_WORDS];
        batcher.stage(&words).unwrap();
        assert_eq!(batcher.len(), MAX_WRITE_WORDS);
    }

    #[test]
    fn test_stage_over_capacity_is_atomic() {
        let mut batcher = WriteBatcher::new();
        batcher.stage(&vec![0u32; MAX_WRITE_WORDS - 1]).unwrap();
        assert!(matches!(
            batcher.stage(&[1, 2]),
            Err(Error::CapacityExceeded)
        ));
        // The rejected words must not have been partially applied.
        assert_eq!(batcher.len(), MAX_WRITE_WORDS - 1);
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let mut batcher = WriteBatcher::new();
        let mut mock = Mock::new();
        batcher.flush(&mut mock).unwrap();
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_flush_emits_one_burst_and_clears() {
        let mut batcher = WriteBatcher::new();
        let mut mock = Mock::new();
        batcher.stage(&[0xAAAA_0001, 0xAAAA_0002]).unwrap();
        batcher.stage(&[0xAAAA_0003]).unwrap();
        batcher.flush(&mut mock).unwrap();
        assert_eq!(mock.writes().len(), 1);
        assert_eq!(
            mock.written_words(0),
            vec![0xAAAA_0001, 0xAAAA_0002, 0xAAAA_0003]
        );
        // A second flush has nothing left to send.
        batcher.flush(&mut mock).unwrap();
        assert_eq!(mock.writes().len(), 1);
    }

    #[test]
    fn test_short_transfer_surfaces() {
        let mut batcher = WriteBatcher::new();
        let mut mock = Mock::new();
        mock.set_accept_limit(Some(3));
        batcher.stage(&[0xDEAD_BEEF]).unwrap();
        assert!(matches!(
            batcher.flush(&mut mock),
            Err(Error::ShortTransfer)
        ));
    }
}
