//! Inbound byte collection and requested/unrequested demultiplexing.
//!
//! The board multiplexes two logically independent channels over one byte
//! stream: raw data answering read commands, and unsolicited switch-event
//! words. The outstanding-request marker is the sole disambiguator, so while
//! a request is pending every arriving word is reply data until the expected
//! count has been satisfied.

use crate::error::Result;
use crate::transport::Transport;
use std::collections::VecDeque;

/// Bytes pulled from the transport per collect call.
const COLLECT_CHUNK: usize = 512;

/// Default bound on collect/sort attempts while waiting for reply data.
pub(crate) const DEFAULT_READ_RETRIES: usize = 10;

#[derive(Debug)]
pub(crate) struct ReadDemux {
    /// Raw bytes not yet assembled into words; holds partial words across
    /// collect calls.
    pending: Vec<u8>,
    unrequested: VecDeque<u32>,
    requested: VecDeque<u32>,
    /// Reply words still expected by the outstanding read request, if any.
    outstanding: Option<usize>,
}

impl ReadDemux {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            unrequested: VecDeque::new(),
            requested: VecDeque::new(),
            outstanding: None,
        }
    }

    /// Pulls whatever bytes are currently available into the accumulator.
    /// One bounded transport read per call.
    pub fn collect<T: Transport>(&mut self, transport: &mut T) -> Result<usize> {
        let mut buf = [0u8; COLLECT_CHUNK];
        let n = transport.read_bytes(&mut buf)?;
        self.pending.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    /// Assembles complete words out of the accumulator and routes each one:
    /// to the requested FIFO while reply words are still owed, otherwise to
    /// the unrequested (event) FIFO.
    pub fn sort(&mut self) {
        let whole = self.pending.len() / procwire::WORD_BYTES * procwire::WORD_BYTES;
        for chunk in self.pending[..whole].chunks_exact(procwire::WORD_BYTES) {
            let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            match self.outstanding.as_mut() {
                Some(expected) => {
                    self.requested.push_back(word);
                    *expected -= 1;
                    if *expected == 0 {
                        self.outstanding = None;
                    }
                }
                None => self.unrequested.push_back(word),
            }
        }
        self.pending.drain(..whole);
    }

    /// Marks `count` reply words as owed to a just-issued read command.
    /// `count` must be nonzero; a satisfied request clears the marker.
    pub fn begin_request(&mut self, count: usize) {
        debug_assert!(count > 0, "zero-word request");
        debug_assert!(self.outstanding.is_none(), "request already outstanding");
        self.outstanding = Some(count);
    }

    /// Clears the outstanding marker and discards any partial reply; called
    /// when a request times out or its transport fails.
    pub fn abort_request(&mut self) {
        self.outstanding = None;
        self.requested.clear();
    }

    pub fn requested_len(&self) -> usize {
        self.requested.len()
    }

    /// Removes and returns the first `count` reply words in arrival order.
    pub fn take_requested(&mut self, count: usize) -> Vec<u32> {
        self.requested.drain(..count).collect()
    }

    pub fn pop_unrequested(&mut self) -> Option<u32> {
        self.unrequested.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::Mock;
    use paste::paste;

    fn pump(demux: &mut ReadDemux, mock: &mut Mock) {
        while demux.collect(mock).unwrap() > 0 {}
        demux.sort();
    }

    macro_rules! test_chunked_assembly {
        ($chunk:literal) => {
            paste! {
                #[test]
                fn [<test_assembles_words_in_chunks_of_ $chunk>]() {
                    let mut demux = ReadDemux::new();
                    let mut mock = Mock::new();
                    mock.set_read_chunk($chunk);
                    mock.queue_words(&[0x1111_2222, 0x3333_4444, 0x5555_6666]);
                    pump(&mut demux, &mut mock);
                    assert_eq!(demux.pop_unrequested(), Some(0x1111_2222));
                    assert_eq!(demux.pop_unrequested(), Some(0x3333_4444));
                    assert_eq!(demux.pop_unrequested(), Some(0x5555_6666));
                    assert_eq!(demux.pop_unrequested(), None);
                }
            }
        };
    }

    test_chunked_assembly!(1);
    test_chunked_assembly!(2);
    test_chunked_assembly!(3);
    test_chunked_assembly!(5);
    test_chunked_assembly!(7);

    #[test]
    fn test_partial_word_held_across_collects() {
        let mut demux = ReadDemux::new();
        let mut mock = Mock::new();
        mock.queue_bytes(&[0xAA, 0xBB]);
        demux.collect(&mut mock).unwrap();
        demux.sort();
        assert_eq!(demux.pop_unrequested(), None);
        mock.queue_bytes(&[0xCC, 0xDD]);
        demux.collect(&mut mock).unwrap();
        demux.sort();
        assert_eq!(demux.pop_unrequested(), Some(0xAABB_CCDD));
    }

    #[test]
    fn test_reply_words_then_events_in_order() {
        let mut demux = ReadDemux::new();
        let mut mock = Mock::new();
        // Two reply words owed, then three unrelated event words behind them.
        demux.begin_request(2);
        mock.queue_words(&[10, 11, 100, 101, 102]);
        pump(&mut demux, &mut mock);
        assert_eq!(demux.requested_len(), 2);
        assert_eq!(demux.take_requested(2), vec![10, 11]);
        assert_eq!(demux.pop_unrequested(), Some(100));
        assert_eq!(demux.pop_unrequested(), Some(101));
        assert_eq!(demux.pop_unrequested(), Some(102));
    }

    #[test]
    fn test_abort_discards_partial_reply() {
        let mut demux = ReadDemux::new();
        let mut mock = Mock::new();
        demux.begin_request(4);
        mock.queue_words(&[1, 2]);
        pump(&mut demux, &mut mock);
        assert_eq!(demux.requested_len(), 2);
        demux.abort_request();
        assert_eq!(demux.requested_len(), 0);
        // With the marker cleared, new words are events again.
        mock.queue_words(&[3]);
        pump(&mut demux, &mut mock);
        assert_eq!(demux.pop_unrequested(), Some(3));
    }
}
