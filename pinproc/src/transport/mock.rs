//! Mock transport used in testing the session layer.

use super::Transport;
use std::collections::VecDeque;
use std::io;

/// A scripted link: tests queue the bytes the board would send and inspect
/// the bursts the session wrote. Reads hand out at most `read_chunk` bytes
/// per call so word assembly across partial reads can be exercised.
#[derive(Debug)]
pub struct Mock {
    rx: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    read_chunk: usize,
    accept_limit: Option<usize>,
}

impl Mock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            writes: Vec::new(),
            read_chunk: 4096,
            accept_limit: None,
        }
    }

    /// Caps how many bytes a single `read_bytes` call may return.
    pub fn set_read_chunk(&mut self, bytes: usize) {
        self.read_chunk = bytes;
    }

    /// Forces every subsequent write to accept at most `bytes`, simulating a
    /// short transfer.
    pub fn set_accept_limit(&mut self, bytes: Option<usize>) {
        self.accept_limit = bytes;
    }

    /// Queues raw bytes as if the board had sent them.
    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Queues whole words in wire byte order.
    pub fn queue_words(&mut self, words: &[u32]) {
        self.queue_bytes(&procwire::bytes_from_words(words));
    }

    /// Queues an encoded switch-event word.
    pub fn queue_event(&mut self, event: &procwire::Event) {
        self.queue_words(&[procwire::encode_event(event)]);
    }

    /// Every burst written so far, in order, as raw bytes.
    #[must_use]
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// The `index`th written burst, reassembled into words.
    #[must_use]
    pub fn written_words(&self, index: usize) -> Vec<u32> {
        procwire::words_from_bytes(&self.writes[index])
    }

    #[must_use]
    pub fn rx_is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Mock {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.read_chunk).min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().expect("length checked above");
        }
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let accepted = match self.accept_limit {
            Some(limit) => bytes.len().min(limit),
            None => bytes.len(),
        };
        self.writes.push(bytes[..accepted].to_vec());
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_respects_chunk() {
        let mut mock = Mock::new();
        mock.set_read_chunk(3);
        mock.queue_words(&[0xAABB_CCDD]);
        let mut buf = [0u8; 8];
        assert_eq!(mock.read_bytes(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(mock.read_bytes(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xDD);
        assert_eq!(mock.read_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_records_bursts() {
        let mut mock = Mock::new();
        mock.write_bytes(&[1, 2, 3, 4]).unwrap();
        mock.write_bytes(&[5, 6, 7, 8]).unwrap();
        assert_eq!(mock.writes().len(), 2);
        assert_eq!(mock.written_words(1), vec![0x0506_0708]);
    }

    #[test]
    fn test_accept_limit_shortens_writes() {
        let mut mock = Mock::new();
        mock.set_accept_limit(Some(2));
        assert_eq!(mock.write_bytes(&[1, 2, 3, 4]).unwrap(), 2);
        assert_eq!(mock.writes()[0], vec![1, 2]);
    }
}
