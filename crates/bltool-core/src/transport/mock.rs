//! Mock serial transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{Transport, TransportError};

struct Inner {
    /// Scripted replies, one consumed per write.
    scripted: VecDeque<Option<Vec<u8>>>,
    /// Bytes currently readable.
    input: VecDeque<u8>,
    /// Captured writes.
    write_log: Vec<Vec<u8>>,
}

/// Mock transport for unit testing channel and session logic.
///
/// Models the strict one-request/one-response ordering of the wire
/// protocol: each `write` arms the next scripted reply, which then
/// becomes readable. Clones share state, so a test can keep a handle
/// while a session owns the transport.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                scripted: VecDeque::new(),
                input: VecDeque::new(),
                write_log: Vec::new(),
            })),
        }
    }

    /// Script a reply to the next unanswered write.
    pub fn reply(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .push_back(Some(bytes.to_vec()));
    }

    /// Script a write that gets no reply (device stays silent).
    pub fn no_reply(&self) {
        self.inner.lock().unwrap().scripted.push_back(None);
    }

    /// Make bytes readable immediately, without waiting for a write.
    pub fn push_input(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().input.extend(bytes.iter().copied());
    }

    /// All captured writes, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().write_log.clone()
    }

    /// Number of scripted replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.inner.lock().unwrap().scripted.len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_log.push(data.to_vec());
        if let Some(reply) = inner.scripted.pop_front().flatten() {
            inner.input.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.input.len().min(max_len);
        Ok(inner.input.drain(..n).collect())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.inner.lock().unwrap().input.len())
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.inner.lock().unwrap().input.clear();
        Ok(())
    }

    fn delay(&mut self, _duration: Duration) {
        // Tests never wait on the wall clock.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_arms_scripted_reply() {
        let mock = MockTransport::new();
        mock.reply(b"OK");

        let mut t = mock.clone();
        assert_eq!(t.bytes_available().unwrap(), 0);
        t.write(b"ping").unwrap();
        assert_eq!(t.bytes_available().unwrap(), 2);
        assert_eq!(t.read(16).unwrap(), b"OK");
        assert_eq!(mock.writes(), vec![b"ping".to_vec()]);
    }

    #[test]
    fn silent_write_leaves_input_empty() {
        let mock = MockTransport::new();
        mock.no_reply();

        let mut t = mock.clone();
        t.write(b"ping").unwrap();
        assert_eq!(t.bytes_available().unwrap(), 0);
    }

    #[test]
    fn flush_discards_pending_input() {
        let mock = MockTransport::new();
        mock.push_input(b"stale");

        let mut t = mock.clone();
        assert_eq!(t.bytes_available().unwrap(), 5);
        t.flush_input().unwrap();
        assert_eq!(t.bytes_available().unwrap(), 0);
    }
}
