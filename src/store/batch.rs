//! Forward-only stream of messages from a log
//!
//! A batch is produced by a store query and consumed exactly once, in
//! non-decreasing `time_received` order. It cannot be restarted; querying
//! again produces a fresh batch.

use std::fmt;

use super::message::Message;

/// A single-consumption, time-ordered stream of [`Message`]s.
///
/// Backends stream messages lazily (the SQLite store pages through its
/// cursor), so a batch over a large log never holds the whole log in memory.
pub struct Batch {
    inner: Box<dyn Iterator<Item = Message> + Send>,
}

impl Batch {
    /// Wrap an iterator as a batch. The iterator must yield messages in
    /// non-decreasing `time_received` order.
    pub fn new(inner: impl Iterator<Item = Message> + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// A batch with no messages.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for Batch {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        self.inner.next()
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_batch_is_forward_only() {
        let msgs = vec![
            Message::new("/a", "T", Bytes::from_static(b"1"), 10),
            Message::new("/a", "T", Bytes::from_static(b"2"), 20),
        ];
        let mut batch = Batch::new(msgs.into_iter());
        assert_eq!(batch.next().unwrap().time_received, 10);
        assert_eq!(batch.next().unwrap().time_received, 20);
        assert!(batch.next().is_none());
        // Drained for good.
        assert!(batch.next().is_none());
    }

    #[test]
    fn test_empty_batch() {
        assert!(Batch::empty().next().is_none());
    }
}
