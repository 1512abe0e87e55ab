//! Persisted log storage
//!
//! A store is the persisted, time-ordered capture of messages that playback
//! reads from and the recorder writes into. The playback engine only depends
//! on the [`Store`] trait; [`SqliteStore`] is the backend shipped with this
//! crate, and any other backend honoring the same contract works too.

mod batch;
mod descriptor;
mod message;
mod sqlite;

pub use batch::Batch;
pub use descriptor::Descriptor;
pub use message::Message;
pub use sqlite::SqliteStore;

use std::collections::BTreeSet;

use crate::error::Result;

/// Read contract of a log storage backend.
pub trait Store: Send + Sync {
    /// Whether the backing log was opened successfully.
    fn valid(&self) -> bool;

    /// The catalog of topics and message types contained in the log.
    ///
    /// An invalid store reports an empty catalog.
    fn descriptor(&self) -> Descriptor;

    /// Query a time-ordered batch of messages for exactly the given topic
    /// set. An empty set yields an empty batch.
    fn query_messages(&self, topics: &BTreeSet<String>) -> Result<Batch>;

    /// Whether the backend supports concurrent readers.
    ///
    /// When this is false the playback factory serializes sessions: it
    /// refuses to start a new one while the previous is still running.
    fn threadsafe(&self) -> bool;
}

/// Placeholder store behind a factory whose log failed to open. Every
/// operation soft-fails; `valid()` is false.
pub(crate) struct InvalidStore;

impl Store for InvalidStore {
    fn valid(&self) -> bool {
        false
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor::default()
    }

    fn query_messages(&self, _topics: &BTreeSet<String>) -> Result<Batch> {
        Err(crate::error::RewindError::StoreInvalid)
    }

    fn threadsafe(&self) -> bool {
        true
    }
}
