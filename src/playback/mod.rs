//! Log playback
//!
//! [`Playback`] is the long-lived factory: it owns the log store and the
//! topic selection, and mints one [`PlaybackHandle`] per replay session.
//! Each session re-emits the selected messages on the live fabric with the
//! same inter-arrival timing they had at capture time.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use rewind::Playback;
//!
//! let mut playback = Playback::open("tour.log");
//! playback.add_topics_matching(&regex::Regex::new("/sensors/.*")?);
//!
//! let session = playback.start(Duration::from_millis(200))?;
//! session.wait_until_finished();
//! ```
//!
//! Sessions run on a worker thread; the caller is free to stop them early
//! or to wait. When the storage backend does not support concurrent
//! readers, the factory refuses to start a second session while one is
//! still running.

mod registry;
mod scheduler;
mod selection;
mod session;

pub use session::PlaybackHandle;

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::error::{Result, RewindError};
use crate::fabric::{self, NodeConfig, Transport};
use crate::store::{InvalidStore, SqliteStore, Store};

use selection::TopicSelection;

/// Factory for replay sessions over one log.
pub struct Playback {
    store: Arc<dyn Store>,
    selection: TopicSelection,
    transport: Arc<dyn Transport>,
    node_config: NodeConfig,
    /// Most recently minted session; consulted only when the backend must
    /// serialize readers.
    last_session: Mutex<Weak<PlaybackHandle>>,
}

impl Playback {
    /// Open a log file for playback on the process default transport.
    ///
    /// A file that cannot be opened leaves the factory in a soft-failed
    /// state: [`valid`](Self::valid) reports false and every operation is
    /// rejected without panicking.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let store: Arc<dyn Store> = match SqliteStore::open(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not open log file");
                Arc::new(InvalidStore)
            }
        };
        Self::with_store(store)
    }

    /// Build a factory over any store honoring the [`Store`] contract.
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            selection: TopicSelection::default(),
            transport: fabric::default_transport(),
            node_config: NodeConfig::default(),
            last_session: Mutex::new(Weak::new()),
        }
    }

    /// Publish through a specific transport instead of the process default.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Configure the fabric node minted for each session.
    pub fn with_node_config(mut self, config: NodeConfig) -> Self {
        self.node_config = config;
        self
    }

    /// Whether the log was opened successfully.
    pub fn valid(&self) -> bool {
        self.store.valid()
    }

    /// Select a topic by exact name. Returns false when the topic is not in
    /// the log or the log is not open.
    ///
    /// Any call makes the selection explicit, even a failing one: a user who
    /// only ever adds unknown topics ends up with an explicitly empty
    /// selection that plays nothing.
    pub fn add_topic(&mut self, name: &str) -> bool {
        self.selection.touch();
        if !self.store.valid() {
            error!("failed to open log file");
            return false;
        }
        let catalog = self.store.descriptor();
        let added = self.selection.add_name(name, &catalog);
        if !added {
            warn!(topic = %name, "topic is not in the log");
        }
        added
    }

    /// Select every topic whose whole name matches `pattern`. Returns the
    /// match count, or -1 when the log is not open.
    pub fn add_topics_matching(&mut self, pattern: &Regex) -> i64 {
        self.selection.touch();
        if !self.store.valid() {
            error!("failed to open log file");
            return -1;
        }
        let catalog = self.store.descriptor();
        self.selection.add_matching(pattern, &catalog)
    }

    /// Deselect a topic by exact name; an implicit selection is first
    /// widened to the full catalog. Returns true iff something was erased.
    pub fn remove_topic(&mut self, name: &str) -> bool {
        self.selection.touch();
        if !self.store.valid() {
            error!("failed to open log file");
            return false;
        }
        let catalog = self.store.descriptor();
        self.selection.remove_name(name, &catalog)
    }

    /// Deselect every topic whose whole name matches `pattern`, widening an
    /// implicit selection first. Returns the erased count, or -1 when the
    /// log is not open.
    pub fn remove_topics_matching(&mut self, pattern: &Regex) -> i64 {
        self.selection.touch();
        if !self.store.valid() {
            error!("failed to open log file");
            return -1;
        }
        let catalog = self.store.descriptor();
        self.selection.remove_matching(pattern, &catalog)
    }

    /// Start a replay session over the currently selected topics.
    ///
    /// `settle` is slept after advertising and before the first publish so
    /// discovery can propagate; zero skips the pause entirely. On a backend
    /// without concurrent-reader support, starting while a previous session
    /// is still running fails with [`RewindError::SessionActive`].
    pub fn start(&self, settle: Duration) -> Result<Arc<PlaybackHandle>> {
        if !self.store.valid() {
            error!("could not start: failed to open log file");
            return Err(RewindError::StoreInvalid);
        }

        if !self.store.threadsafe() {
            if let Some(last) = self.last_session.lock().upgrade() {
                if !last.finished() {
                    warn!("storage backend is single-threaded; only one session may run at a time");
                    return Err(RewindError::SessionActive);
                }
            }
        }

        let catalog = self.store.descriptor();
        if !self.selection.is_explicit() {
            debug!("no topics selected, defaulting to all topics");
        }
        let topics = self.selection.resolve(&catalog);
        if topics.is_empty() {
            warn!("topic selection is empty");
        }

        let session = PlaybackHandle::launch(
            Arc::clone(&self.store),
            topics,
            settle,
            self.transport.as_ref(),
            &self.node_config,
        )?;

        if !self.store.threadsafe() {
            *self.last_session.lock() = Arc::downgrade(&session);
        }

        Ok(session)
    }
}
