//! One active replay session
//!
//! A handle binds together the publisher registry, the batch being drained,
//! and the worker thread running the scheduler. Construction is atomic:
//! node, publishers, settle pause, batch query, worker launch, in that
//! order. Teardown is the reverse: dropping a handle stops the worker and
//! joins it, then the registry releases its publishers before the fabric
//! node, and the store handle is released last.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::error::Result;
use crate::fabric::{NodeConfig, Transport};
use crate::store::Store;

use super::registry::PublisherRegistry;
use super::scheduler;

/// State shared between a handle and its worker thread.
pub(super) struct SessionShared {
    /// Raised by `stop()`; also raised by the worker itself on exit.
    pub stop: AtomicBool,
    /// Raised exactly once, by the worker, as it exits.
    pub finished: AtomicBool,
    /// Guards the `finished` edge for external waiters.
    pub wait_lock: Mutex<()>,
    pub wait_cv: Condvar,
    /// Wakes the worker out of its between-message wait.
    pub sleep_lock: Mutex<()>,
    pub sleep_cv: Condvar,
    /// Held by the worker for its entire iteration over the batch.
    pub batch_lock: Mutex<()>,
    /// Keeps the log alive while the session runs, even if the factory that
    /// minted the session is gone.
    pub store: Arc<dyn Store>,
}

/// Handle to one active replay.
///
/// Created by [`Playback::start`](super::Playback::start). The replay runs
/// on a dedicated worker thread; the handle only observes and controls it.
pub struct PlaybackHandle {
    shared: Arc<SessionShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackHandle {
    pub(super) fn launch(
        store: Arc<dyn Store>,
        topics: BTreeSet<String>,
        settle: Duration,
        transport: &dyn Transport,
        node_config: &NodeConfig,
    ) -> Result<Arc<Self>> {
        let node = transport.create_node(node_config)?;
        let catalog = store.descriptor();
        let mut registry = PublisherRegistry::new(node);
        for topic in &topics {
            registry.ensure_topic(topic, &catalog);
        }

        // Let discovery propagate before the first publish. A zero settle
        // must not sleep at all.
        if !settle.is_zero() {
            thread::sleep(settle);
        }

        let mut batch = store.query_messages(&topics)?.peekable();
        if batch.peek().is_none() {
            warn!("there are no messages to play");
        }

        let shared = Arc::new(SessionShared {
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            wait_lock: Mutex::new(()),
            wait_cv: Condvar::new(),
            sleep_lock: Mutex::new(()),
            sleep_cv: Condvar::new(),
            batch_lock: Mutex::new(()),
            store,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("rewind-playback".to_string())
            .spawn(move || scheduler::run(&worker_shared, &registry, batch))?;

        Ok(Arc::new(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Stop the replay and join the worker. Idempotent; safe from any
    /// thread. `finished()` is true once this returns.
    pub fn stop(&self) {
        {
            let _guard = self.shared.sleep_lock.lock();
            self.shared.stop.store(true, Ordering::Release);
        }
        self.shared.sleep_cv.notify_all();

        let worker = self.worker.lock().take();
        match worker {
            Some(handle) => {
                // A worker that panicked has already run its teardown.
                let _ = handle.join();
            }
            // Another caller owns the join; wait for the finished edge.
            None => self.wait_until_finished(),
        }
    }

    /// Block until the replay has drained its batch or was stopped.
    /// Callable concurrently from multiple threads.
    pub fn wait_until_finished(&self) {
        if !self.shared.store.valid() {
            return;
        }
        let mut guard = self.shared.wait_lock.lock();
        while !self.shared.finished.load(Ordering::Acquire) {
            self.shared.wait_cv.wait(&mut guard);
        }
    }

    /// Non-blocking snapshot: has the worker exited?
    pub fn finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
