//! Log recording
//!
//! The recorder is the companion of playback: it subscribes to raw byte
//! streams on the fabric and appends every received message to a log file.
//! Messages are stamped on a monotonic clock anchored to the wall clock at
//! recorder creation, which keeps `time_recv` values both human-meaningful
//! and strictly usable for cadence reconstruction.
//!
//! Subscriptions can be added before or while recording; inserts only
//! happen between [`Recorder::start`] and [`Recorder::stop`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, error, info};

use crate::error::{Result, RewindError};
use crate::fabric::{self, Node, NodeConfig, Transport};
use crate::store::SqliteStore;

/// Captures fabric traffic into a log file.
pub struct Recorder {
    node: Box<dyn Node>,
    patterns: Vec<Regex>,
    subscribed: BTreeSet<String>,
    sink: Arc<Sink>,
}

/// Shared with every subscription callback.
struct Sink {
    store: Mutex<Option<Arc<SqliteStore>>>,
    origin_mono: Instant,
    origin_wall_ns: i64,
    captured: AtomicU64,
}

impl Sink {
    fn timestamp(&self) -> i64 {
        self.origin_wall_ns
            .saturating_add(self.origin_mono.elapsed().as_nanos() as i64)
    }

    fn record(&self, topic: &str, type_name: &str, data: &[u8]) {
        let store = self.store.lock();
        // Not recording yet, or already stopped.
        let Some(store) = store.as_ref() else {
            return;
        };
        match store.insert_message(self.timestamp(), topic, type_name, data) {
            Ok(()) => {
                self.captured.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!(topic = %topic, error = %e, "failed to record message"),
        }
    }
}

impl Recorder {
    /// Create a recorder on the process default transport.
    pub fn new() -> Result<Self> {
        Self::with_transport(fabric::default_transport().as_ref(), &NodeConfig::default())
    }

    /// Create a recorder on a specific transport and node configuration.
    pub fn with_transport(transport: &dyn Transport, config: &NodeConfig) -> Result<Self> {
        let node = transport.create_node(config)?;
        let origin_wall_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Ok(Self {
            node,
            patterns: Vec::new(),
            subscribed: BTreeSet::new(),
            sink: Arc::new(Sink {
                store: Mutex::new(None),
                origin_mono: Instant::now(),
                origin_wall_ns,
                captured: AtomicU64::new(0),
            }),
        })
    }

    /// Subscribe to a topic by exact name, whether or not anything is
    /// advertising it yet.
    pub fn add_topic(&mut self, name: &str) -> Result<()> {
        if self.subscribed.contains(name) {
            return Ok(());
        }
        let sink = Arc::clone(&self.sink);
        self.node.subscribe_raw(
            name,
            Box::new(move |topic, type_name, data| sink.record(topic, type_name, data)),
        )?;
        debug!(topic = %name, "subscribed for recording");
        self.subscribed.insert(name.to_string());
        Ok(())
    }

    /// Subscribe to every currently advertised topic whose whole name
    /// matches `pattern`, and remember the pattern so [`start`](Self::start)
    /// picks up topics advertised in the meantime. Returns the number of new
    /// subscriptions.
    pub fn add_topics_matching(&mut self, pattern: &Regex) -> i64 {
        self.patterns.push(anchor(pattern));
        self.subscribe_matching()
    }

    /// Begin appending received messages to the log at `path`, creating the
    /// file and its schema if needed.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.sink.store.lock().is_some() {
            return Err(RewindError::AlreadyRecording);
        }
        // Topics may have appeared since the patterns were added.
        self.subscribe_matching();
        let store = Arc::new(SqliteStore::create(path.as_ref())?);
        *self.sink.store.lock() = Some(store);
        info!(path = %path.as_ref().display(), "started recording");
        Ok(())
    }

    /// Stop recording and release the log file. Subscriptions stay in place
    /// so a later `start` resumes capture.
    pub fn stop(&mut self) {
        if self.sink.store.lock().take().is_some() {
            info!(messages = self.captured(), "stopped recording");
        }
    }

    /// Whether a log file is currently attached.
    pub fn recording(&self) -> bool {
        self.sink.store.lock().is_some()
    }

    /// Messages written so far, across all `start`/`stop` spans.
    pub fn captured(&self) -> u64 {
        self.sink.captured.load(Ordering::Relaxed)
    }

    fn subscribe_matching(&mut self) -> i64 {
        let advertised = self.node.advertised_topics();
        let mut added = 0;
        for (topic, _type_name) in advertised {
            if self.subscribed.contains(&topic) {
                continue;
            }
            if self.patterns.iter().any(|p| p.is_match(&topic)) {
                match self.add_topic(&topic) {
                    Ok(()) => added += 1,
                    Err(e) => error!(topic = %topic, error = %e, "failed to subscribe"),
                }
            }
        }
        added
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wrap a pattern so it must match a whole topic name, not a substring.
fn anchor(pattern: &Regex) -> Regex {
    match Regex::new(&format!("^(?:{})$", pattern.as_str())) {
        Ok(anchored) => anchored,
        // A valid pattern stays valid inside a non-capturing group.
        Err(_) => pattern.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::InProcTransport;
    use crate::store::Store;
    use tempfile::tempdir;

    #[test]
    fn test_messages_outside_recording_span_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.log");
        let transport = InProcTransport::new();
        let config = NodeConfig::default();

        let mut recorder = Recorder::with_transport(&transport, &config).unwrap();
        recorder.add_topic("/chatter").unwrap();

        let mut publisher_node = transport.create_node(&config).unwrap();
        let publisher = publisher_node.advertise("/chatter", "T").unwrap();

        publisher.publish_raw(b"before", "T").unwrap();
        recorder.start(&path).unwrap();
        publisher.publish_raw(b"during", "T").unwrap();
        recorder.stop();
        publisher.publish_raw(b"after", "T").unwrap();

        assert_eq!(recorder.captured(), 1);
        drop(recorder);

        let store = SqliteStore::open(&path).unwrap();
        let topics = std::iter::once("/chatter".to_string()).collect();
        let msgs: Vec<_> = store.query_messages(&topics).unwrap().collect();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data.as_ref(), b"during");
        assert_eq!(msgs[0].type_name, "T");
    }

    #[test]
    fn test_pattern_subscription_covers_later_advertisements() {
        let dir = tempdir().unwrap();
        let transport = InProcTransport::new();
        let config = NodeConfig::default();

        let mut publisher_node = transport.create_node(&config).unwrap();
        let early = publisher_node.advertise("/sensors/imu", "T").unwrap();

        let mut recorder = Recorder::with_transport(&transport, &config).unwrap();
        let re = Regex::new("/sensors/.*").unwrap();
        assert_eq!(recorder.add_topics_matching(&re), 1);

        // Advertised after the pattern was added, before start.
        let late = publisher_node.advertise("/sensors/gps", "T").unwrap();
        recorder.start(dir.path().join("capture.log")).unwrap();

        early.publish_raw(b"imu", "T").unwrap();
        late.publish_raw(b"gps", "T").unwrap();
        assert_eq!(recorder.captured(), 2);
    }

    #[test]
    fn test_double_start_is_rejected() {
        let dir = tempdir().unwrap();
        let transport = InProcTransport::new();
        let mut recorder =
            Recorder::with_transport(&transport, &NodeConfig::default()).unwrap();
        recorder.start(dir.path().join("a.log")).unwrap();
        assert!(matches!(
            recorder.start(dir.path().join("b.log")),
            Err(RewindError::AlreadyRecording)
        ));
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let dir = tempdir().unwrap();
        let transport = InProcTransport::new();
        let config = NodeConfig::default();

        let mut recorder = Recorder::with_transport(&transport, &config).unwrap();
        recorder.add_topic("/t").unwrap();
        recorder.start(dir.path().join("mono.log")).unwrap();

        let mut publisher_node = transport.create_node(&config).unwrap();
        let publisher = publisher_node.advertise("/t", "T").unwrap();
        for i in 0..10u8 {
            publisher.publish_raw(&[i], "T").unwrap();
        }
        recorder.stop();
        drop(recorder);

        let store = SqliteStore::open(dir.path().join("mono.log")).unwrap();
        let topics = std::iter::once("/t".to_string()).collect();
        let times: Vec<i64> = store
            .query_messages(&topics)
            .unwrap()
            .map(|m| m.time_received)
            .collect();
        assert_eq!(times.len(), 10);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
