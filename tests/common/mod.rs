//! Shared helpers for integration tests

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rewind::fabric::{NodeConfig, Transport};
use rewind::store::SqliteStore;

/// One message observed by a [`Collector`].
#[derive(Debug, Clone)]
pub struct Observed {
    pub topic: String,
    pub type_name: String,
    pub data: Vec<u8>,
    pub at: Instant,
}

/// Subscribes to topics on a transport and records everything delivered.
pub struct Collector {
    // Keeps the subscriptions alive.
    _node: Box<dyn rewind::fabric::Node>,
    events: Arc<Mutex<Vec<Observed>>>,
}

impl Collector {
    pub fn subscribe(transport: &dyn Transport, topics: &[&str]) -> Self {
        let mut node = transport
            .create_node(&NodeConfig::default())
            .expect("loopback node");
        let events: Arc<Mutex<Vec<Observed>>> = Arc::new(Mutex::new(Vec::new()));
        for topic in topics {
            let sink = Arc::clone(&events);
            node.subscribe_raw(
                topic,
                Box::new(move |topic, type_name, data| {
                    sink.lock().push(Observed {
                        topic: topic.to_string(),
                        type_name: type_name.to_string(),
                        data: data.to_vec(),
                        at: Instant::now(),
                    });
                }),
            )
            .expect("loopback subscribe");
        }
        Self {
            _node: node,
            events,
        }
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

/// Write a log file containing the given `(topic, type, payload, time_ns)`
/// rows, in insertion order.
pub fn write_log(path: &Path, messages: &[(&str, &str, &[u8], i64)]) {
    let store = SqliteStore::create(path).expect("create log");
    for (topic, type_name, data, time_ns) in messages {
        store
            .insert_message(*time_ns, topic, type_name, data)
            .expect("insert message");
    }
}
