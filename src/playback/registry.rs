//! Publisher registry for one playback session
//!
//! Publishers are created once per (topic, type) pair during session
//! construction and never re-created afterwards, so the scheduler's hot path
//! reads the map without locking. A pair whose advertisement failed is
//! simply absent; its messages are dropped at publish time.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::fabric::{Node, RawPublisher};
use crate::store::Descriptor;

pub(crate) struct PublisherRegistry {
    // Declared before `node` so publishers drop before the node that
    // advertised them.
    publishers: HashMap<String, HashMap<String, Box<dyn RawPublisher>>>,
    node: Box<dyn Node>,
}

impl PublisherRegistry {
    pub fn new(node: Box<dyn Node>) -> Self {
        Self {
            publishers: HashMap::new(),
            node,
        }
    }

    /// Advertise every type the catalog lists under `topic`.
    pub fn ensure_topic(&mut self, topic: &str, catalog: &Descriptor) {
        let Some(types) = catalog.types_of(topic) else {
            warn!(topic = %topic, "topic is not in the log");
            return;
        };
        for type_name in types {
            self.ensure(topic, type_name);
        }
    }

    /// Advertise `(topic, type)` unless a publisher already exists for it.
    pub fn ensure(&mut self, topic: &str, type_name: &str) {
        let by_type = self.publishers.entry(topic.to_string()).or_default();
        if by_type.contains_key(type_name) {
            return;
        }
        match self.node.advertise(topic, type_name) {
            Ok(publisher) => {
                debug!(topic = %topic, type_name = %type_name, "created publisher");
                by_type.insert(type_name.to_string(), publisher);
            }
            Err(e) => {
                warn!(
                    topic = %topic,
                    type_name = %type_name,
                    error = %e,
                    "failed to advertise; messages for this pair will be dropped"
                );
            }
        }
    }

    /// Publisher for `(topic, type)`, if advertisement succeeded.
    pub fn get(&self, topic: &str, type_name: &str) -> Option<&dyn RawPublisher> {
        self.publishers
            .get(topic)
            .and_then(|by_type| by_type.get(type_name))
            .map(|publisher| publisher.as_ref())
    }

    #[cfg(test)]
    pub fn publisher_count(&self) -> usize {
        self.publishers.values().map(|by_type| by_type.len()).sum()
    }
}
