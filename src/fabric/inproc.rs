//! In-process loopback fabric
//!
//! A minimal transport that delivers published messages synchronously to
//! subscribers inside the same process. It backs the test suite, the demo
//! CLI flows, and any embedding that wants record/playback without a real
//! middleware attached.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;

use super::{Node, NodeConfig, RawHandler, RawPublisher, Transport};

/// `(partition, topic)`
type TopicKey = (String, String);

#[derive(Default)]
struct TopicState {
    /// node id -> type names advertised by that node
    advertisements: HashMap<u64, BTreeSet<String>>,
    subscribers: Vec<(u64, Arc<RawHandler>)>,
}

#[derive(Default)]
struct Bus {
    next_node_id: AtomicU64,
    topics: RwLock<HashMap<TopicKey, TopicState>>,
}

impl Bus {
    fn remove_node(&self, node_id: u64) {
        let mut topics = self.topics.write();
        topics.retain(|_, state| {
            state.advertisements.remove(&node_id);
            state.subscribers.retain(|(id, _)| *id != node_id);
            !state.advertisements.is_empty() || !state.subscribers.is_empty()
        });
    }
}

/// In-process loopback implementation of [`Transport`].
#[derive(Default)]
pub struct InProcTransport {
    bus: Arc<Bus>,
}

impl InProcTransport {
    /// Create a standalone loopback bus.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for InProcTransport {
    fn create_node(&self, config: &NodeConfig) -> Result<Box<dyn Node>> {
        let id = self.bus.next_node_id.fetch_add(1, Ordering::Relaxed);
        debug!(node = id, partition = %config.partition, "created loopback node");
        Ok(Box::new(InProcNode {
            bus: Arc::clone(&self.bus),
            id,
            partition: config.partition.clone(),
        }))
    }
}

struct InProcNode {
    bus: Arc<Bus>,
    id: u64,
    partition: String,
}

impl Node for InProcNode {
    fn advertise(&mut self, topic: &str, type_name: &str) -> Result<Box<dyn RawPublisher>> {
        let key = (self.partition.clone(), topic.to_string());
        let mut topics = self.bus.topics.write();
        topics
            .entry(key.clone())
            .or_default()
            .advertisements
            .entry(self.id)
            .or_default()
            .insert(type_name.to_string());
        Ok(Box::new(InProcPublisher {
            bus: Arc::clone(&self.bus),
            key,
        }))
    }

    fn subscribe_raw(&mut self, topic: &str, handler: RawHandler) -> Result<()> {
        let key = (self.partition.clone(), topic.to_string());
        let mut topics = self.bus.topics.write();
        topics
            .entry(key)
            .or_default()
            .subscribers
            .push((self.id, Arc::new(handler)));
        Ok(())
    }

    fn advertised_topics(&self) -> Vec<(String, String)> {
        let topics = self.bus.topics.read();
        let mut out = Vec::new();
        for ((partition, topic), state) in topics.iter() {
            if *partition != self.partition {
                continue;
            }
            let mut types = BTreeSet::new();
            for advertised in state.advertisements.values() {
                types.extend(advertised.iter().cloned());
            }
            for type_name in types {
                out.push((topic.clone(), type_name));
            }
        }
        out.sort();
        out
    }
}

impl Drop for InProcNode {
    fn drop(&mut self) {
        self.bus.remove_node(self.id);
    }
}

struct InProcPublisher {
    bus: Arc<Bus>,
    key: TopicKey,
}

impl RawPublisher for InProcPublisher {
    fn publish_raw(&self, data: &[u8], type_name: &str) -> Result<()> {
        // Snapshot the handlers so delivery runs without the bus lock held;
        // a handler may itself subscribe or advertise.
        let handlers: Vec<Arc<RawHandler>> = {
            let topics = self.bus.topics.read();
            match topics.get(&self.key) {
                Some(state) => state.subscribers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => Vec::new(),
            }
        };
        for handler in handlers {
            (*handler)(&self.key.1, type_name, data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn collecting_handler(sink: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>) -> RawHandler {
        Box::new(move |topic, type_name, data| {
            sink.lock()
                .push((topic.to_string(), type_name.to_string(), data.to_vec()));
        })
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let transport = InProcTransport::new();
        let config = NodeConfig::new();
        let mut sub = transport.create_node(&config).unwrap();
        let mut publisher_node = transport.create_node(&config).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        sub.subscribe_raw("/chatter", collecting_handler(Arc::clone(&seen)))
            .unwrap();

        let publisher = publisher_node.advertise("/chatter", "example.Msg").unwrap();
        publisher.publish_raw(b"hello", "example.Msg").unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "/chatter");
        assert_eq!(seen[0].1, "example.Msg");
        assert_eq!(seen[0].2, b"hello");
    }

    #[test]
    fn test_partitions_are_isolated() {
        let transport = InProcTransport::new();
        let mut sub = transport
            .create_node(&NodeConfig::new().with_partition("red"))
            .unwrap();
        let mut publisher_node = transport
            .create_node(&NodeConfig::new().with_partition("blue"))
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        sub.subscribe_raw("/chatter", collecting_handler(Arc::clone(&seen)))
            .unwrap();

        let publisher = publisher_node.advertise("/chatter", "T").unwrap();
        publisher.publish_raw(b"x", "T").unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_node_drop_releases_advertisements() {
        let transport = InProcTransport::new();
        let config = NodeConfig::new();
        let mut advertiser = transport.create_node(&config).unwrap();
        let observer = transport.create_node(&config).unwrap();

        let _pub_a = advertiser.advertise("/a", "T1").unwrap();
        let _pub_b = advertiser.advertise("/b", "T2").unwrap();
        assert_eq!(observer.advertised_topics().len(), 2);

        drop(_pub_a);
        drop(_pub_b);
        drop(advertiser);
        assert!(observer.advertised_topics().is_empty());
    }

    #[test]
    fn test_advertised_topics_merges_types() {
        let transport = InProcTransport::new();
        let config = NodeConfig::new();
        let mut a = transport.create_node(&config).unwrap();
        let mut b = transport.create_node(&config).unwrap();

        let _p1 = a.advertise("/chatter", "T1").unwrap();
        let _p2 = b.advertise("/chatter", "T2").unwrap();

        let advertised = a.advertised_topics();
        assert_eq!(
            advertised,
            vec![
                ("/chatter".to_string(), "T1".to_string()),
                ("/chatter".to_string(), "T2".to_string()),
            ]
        );
    }
}
