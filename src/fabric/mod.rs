//! Live messaging fabric contract
//!
//! Playback re-emits messages on a live publish/subscribe transport and the
//! recorder captures from one. Both depend only on the traits in this
//! module:
//!
//! - [`Transport`]: the process's connection to a messaging fabric; mints
//!   nodes.
//! - [`Node`]: one participant; advertises publishers and subscribes to raw
//!   byte streams. Dropping a node releases everything it advertised.
//! - [`RawPublisher`]: a live, advertised emitter for one (topic, type).
//!
//! The crate ships [`InProcTransport`], an in-process loopback bus, and a
//! process-wide default transport slot. Embedding applications swap in a
//! real middleware with [`set_default_transport`] before using the CLI-style
//! entry points; everything else takes a transport explicitly.

mod inproc;

pub use inproc::InProcTransport;

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Callback invoked with `(topic, type name, payload)` for each raw message
/// delivered to a subscription.
pub type RawHandler = Box<dyn Fn(&str, &str, &[u8]) + Send + Sync>;

/// Configuration for a fabric node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Partition scope; nodes only see traffic within their own partition.
    #[serde(default)]
    pub partition: String,
}

impl NodeConfig {
    /// Create a config for the default partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope the node to a partition.
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }
}

/// A process's connection to a messaging fabric.
pub trait Transport: Send + Sync {
    /// Create a new node participating in the fabric.
    fn create_node(&self, config: &NodeConfig) -> Result<Box<dyn Node>>;
}

/// One fabric participant.
pub trait Node: Send {
    /// Advertise `(topic, type)` and return a publisher for it.
    fn advertise(&mut self, topic: &str, type_name: &str) -> Result<Box<dyn RawPublisher>>;

    /// Subscribe to every message published on `topic` within this node's
    /// partition. The handler runs on the publisher's thread and must not
    /// block.
    fn subscribe_raw(&mut self, topic: &str, handler: RawHandler) -> Result<()>;

    /// Snapshot of `(topic, type)` pairs currently advertised in this
    /// node's partition.
    fn advertised_topics(&self) -> Vec<(String, String)>;
}

/// A live emitter for one advertised (topic, type) pair.
pub trait RawPublisher: Send {
    /// Publish raw payload bytes under the given type name.
    fn publish_raw(&self, data: &[u8], type_name: &str) -> Result<()>;
}

fn default_slot() -> &'static RwLock<Option<Arc<dyn Transport>>> {
    static SLOT: OnceLock<RwLock<Option<Arc<dyn Transport>>>> = OnceLock::new();
    SLOT.get_or_init(|| RwLock::new(None))
}

/// Replace the process-wide default transport.
pub fn set_default_transport(transport: Arc<dyn Transport>) {
    *default_slot().write() = Some(transport);
}

/// The process-wide default transport, installing the in-process loopback
/// on first use if none was registered.
pub fn default_transport() -> Arc<dyn Transport> {
    if let Some(transport) = default_slot().read().as_ref() {
        return Arc::clone(transport);
    }
    let mut slot = default_slot().write();
    let transport = slot.get_or_insert_with(|| Arc::new(InProcTransport::new()) as Arc<dyn Transport>);
    Arc::clone(transport)
}
