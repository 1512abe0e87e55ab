//! Catalog of what a log contains
//!
//! The descriptor maps each topic name in a log to the set of message type
//! names it carries. One topic may carry several types concurrently. The
//! playback engine consults it when resolving topic selections and when
//! advertising publishers; it never mutates it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Read-only mapping `topic name -> set of type names`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Descriptor {
    topics: BTreeMap<String, BTreeSet<String>>,
}

impl Descriptor {
    /// Record that `topic` carries messages of `type_name`.
    pub(crate) fn insert(&mut self, topic: impl Into<String>, type_name: impl Into<String>) {
        self.topics
            .entry(topic.into())
            .or_default()
            .insert(type_name.into());
    }

    /// Iterate over all topic names in the log.
    pub fn topics(&self) -> impl Iterator<Item = &String> {
        self.topics.keys()
    }

    /// The full `topic -> types` mapping.
    pub fn topic_types(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.topics
    }

    /// The set of types carried by `topic`, if the topic is in the log.
    pub fn types_of(&self, topic: &str) -> Option<&BTreeSet<String>> {
        self.topics.get(topic)
    }

    /// Whether `topic` appears in the log.
    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Number of distinct topics.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// True when the log has no topics at all.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
