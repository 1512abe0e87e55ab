//! A single message captured in a log

use bytes::Bytes;

/// One message as it was observed on the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message was published on
    pub topic: String,
    /// Name of the message schema
    pub type_name: String,
    /// Raw payload bytes
    pub data: Bytes,
    /// Receipt time in nanoseconds on a clock that is monotonic within one log
    pub time_received: i64,
}

impl Message {
    /// Create a new message.
    pub fn new(
        topic: impl Into<String>,
        type_name: impl Into<String>,
        data: impl Into<Bytes>,
        time_received: i64,
    ) -> Self {
        Self {
            topic: topic.into(),
            type_name: type_name.into(),
            data: data.into(),
            time_received,
        }
    }
}
