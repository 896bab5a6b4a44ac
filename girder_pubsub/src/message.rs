use crate::PubSubError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;

/// Metadata key that carries the message type.
pub const TYPE_METADATA_KEY: &str = "type";

/// Message type of protobuf-encoded tasks.
pub const TASK_MESSAGE_TYPE: &str = "Task";

/// A message body with string metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Opaque payload.
    pub body: Vec<u8>,
    /// Metadata, sent as broker headers or properties.
    pub metadata: BTreeMap<String, String>,
}

impl Message {
    /// Creates a message without metadata.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());

        self
    }

    /// The value of the [type metadata](TYPE_METADATA_KEY), if any.
    pub fn message_type(&self) -> Option<&str> {
        self.metadata.get(TYPE_METADATA_KEY).map(String::as_str)
    }
}

/// Settles a received message with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirms processing; the broker forgets the message.
    async fn ack(&self) -> Result<(), PubSubError>;

    /// Rejects the message; the broker redelivers it.
    async fn nack(&self) -> Result<(), PubSubError>;
}

/// A [`Message`] received from a subscription, to be settled with
/// [`ack`](ReceivedMessage::ack) or [`nack`](ReceivedMessage::nack).
pub struct ReceivedMessage {
    message: Message,
    acknowledger: Box<dyn Acknowledger>,
}

impl ReceivedMessage {
    /// Pairs a message with the means to settle it.
    pub fn new(message: Message, acknowledger: Box<dyn Acknowledger>) -> Self {
        Self {
            message,
            acknowledger,
        }
    }

    /// Confirms processing.
    pub async fn ack(&self) -> Result<(), PubSubError> {
        self.acknowledger.ack().await
    }

    /// Rejects the message for redelivery.
    pub async fn nack(&self) -> Result<(), PubSubError> {
        self.acknowledger.nack().await
    }

    /// Borrows the message.
    pub fn message(&self) -> &Message {
        &self.message
    }
}

impl Deref for ReceivedMessage {
    type Target = Message;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl Debug for ReceivedMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
