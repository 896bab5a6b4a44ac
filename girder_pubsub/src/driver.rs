use crate::{Message, PubSubError, ReceivedMessage};
use async_trait::async_trait;

/// Engine-side publishing end of a topic.
#[async_trait]
pub trait TopicDriver: Send + Sync {
    /// Publishes a message, returning once the broker has accepted it.
    async fn send(&self, message: Message) -> Result<(), PubSubError>;

    /// Releases the engine resources. Further sends fail.
    async fn shutdown(&self) -> Result<(), PubSubError>;
}

/// Engine-side consuming end of a subscription.
#[async_trait]
pub trait SubscriptionDriver: Send + Sync {
    /// Waits for the next message.
    async fn receive(&self) -> Result<ReceivedMessage, PubSubError>;

    /// Releases the engine resources. Pending and further receives fail with
    /// [`PubSubError::Closed`].
    async fn shutdown(&self) -> Result<(), PubSubError>;
}
