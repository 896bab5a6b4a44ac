//! In-process engine: every named topic is a process-global FIFO queue shared
//! by all publishers and subscriptions of that name.

use crate::{Acknowledger, Message, PubSubError, ReceivedMessage, SubscriptionDriver, TopicDriver};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::select;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static TOPICS: OnceLock<SyncMutex<HashMap<String, Arc<MemTopic>>>> = OnceLock::new();

#[derive(Default)]
struct MemTopic {
    queue: SyncMutex<VecDeque<Message>>,
    available: Notify,
}

impl MemTopic {
    fn named(name: &str) -> Arc<Self> {
        let topics = TOPICS.get_or_init(|| SyncMutex::new(HashMap::new()));

        topics
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(topic = name, "Creating in-memory topic");
                Arc::default()
            })
            .clone()
    }

    fn push_back(&self, message: Message) {
        self.queue.lock().push_back(message);
        self.available.notify_one();
    }

    fn push_front(&self, message: Message) {
        self.queue.lock().push_front(message);
        self.available.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }
}

/// Publishing end of an in-memory topic.
pub struct MemTopicDriver {
    topic: Arc<MemTopic>,
    closed: CancellationToken,
}

/// Consuming end of an in-memory topic.
pub struct MemSubscriptionDriver {
    topic: Arc<MemTopic>,
    closed: CancellationToken,
}

/// Opens the publishing end of the named topic, creating the topic if needed.
pub fn open_topic(name: &str) -> MemTopicDriver {
    MemTopicDriver {
        topic: MemTopic::named(name),
        closed: CancellationToken::new(),
    }
}

/// Opens a subscription to the named topic, creating the topic if needed.
pub fn open_subscription(name: &str) -> MemSubscriptionDriver {
    MemSubscriptionDriver {
        topic: MemTopic::named(name),
        closed: CancellationToken::new(),
    }
}

#[async_trait]
impl TopicDriver for MemTopicDriver {
    async fn send(&self, message: Message) -> Result<(), PubSubError> {
        if self.closed.is_cancelled() {
            return Err(PubSubError::Closed);
        }

        self.topic.push_back(message);

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PubSubError> {
        self.closed.cancel();

        Ok(())
    }
}

#[async_trait]
impl SubscriptionDriver for MemSubscriptionDriver {
    async fn receive(&self) -> Result<ReceivedMessage, PubSubError> {
        loop {
            // Register interest before checking, so a concurrent push is not missed
            let available = self.topic.available.notified();
            tokio::pin!(available);
            available.as_mut().enable();

            if self.closed.is_cancelled() {
                return Err(PubSubError::Closed);
            }

            if let Some(message) = self.topic.pop() {
                let acknowledger = MemAcknowledger {
                    topic: self.topic.clone(),
                    message: message.clone(),
                    settled: AtomicBool::new(false),
                };

                return Ok(ReceivedMessage::new(message, Box::new(acknowledger)));
            }

            select! {
                biased;
                _ = self.closed.cancelled() => return Err(PubSubError::Closed),
                _ = &mut available => {}
            }
        }
    }

    async fn shutdown(&self) -> Result<(), PubSubError> {
        self.closed.cancel();

        Ok(())
    }
}

/// Settles an in-memory message. A message dropped without being settled is
/// redelivered, like a nack.
struct MemAcknowledger {
    topic: Arc<MemTopic>,
    message: Message,
    settled: AtomicBool,
}

impl MemAcknowledger {
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }
}

#[async_trait]
impl Acknowledger for MemAcknowledger {
    async fn ack(&self) -> Result<(), PubSubError> {
        self.settle();

        Ok(())
    }

    async fn nack(&self) -> Result<(), PubSubError> {
        if self.settle() {
            self.topic.push_front(self.message.clone());
        }

        Ok(())
    }
}

impl Drop for MemAcknowledger {
    fn drop(&mut self) {
        if self.settle() {
            self.topic.push_front(std::mem::take(&mut self.message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_order_and_redelivers_nacked_first() {
        // Given
        let topic = open_topic("mem-engine-order");
        let subscription = open_subscription("mem-engine-order");
        topic.send(Message::new("first")).await.unwrap();
        topic.send(Message::new("second")).await.unwrap();

        // When
        let first = subscription.receive().await.unwrap();
        first.nack().await.unwrap();
        let again = subscription.receive().await.unwrap();
        again.ack().await.unwrap();
        let second = subscription.receive().await.unwrap();
        second.ack().await.unwrap();

        // Then
        assert_eq!(again.body, b"first".to_vec());
        assert_eq!(second.body, b"second".to_vec());
    }

    #[tokio::test]
    async fn waits_for_a_later_message() {
        // Given
        let subscription = open_subscription("mem-engine-wait");
        let sender = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            open_topic("mem-engine-wait")
                .send(Message::new("late"))
                .await
                .unwrap();
        });

        // When
        let received = subscription.receive().await.unwrap();
        received.ack().await.unwrap();
        sender.await.unwrap();

        // Then
        assert_eq!(received.body, b"late".to_vec());
    }

    #[tokio::test]
    async fn dropped_message_is_redelivered() {
        // Given
        let topic = open_topic("mem-engine-drop");
        let subscription = open_subscription("mem-engine-drop");
        topic.send(Message::new("unsettled")).await.unwrap();

        // When
        drop(subscription.receive().await.unwrap());
        let received = subscription.receive().await.unwrap();
        received.ack().await.unwrap();

        // Then
        assert_eq!(received.body, b"unsettled".to_vec());
    }

    #[tokio::test]
    async fn shutdown_releases_pending_receive() {
        // Given
        let subscription = Arc::new(open_subscription("mem-engine-shutdown"));
        let pending = tokio::spawn({
            let subscription = subscription.clone();
            async move { subscription.receive().await }
        });
        tokio::task::yield_now().await;

        // When
        subscription.shutdown().await.unwrap();
        let result = pending.await.unwrap();

        // Then
        assert!(matches!(result, Err(PubSubError::Closed)));
    }
}
