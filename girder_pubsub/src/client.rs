use crate::engine::{mem, rabbitmq};
use crate::{
    BrokerConfig, Engine, Message, PubSubError, ReceivedMessage, SubscriptionDriver,
    TASK_MESSAGE_TYPE, TYPE_METADATA_KEY, TopicDriver,
};
use tracing::{debug, warn};

/// Publishes [`Message`]s to the topic of a [`BrokerConfig`].
pub struct PubClient {
    topic: String,
    driver: Box<dyn TopicDriver>,
}

/// Receives [`Message`]s from the topic of a [`BrokerConfig`].
pub struct SubClient {
    topic: String,
    driver: Box<dyn SubscriptionDriver>,
}

fn validate(config: &BrokerConfig) -> Result<(), PubSubError> {
    if config.topic.trim().is_empty() {
        return Err(PubSubError::InvalidConfig(
            "topic must not be empty".to_string(),
        ));
    }

    Ok(())
}

impl PubClient {
    /// Opens the topic with the configured engine.
    pub async fn open(config: &BrokerConfig) -> Result<Self, PubSubError> {
        validate(config)?;

        debug!(engine = %config.engine, topic = config.topic.as_str(), "Opening topic");

        let driver: Box<dyn TopicDriver> = match config.engine {
            Engine::Mem => Box::new(mem::open_topic(&config.topic)),
            Engine::RabbitMq => Box::new(rabbitmq::RabbitTopicDriver::open(config).await?),
            Engine::AzureSb => return Err(PubSubError::UnsupportedEngine(config.engine)),
        };

        Ok(Self {
            topic: config.topic.clone(),
            driver,
        })
    }

    /// Publishes a message.
    pub async fn send(&self, message: Message) -> Result<(), PubSubError> {
        self.driver.send(message).await
    }

    /// Publishes a protobuf-encoded task, tagged with the
    /// [task type](TASK_MESSAGE_TYPE).
    pub async fn send_task<T: prost::Message>(&self, task: &T) -> Result<(), PubSubError> {
        let message =
            Message::new(task.encode_to_vec()).with_metadata(TYPE_METADATA_KEY, TASK_MESSAGE_TYPE);

        self.send(message).await
    }

    /// Releases the topic.
    pub async fn close(&self) -> Result<(), PubSubError> {
        debug!(topic = self.topic.as_str(), "Closing topic");

        self.driver.shutdown().await
    }
}

impl SubClient {
    /// Opens a subscription with the configured engine.
    pub async fn open(config: &BrokerConfig) -> Result<Self, PubSubError> {
        validate(config)?;

        debug!(engine = %config.engine, topic = config.topic.as_str(), "Opening subscription");

        let driver: Box<dyn SubscriptionDriver> = match config.engine {
            Engine::Mem => Box::new(mem::open_subscription(&config.topic)),
            Engine::RabbitMq => Box::new(rabbitmq::RabbitSubscriptionDriver::open(config).await?),
            Engine::AzureSb => return Err(PubSubError::UnsupportedEngine(config.engine)),
        };

        Ok(Self {
            topic: config.topic.clone(),
            driver,
        })
    }

    /// Waits for the next message.
    pub async fn receive(&self) -> Result<ReceivedMessage, PubSubError> {
        self.driver.receive().await
    }

    /// Waits for the next message and decodes it as a task.
    ///
    /// A message that is not tagged with the [task type](TASK_MESSAGE_TYPE),
    /// or that fails to decode, is nacked and reported as an error.
    pub async fn receive_task<T>(&self) -> Result<(T, ReceivedMessage), PubSubError>
    where
        T: prost::Message + Default,
    {
        let message = self.receive().await?;

        if message.message_type() != Some(TASK_MESSAGE_TYPE) {
            self.reject(&message).await;
            return Err(PubSubError::UnknownMessageType);
        }

        match T::decode(message.body.as_slice()) {
            Ok(task) => Ok((task, message)),
            Err(error) => {
                self.reject(&message).await;
                Err(error.into())
            }
        }
    }

    /// Releases the subscription. Pending receives fail with
    /// [`PubSubError::Closed`].
    pub async fn close(&self) -> Result<(), PubSubError> {
        debug!(topic = self.topic.as_str(), "Closing subscription");

        self.driver.shutdown().await
    }

    async fn reject(&self, message: &ReceivedMessage) {
        if let Err(error) = message.nack().await {
            warn!(
                topic = self.topic.as_str(),
                ?error,
                error_message = %error,
                "Failed to nack a rejected message",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(string, tag = "1")]
        pub label: String,
        #[prost(uint32, tag = "2")]
        pub count: u32,
    }

    fn broker(topic: &str) -> BrokerConfig {
        BrokerConfig::new(Engine::Mem, topic, "")
    }

    #[tokio::test]
    async fn task_goes_through() {
        // Given
        let config = broker("client-task");
        let publisher = PubClient::open(&config).await.unwrap();
        let subscriber = SubClient::open(&config).await.unwrap();
        let ping = Ping {
            label: "hello".to_string(),
            count: 3,
        };

        // When
        publisher.send_task(&ping).await.unwrap();
        let (task, message) = subscriber.receive_task::<Ping>().await.unwrap();
        message.ack().await.unwrap();

        // Then
        assert_eq!(task, ping);
        assert_eq!(message.message_type(), Some("Task"));
    }

    #[tokio::test]
    async fn untyped_message_is_nacked_and_rejected() {
        // Given
        let config = broker("client-untyped");
        let publisher = PubClient::open(&config).await.unwrap();
        let subscriber = SubClient::open(&config).await.unwrap();
        publisher
            .send(Message::new("plain").with_metadata("type", "Event"))
            .await
            .unwrap();

        // When
        let error = subscriber.receive_task::<Ping>().await.unwrap_err();
        let redelivered = subscriber.receive().await.unwrap();
        redelivered.ack().await.unwrap();

        // Then
        assert_eq!(error.to_string(), "message has unknown type");
        assert_eq!(redelivered.body, b"plain".to_vec());
    }

    #[tokio::test]
    async fn undecodable_task_is_rejected() {
        // Given
        let config = broker("client-undecodable");
        let publisher = PubClient::open(&config).await.unwrap();
        let subscriber = SubClient::open(&config).await.unwrap();
        publisher
            .send(Message::new(vec![0xff, 0xff, 0xff]).with_metadata("type", "Task"))
            .await
            .unwrap();

        // When
        let result = subscriber.receive_task::<Ping>().await;

        // Then
        assert!(matches!(result, Err(PubSubError::Decode(_))));
    }

    #[tokio::test]
    async fn azure_service_bus_is_unsupported() {
        // Given
        let config = BrokerConfig::new(Engine::AzureSb, "tasks", "Endpoint=sb://example/");

        // When
        let result = PubClient::open(&config).await;

        // Then
        assert_eq!(
            result.err().map(|error| error.to_string()),
            Some("unsupported pubsub engine 'azuresb'".to_string()),
        );
    }

    #[tokio::test]
    async fn empty_topic_is_rejected() {
        // When
        let result = SubClient::open(&broker(" ")).await;

        // Then
        assert!(matches!(result, Err(PubSubError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn closed_topic_refuses_messages() {
        // Given
        let publisher = PubClient::open(&broker("client-closed")).await.unwrap();

        // When
        publisher.close().await.unwrap();
        let result = publisher.send(Message::new("late")).await;

        // Then
        assert!(matches!(result, Err(PubSubError::Closed)));
    }
}
