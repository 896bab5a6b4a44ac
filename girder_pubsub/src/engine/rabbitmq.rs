//! RabbitMQ engine over AMQP 0.9.1. A topic is published to the exchange of
//! the same name and consumed from the queue of the same name.

use crate::{
    Acknowledger, Backoff, BrokerConfig, Message, PubSubError, ReceivedMessage,
    SubscriptionDriver, TopicDriver,
};
use async_trait::async_trait;
use futures::StreamExt;
use girder_core::{AppContext, AppSpindown, AppSpindownToken};
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ConfirmSelectOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, Error as LapinError,
};
use parking_lot::Mutex as SyncMutex;
use secure_string::SecureString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::select;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Holds at most one live connection to the broker and reconnects on demand.
///
/// The connection is closed once the global [`AppContext`] terminates or the
/// owning driver shuts down, whichever comes first. Until then the link keeps
/// an [`AppSpindown`] workload open.
struct Link {
    name: Arc<str>,
    uri: SecureString,
    backoff: Backoff,
    connection: AsyncMutex<Option<Connection>>,
    closed: CancellationToken,
    watcher: SyncMutex<Option<JoinHandle<()>>>,
}

impl Link {
    fn start(kind: &str, config: &BrokerConfig) -> Arc<Self> {
        let name: Arc<str> = Arc::from(format!("rabbitmq:{kind}:{}", config.topic));
        let uri = SecureString::from(format!("amqp://{}/", config.connstring.unsecure()));
        let spindown_token = AppSpindown::register(&name);

        let link = Arc::new(Self {
            name,
            uri,
            backoff: Backoff::new(&config.reconnect_backoff),
            connection: AsyncMutex::new(None),
            closed: CancellationToken::new(),
            watcher: SyncMutex::new(None),
        });

        let watcher = tokio::spawn(link.clone().watch(spindown_token));
        *link.watcher.lock() = Some(watcher);

        link
    }

    async fn watch(self: Arc<Self>, _spindown_token: AppSpindownToken) {
        select! {
            biased;
            _ = self.closed.cancelled() => {}
            _ = AppContext::terminated() => {}
        }

        // Stop any connection attempt still in progress
        self.closed.cancel();

        if let Some(connection) = self.connection.lock().await.take() {
            close_connection(&self.name, connection).await;
        }
    }

    /// Closes the connection and waits until it is closed.
    async fn shutdown(&self) {
        self.closed.cancel();

        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }
    }

    /// Opens a fresh channel, reconnecting as needed.
    async fn channel(&self) -> Result<Channel, PubSubError> {
        let mut connection_guard = self.connection.lock().await;

        loop {
            if let Some(connection) = connection_guard.as_ref() {
                if connection.status().connected() {
                    match connection.create_channel().await {
                        Ok(channel) => {
                            self.backoff.reset();
                            return Ok(channel);
                        }
                        Err(error) => {
                            warn!(
                                name = self.name.as_ref(),
                                ?error,
                                error_message = %error,
                                "Failed to create a RabbitMQ channel",
                            );
                            self.pause(error.into()).await?;
                        }
                    }
                }
            }

            if let Some(stale) = connection_guard.take() {
                tokio::spawn(close_connection(self.name.clone(), stale));
            }

            *connection_guard = Some(self.connect().await?);
        }
    }

    /// Connects with backoff until success, backoff exhaustion or shutdown.
    async fn connect(&self) -> Result<Connection, PubSubError> {
        loop {
            let properties = ConnectionProperties::default()
                .with_executor(tokio_executor_trait::Tokio::current())
                .with_reactor(tokio_reactor_trait::Tokio);

            let result = select! {
                biased;
                _ = self.closed.cancelled() => return Err(PubSubError::Closed),
                _ = AppContext::terminated() => return Err(PubSubError::Terminated),
                result = Connection::connect(self.uri.unsecure(), properties) => result,
            };

            match result {
                Ok(connection) => {
                    info!(name = self.name.as_ref(), "Connected to RabbitMQ");
                    return Ok(connection);
                }
                Err(error) => {
                    warn!(
                        name = self.name.as_ref(),
                        ?error,
                        error_message = %error,
                        "Failed to establish a RabbitMQ connection",
                    );
                    self.pause(error.into()).await?;
                }
            }
        }
    }

    /// Waits out the next backoff delay. Gives up with the given `error` once
    /// the backoff is exhausted.
    async fn pause(&self, error: PubSubError) -> Result<(), PubSubError> {
        let Some(delay) = self.backoff.next() else {
            warn!(
                alert = true,
                name = self.name.as_ref(),
                "Giving up on connecting to RabbitMQ",
            );
            return Err(error);
        };

        select! {
            biased;
            _ = self.closed.cancelled() => Err(PubSubError::Closed),
            _ = AppContext::terminated() => Err(PubSubError::Terminated),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

async fn close_connection(name: impl AsRef<str>, connection: Connection) {
    let name = name.as_ref();

    match connection.close(0, "Closed by client").await {
        Ok(()) => info!(name = name, "Closed a RabbitMQ connection"),
        Err(LapinError::InvalidConnectionState(_)) => {
            info!(name = name, "Discarded a previously lost RabbitMQ connection")
        }
        Err(error) => warn!(
            name = name,
            ?error,
            error_message = %error,
            "Failed to gracefully close a RabbitMQ connection",
        ),
    }
}

/// Publishes to the exchange named after the topic, with publisher confirms.
pub struct RabbitTopicDriver {
    topic: String,
    link: Arc<Link>,
    channel: AsyncMutex<Option<Channel>>,
}

impl RabbitTopicDriver {
    /// Connects to the broker and prepares a confirming channel.
    pub async fn open(config: &BrokerConfig) -> Result<Self, PubSubError> {
        let link = Link::start("pub", config);

        let channel = match confirming_channel(&link).await {
            Ok(channel) => channel,
            Err(error) => {
                link.shutdown().await;
                return Err(error);
            }
        };

        Ok(Self {
            topic: config.topic.clone(),
            link,
            channel: AsyncMutex::new(Some(channel)),
        })
    }

    async fn publish(&self, channel: &Channel, message: Message) -> Result<(), PubSubError> {
        let mut headers = FieldTable::default();
        for (key, value) in message.metadata {
            headers.insert(
                ShortString::from(key),
                AMQPValue::LongString(LongString::from(value.as_bytes())),
            );
        }

        let confirmation = channel
            .basic_publish(
                &self.topic,
                "",
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &message.body,
                BasicProperties::default().with_headers(headers),
            )
            .await?
            .await?;

        match confirmation {
            Confirmation::Nack(_) => Err(PubSubError::Nacked),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }
}

async fn confirming_channel(link: &Link) -> Result<Channel, PubSubError> {
    let channel = link.channel().await?;

    channel
        .confirm_select(ConfirmSelectOptions { nowait: false })
        .await?;

    Ok(channel)
}

#[async_trait]
impl TopicDriver for RabbitTopicDriver {
    async fn send(&self, message: Message) -> Result<(), PubSubError> {
        let mut channel_guard = self.channel.lock().await;

        let channel = match channel_guard.take() {
            Some(channel) if channel.status().connected() => channel,
            _ => confirming_channel(&self.link).await?,
        };

        let result = self.publish(&channel, message).await;

        // A broken channel is replaced on the next send
        if !matches!(result, Err(PubSubError::Rabbit(_))) {
            *channel_guard = Some(channel);
        }

        result
    }

    async fn shutdown(&self) -> Result<(), PubSubError> {
        self.channel.lock().await.take();
        self.link.shutdown().await;

        Ok(())
    }
}

/// Consumes the queue named after the topic, with manual acknowledgement.
pub struct RabbitSubscriptionDriver {
    topic: String,
    link: Arc<Link>,
    consumer: AsyncMutex<Option<Consumer>>,
}

impl RabbitSubscriptionDriver {
    /// Connects to the broker and starts consuming.
    pub async fn open(config: &BrokerConfig) -> Result<Self, PubSubError> {
        let link = Link::start("sub", config);
        let driver = Self {
            topic: config.topic.clone(),
            link,
            consumer: AsyncMutex::new(None),
        };

        match driver.consume().await {
            Ok(consumer) => {
                *driver.consumer.lock().await = Some(consumer);
                Ok(driver)
            }
            Err(error) => {
                driver.link.shutdown().await;
                Err(error)
            }
        }
    }

    async fn consume(&self) -> Result<Consumer, PubSubError> {
        let channel = self.link.channel().await?;

        let consumer = channel
            .basic_consume(
                &self.topic,
                self.link.name.as_ref(),
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;

        Ok(consumer)
    }
}

#[async_trait]
impl SubscriptionDriver for RabbitSubscriptionDriver {
    async fn receive(&self) -> Result<ReceivedMessage, PubSubError> {
        let mut consumer_guard = self.consumer.lock().await;

        loop {
            if consumer_guard.is_none() {
                *consumer_guard = Some(self.consume().await?);
            }

            let Some(consumer) = consumer_guard.as_mut() else {
                continue;
            };

            let next = select! {
                biased;
                _ = self.link.closed.cancelled() => return Err(PubSubError::Closed),
                next = consumer.next() => next,
            };

            match next {
                Some(Ok(delivery)) => return Ok(received_message(delivery)),
                Some(Err(error)) => warn!(
                    name = self.link.name.as_ref(),
                    ?error,
                    error_message = %error,
                    "Received an error from a RabbitMQ consumer",
                ),
                None => warn!(
                    name = self.link.name.as_ref(),
                    "RabbitMQ consumer ran out of messages",
                ),
            }

            // Start over on a fresh consumer
            consumer_guard.take();
        }
    }

    async fn shutdown(&self) -> Result<(), PubSubError> {
        self.link.shutdown().await;
        self.consumer.lock().await.take();

        Ok(())
    }
}

fn received_message(delivery: Delivery) -> ReceivedMessage {
    let metadata = delivery
        .properties
        .headers()
        .as_ref()
        .map(headers_to_metadata)
        .unwrap_or_default();

    let message = Message {
        body: delivery.data,
        metadata,
    };

    ReceivedMessage::new(message, Box::new(RabbitAcknowledger(delivery.acker)))
}

fn headers_to_metadata(headers: &FieldTable) -> BTreeMap<String, String> {
    headers
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                AMQPValue::LongString(value) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
                AMQPValue::ShortString(value) => value.as_str().to_string(),
                _ => return None,
            };

            Some((key.as_str().to_string(), value))
        })
        .collect()
}

struct RabbitAcknowledger(Acker);

#[async_trait]
impl Acknowledger for RabbitAcknowledger {
    async fn ack(&self) -> Result<(), PubSubError> {
        self.0.ack(BasicAckOptions { multiple: false }).await?;

        Ok(())
    }

    async fn nack(&self) -> Result<(), PubSubError> {
        self.0
            .nack(BasicNackOptions {
                multiple: false,
                requeue: true,
            })
            .await?;

        Ok(())
    }
}
