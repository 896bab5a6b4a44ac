use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use secure_string::SecureString;

/// The broker section of an application config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrokerConfig {
    /// Which broker engine to use.
    pub engine: Engine,
    /// Topic name: the exchange to publish to and the queue to consume from.
    pub topic: String,
    /// Engine-specific connection string. For RabbitMQ: `USER:PASS@HOST:PORT`.
    #[serde(default = "BrokerConfig::default_connstring")]
    pub connstring: SecureString,
    /// Subscription name, for engines that separate topics and subscriptions.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Reconnection backoff for engines that hold a network connection.
    #[serde(default, alias = "backoff")]
    pub reconnect_backoff: BackoffConfig,
}

impl BrokerConfig {
    /// Creates a config with the default backoff and no subscription.
    pub fn new(engine: Engine, topic: impl Into<String>, connstring: impl Into<String>) -> Self {
        Self {
            engine,
            topic: topic.into(),
            connstring: SecureString::from(connstring.into()),
            subscription: None,
            reconnect_backoff: BackoffConfig::default(),
        }
    }

    fn default_connstring() -> SecureString {
        SecureString::from(String::new())
    }
}

/// Supported broker engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Azure Service Bus.
    #[serde(alias = "azure_service_bus")]
    AzureSb,
    /// RabbitMQ over AMQP 0.9.1.
    #[serde(alias = "rabbit", alias = "amqp")]
    RabbitMq,
    /// In-process queues.
    #[serde(alias = "memory")]
    Mem,
}

impl Display for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AzureSb => "azuresb",
            Self::RabbitMq => "rabbitmq",
            Self::Mem => "mem",
        })
    }
}

/// Parameters of an exponential backoff between reconnection attempts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay.
    #[serde(deserialize_with = "girder_config::de::duration")]
    pub initial_interval: Duration,
    /// Upper bound of a single delay.
    #[serde(deserialize_with = "girder_config::de::duration")]
    pub max_interval: Duration,
    /// Jitter applied to each delay, between `0.0` and `1.0`.
    pub randomization_factor: f64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Give up after this much time; never when absent.
    #[serde(deserialize_with = "girder_config::de::optional_duration")]
    pub max_elapsed_time: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(60),
            randomization_factor: 0.5,
            multiplier: 2.0,
            max_elapsed_time: None,
        }
    }
}

impl AsRef<BackoffConfig> for BackoffConfig {
    fn as_ref(&self) -> &BackoffConfig {
        self
    }
}
