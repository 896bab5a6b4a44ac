use crate::Engine;
use girder_core::SpindownTimeout;
use thiserror::Error;

/// Failure of a pub/sub operation.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The engine is recognized but has no driver in this build.
    #[error("unsupported pubsub engine '{0}'")]
    UnsupportedEngine(Engine),

    /// The configuration is unusable.
    #[error("invalid broker configuration: {0}")]
    InvalidConfig(String),

    /// A received message does not carry the expected type metadata.
    #[error("message has unknown type")]
    UnknownMessageType,

    /// A received task could not be decoded.
    #[error("failed to decode task: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The broker refused a published message.
    #[error("broker negatively acknowledged the message")]
    Nacked,

    /// The topic or subscription has been shut down.
    #[error("topic or subscription is closed")]
    Closed,

    /// The application context terminated while waiting on the broker.
    #[error("application context terminated")]
    Terminated,

    /// The RabbitMQ driver failed.
    #[error("rabbitmq error: {0}")]
    Rabbit(#[from] lapin::Error),

    /// The worker's close function failed.
    #[error("close function failed: {0}")]
    Close(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The worker's receive loop panicked or was aborted.
    #[error("receive loop failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Background workloads did not finish within the shutdown timeout.
    #[error("shutdown timed out: {0}")]
    ShutdownTimeout(#[from] SpindownTimeout),
}
