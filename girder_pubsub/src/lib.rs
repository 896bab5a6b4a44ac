#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements the [`BrokerConfig`] application configuration section.
mod config;
pub use self::config::{BackoffConfig, BrokerConfig, Engine};

/// Implements [`PubSubError`].
mod error;
pub use self::error::PubSubError;

/// Implements the reconnection [`Backoff`].
mod backoff;
pub use self::backoff::Backoff;

/// Implements [`Message`] and [`ReceivedMessage`].
mod message;
pub use self::message::{Acknowledger, Message, ReceivedMessage, TASK_MESSAGE_TYPE, TYPE_METADATA_KEY};

/// Implements the engine-facing driver traits.
mod driver;
pub use self::driver::{SubscriptionDriver, TopicDriver};

/// Implements the broker engines.
mod engine {
    pub mod mem;
    pub mod rabbitmq;
}

/// Implements [`PubClient`] and [`SubClient`].
mod client;
pub use self::client::{PubClient, SubClient};

/// Implements the task [`Worker`] loop.
mod worker;
pub use self::worker::{BoxError, CloseFn, TaskHandler, Worker};
