#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements the [`AppConfig`] facade.
mod app_config;
pub use self::app_config::{AppConfig, AppConfigError};

/// Re-exports the [`DotEnv`] loader.
pub use girder_config::DotEnv;

/// Re-exports the public API of `girder-core` in the root of this crate for
/// convenience.
pub use girder_core::*;

/// Re-exports the public API of `tokio` for convenience.
pub use tokio;

/// Re-exports the public API of `girder-config` for convenience.
pub use girder_config as config;

/// Re-exports the public API of `girder-tracing` for convenience.
#[cfg(feature = "tracing")]
pub use girder_tracing as logging;

/// Re-exports the public API of `tracing` for convenience.
#[cfg(feature = "tracing")]
pub use tracing;

/// Re-exports the public API of `girder-docstore` for convenience.
#[cfg(feature = "docstore")]
pub use girder_docstore as docstore;

/// Re-exports the public API of `girder-pubsub` for convenience.
#[cfg(feature = "pubsub")]
pub use girder_pubsub as pubsub;

/// Re-exports the public API of `girder-web` for convenience.
#[cfg(feature = "web")]
pub use girder_web as web;

/// Re-exports the public API of `girder-terraform` for convenience.
#[cfg(feature = "terraform")]
pub use girder_terraform as terraform;

/// Implements the [`App`] entry point and its [`Launchpad`].
mod launchpad;
pub use self::launchpad::wiring::configuration::{ConfigurationWiring, FlagOverrides};
pub use self::launchpad::wiring::preflight::PreflightWiring;
pub use self::launchpad::{App, Launchpad};
