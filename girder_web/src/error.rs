use girder_core::SpindownTimeout;
use std::io;
use thiserror::Error;

/// Failure of the [`WebApp`](crate::WebApp) lifecycle.
#[derive(Debug, Error)]
pub enum WebError {
    /// The listener could not be bound, or serving failed.
    #[error("failed to serve http: {0}")]
    Serve(#[from] io::Error),

    /// The close function failed.
    #[error("close function failed: {0}")]
    Close(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The serving task panicked.
    #[error("serving task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Background workloads did not finish within the shutdown timeout.
    #[error("shutdown timed out: {0}")]
    ShutdownTimeout(#[from] SpindownTimeout),
}
