use crate::{BrokerConfig, PubSubError, ReceivedMessage, SubClient};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use girder_core::{AppContext, AppSpindown};
use std::error::Error;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::select;
use tracing::{debug, error, info};

/// Boxed error returned by [`TaskHandler`]s and [`CloseFn`]s.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Cleanup routine run once after the receive loop ends.
pub type CloseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Processes the tasks received by a [`Worker`].
///
/// The handler owns settlement: it must [`ack`](ReceivedMessage::ack) or
/// [`nack`](ReceivedMessage::nack) the message itself.
#[async_trait]
pub trait TaskHandler<T>: Send + Sync + 'static {
    /// Handles one decoded task. An error is logged and the worker moves on.
    async fn handle_task(&self, task: T, message: &ReceivedMessage) -> Result<(), BoxError>;
}

/// Receives protobuf tasks of type `T` from a broker and hands them to a
/// [`TaskHandler`] until the global [`AppContext`] terminates.
pub struct Worker<T, H> {
    broker: BrokerConfig,
    handler: H,
    shutdown_timeout: Duration,
    close_fn: Option<CloseFn>,
    receive_timeout: Duration,
    _task: PhantomData<fn() -> T>,
}

impl<T, H> Worker<T, H>
where
    T: prost::Message + Default + 'static,
    H: TaskHandler<T>,
{
    /// Creates a worker with a 30-second shutdown timeout, a 5-second receive
    /// timeout and no close function.
    pub fn new(broker: BrokerConfig, handler: H) -> Self {
        Self {
            broker,
            handler,
            shutdown_timeout: Duration::from_secs(30),
            close_fn: None,
            receive_timeout: Duration::from_secs(5),
            _task: PhantomData,
        }
    }

    /// Sets how long shutdown may take before it is reported as failed.
    pub fn with_shutdown_timeout(self, shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_timeout,
            ..self
        }
    }

    /// Sets how long a single receive may wait before the loop checks in
    /// again.
    pub fn with_receive_timeout(self, receive_timeout: Duration) -> Self {
        Self {
            receive_timeout,
            ..self
        }
    }

    /// Sets a cleanup routine to run after the subscription is closed.
    pub fn with_close_fn<F, Fut>(self, close_fn: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            close_fn: Some(Box::new(move || close_fn().boxed())),
            ..self
        }
    }

    /// Runs the worker in the background and blocks until `SIGINT` or
    /// `SIGTERM`, then terminates the [`AppContext`] and waits for every
    /// registered workload to finish within the shutdown timeout.
    ///
    /// Returns early if the receive loop fails on its own.
    pub async fn run_with_signal_handler(self) -> Result<(), PubSubError> {
        self.launch(true).await
    }

    /// Same as [`run_with_signal_handler`](Worker::run_with_signal_handler),
    /// but waits for the [`AppContext`] to be terminated by other means
    /// instead of trapping signals.
    pub async fn run(self) -> Result<(), PubSubError> {
        self.launch(false).await
    }

    async fn launch(self, trap_signals: bool) -> Result<(), PubSubError> {
        let Self {
            broker,
            handler,
            shutdown_timeout,
            close_fn,
            receive_timeout,
            ..
        } = self;

        let subscription = SubClient::open(&broker).await?;

        info!(
            engine = %broker.engine,
            topic = broker.topic.as_str(),
            "Reading tasks from broker",
        );

        let spindown_token = AppSpindown::register(format!("worker:{}", broker.topic));
        let mut receiving = tokio::spawn(async move {
            let _spindown_token = spindown_token;
            let outcome = receive_loop::<T, H>(&subscription, &handler, receive_timeout).await;

            wind_down(outcome, &subscription, close_fn).await
        });

        let finished_early = select! {
            biased;
            joined = &mut receiving => Some(joined),
            _ = shutdown_requested(trap_signals) => None,
        };

        AppContext::terminate();

        if let Err(timeout) = AppSpindown::completed_within(shutdown_timeout).await {
            error!(
                alert = true,
                spun_down = timeout.spun_down,
                timed_out = timeout.timed_out,
                "Timed out waiting for the worker to shut down",
            );
            return Err(timeout.into());
        }

        info!("All services gracefully shut down");

        let joined = match finished_early {
            Some(joined) => joined,
            None => receiving.await,
        };

        joined?
    }
}

async fn shutdown_requested(trap_signals: bool) {
    if trap_signals {
        AppContext::wait_for_signal().await;
        info!("Received interrupt signal; gracefully shutting down worker");
    } else {
        AppContext::terminated().await;
    }
}

async fn receive_loop<T, H>(
    subscription: &SubClient,
    handler: &H,
    receive_timeout: Duration,
) -> Result<(), PubSubError>
where
    T: prost::Message + Default,
    H: TaskHandler<T>,
{
    loop {
        let received = select! {
            biased;
            _ = AppContext::terminated() => {
                debug!("Received shutdown message; exiting loop");
                return Ok(());
            }
            received = tokio::time::timeout(receive_timeout, subscription.receive_task::<T>()) => received,
        };

        let (task, message) = match received {
            Err(_) => {
                debug!("Receive loop broker wait timeout reached");
                continue;
            }
            Ok(Err(error)) => {
                error!(
                    ?error,
                    error_message = %error,
                    "Failed to receive a task from the broker",
                );
                return Err(error);
            }
            Ok(Ok(received)) => received,
        };

        match handler.handle_task(task, &message).await {
            Ok(()) => info!("Processed a task"),
            Err(error) => error!(
                ?error,
                error_message = %error,
                "Failed to process a task",
            ),
        }
    }
}

/// Closes the subscription, then runs the close function. The first failure
/// is reported, unless the loop itself already failed.
async fn wind_down(
    outcome: Result<(), PubSubError>,
    subscription: &SubClient,
    close_fn: Option<CloseFn>,
) -> Result<(), PubSubError> {
    let mut outcome = outcome;

    if let Err(error) = subscription.close().await {
        error!(?error, error_message = %error, "Failed to close the subscription");
        if outcome.is_ok() {
            outcome = Err(error);
        }
    }

    if let Some(close_fn) = close_fn {
        if let Err(error) = close_fn().await {
            error!(?error, error_message = %error, "Failed to close connections");
            if outcome.is_ok() {
                outcome = Err(PubSubError::Close(error));
            }
        }
    }

    outcome
}
