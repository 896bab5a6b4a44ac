use crate::WebError;
use axum::Router;
use futures::FutureExt;
use futures::future::BoxFuture;
use girder_core::{AppContext, AppSpindown};
use std::error::Error;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tracing::{debug, error, info};

/// Cleanup routine run once after the server stops serving.
pub type CloseFn =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), Box<dyn Error + Send + Sync>>> + Send>;

/// An HTTP server bound to `0.0.0.0:<port>` that shuts down gracefully with
/// the global [`AppContext`].
pub struct WebApp {
    router: Router,
    port: u16,
    shutdown_timeout: Duration,
    close_fn: Option<CloseFn>,
}

impl WebApp {
    /// Creates a server for the given router with a 30-second shutdown
    /// timeout and no close function.
    pub fn new(router: Router, port: u16) -> Self {
        Self {
            router,
            port,
            shutdown_timeout: Duration::from_secs(30),
            close_fn: None,
        }
    }

    /// Sets how long shutdown may take before it is reported as failed.
    pub fn with_shutdown_timeout(self, shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_timeout,
            ..self
        }
    }

    /// Sets a cleanup routine to run after serving ends.
    pub fn with_close_fn<F, Fut>(self, close_fn: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Box<dyn Error + Send + Sync>>> + Send + 'static,
    {
        Self {
            close_fn: Some(Box::new(move || close_fn().boxed())),
            ..self
        }
    }

    /// Serves in the background and blocks until `SIGINT` or `SIGTERM`, then
    /// terminates the [`AppContext`] and waits for every registered workload
    /// to finish within the shutdown timeout.
    pub async fn run_with_signal_handler(self) -> Result<(), WebError> {
        let listener = self.bind().await?;
        self.launch(listener, true).await
    }

    /// Same as [`run_with_signal_handler`](WebApp::run_with_signal_handler),
    /// but waits for the [`AppContext`] to be terminated by other means
    /// instead of trapping signals.
    pub async fn run(self) -> Result<(), WebError> {
        let listener = self.bind().await?;
        self.launch(listener, false).await
    }

    /// Same as [`run`](WebApp::run), on an already bound listener. The port
    /// is ignored.
    pub async fn run_on(self, listener: TcpListener) -> Result<(), WebError> {
        self.launch(listener, false).await
    }

    async fn bind(&self) -> Result<TcpListener, WebError> {
        let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));

        Ok(TcpListener::bind(address).await?)
    }

    async fn launch(self, listener: TcpListener, trap_signals: bool) -> Result<(), WebError> {
        let Self {
            router,
            shutdown_timeout,
            close_fn,
            ..
        } = self;

        info!(address = %listener.local_addr()?, "Starting web server");

        let spindown_token = AppSpindown::register("web:server");
        let mut serving = tokio::spawn(async move {
            let _spindown_token = spindown_token;

            let outcome = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(AppContext::terminated())
            .await
            .map_err(WebError::from);

            debug!("Web server stopped serving");

            wind_down(outcome, close_fn).await
        });

        let finished_early = select! {
            biased;
            joined = &mut serving => Some(joined),
            _ = shutdown_requested(trap_signals) => None,
        };

        AppContext::terminate();

        if let Err(timeout) = AppSpindown::completed_within(shutdown_timeout).await {
            error!(
                alert = true,
                spun_down = timeout.spun_down,
                timed_out = timeout.timed_out,
                "Timed out waiting for the web server to shut down",
            );
            return Err(timeout.into());
        }

        info!("All services gracefully shut down");

        let joined = match finished_early {
            Some(joined) => joined,
            None => serving.await,
        };

        joined?
    }
}

async fn shutdown_requested(trap_signals: bool) {
    if trap_signals {
        AppContext::wait_for_signal().await;
        info!("Received interrupt signal; gracefully shutting down server");
    } else {
        AppContext::terminated().await;
    }
}

async fn wind_down(outcome: Result<(), WebError>, close_fn: Option<CloseFn>) -> Result<(), WebError> {
    if let Err(error) = &outcome {
        error!(?error, error_message = %error, "Web server failed");
    }

    let Some(close_fn) = close_fn else {
        return outcome;
    };

    debug!("Handling additional shutdown tasks");

    match close_fn().await {
        Ok(()) => outcome,
        Err(error) => {
            error!(?error, error_message = %error, "Failed to run additional shutdown tasks");
            outcome.and(Err(WebError::Close(error)))
        }
    }
}
