use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// Process-wide quit broadcast
static QUIT: OnceLock<CancellationToken> = OnceLock::new();

/// Facade over the process-wide quit broadcast.
///
/// The context starts alive and is [terminated](AppContext::terminate) at most
/// once: every task [waiting](AppContext::terminated) on it is released at that
/// moment, and every task that starts waiting afterwards is released
/// immediately. Repeated termination only produces a log entry.
///
/// The first OS shutdown signal may terminate the context automatically, see
/// [`AppContext::auto_terminate`].
///
/// ## Example
///
/// ```rust
/// use girder_core::AppContext;
///
/// #[tokio::main]
/// async fn main() {
///     let worker = tokio::spawn(async move {
///         AppContext::terminated().await;
///         // release resources here
///     });
///
///     AppContext::terminate();
///
///     worker.await.unwrap();
/// }
/// ```
pub struct AppContext;

impl AppContext {
    fn quit() -> &'static CancellationToken {
        QUIT.get_or_init(CancellationToken::new)
    }

    /// Completes once the context is terminated.
    pub async fn terminated() {
        Self::quit().cancelled().await;
    }

    /// Terminates the context, releasing every task that waits on
    /// [`AppContext::terminated`].
    pub fn terminate() {
        if Self::quit().is_cancelled() {
            info!("Application context is already terminated");
            return;
        }

        info!("Terminating application context");

        Self::quit().cancel();
    }

    /// Starts listening for OS shutdown signals in a background task. The
    /// first intercepted signal terminates the context; a repeated one exits
    /// the process with status code `1`.
    ///
    /// This replaces the default signal handling of the whole process and
    /// cannot be undone. Repeated calls have no effect. The returned future
    /// completes once listening has started.
    pub async fn auto_terminate() {
        static CALLED: AtomicBool = AtomicBool::new(false);

        if CALLED.swap(true, Ordering::Relaxed) {
            return;
        }

        tokio::spawn(Self::listen_for_shutdown_signals());

        // Let the listener start before returning
        tokio::task::yield_now().await;
    }

    /// Completes on the next OS shutdown signal (`SIGINT` or `SIGTERM` on Unix,
    /// `ctrl_c` elsewhere) without terminating anything.
    ///
    /// Shutdown wrappers use this to block the foreground until an operator
    /// asks the process to stop.
    pub async fn wait_for_signal() {
        Self::wait_for_shutdown_signal().await;
    }

    /// Reports whether the context has been terminated.
    ///
    /// Use [`AppContext::terminated`] to wait for termination instead.
    pub fn is_terminated() -> bool {
        Self::quit().is_cancelled()
    }

    /// Reports whether the context is still alive.
    ///
    /// Use [`AppContext::terminated`] to wait for termination instead.
    pub fn is_alive() -> bool {
        !Self::quit().is_cancelled()
    }

    async fn listen_for_shutdown_signals() -> ! {
        Self::wait_for_shutdown_signal().await;

        info!("Shutdown signal intercepted");

        Self::quit().cancel();

        Self::wait_for_shutdown_signal().await;

        warn!("Repeated shutdown signal intercepted; exiting");

        std::process::exit(1);
    }

    #[cfg(unix)]
    async fn wait_for_shutdown_signal() {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(error), _) | (_, Err(error)) => {
                    error!(
                        alert = true,
                        ?error,
                        error_message = %error,
                        "Failed to subscribe to shutdown signals; falling back to ctrl_c",
                    );
                    return Self::wait_for_ctrl_c().await;
                }
            };

        tokio::select! {
            biased;
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_shutdown_signal() {
        Self::wait_for_ctrl_c().await;
    }

    async fn wait_for_ctrl_c() {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(
                alert = true,
                ?error,
                error_message = %error,
                "Failed to listen for ctrl_c; shutdown signals will be ignored",
            );
            std::future::pending::<()>().await;
        }
    }
}
