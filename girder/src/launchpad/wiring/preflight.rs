use crate::AppConfig;
use tokio::runtime::Runtime;

/// Defines the **preflight wiring** stage of a Girder application, run right
/// before the main future with both the [`AppConfig`] and the [`Runtime`]
/// available.
///
/// ```no_run
/// use girder::{App, AppConfig, PreflightWiring};
/// use tokio::runtime::Runtime;
///
/// fn main() {
///     App::launchpad(async_main())
///         .with_preflight_wiring(QuietPreflightWiring)
///         .boot();
/// }
///
/// async fn async_main() {}
///
/// struct QuietPreflightWiring;
///
/// impl PreflightWiring for QuietPreflightWiring {
///     fn announce_startup(&self, _config: &'static AppConfig, _runtime: &Runtime) {
///         // Stay quiet
///     }
/// }
/// ```
pub trait PreflightWiring {
    /// Runs the stage.
    fn run(&self, config: &'static AppConfig, runtime: &Runtime) {
        self.announce_startup(config, runtime);
    }

    /// Logs the startup of the application. Does nothing without the
    /// `tracing` feature.
    fn announce_startup(&self, _config: &'static AppConfig, _runtime: &Runtime) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            workers = _runtime.metrics().num_workers(),
            "Starting {}",
            _config.name(),
        );
    }
}

/// The default [`PreflightWiring`].
pub(crate) struct DefaultPreflightWiring;

impl PreflightWiring for DefaultPreflightWiring {}
