use crate::launchpad::wiring::configuration::DefaultConfigurationWiring;
use crate::launchpad::wiring::preflight::DefaultPreflightWiring;
use crate::{ConfigurationWiring, FlagOverrides, PreflightWiring};
use clap::ArgMatches;
use girder_config::{AssemblerChoices, FlagBindings};
use girder_core::{AppContext, girder_shutdown};
use tokio::runtime::Runtime;
use tokio::select;

pub mod wiring {
    pub mod configuration;
    pub mod preflight;
}

/// The entry point of a Girder application.
///
/// ```no_run
/// use girder::App;
///
/// fn main() {
///     App::launchpad(async_main())
///         .with_config_dir("settings")
///         .with_env_prefix("WORKER")
///         .boot();
/// }
///
/// async fn async_main() {
///     println!("Executing the main logic");
/// }
/// ```
pub struct App;

impl App {
    /// Boots `async_main` with a default [`Launchpad`].
    pub fn boot<Main>(async_main: Main)
    where
        Main: Future<Output = ()>,
    {
        Launchpad::new(async_main).boot()
    }

    /// Returns a [`Launchpad`] to customize before [booting](Launchpad::boot).
    pub fn launchpad<Main>(async_main: Main) -> Launchpad<Main>
    where
        Main: Future<Output = ()>,
    {
        Launchpad::new(async_main)
    }
}

/// Configures and launches a Girder application.
///
/// Startup runs in **wiring stages**:
///
/// 1.  **Configuration wiring:** loads dot-env files, assembles the
///     [`AppConfig`] from config files, environment variables and bound
///     flags, then sets up logging.
///
/// 2.  **Runtime:** a multi-threaded Tokio [`Runtime`] is built.
///
/// 3.  **Preflight wiring:** final checks and the startup announcement.
///
/// The main future then runs until it completes or the [`AppContext`] is
/// terminated, after which registered workloads are given time to spin down.
///
/// [`AppConfig`]: crate::AppConfig
pub struct Launchpad<Main>
where
    Main: Future<Output = ()>,
{
    async_main: Main,
    configuration_choices: AssemblerChoices,
    flag_overrides: Option<FlagOverrides>,
    configuration_wiring: Box<dyn ConfigurationWiring>,
    preflight_wiring: Box<dyn PreflightWiring>,
}

impl<Main> Launchpad<Main>
where
    Main: Future<Output = ()>,
{
    /// Creates a new `Launchpad` with default wiring.
    pub fn new(async_main: Main) -> Self {
        Self {
            async_main,
            configuration_choices: AssemblerChoices::default(),
            flag_overrides: None,
            configuration_wiring: Box::new(DefaultConfigurationWiring),
            preflight_wiring: Box::new(DefaultPreflightWiring),
        }
    }
}

impl<Main> Launchpad<Main>
where
    Main: Future<Output = ()>,
{
    /// Specifies the config directory, relative to the pivot directory or
    /// absolute. Defaults to `"config"`.
    pub fn with_config_dir(self, name: impl Into<String>) -> Self {
        Self {
            configuration_choices: AssemblerChoices {
                dir_name: Some(name.into()),
                ..self.configuration_choices
            },
            ..self
        }
    }

    /// Enables or disables config overrides from environment variables.
    /// Defaults to `true`.
    pub fn with_env(self, enabled: bool) -> Self {
        Self {
            configuration_choices: AssemblerChoices {
                env_enabled: enabled,
                ..self.configuration_choices
            },
            ..self
        }
    }

    /// Specifies the prefix of environment variables used as overrides.
    ///
    /// With the default prefix `"APP"`, `APP_WEB_PORT` overrides the
    /// `web.port` key.
    pub fn with_env_prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            configuration_choices: AssemblerChoices {
                env_prefix: Some(prefix.into()),
                ..self.configuration_choices
            },
            ..self
        }
    }

    /// Specifies the separator of environment variable names. Defaults to
    /// `"_"`.
    pub fn with_env_separator(self, separator: impl Into<String>) -> Self {
        Self {
            configuration_choices: AssemblerChoices {
                env_separator: Some(separator.into()),
                ..self.configuration_choices
            },
            ..self
        }
    }

    /// Applies the given flag `bindings` on top of config files and
    /// environment variables, reading values from the parsed `matches`.
    pub fn with_flag_bindings(self, bindings: FlagBindings, matches: ArgMatches) -> Self {
        Self {
            flag_overrides: Some(FlagOverrides { bindings, matches }),
            ..self
        }
    }

    /// Replaces the default **configuration** wiring.
    pub fn with_configuration_wiring<W>(self, configuration_wiring: W) -> Self
    where
        W: ConfigurationWiring + 'static,
    {
        Self {
            configuration_wiring: Box::new(configuration_wiring),
            ..self
        }
    }

    /// Replaces the default **preflight** wiring.
    pub fn with_preflight_wiring<W>(self, preflight_wiring: W) -> Self
    where
        W: PreflightWiring + 'static,
    {
        Self {
            preflight_wiring: Box::new(preflight_wiring),
            ..self
        }
    }
}

impl<Main> Launchpad<Main>
where
    Main: Future<Output = ()>,
{
    /// Runs the wiring stages, then blocks on the main future until it
    /// completes or the process is asked to stop, and shuts down gracefully.
    pub fn boot(self) {
        // Resolve the application configuration
        let config = self
            .configuration_wiring
            .run(&self.configuration_choices, self.flag_overrides.as_ref());

        // Make the asynchronous runtime
        let runtime = make_runtime();

        // Run the preflight steps
        self.preflight_wiring.run(config, &runtime);

        // Proceed to the main asynchronous logic
        runtime.block_on(run_async_main(self.async_main));
    }
}

fn make_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("it should be possible to build a multi-threaded tokio runtime")
}

async fn run_async_main<Main>(async_main: Main)
where
    Main: Future<Output = ()>,
{
    // Terminate the context on the first shutdown signal
    AppContext::auto_terminate().await;

    select! {
        biased;
        _ = AppContext::terminated() => {},
        _ = async_main => {},
    }

    girder_shutdown().await;
}
