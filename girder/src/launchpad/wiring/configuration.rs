use crate::{AppConfig, DotEnv};
use clap::ArgMatches;
use config::ConfigBuilder;
use config::builder::DefaultState;
use girder_config::{Assembler, AssemblerChoices, FlagBindings};

/// Command-line flags bound to config keys, together with the parsed
/// arguments to read them from.
#[derive(Debug, Clone)]
pub struct FlagOverrides {
    /// Bindings between arguments and config keys.
    pub bindings: FlagBindings,
    /// The parsed command line.
    pub matches: ArgMatches,
}

/// Defines the **configuration wiring** stage of a Girder application:
/// preparing the environment, assembling the [`AppConfig`] and setting up
/// logging.
///
/// Every method has a default. Override the ones to customize:
///
/// ```no_run
/// use girder::{App, AppConfig, ConfigurationWiring};
///
/// fn main() {
///     App::launchpad(async_main())
///         .with_configuration_wiring(NamedConfigurationWiring)
///         .boot();
/// }
///
/// async fn async_main() {
///     assert_eq!(AppConfig::get().name(), "custom-name");
/// }
///
/// struct NamedConfigurationWiring;
///
/// impl ConfigurationWiring for NamedConfigurationWiring {
///     fn prepare_environment(&self) {
///         unsafe { std::env::set_var("APP_NAME", "custom-name") }
///     }
/// }
/// ```
pub trait ConfigurationWiring {
    /// Runs the stage by calling the other methods in order.
    fn run(
        &self,
        choices: &AssemblerChoices,
        flags: Option<&FlagOverrides>,
    ) -> &'static AppConfig {
        // Prepare the environment
        self.prepare_environment();

        // Make the config builder
        let mut builder = self.make_config_builder(choices);

        // Flags beat files and environment
        if let Some(flags) = flags {
            builder = flags
                .bindings
                .apply(builder, &flags.matches)
                .unwrap_or_else(|error| panic!("failed to apply command-line flags: {}", error));
        }

        // Set the config builder for the application configuration
        self.seed_config(builder);

        let config = AppConfig::get();

        // Set up logging as early as possible
        self.init_tracing(config);

        config
    }

    /// Loads `.env.local` and `.env` through [`DotEnv::tap`].
    fn prepare_environment(&self) {
        DotEnv::tap();
    }

    /// Creates the builder of config files and environment variables.
    fn make_config_builder(&self, choices: &AssemblerChoices) -> ConfigBuilder<DefaultState> {
        Assembler::make_builder(choices)
    }

    /// Builds and seeds the [`AppConfig`].
    fn seed_config(&self, builder: ConfigBuilder<DefaultState>) {
        AppConfig::seed(builder);
    }

    /// Installs the global `tracing` subscriber described by
    /// [`AppConfig::tracing`]. Does nothing without the `tracing` feature.
    fn init_tracing(&self, _config: &'static AppConfig) {
        #[cfg(feature = "tracing")]
        {
            use girder_tracing::{Registry, SubscriberExt, SubscriberInitExt};

            #[cfg(feature = "tracing-log")]
            let _ = tracing_log::LogTracer::init();

            let layer = girder_tracing::make_layer(_config.tracing()).unwrap_or_else(|error| {
                panic!("failed to open the configured log output: {}", error)
            });

            // A subscriber installed by the host wins
            let _ = Registry::default().with(layer).try_init();
        }
    }
}

/// The default [`ConfigurationWiring`].
pub(crate) struct DefaultConfigurationWiring;

impl ConfigurationWiring for DefaultConfigurationWiring {}
