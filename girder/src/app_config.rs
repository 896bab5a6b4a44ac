use crate::app_config::statics::StaticAppConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod statics;

/// The application configuration, resolved once at startup from config
/// files, environment variables and bound command-line flags.
///
/// Sections of the Girder family with a dedicated accessor are parsed
/// eagerly. Any other section is parsed on demand with
/// [`AppConfig::section`]:
///
/// ```no_run
/// use girder::AppConfig;
/// use serde::Deserialize;
///
/// #[derive(Default, Deserialize)]
/// struct Greeting {
///     message: String,
/// }
///
/// fn main() {
///     girder::App::boot(async {
///         let greeting: Greeting = AppConfig::section("greeting");
///         println!("{} from {}", greeting.message, AppConfig::get().name());
///     });
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(alias = "app_name")]
    name: String,

    #[cfg(feature = "tracing")]
    #[serde(alias = "logging", alias = "log")]
    tracing: girder_tracing::TracingConfig,
}

/// Failure to parse a section of the [`AppConfig`].
#[derive(Debug, Error)]
#[error("failed to parse configuration section: {0}")]
pub struct AppConfigError(#[from] ConfigError);

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),

            #[cfg(feature = "tracing")]
            tracing: Default::default(),
        }
    }
}

impl AppConfig {
    /// Returns the application configuration.
    ///
    /// # Panics
    ///
    /// Panics if called before the application has booted.
    pub fn get() -> &'static Self {
        StaticAppConfig::app_config()
    }

    /// Parses the section under `key`, falling back to `T::default()` when
    /// the key is absent.
    ///
    /// # Panics
    ///
    /// Panics if the section is present but malformed. See
    /// [`try_section`](AppConfig::try_section).
    pub fn section<T>(key: impl AsRef<str>) -> T
    where
        T: DeserializeOwned + Default,
    {
        let key = key.as_ref();

        Self::try_section(key).unwrap_or_else(|error| {
            panic!(
                "failed to load or parse the application configuration section '{}': {}",
                key, error,
            );
        })
    }

    /// Parses the section under `key` like [`section`](AppConfig::section),
    /// returning malformed input as an error.
    pub fn try_section<T>(key: impl AsRef<str>) -> Result<T, AppConfigError>
    where
        T: DeserializeOwned + Default,
    {
        StaticAppConfig::proxy_config()
            .get(key.as_ref())
            .or_else(|error| match error {
                ConfigError::NotFound(_) => Ok(T::default()),
                _ => Err(AppConfigError::from(error)),
            })
    }

    /// The application name. Defaults to `"app"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The logging section.
    #[cfg(feature = "tracing")]
    pub fn tracing(&self) -> &girder_tracing::TracingConfig {
        &self.tracing
    }

    /// Builds and stores the application configuration. Called once during
    /// boot.
    ///
    /// # Panics
    ///
    /// Panics if the sources cannot be merged, or if called twice.
    pub fn seed(builder: ConfigBuilder<DefaultState>) {
        let proxy_config = builder
            .build()
            .expect("it should be possible to build the application configuration");

        StaticAppConfig::seed(proxy_config);
    }
}
