use clap::ArgMatches;
use clap::parser::ValueSource;
use config::builder::BuilderState;
use config::{ConfigBuilder, ConfigError, Value};
use thiserror::Error;

/// Ties `clap` arguments to config keys, so that flags take part in config
/// resolution.
///
/// An argument given on the command line (or through its `clap` `env`
/// fallback) becomes an **override**, beating every other source. An argument
/// that only carries its `clap` default becomes a **default**, beaten by config
/// files and environment variables. Arguments that are absent altogether leave
/// the key alone.
///
/// ```
/// use clap::{Arg, Command};
/// use config::builder::DefaultState;
/// use config::ConfigBuilder;
/// use girder_config::FlagBindings;
///
/// let mut bindings = FlagBindings::new();
/// let cmd = Command::new("app").arg(Arg::new("port").long("port").default_value("8080"));
/// bindings.bind("web.port", "port");
///
/// let matches = cmd.get_matches_from(["app", "--port", "9000"]);
/// let config = bindings
///     .apply(ConfigBuilder::<DefaultState>::default(), &matches)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(config.get_int("web.port").unwrap(), 9000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlagBindings {
    bindings: Vec<FlagBinding>,
}

#[derive(Debug, Clone)]
struct FlagBinding {
    key: String,
    arg_id: String,
    many: bool,
}

/// Failure to apply [`FlagBindings`].
#[derive(Debug, Error)]
pub enum BindError {
    /// The bound argument is not defined on the `clap` command.
    #[error("failed to bind config key '{key}': unknown argument '{arg_id}'")]
    UnknownArg {
        /// Config key of the binding.
        key: String,
        /// Argument id of the binding.
        arg_id: String,
    },

    /// The `config` builder rejected the key.
    #[error("failed to bind config key '{key}': {source}")]
    Config {
        /// Config key of the binding.
        key: String,
        /// Underlying error.
        #[source]
        source: ConfigError,
    },
}

impl FlagBindings {
    /// Creates an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the single-valued argument `arg_id` to the config `key`.
    pub fn bind(&mut self, key: impl Into<String>, arg_id: impl Into<String>) -> &mut Self {
        self.push(key.into(), arg_id.into(), false)
    }

    /// Binds the multi-valued argument `arg_id` to the config `key`; its values
    /// become a config array.
    pub fn bind_many(&mut self, key: impl Into<String>, arg_id: impl Into<String>) -> &mut Self {
        self.push(key.into(), arg_id.into(), true)
    }

    /// Number of recorded bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Reports whether no bindings are recorded.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The config keys bound so far, in binding order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.key.as_str())
    }

    fn push(&mut self, key: String, arg_id: String, many: bool) -> &mut Self {
        self.bindings.push(FlagBinding { key, arg_id, many });

        self
    }

    /// Applies every binding to the given `builder`, reading values from the
    /// parsed `matches`.
    pub fn apply<St: BuilderState>(
        &self,
        mut builder: ConfigBuilder<St>,
        matches: &ArgMatches,
    ) -> Result<ConfigBuilder<St>, BindError> {
        for binding in &self.bindings {
            let raw = matches
                .try_get_raw(&binding.arg_id)
                .map_err(|_| BindError::UnknownArg {
                    key: binding.key.clone(),
                    arg_id: binding.arg_id.clone(),
                })?;

            let Some(raw) = raw else {
                continue;
            };

            let values = raw
                .map(|value| value.to_string_lossy().into_owned())
                .collect::<Vec<_>>();

            let value = match (binding.many, values.len()) {
                (true, _) => Value::from(values),
                (false, 0) => continue,
                (false, _) => Value::from(values.into_iter().next_back().unwrap_or_default()),
            };

            builder = match matches.value_source(&binding.arg_id) {
                Some(ValueSource::DefaultValue) => builder.set_default(&binding.key, value),
                Some(_) => builder.set_override(&binding.key, value),
                None => continue,
            }
            .map_err(|source| BindError::Config {
                key: binding.key.clone(),
                source,
            })?;
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction, Command};
    use config::builder::DefaultState;
    use pretty_assertions::assert_eq;

    fn command() -> Command {
        Command::new("app")
            .arg(Arg::new("issuer").long("oidc-issuer"))
            .arg(
                Arg::new("lifetime")
                    .long("session-lifetime")
                    .default_value("336h"),
            )
            .arg(
                Arg::new("pkce")
                    .long("oidc-with-pkce")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("scopes")
                    .long("oidc-scopes")
                    .action(ArgAction::Append),
            )
    }

    fn bindings() -> FlagBindings {
        let mut bindings = FlagBindings::new();
        bindings
            .bind("web.oidc.issuer_url", "issuer")
            .bind("web.session.lifetime", "lifetime")
            .bind("web.oidc.with_pkce", "pkce")
            .bind_many("web.oidc.additional_scopes", "scopes");
        bindings
    }

    #[test]
    fn explicit_flags_override_and_defaults_fill_in() {
        // Given
        let matches = command()
            .try_get_matches_from([
                "app",
                "--oidc-issuer",
                "https://id.example.com",
                "--oidc-with-pkce",
                "--oidc-scopes",
                "email",
                "--oidc-scopes",
                "profile",
            ])
            .unwrap();
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_override("web.oidc.issuer_url", "https://overridden.example.com")
            .unwrap();

        // When
        let config = bindings()
            .apply(builder, &matches)
            .unwrap()
            .build()
            .unwrap();

        // Then
        assert_eq!(
            config.get_string("web.oidc.issuer_url").unwrap(),
            "https://id.example.com",
        );
        assert_eq!(config.get_string("web.session.lifetime").unwrap(), "336h");
        assert_eq!(config.get_bool("web.oidc.with_pkce").unwrap(), true);
        assert_eq!(
            config.get::<Vec<String>>("web.oidc.additional_scopes").unwrap(),
            vec!["email".to_string(), "profile".to_string()],
        );
    }

    #[test]
    fn defaults_yield_to_other_sources() {
        // Given
        let matches = command().try_get_matches_from(["app"]).unwrap();
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_override("web.session.lifetime", "1h")
            .unwrap();

        // When
        let config = bindings()
            .apply(builder, &matches)
            .unwrap()
            .build()
            .unwrap();

        // Then
        assert_eq!(config.get_string("web.session.lifetime").unwrap(), "1h");
        assert_eq!(config.get_bool("web.oidc.with_pkce").unwrap(), false);
        assert!(config.get_string("web.oidc.issuer_url").is_err());
    }

    #[test]
    fn unknown_argument_is_reported() {
        // Given
        let matches = command().try_get_matches_from(["app"]).unwrap();
        let mut bindings = FlagBindings::new();
        bindings.bind("web.csrf.dev", "csrf-dev");

        // When
        let error = bindings
            .apply(ConfigBuilder::<DefaultState>::default(), &matches)
            .unwrap_err();

        // Then
        assert_eq!(
            error.to_string(),
            "failed to bind config key 'web.csrf.dev': unknown argument 'csrf-dev'",
        );
    }
}
