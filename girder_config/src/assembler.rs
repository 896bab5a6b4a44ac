use crate::Scanner;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};

/// Stacks the application config sources into one [`ConfigBuilder`]: every
/// file found by the [`Scanner`] in name order, then environment variables
/// on top.
pub struct Assembler;

/// Where the [`Assembler`] looks for config sources.
#[derive(Debug, Clone)]
pub struct AssemblerChoices {
    /// Config directory passed to [`Scanner::find_config_files`].
    pub dir_name: Option<String>,
    /// Whether environment variables override the files.
    pub env_enabled: bool,
    /// Only variables starting with this prefix are read.
    pub env_prefix: Option<String>,
    /// Separates nested keys in variable names.
    pub env_separator: Option<String>,
}

impl Default for AssemblerChoices {
    fn default() -> Self {
        Self {
            dir_name: Some("config".to_string()),
            env_enabled: true,
            env_prefix: Some("APP".to_string()),
            env_separator: Some("_".to_string()),
        }
    }
}

impl Assembler {
    /// Creates the builder described by `choices`. Later sources win, so a
    /// variable beats every file and a file beats the ones sorted before it.
    pub fn make_builder(choices: &AssemblerChoices) -> ConfigBuilder<DefaultState> {
        let builder = Scanner::find_config_files(choices.dir_name.as_deref())
            .into_iter()
            .fold(ConfigBuilder::<DefaultState>::default(), |builder, file| {
                builder.add_source(File::from(file))
            });

        match Self::environment(choices) {
            Some(environment) => builder.add_source(environment),
            None => builder,
        }
    }

    fn environment(choices: &AssemblerChoices) -> Option<Environment> {
        if !choices.env_enabled {
            return None;
        }

        let mut environment = Environment::default();

        if let Some(prefix) = choices.env_prefix.as_deref() {
            environment = environment.prefix(prefix);
        }

        if let Some(separator) = choices.env_separator.as_deref() {
            environment = environment.separator(separator);
        }

        Some(environment)
    }
}
