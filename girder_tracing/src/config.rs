use crate::{FormatFlavor, LogOutput, Verbosity};
use serde::Deserialize;
use std::collections::BTreeMap;

pub mod flavor;
pub mod output;
pub mod verbosity;

/// The application logging section: verbosity, output format and
/// destination of the [formatted layer](tracing_subscriber::fmt::Layer).
///
/// Every key is optional. Keys have a few accepted spellings (`verbosity` or
/// `level`, `flavor` or `flavour`, `show_file` or `with_file`, and so on).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    #[serde(alias = "level", alias = "lvl")]
    verbosity: Verbosity,
    #[serde(alias = "flavour", alias = "format")]
    flavor: FormatFlavor,
    #[serde(alias = "colour", alias = "with_color", alias = "show_color")]
    color: bool,
    #[serde(alias = "with_timestamp")]
    show_timestamp: bool,
    #[serde(alias = "with_target")]
    show_target: bool,
    #[serde(alias = "with_file")]
    show_file: bool,
    #[serde(alias = "show_line", alias = "with_line_number")]
    show_line_number: bool,
    #[serde(alias = "with_level")]
    show_level: bool,
    #[serde(alias = "with_thread_id")]
    show_thread_id: bool,
    #[serde(alias = "with_thread_name")]
    show_thread_name: bool,
    #[cfg(feature = "json")]
    #[serde(alias = "flat_json")]
    flatten_json: bool,
    #[serde(alias = "output_path", alias = "output_paths")]
    output: LogOutput,
    #[serde(alias = "target_verbosity")]
    targets: BTreeMap<String, Verbosity>,
}

impl TracingConfig {
    /// Preset for tests: `debug` verbosity, compact single-line output
    /// without color or timestamps.
    pub fn for_test() -> Self {
        Self {
            verbosity: Verbosity::Debug,
            flavor: FormatFlavor::Compact,
            color: false,
            show_timestamp: false,
            show_thread_id: false,
            ..Self::default()
        }
    }

    /// Replaces the root [verbosity level](Verbosity).
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;

        self
    }

    /// Replaces the [output destination](LogOutput).
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;

        self
    }

    /// Merges an extra per-target [`Verbosity`] level into this config.
    pub fn with_target(
        mut self,
        target: impl Into<String>,
        verbosity: impl Into<Verbosity>,
    ) -> Self {
        self.targets.insert(target.into(), verbosity.into());

        self
    }

    /// Merges extra per-target [`Verbosity`] levels into this config.
    pub fn with_targets<T, L>(mut self, targets: impl IntoIterator<Item = (T, L)>) -> Self
    where
        T: Into<String>,
        L: Into<Verbosity>,
    {
        for (target, verbosity) in targets {
            self.targets.insert(target.into(), verbosity.into());
        }

        self
    }
}

impl TracingConfig {
    /// Root verbosity level.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Event formatting flavor.
    pub fn flavor(&self) -> FormatFlavor {
        self.flavor
    }

    /// Whether the output is colored with ANSI escapes.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Whether each event starts with a timestamp.
    pub fn show_timestamp(&self) -> bool {
        self.show_timestamp
    }

    /// Whether each event shows its target.
    pub fn show_target(&self) -> bool {
        self.show_target
    }

    /// Whether each event shows its source file.
    pub fn show_file(&self) -> bool {
        self.show_file
    }

    /// Whether each event shows its source line number.
    pub fn show_line_number(&self) -> bool {
        self.show_line_number
    }

    /// Whether each event shows its level.
    pub fn show_level(&self) -> bool {
        self.show_level
    }

    /// Whether each event shows the emitting thread's ID.
    pub fn show_thread_id(&self) -> bool {
        self.show_thread_id
    }

    /// Whether each event shows the emitting thread's name.
    pub fn show_thread_name(&self) -> bool {
        self.show_thread_name
    }

    /// Whether JSON events put their fields at the top level.
    #[cfg(feature = "json")]
    pub fn flatten_json(&self) -> bool {
        self.flatten_json
    }

    /// Where events are written.
    pub fn output(&self) -> &LogOutput {
        &self.output
    }

    /// Per-target verbosity overrides.
    pub fn targets(&self) -> &BTreeMap<String, Verbosity> {
        &self.targets
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            flavor: FormatFlavor::default(),
            color: true,
            show_timestamp: true,
            show_target: true,
            show_file: false,
            show_line_number: false,
            show_level: true,
            show_thread_id: true,
            show_thread_name: false,
            #[cfg(feature = "json")]
            flatten_json: true,
            output: LogOutput::default(),
            targets: BTreeMap::default(),
        }
    }
}

impl AsRef<TracingConfig> for TracingConfig {
    fn as_ref(&self) -> &TracingConfig {
        self
    }
}
