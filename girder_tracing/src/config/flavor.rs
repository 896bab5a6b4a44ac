use serde::Deserialize;

/// Layout of each event written by the layer from [`make_layer`](crate::make_layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFlavor {
    /// One line per event with the full span context.
    #[default]
    #[serde(alias = "default", alias = "FULL")]
    Full,

    /// One line per event, span fields folded into the event fields.
    #[serde(alias = "COMPACT")]
    Compact,

    /// Several indented lines per event.
    #[serde(alias = "PRETTY")]
    Pretty,

    /// One JSON object per line.
    #[cfg(feature = "json")]
    #[serde(alias = "JSON")]
    Json,
}

impl FormatFlavor {
    /// Whether events are meant for a log pipeline rather than a terminal.
    /// Such output never carries color escape codes.
    pub fn is_machine_readable(self) -> bool {
        #[cfg(feature = "json")]
        if self == Self::Json {
            return true;
        }

        false
    }
}
