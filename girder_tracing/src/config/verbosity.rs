use serde::Deserialize;
use tracing_core::LevelFilter as TracingLevelFilter;

/// A deserializable stand-in for the `tracing` crate's
/// [`LevelFilter`](TracingLevelFilter).
///
/// A level is “higher” when it is more verbose: [`Trace`](Verbosity::Trace) is
/// higher than [`Error`](Verbosity::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Log **nothing**.
    #[serde(alias = "no", alias = "OFF")]
    Off,

    /// Log at level [`ERROR`](tracing_core::metadata::Level::ERROR) only.
    #[serde(alias = "err", alias = "ERROR")]
    Error,

    /// Log at level [`WARN`](tracing_core::metadata::Level::WARN) and lower.
    #[serde(alias = "warning", alias = "WARN")]
    Warn,

    /// Log at level [`INFO`](tracing_core::metadata::Level::INFO) and lower.
    #[default]
    #[serde(alias = "INFO")]
    Info,

    /// Log at level [`DEBUG`](tracing_core::metadata::Level::DEBUG) and lower.
    #[serde(alias = "DEBUG")]
    Debug,

    /// Log **everything**.
    #[serde(alias = "TRACE")]
    Trace,
}

impl Verbosity {
    /// Translates this level to the `tracing` crate's
    /// [`LevelFilter`](TracingLevelFilter).
    pub fn to_tracing_level_filter(&self) -> TracingLevelFilter {
        match self {
            Self::Off => TracingLevelFilter::OFF,
            Self::Error => TracingLevelFilter::ERROR,
            Self::Warn => TracingLevelFilter::WARN,
            Self::Info => TracingLevelFilter::INFO,
            Self::Debug => TracingLevelFilter::DEBUG,
            Self::Trace => TracingLevelFilter::TRACE,
        }
    }
}

impl From<Verbosity> for TracingLevelFilter {
    fn from(value: Verbosity) -> Self {
        value.to_tracing_level_filter()
    }
}

impl From<&Verbosity> for TracingLevelFilter {
    fn from(value: &Verbosity) -> Self {
        value.to_tracing_level_filter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn aliases() {
        // Given
        let input = "[no, err, warning, INFO, debug, trace]";

        // When
        let levels = serde_yml::from_str::<Vec<Verbosity>>(input).unwrap();

        // Then
        assert_eq!(
            levels,
            vec![
                Verbosity::Off,
                Verbosity::Error,
                Verbosity::Warn,
                Verbosity::Info,
                Verbosity::Debug,
                Verbosity::Trace,
            ],
        );
    }

    #[test]
    fn ordering_follows_verbosity() {
        assert!(Verbosity::Trace > Verbosity::Error);
        assert!(Verbosity::Warn < Verbosity::Info);
        assert_eq!(
            TracingLevelFilter::from(Verbosity::Debug),
            TracingLevelFilter::DEBUG,
        );
    }

    #[test]
    fn unknown_level_is_rejected() {
        // When
        let result = serde_yml::from_str::<Verbosity>("loud");

        // Then
        assert!(result.is_err());
    }
}
