use serde::Deserialize;
use std::path::PathBuf;

/// Destination of formatted log events.
///
/// Deserializes from a single string: `stdout`, `stderr`, or anything else,
/// which is taken as a file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// A file, opened for appending and created if missing.
    File(PathBuf),
}

impl From<String> for LogOutput {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "stdout" | "-" => Self::Stdout,
            "stderr" => Self::Stderr,
            _ => Self::File(PathBuf::from(value)),
        }
    }
}

impl From<&str> for LogOutput {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}
