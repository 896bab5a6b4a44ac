use thiserror::Error;

/// Failure of a document collection operation.
#[derive(Debug, Error)]
pub enum DocstoreError {
    /// The collection URL could not be parsed or lacks a required part.
    #[error("invalid collection url '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No opener is registered for the URL scheme.
    #[error("no document collection opener registered for scheme '{0}'")]
    UnsupportedScheme(String),

    /// The document does not carry a string value in the key field.
    #[error("document has no string value in key field '{0}'")]
    MissingKey(String),

    /// A document with the same key already exists.
    #[error("document with key '{0}' already exists")]
    AlreadyExists(String),

    /// A document could not be converted to or from the backend's format.
    #[error("failed to convert document: {0}")]
    Conversion(String),

    /// The backend failed.
    #[cfg(feature = "mongodb")]
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

impl DocstoreError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
