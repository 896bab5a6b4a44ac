use std::path::PathBuf;
use thiserror::Error;

/// Failure of a Terraform helper.
#[derive(Debug, Error)]
pub enum TerraformError {
    /// The HTTP request failed.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry's service discovery document lacks a service.
    #[error("no {0} key in services list")]
    MissingService(&'static str),

    /// A discovered service endpoint is not a valid URL.
    #[error("invalid service endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// The offending endpoint.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The registry answered with an unexpected status.
    #[error("error {action}: status {status}: {body}")]
    UnexpectedStatus {
        /// What was attempted.
        action: String,
        /// The response status code.
        status: u16,
        /// The response body.
        body: String,
    },

    /// The registry listed no versions for a module.
    #[error("registry returned no versions for module {0}")]
    NoVersions(String),

    /// The download response lacks the `X-Terraform-Get` header.
    #[error("no X-Terraform-Get header in download response")]
    MissingDownloadSource,

    /// A source string is not a registry address.
    #[error("invalid registry module source '{source_addr}': {reason}")]
    InvalidRegistrySource {
        /// The offending source.
        source_addr: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The download destination exists and is not empty.
    #[error("destination '{}' is not empty", .0.display())]
    DestinationNotEmpty(PathBuf),

    /// The module source uses a getter that cannot be fetched.
    #[error("unsupported module source getter '{0}'")]
    UnsupportedGetter(String),

    /// A git source names a reference that could be mistaken for a `git`
    /// option.
    #[error("invalid git reference '{0}'")]
    InvalidGitRef(String),

    /// The `git` CLI failed.
    #[error("git {command} failed: {stderr}")]
    Git {
        /// The git subcommand.
        command: &'static str,
        /// Captured standard error.
        stderr: String,
    },

    /// The Terraform CLI config could not be parsed.
    #[error("failed to parse terraform cli config '{}': {source}", path.display())]
    CliConfig {
        /// The config file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: hcl::Error,
    },

    /// An exclude pattern is not a valid regex.
    #[error("invalid exclude pattern: {0}")]
    InvalidExclude(#[from] regex::Error),

    /// A walked path does not lie under the walk root.
    #[error("path '{}' is outside of '{}'", path.display(), root.display())]
    OutsideRoot {
        /// The walked path.
        path: PathBuf,
        /// The walk root.
        root: PathBuf,
    },

    /// Walking a directory tree failed.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
