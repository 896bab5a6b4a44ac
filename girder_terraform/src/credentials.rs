use crate::TerraformError;
use hcl::Body;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CLI_CONFIG_ENV: &str = "TF_CLI_CONFIG_FILE";

/// The `credentials` blocks of the Terraform CLI config: registry host to
/// API token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialConfig {
    tokens: HashMap<String, String>,
}

impl CredentialConfig {
    /// Parses CLI config text. Blocks other than `credentials` are ignored,
    /// as are `credentials` blocks without a host label or a string `token`.
    pub fn parse(input: &str) -> Result<Self, hcl::Error> {
        let body: Body = hcl::from_str(input)?;
        let mut tokens = HashMap::new();

        for block in body.blocks().filter(|block| block.identifier() == "credentials") {
            let Some(host) = block.labels().first() else {
                warn!("Ignoring credentials block without a host label");
                continue;
            };

            let token = block
                .body()
                .attributes()
                .find(|attribute| attribute.key() == "token")
                .and_then(|attribute| match attribute.expr() {
                    hcl::Expression::String(token) => Some(token.clone()),
                    _ => None,
                });

            match token {
                Some(token) => {
                    tokens.insert(host.as_str().to_ascii_lowercase(), token);
                }
                None => warn!(host = host.as_str(), "Ignoring credentials block without a string token"),
            }
        }

        Ok(Self { tokens })
    }

    /// The token for the given registry host.
    pub fn token(&self, host: &str) -> Option<&str> {
        self.tokens
            .get(&host.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of configured hosts.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Reports whether no host is configured.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Loads the credentials of the Terraform CLI config.
///
/// The first regular file among `$TF_CLI_CONFIG_FILE` and the per-user
/// config (`$HOME/.terraformrc`, or `%APPDATA%/terraform.rc` on Windows) is
/// used. Finding none is not an error.
pub fn load_credential_config() -> Result<Option<CredentialConfig>, TerraformError> {
    load_credential_config_from(&search_paths())
}

pub(crate) fn load_credential_config_from(
    paths: &[PathBuf],
) -> Result<Option<CredentialConfig>, TerraformError> {
    let Some(path) = paths.iter().find(|path| path.is_file()) else {
        return Ok(None);
    };

    debug!(path = %path.display(), "Loading Terraform CLI credentials");

    let input = std::fs::read_to_string(path)?;
    let config = CredentialConfig::parse(&input).map_err(|source| TerraformError::CliConfig {
        path: path.clone(),
        source,
    })?;

    Ok(Some(config))
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(custom) = std::env::var_os(CLI_CONFIG_ENV).filter(|custom| !custom.is_empty()) {
        paths.push(PathBuf::from(custom));
    }

    if let Some(user_config) = user_config_path() {
        paths.push(user_config);
    }

    paths
}

#[cfg(windows)]
fn user_config_path() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(|appdata| Path::new(&appdata).join("terraform.rc"))
}

#[cfg(not(windows))]
fn user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".terraformrc"))
}
