#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements [`TerraformError`].
mod error;
pub use self::error::TerraformError;

/// Implements registry addresses and module source classification.
mod source_type;
pub use self::source_type::{
    DEFAULT_REGISTRY_HOST, ModulePackage, ModuleSource, TerraformModSrcType,
    get_terraform_mod_src_type, parse_registry_source,
};

/// Implements the registry protocol payloads.
mod types;
pub use self::types::{
    FensakExtDiscovery, LoginService, ModuleVersion, ModuleVersionList, ModuleVersionsResponse,
    ProvenanceStatement, ProvenanceSubject, ServiceDiscovery,
};

/// Implements the Terraform CLI credential config.
mod credentials;
pub use self::credentials::{CredentialConfig, load_credential_config};

/// Implements module source fetching.
mod getter;

/// Implements [`RegistryClient`].
mod registry_client;
pub use self::registry_client::RegistryClient;

/// Implements [`FensakExtClient`].
mod provenance_client;
pub use self::provenance_client::{FensakExtClient, registry_supports_fensak_ext};

/// Implements [`find_terraform_modules`].
mod modules;
pub use self::modules::find_terraform_modules;
