use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response of the registry service discovery protocol
/// (`/.well-known/terraform.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDiscovery {
    /// Login service.
    #[serde(rename = "login.v1", default, skip_serializing_if = "Option::is_none")]
    pub login_v1: Option<LoginService>,
    /// Module registry endpoint, absolute or relative to the host.
    #[serde(rename = "modules.v1", default, skip_serializing_if = "Option::is_none")]
    pub modules_v1: Option<String>,
    /// Provider registry endpoint.
    #[serde(rename = "providers.v1", default, skip_serializing_if = "Option::is_none")]
    pub providers_v1: Option<String>,
}

/// Response of the Fensak extension discovery document
/// (`/.well-known/terraform_ext_fensak.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FensakExtDiscovery {
    /// Provenance endpoint, absolute or relative to the host.
    #[serde(rename = "provenance.v0", default, skip_serializing_if = "Option::is_none")]
    pub provenance_v0: Option<String>,
}

/// OAuth client details for the registry login protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginService {
    /// Client ID.
    #[serde(default)]
    pub client: String,
    /// Supported grant types.
    #[serde(default)]
    pub grant_types: Vec<String>,
    /// Authorization endpoint.
    #[serde(default)]
    pub authz: String,
    /// Token endpoint.
    #[serde(default)]
    pub token: String,
    /// Loopback ports the CLI may listen on.
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// Response of the module versions endpoint. The registry wraps the version
/// list in a single-element `modules` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersionsResponse {
    /// The wrapped version lists.
    #[serde(default)]
    pub modules: Vec<ModuleVersionList>,
}

/// The available versions of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersionList {
    /// Versions, in registry order.
    #[serde(default)]
    pub versions: Vec<ModuleVersion>,
}

/// One available module version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVersion {
    /// Semantic version string.
    pub version: String,
}

/// An in-toto provenance statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceStatement {
    /// Statement type URI.
    #[serde(rename = "_type")]
    pub statement_type: String,
    /// Attested artifacts.
    #[serde(default)]
    pub subject: Vec<ProvenanceSubject>,
    /// Predicate type URI.
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    /// The provenance predicate, kept as raw JSON.
    #[serde(default)]
    pub predicate: Value,
}

/// An artifact covered by a [`ProvenanceStatement`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSubject {
    /// Artifact name.
    pub name: String,
    /// Digests by algorithm.
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}
