use crate::TerraformError;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

/// Registry host assumed for addresses without one.
pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile(r"^[0-9A-Za-z](?:[0-9A-Za-z_-]{0,62}[0-9A-Za-z])?$"));
static SYSTEM_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile(r"^[0-9a-z]{1,64}$"));
static FORCED_GETTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile(r"^([A-Za-z0-9]+)::(.+)$"));
static SCP_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+:[^/]"));

// Only called with the literal patterns above
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("it should be possible to compile a built-in source pattern")
}

/// How Terraform fetches a module source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerraformModSrcType {
    /// Not recognized.
    Unknown,
    /// A local path.
    Local,
    /// A module registry address.
    Registry,
    /// A git repository.
    Git,
    /// A Mercurial repository.
    Hg,
    /// An S3 bucket.
    S3,
    /// A GCS bucket.
    Gcs,
    /// An HTTP(S) URL.
    Http,
}

impl Display for TerraformModSrcType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Registry => "registry",
            Self::Git => "git",
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Http => "http",
            // hg is reported as unknown
            Self::Unknown | Self::Hg => "unknown",
        })
    }
}

/// A module package in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePackage {
    /// Registry hostname, lowercase.
    pub host: String,
    /// Owning namespace.
    pub namespace: String,
    /// Module name.
    pub name: String,
    /// Target system, e.g. `aws`.
    pub target_system: String,
}

impl Display for ModulePackage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.host, self.namespace, self.name, self.target_system,
        )
    }
}

/// A registry module address, optionally pointing into a subdirectory of the
/// package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleSource {
    /// The package.
    pub package: ModulePackage,
    /// Subdirectory inside the package; empty for the package root.
    pub subdir: String,
}

impl Display for ModuleSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.package)?;

        if !self.subdir.is_empty() {
            write!(f, "//{}", self.subdir)?;
        }

        Ok(())
    }
}

/// Parses a registry module address: `[host/]namespace/name/system[//subdir]`.
pub fn parse_registry_source(source: &str) -> Result<ModuleSource, TerraformError> {
    let invalid = |reason: &str| TerraformError::InvalidRegistrySource {
        source_addr: source.to_string(),
        reason: reason.to_string(),
    };

    if source.contains("::") {
        return Err(invalid("forced getters are not registry addresses"));
    }
    if source.contains('?') {
        return Err(invalid("registry addresses cannot have query strings"));
    }

    let (package, subdir) = match source.split_once("//") {
        Some((package, subdir)) => (package, subdir.trim_matches('/')),
        None => (source, ""),
    };

    let parts = package.split('/').collect::<Vec<_>>();
    let (host, namespace, name, system) = match parts.as_slice() {
        [namespace, name, system] => {
            (DEFAULT_REGISTRY_HOST.to_string(), *namespace, *name, *system)
        }
        [host, namespace, name, system] => {
            let host = parse_host(host).ok_or_else(|| invalid("invalid host"))?;
            (host, *namespace, *name, *system)
        }
        _ => {
            return Err(invalid(
                "expected namespace/name/system, optionally prefixed by host",
            ));
        }
    };

    if host == "github.com" || host == "bitbucket.org" {
        return Err(invalid("source control hosts are not module registries"));
    }
    if !NAME_PATTERN.is_match(namespace) {
        return Err(invalid("invalid namespace"));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(invalid("invalid module name"));
    }
    if !SYSTEM_PATTERN.is_match(system) {
        return Err(invalid("invalid target system"));
    }

    Ok(ModuleSource {
        package: ModulePackage {
            host,
            namespace: namespace.to_string(),
            name: name.to_string(),
            target_system: system.to_string(),
        },
        subdir: subdir.to_string(),
    })
}

fn parse_host(host: &str) -> Option<String> {
    let (hostname, port) = match host.rsplit_once(':') {
        Some((hostname, port)) => (hostname, Some(port)),
        None => (host, None),
    };

    let valid_label =
        |label: &str| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    let valid_hostname = hostname.split('.').all(valid_label);
    let valid_port =
        port.is_none_or(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()));

    (valid_hostname && valid_port).then(|| host.to_ascii_lowercase())
}

/// Classifies a module `source` the way Terraform picks a fetcher: local
/// paths first, then registry addresses, then the go-getter detectors.
pub fn get_terraform_mod_src_type(source: &str) -> TerraformModSrcType {
    if is_local_source(source) {
        return TerraformModSrcType::Local;
    }

    if parse_registry_source(source).is_ok() {
        return TerraformModSrcType::Registry;
    }

    getter_source_type(source)
}

fn is_local_source(source: &str) -> bool {
    let slashed = source.replace('\\', "/");

    slashed.starts_with("./") || slashed.starts_with("../")
}

/// Splits a forced getter prefix (`git::`, `s3::`, ...) off `source`.
pub(crate) fn split_forced_getter(source: &str) -> Option<(&str, &str)> {
    let captures = FORCED_GETTER_PATTERN.captures(source)?;

    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

pub(crate) fn getter_source_type(source: &str) -> TerraformModSrcType {
    if let Some((getter, _)) = split_forced_getter(source) {
        return match getter {
            "git" => TerraformModSrcType::Git,
            "hg" => TerraformModSrcType::Hg,
            "s3" => TerraformModSrcType::S3,
            "gcs" => TerraformModSrcType::Gcs,
            "http" | "https" => TerraformModSrcType::Http,
            "file" => TerraformModSrcType::Local,
            _ => TerraformModSrcType::Unknown,
        };
    }

    let host = source.split('/').next().unwrap_or_default();

    if host.ends_with("amazonaws.com") && host.contains("s3") {
        return TerraformModSrcType::S3;
    }

    if source.starts_with("www.googleapis.com/storage/") {
        return TerraformModSrcType::Gcs;
    }

    if ["github.com/", "gitlab.com/", "bitbucket.org/"]
        .iter()
        .any(|prefix| source.starts_with(prefix))
        || SCP_PATTERN.is_match(source)
    {
        return TerraformModSrcType::Git;
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        return TerraformModSrcType::Http;
    }

    if source.starts_with("file://") || is_absolute_path(source) {
        return TerraformModSrcType::Local;
    }

    TerraformModSrcType::Unknown
}

fn is_absolute_path(source: &str) -> bool {
    let mut chars = source.chars();

    match (chars.next(), chars.next(), chars.next()) {
        (Some('/'), _, _) => true,
        (Some(drive), Some(':'), Some('\\' | '/')) => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn built_in_patterns_compile() {
        assert!(NAME_PATTERN.is_match("consul"));
        assert!(SYSTEM_PATTERN.is_match("aws"));
        assert!(FORCED_GETTER_PATTERN.is_match("git::https://example.com/vpc.git"));
        assert!(SCP_PATTERN.is_match("git@github.com:org/vpc.git"));
    }

    #[test]
    fn classifies_sources() {
        let cases = [
            ("./consul", TerraformModSrcType::Local),
            ("./multi/levels/deep/consul", TerraformModSrcType::Local),
            (".\\windows\\path", TerraformModSrcType::Local),
            ("..\\windows\\path\\multilevel", TerraformModSrcType::Local),
            ("../multi/level", TerraformModSrcType::Local),
            ("hashicorp/consul/aws", TerraformModSrcType::Registry),
            ("app.terraform.io/example-corp/k8s-cluster/azurerm", TerraformModSrcType::Registry),
            ("hashicorp/consul/aws//modules/consul-cluster", TerraformModSrcType::Registry),
            ("github.com/yorinasub17/foo", TerraformModSrcType::Git),
            ("github.com/yorinasub17/foo//some/module/dir", TerraformModSrcType::Git),
            ("gitlab.com/yorinasub17/foo", TerraformModSrcType::Git),
            ("gitlab.com/yorinasub17/foo//some/module/dir", TerraformModSrcType::Git),
            ("bucket.s3.amazonaws.com/yorinasub17", TerraformModSrcType::S3),
            ("www.googleapis.com/storage/v1/bucket/yorinasub17", TerraformModSrcType::Gcs),
            ("/Users/yorinasub17/terraform/modules", TerraformModSrcType::Local),
            ("https://some.url.com/yorinasub17/modules", TerraformModSrcType::Http),
            ("http://some.url.com/yorinasub17/modules", TerraformModSrcType::Http),
            ("https://some.url.com/yorinasub17/modules//*", TerraformModSrcType::Http),
            ("git@github.com:yorinasub17/foo.git", TerraformModSrcType::Git),
            ("git@github.com:yorinasub17/foo.git?ref=test-branch", TerraformModSrcType::Git),
            ("git@github.com:yorinasub17/foo.git//bar", TerraformModSrcType::Git),
            ("git@custom.git.com:yorinasub17/foo.git", TerraformModSrcType::Git),
            ("git::ssh://git@github.com:2222/yorinasub17/foo.git", TerraformModSrcType::Git),
            ("hg::http://example.com/repo", TerraformModSrcType::Hg),
            ("s3::https://s3.amazonaws.com/bucket/module.zip", TerraformModSrcType::S3),
            ("file:///opt/modules/vpc", TerraformModSrcType::Local),
            ("consul", TerraformModSrcType::Unknown),
        ];

        for (source, expected) in cases {
            assert_eq!(get_terraform_mod_src_type(source), expected, "source {source}");
        }
    }

    #[test]
    fn hg_displays_as_unknown() {
        assert_eq!(TerraformModSrcType::Hg.to_string(), "unknown");
        assert_eq!(TerraformModSrcType::Gcs.to_string(), "gcs");
    }

    #[test]
    fn parses_registry_addresses() {
        // When
        let short = parse_registry_source("hashicorp/consul/aws").unwrap();
        let full = parse_registry_source("App.Terraform.io/example-corp/k8s-cluster/azurerm//modules/nodes").unwrap();

        // Then
        assert_eq!(short.to_string(), "registry.terraform.io/hashicorp/consul/aws");
        assert_eq!(full.package.host, "app.terraform.io");
        assert_eq!(full.package.namespace, "example-corp");
        assert_eq!(full.subdir, "modules/nodes");
        assert_eq!(
            full.to_string(),
            "app.terraform.io/example-corp/k8s-cluster/azurerm//modules/nodes",
        );
    }

    #[test]
    fn rejects_non_registry_addresses() {
        for source in [
            "github.com/hashicorp/example/aws",
            "hashicorp/consul/AWS",
            "hashicorp/consul",
            "git::hashicorp/consul/aws",
            "hashicorp/consul/aws?ref=v1",
            "-bad/consul/aws",
        ] {
            assert!(parse_registry_source(source).is_err(), "source {source}");
        }
    }
}
