use crate::getter;
use crate::{
    ModulePackage, ModuleVersionList, ModuleVersionsResponse, ServiceDiscovery, TerraformError,
    load_credential_config,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

const TERRAFORM_GET_HEADER: &str = "x-terraform-get";
const SERVICE_DISCOVERY_PATH: &str = ".well-known/terraform.json";

/// Client for the module registry protocol of one registry host.
///
/// Credentials for the host are read from the Terraform CLI config and sent
/// as a bearer token.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: RegistryHttp,
    modules_endpoint: Url,
}

impl RegistryClient {
    /// Discovers the module registry endpoint of `host`.
    pub async fn new(host: impl AsRef<str>) -> Result<Self, TerraformError> {
        let host = host.as_ref();
        let http = RegistryHttp::for_host(host)?;
        let base_url = host_base_url(host)?;

        Self::with_base_url(http, base_url).await
    }

    pub(crate) async fn with_base_url(
        http: RegistryHttp,
        base_url: Url,
    ) -> Result<Self, TerraformError> {
        let discovery = http
            .discover::<ServiceDiscovery>(&base_url, SERVICE_DISCOVERY_PATH)
            .await?;

        let endpoint = discovery
            .modules_v1
            .ok_or(TerraformError::MissingService("modules.v1"))?;
        let modules_endpoint = resolve_endpoint(&base_url, &endpoint)?;

        debug!(endpoint = %modules_endpoint, "Discovered module registry endpoint");

        Ok(Self {
            http,
            modules_endpoint,
        })
    }

    /// The resolved `modules.v1` endpoint.
    pub fn modules_endpoint(&self) -> &Url {
        &self.modules_endpoint
    }

    /// Lists the available versions of `module`.
    pub async fn get_versions(
        &self,
        module: &ModulePackage,
    ) -> Result<ModuleVersionList, TerraformError> {
        let url = module_url(&self.modules_endpoint, module, &["versions"])?;

        let response = self.http.get(url).send().await?;
        let response = expect_status(response, StatusCode::OK, "listing module versions").await?;
        let versions = response.json::<ModuleVersionsResponse>().await?;

        versions
            .modules
            .into_iter()
            .next()
            .ok_or_else(|| TerraformError::NoVersions(module.to_string()))
    }

    /// Downloads `version` of `module` into `destination`, which must be
    /// missing or empty.
    pub async fn download_to_path(
        &self,
        module: &ModulePackage,
        version: &str,
        destination: impl AsRef<Path>,
    ) -> Result<(), TerraformError> {
        let destination = destination.as_ref();
        getter::ensure_empty_destination(destination).await?;

        let url = module_url(&self.modules_endpoint, module, &[version, "download"])?;

        let response = self.http.get(url.clone()).send().await?;
        let response =
            expect_status(response, StatusCode::NO_CONTENT, "fetching module download url").await?;
        let source = download_source(response.headers(), &url)?;

        debug!(
            module = %module,
            version = version,
            source = source.as_str(),
            "Resolved module download source",
        );

        getter::fetch(&source, destination).await
    }
}

/// HTTP client that authenticates against one registry host.
#[derive(Debug, Clone)]
pub(crate) struct RegistryHttp {
    client: Client,
    token: Option<String>,
}

impl RegistryHttp {
    pub(crate) fn new(token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            token,
        }
    }

    pub(crate) fn for_host(host: &str) -> Result<Self, TerraformError> {
        let token = load_credential_config()?
            .and_then(|config| config.token(host).map(str::to_string));

        if token.is_some() {
            debug!(host = host, "Using Terraform CLI credentials for registry");
        }

        Ok(Self::new(token))
    }

    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);

        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub(crate) async fn discover<T: DeserializeOwned>(
        &self,
        base_url: &Url,
        path: &str,
    ) -> Result<T, TerraformError> {
        let url = base_url
            .join(path)
            .map_err(|error| TerraformError::InvalidEndpoint {
                url: path.to_string(),
                reason: error.to_string(),
            })?;

        let response = self.get(url).send().await?;
        let response = expect_status(response, StatusCode::OK, "discovering services").await?;

        Ok(response.json::<T>().await?)
    }
}

pub(crate) fn host_base_url(host: &str) -> Result<Url, TerraformError> {
    let url = format!("https://{host}/");

    Url::parse(&url).map_err(|error| TerraformError::InvalidEndpoint {
        url,
        reason: error.to_string(),
    })
}

/// Resolves a discovered endpoint, which may be relative to the host.
pub(crate) fn resolve_endpoint(base_url: &Url, endpoint: &str) -> Result<Url, TerraformError> {
    let mut url = base_url
        .join(endpoint)
        .map_err(|error| TerraformError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: error.to_string(),
        })?;

    if url.cannot_be_a_base() {
        return Err(TerraformError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: "not a hierarchical url".to_string(),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// `{endpoint}/{namespace}/{name}/{system}/{suffix...}`.
pub(crate) fn module_url(
    endpoint: &Url,
    module: &ModulePackage,
    suffix: &[&str],
) -> Result<Url, TerraformError> {
    let mut url = endpoint.clone();

    url.path_segments_mut()
        .map_err(|()| TerraformError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: "cannot be a base url".to_string(),
        })?
        .pop_if_empty()
        .extend([
            module.namespace.as_str(),
            module.name.as_str(),
            module.target_system.as_str(),
        ])
        .extend(suffix);

    Ok(url)
}

pub(crate) async fn expect_status(
    response: Response,
    expected: StatusCode,
    action: &str,
) -> Result<Response, TerraformError> {
    if response.status() == expected {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    Err(TerraformError::UnexpectedStatus {
        action: action.to_string(),
        status,
        body,
    })
}

fn download_source(headers: &HeaderMap, download_url: &Url) -> Result<String, TerraformError> {
    let source = headers
        .get(TERRAFORM_GET_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(TerraformError::MissingDownloadSource)?;

    // Relative locations resolve against the download url
    if ["/", "./", "../"].iter().any(|prefix| source.starts_with(prefix)) {
        let resolved = download_url
            .join(source)
            .map_err(|error| TerraformError::InvalidEndpoint {
                url: source.to_string(),
                reason: error.to_string(),
            })?;

        return Ok(resolved.to_string());
    }

    Ok(source.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_registry_source;
    use pretty_assertions::assert_eq;

    fn consul() -> ModulePackage {
        parse_registry_source("hashicorp/consul/aws").unwrap().package
    }

    async fn client(server: &mut mockito::ServerGuard, modules: &str) -> RegistryClient {
        server
            .mock("GET", "/.well-known/terraform.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"modules.v1": "{modules}"}}"#))
            .create_async()
            .await;

        let base_url = Url::parse(&format!("{}/", server.url())).unwrap();

        RegistryClient::with_base_url(RegistryHttp::new(Some("t0ken".to_string())), base_url)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_relative_modules_endpoint() {
        // Given
        let mut server = mockito::Server::new_async().await;

        // When
        let client = client(&mut server, "/v1/modules").await;

        // Then
        assert_eq!(
            client.modules_endpoint().as_str(),
            format!("{}/v1/modules/", server.url()),
        );
    }

    #[tokio::test]
    async fn missing_modules_service_is_an_error() {
        // Given
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/.well-known/terraform.json")
            .with_status(200)
            .with_body(r#"{"providers.v1": "/v1/providers/"}"#)
            .create_async()
            .await;
        let base_url = Url::parse(&format!("{}/", server.url())).unwrap();

        // When
        let error = RegistryClient::with_base_url(RegistryHttp::new(None), base_url)
            .await
            .unwrap_err();

        // Then
        assert_eq!(error.to_string(), "no modules.v1 key in services list");
    }

    #[tokio::test]
    async fn lists_versions_with_credentials() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let client = client(&mut server, "/v1/modules/").await;
        let versions = server
            .mock("GET", "/v1/modules/hashicorp/consul/aws/versions")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_body(r#"{"modules": [{"versions": [{"version": "0.11.0"}, {"version": "0.10.0"}]}]}"#)
            .create_async()
            .await;

        // When
        let list = client.get_versions(&consul()).await.unwrap();

        // Then
        versions.assert_async().await;
        assert_eq!(
            list.versions
                .iter()
                .map(|version| version.version.as_str())
                .collect::<Vec<_>>(),
            vec!["0.11.0", "0.10.0"],
        );
    }

    #[tokio::test]
    async fn empty_version_list_is_an_error() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let client = client(&mut server, "/v1/modules/").await;
        server
            .mock("GET", "/v1/modules/hashicorp/consul/aws/versions")
            .with_status(200)
            .with_body(r#"{"modules": []}"#)
            .create_async()
            .await;

        // When
        let error = client.get_versions(&consul()).await.unwrap_err();

        // Then
        assert_eq!(
            error.to_string(),
            "registry returned no versions for module registry.terraform.io/hashicorp/consul/aws",
        );
    }

    #[tokio::test]
    async fn unexpected_status_carries_the_body() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let client = client(&mut server, "/v1/modules/").await;
        server
            .mock("GET", "/v1/modules/hashicorp/consul/aws/versions")
            .with_status(404)
            .with_body("module not found")
            .create_async()
            .await;

        // When
        let error = client.get_versions(&consul()).await.unwrap_err();

        // Then
        assert_eq!(
            error.to_string(),
            "error listing module versions: status 404: module not found",
        );
    }

    #[tokio::test]
    async fn download_requires_terraform_get_header() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let client = client(&mut server, "/v1/modules/").await;
        server
            .mock("GET", "/v1/modules/hashicorp/consul/aws/0.11.0/download")
            .with_status(204)
            .create_async()
            .await;
        let destination =
            std::env::temp_dir().join(format!("girder-download-{}", uuid::Uuid::new_v4()));

        // When
        let error = client
            .download_to_path(&consul(), "0.11.0", &destination)
            .await
            .unwrap_err();

        // Then
        assert!(matches!(error, TerraformError::MissingDownloadSource));
    }

    #[tokio::test]
    async fn download_rejects_unsupported_getter() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let client = client(&mut server, "/v1/modules/").await;
        server
            .mock("GET", "/v1/modules/hashicorp/consul/aws/0.11.0/download")
            .with_status(204)
            .with_header("X-Terraform-Get", "s3::https://s3.amazonaws.com/bucket/consul.zip")
            .create_async()
            .await;
        let destination =
            std::env::temp_dir().join(format!("girder-download-{}", uuid::Uuid::new_v4()));

        // When
        let error = client
            .download_to_path(&consul(), "0.11.0", &destination)
            .await
            .unwrap_err();

        // Then
        assert_eq!(error.to_string(), "unsupported module source getter 's3'");
    }

    #[test]
    fn relative_download_source_resolves_against_download_url() {
        // Given
        let mut headers = HeaderMap::new();
        headers.insert(TERRAFORM_GET_HEADER, "./archive.tar.gz".parse().unwrap());
        let url = Url::parse("https://registry.example.com/v1/modules/a/b/c/1.0.0/download").unwrap();

        // When
        let source = download_source(&headers, &url).unwrap();

        // Then
        assert_eq!(
            source,
            "https://registry.example.com/v1/modules/a/b/c/1.0.0/archive.tar.gz",
        );
    }

    #[test]
    fn module_url_extends_endpoint() {
        // Given
        let endpoint = Url::parse("https://registry.example.com/v1/modules/").unwrap();
        let opaque = Url::parse("mailto:registry@example.com").unwrap();

        // When
        let url = module_url(&endpoint, &consul(), &["0.1.0", "download"]).unwrap();
        let error = module_url(&opaque, &consul(), &["versions"]).unwrap_err();

        // Then
        assert_eq!(
            url.as_str(),
            "https://registry.example.com/v1/modules/hashicorp/consul/aws/0.1.0/download",
        );
        assert_eq!(
            error.to_string(),
            "invalid service endpoint 'mailto:registry@example.com': cannot be a base url",
        );
    }
}
