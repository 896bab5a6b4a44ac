use crate::registry_client::{
    RegistryHttp, expect_status, host_base_url, module_url, resolve_endpoint,
};
use crate::{FensakExtDiscovery, ModulePackage, ProvenanceStatement, TerraformError};
use reqwest::{StatusCode, Url};
use tracing::debug;

const FENSAK_DISCOVERY_PATH: &str = ".well-known/terraform_ext_fensak.json";

/// Reports whether `host` publishes the Fensak registry extension.
///
/// Any failure to fetch the discovery document counts as no support.
pub async fn registry_supports_fensak_ext(host: impl AsRef<str>) -> bool {
    let host = host.as_ref();

    match host_base_url(host) {
        Ok(base_url) => supports_fensak_ext_at(&RegistryHttp::new(None), &base_url).await,
        Err(error) => {
            debug!(?error, error_message = %error, host = host, "Invalid registry host");
            false
        }
    }
}

async fn supports_fensak_ext_at(http: &RegistryHttp, base_url: &Url) -> bool {
    let Ok(url) = base_url.join(FENSAK_DISCOVERY_PATH) else {
        return false;
    };

    match http.get(url).send().await {
        Ok(response) => response.status() == StatusCode::OK,
        Err(error) => {
            debug!(?error, error_message = %error, "Failed to check for the Fensak extension");
            false
        }
    }
}

/// Client for the provenance endpoints of the Fensak registry extension.
#[derive(Debug, Clone)]
pub struct FensakExtClient {
    http: RegistryHttp,
    provenance_endpoint: Url,
}

impl FensakExtClient {
    /// Discovers the `provenance.v0` endpoint of `host`.
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
            .discover::<FensakExtDiscovery>(&base_url, FENSAK_DISCOVERY_PATH)
            .await?;

        let endpoint = discovery
            .provenance_v0
            .ok_or(TerraformError::MissingService("provenance.v0"))?;
        let provenance_endpoint = resolve_endpoint(&base_url, &endpoint)?;

        Ok(Self {
            http,
            provenance_endpoint,
        })
    }

    /// Downloads the in-toto provenance attestation of `version` of `module`.
    pub async fn get_attestation(
        &self,
        module: &ModulePackage,
        version: &str,
    ) -> Result<ProvenanceStatement, TerraformError> {
        let url = module_url(&self.provenance_endpoint, module, &[version, "download"])?;

        let response = self.http.get(url).send().await?;
        let response =
            expect_status(response, StatusCode::OK, "downloading provenance attestation").await?;

        Ok(response.json::<ProvenanceStatement>().await?)
    }
}
