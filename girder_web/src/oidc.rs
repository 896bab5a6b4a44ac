use crate::OidcProviderConfig;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthenticationFlow, CoreClaimName, CoreClaimType, CoreClient,
    CoreClientAuthMethod, CoreGrantType, CoreIdToken, CoreIdTokenClaims, CoreIdTokenVerifier,
    CoreJsonWebKey, CoreJsonWebKeyType, CoreJsonWebKeyUse, CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm, CoreJwsSigningAlgorithm, CoreResponseMode, CoreResponseType,
    CoreSubjectIdentifierType, CoreTokenResponse,
};
use openidconnect::reqwest::async_http_client;
use openidconnect::{
    AdditionalProviderMetadata, AuthType, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    IssuerUrl, JsonWebKeySet, Nonce, PkceCodeVerifier as OauthPkceVerifier, ProviderMetadata,
    RedirectUrl, RefreshToken, Scope, TokenResponse,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
const SENSITIVE_URL_PARAMS: &[&str] = &[
    "code",
    "state",
    "client_id",
    "code_challenge",
    "code_challenge_method",
    "scope",
];

/// Names of the query parameters that carry OIDC secrets and must not be
/// logged.
pub fn oidc_url_params() -> &'static [&'static str] {
    SENSITIVE_URL_PARAMS
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct EndSessionMetadata {
    #[serde(default)]
    end_session_endpoint: Option<String>,
}

impl AdditionalProviderMetadata for EndSessionMetadata {}

type DiscoveredMetadata = ProviderMetadata<
    EndSessionMetadata,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJwsSigningAlgorithm,
    CoreJsonWebKeyType,
    CoreJsonWebKeyUse,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

/// Failure of an OIDC operation.
#[derive(Debug, Error)]
pub enum OidcError {
    /// A configured URL is malformed.
    #[error("invalid {kind} url '{url}': {reason}")]
    InvalidUrl {
        /// Which URL.
        kind: &'static str,
        /// The offending value.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Provider metadata could not be discovered.
    #[error("failed to discover oidc provider: {0}")]
    Discovery(String),

    /// The token endpoint rejected the request.
    #[error("failed to exchange token: {0}")]
    Exchange(String),

    /// The token response carried no ID token.
    #[error("no id_token field in oauth2 token")]
    MissingIdToken,

    /// The ID token failed verification.
    #[error("failed to verify id token: {0}")]
    Verification(String),

    /// A raw token matched none of the accepted client IDs.
    #[error("invalid id token")]
    InvalidIdToken,
}

/// A PKCE verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceCodeVerifier {
    /// Sent with the token exchange; kept in the session meanwhile.
    pub verifier: String,
    /// Sent with the authorization request.
    pub challenge: String,
}

/// An OIDC relying party bound to one discovered provider.
#[derive(Debug, Clone)]
pub struct Authenticator {
    client: CoreClient,
    metadata: DiscoveredMetadata,
    scopes: Vec<String>,
    with_pkce: bool,
    raw_token_clientids: Vec<String>,
}

impl Authenticator {
    /// Discovers the provider described by `config` and builds a client for it.
    pub async fn new(config: &OidcProviderConfig) -> Result<Self, OidcError> {
        let metadata = if config.skip_iss_verification {
            discover_unverified(&config.discovery_url, &config.issuer_url).await?
        } else {
            let issuer = issuer_url(&config.issuer_url)?;

            DiscoveredMetadata::discover_async(issuer, async_http_client)
                .await
                .map_err(|error| OidcError::Discovery(error.to_string()))?
        };

        let secret = config.secret.unsecure();
        let secret = (!secret.is_empty()).then(|| ClientSecret::new(secret.to_string()));

        let mut client = CoreClient::from_provider_metadata(
            metadata.clone(),
            ClientId::new(config.clientid.clone()),
            secret,
        )
        .set_auth_type(AuthType::RequestBody);

        if !config.callback_url.is_empty() {
            let redirect = RedirectUrl::new(config.callback_url.clone()).map_err(|error| {
                OidcError::InvalidUrl {
                    kind: "callback",
                    url: config.callback_url.clone(),
                    reason: error.to_string(),
                }
            })?;
            client = client.set_redirect_uri(redirect);
        }

        debug!(
            issuer = config.issuer_url.as_str(),
            clientid = config.clientid.as_str(),
            with_pkce = config.with_pkce,
            "Discovered OIDC provider",
        );

        Ok(Self {
            client,
            metadata,
            scopes: config.additional_scopes.clone(),
            with_pkce: config.with_pkce,
            raw_token_clientids: config.raw_token_clientids.clone(),
        })
    }

    /// Reports whether logins use PKCE.
    pub fn with_pkce(&self) -> bool {
        self.with_pkce
    }

    /// Generates a fresh PKCE verifier: the hex form of 32 random bytes, with
    /// the unpadded base64url SHA-256 of it as challenge.
    pub fn new_code_verifier() -> PkceCodeVerifier {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);

        let verifier = bytes.iter().fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        });
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

        PkceCodeVerifier {
            verifier,
            challenge,
        }
    }

    /// Builds the provider's authorization URL. The `openid` scope is always
    /// requested, followed by the configured additional scopes.
    pub fn auth_code_url(
        &self,
        state: String,
        pkce_challenge: Option<&str>,
        extra_params: &[(&str, &str)],
    ) -> String {
        let mut request = self.client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            move || CsrfToken::new(state),
            Nonce::new_random,
        );

        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        if let Some(challenge) = pkce_challenge {
            request = request
                .add_extra_param("code_challenge", challenge.to_string())
                .add_extra_param("code_challenge_method", "S256");
        }

        for (name, value) in extra_params {
            request = request.add_extra_param(name.to_string(), value.to_string());
        }

        let (url, _, _) = request.url();

        url.to_string()
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: impl Into<String>,
        pkce_verifier: Option<String>,
    ) -> Result<CoreTokenResponse, OidcError> {
        let mut request = self.client.exchange_code(AuthorizationCode::new(code.into()));

        if let Some(verifier) = pkce_verifier {
            request = request.set_pkce_verifier(OauthPkceVerifier::new(verifier));
        }

        request
            .request_async(async_http_client)
            .await
            .map_err(|error| OidcError::Exchange(error.to_string()))
    }

    /// Verifies the ID token of a token response and returns it raw, together
    /// with its claims.
    pub fn verify_id_token(
        &self,
        tokens: &CoreTokenResponse,
    ) -> Result<(String, CoreIdTokenClaims), OidcError> {
        let id_token = tokens.id_token().ok_or(OidcError::MissingIdToken)?;

        let claims = self.verify(id_token, &self.client.id_token_verifier())?;

        Ok((raw_token(id_token)?, claims))
    }

    /// Parses and verifies a raw ID token issued to this client.
    pub fn verify_id_token_str(&self, raw: &str) -> Result<CoreIdTokenClaims, OidcError> {
        let id_token = parse_token(raw)?;

        self.verify(&id_token, &self.client.id_token_verifier())
    }

    /// Uses a refresh token to obtain a new ID token.
    pub async fn refresh_id_token(
        &self,
        refresh_token: impl Into<String>,
    ) -> Result<(String, CoreIdTokenClaims, CoreTokenResponse), OidcError> {
        let tokens = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.into()))
            .request_async(async_http_client)
            .await
            .map_err(|error| OidcError::Exchange(error.to_string()))?;

        let (raw, claims) = self.verify_id_token(&tokens)?;

        Ok((raw, claims, tokens))
    }

    /// Verifies a raw ID token presented by an API caller.
    ///
    /// Without configured raw-token client IDs the audience is not checked.
    /// Otherwise the token must be issued to one of them.
    pub fn verify_raw_token(&self, raw: &str) -> Result<CoreIdTokenClaims, OidcError> {
        let id_token = parse_token(raw)?;

        if self.raw_token_clientids.is_empty() {
            let verifier = self.client.id_token_verifier().require_audience_match(false);
            return self.verify(&id_token, &verifier);
        }

        for clientid in &self.raw_token_clientids {
            let verifier = CoreIdTokenVerifier::new_public_client(
                ClientId::new(clientid.clone()),
                self.metadata.issuer().clone(),
                self.metadata.jwks().clone(),
            );

            if let Ok(claims) = self.verify(&id_token, &verifier) {
                return Ok(claims);
            }
        }

        Err(OidcError::InvalidIdToken)
    }

    /// The provider's `end_session_endpoint`, or an empty string when it
    /// advertises none.
    pub fn logout_url(&self) -> String {
        self.metadata
            .additional_metadata()
            .end_session_endpoint
            .clone()
            .unwrap_or_default()
    }

    fn verify(
        &self,
        id_token: &CoreIdToken,
        verifier: &CoreIdTokenVerifier<'_>,
    ) -> Result<CoreIdTokenClaims, OidcError> {
        id_token
            .claims(verifier, |_: Option<&Nonce>| Ok(()))
            .cloned()
            .map_err(|error| OidcError::Verification(error.to_string()))
    }
}

async fn discover_unverified(
    discovery_url: &str,
    issuer: &str,
) -> Result<DiscoveredMetadata, OidcError> {
    let url = format!("{}{DISCOVERY_PATH}", discovery_url.trim_end_matches('/'));

    debug!(url = url.as_str(), "Fetching OIDC metadata without issuer verification");

    let body = reqwest::get(&url)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|error| OidcError::Discovery(error.to_string()))?
        .bytes()
        .await
        .map_err(|error| OidcError::Discovery(error.to_string()))?;

    let metadata: DiscoveredMetadata = serde_json::from_slice(&body)
        .map_err(|error| OidcError::Discovery(error.to_string()))?;
    let metadata = metadata.set_issuer(issuer_url(issuer)?);

    let jwks = JsonWebKeySet::fetch_async(metadata.jwks_uri(), async_http_client)
        .await
        .map_err(|error| OidcError::Discovery(error.to_string()))?;

    Ok(metadata.set_jwks(jwks))
}

fn issuer_url(url: &str) -> Result<IssuerUrl, OidcError> {
    IssuerUrl::new(url.to_string()).map_err(|error| OidcError::InvalidUrl {
        kind: "issuer",
        url: url.to_string(),
        reason: error.to_string(),
    })
}

fn parse_token(raw: &str) -> Result<CoreIdToken, OidcError> {
    CoreIdToken::from_str(raw).map_err(|error| OidcError::Verification(error.to_string()))
}

fn raw_token(id_token: &CoreIdToken) -> Result<String, OidcError> {
    match serde_json::to_value(id_token) {
        Ok(serde_json::Value::String(raw)) => Ok(raw),
        Ok(_) => Err(OidcError::Verification("id token is not a compact JWT".to_string())),
        Err(error) => Err(OidcError::Verification(error.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use openidconnect::core::CoreRsaPrivateSigningKey;
    use openidconnect::{
        Audience, EmptyAdditionalClaims, JsonWebKeyId, PrivateSigningKey, StandardClaims,
        SubjectIdentifier,
    };
    use pretty_assertions::assert_eq;

    const SIGNING_KEY_PEM: &str = include_str!("../tests/fixtures/oidc_signing_key.pem");

    fn signing_key() -> CoreRsaPrivateSigningKey {
        CoreRsaPrivateSigningKey::from_pem(
            SIGNING_KEY_PEM,
            Some(JsonWebKeyId::new("girder-test".to_string())),
        )
        .unwrap()
    }

    /// The key set that verifies tokens from [`signed_id_token`].
    pub(crate) fn signing_jwks() -> serde_json::Value {
        serde_json::json!({ "keys": [signing_key().as_verification_key()] })
    }

    /// Signs a raw ID token for `subject`, issued by `issuer` to `girder-app`.
    pub(crate) fn signed_id_token(issuer: &str, subject: &str) -> String {
        let now = chrono::Utc::now();
        let claims = CoreIdTokenClaims::new(
            IssuerUrl::new(issuer.to_string()).unwrap(),
            vec![Audience::new("girder-app".to_string())],
            now + chrono::Duration::minutes(5),
            now,
            StandardClaims::new(SubjectIdentifier::new(subject.to_string())),
            EmptyAdditionalClaims {},
        );
        let id_token = CoreIdToken::new(
            claims,
            &signing_key(),
            CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256,
            None,
            None,
        )
        .unwrap();

        raw_token(&id_token).unwrap()
    }

    /// Serves discovery metadata and an empty key set for an issuer at the
    /// server's own URL.
    pub(crate) async fn mock_provider(server: &mut mockito::ServerGuard) -> OidcProviderConfig {
        mock_provider_with_keys(server, serde_json::json!({ "keys": [] })).await
    }

    /// Like [`mock_provider`], serving the given key set.
    pub(crate) async fn mock_provider_with_keys(
        server: &mut mockito::ServerGuard,
        jwks: serde_json::Value,
    ) -> OidcProviderConfig {
        let issuer = server.url();

        server
            .mock("GET", "/.well-known/openid-configuration")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "issuer": issuer,
                    "authorization_endpoint": format!("{issuer}/authorize"),
                    "token_endpoint": format!("{issuer}/token"),
                    "jwks_uri": format!("{issuer}/keys"),
                    "end_session_endpoint": format!("{issuer}/logout"),
                    "response_types_supported": ["code"],
                    "subject_types_supported": ["public"],
                    "id_token_signing_alg_values_supported": ["RS256"],
                })
                .to_string(),
            )
            .create_async()
            .await;

        server
            .mock("GET", "/keys")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(jwks.to_string())
            .create_async()
            .await;

        OidcProviderConfig::new(issuer.as_str(), "girder-app", "s3cret")
            .with_callback_url("http://localhost:8080/oidc/callback")
    }

    #[test]
    fn code_verifier_has_s256_challenge() {
        // When
        let pkce = Authenticator::new_code_verifier();

        // Then
        assert_eq!(pkce.verifier.len(), 64);
        assert!(pkce.verifier.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            pkce.challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes())),
        );
        assert_ne!(pkce, Authenticator::new_code_verifier());
    }

    #[tokio::test]
    async fn discovers_and_builds_auth_url() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let mut config = mock_provider(&mut server).await;
        config.additional_scopes = vec!["email".to_string()];
        let authenticator = Authenticator::new(&config).await.unwrap();

        // When
        let url = authenticator.auth_code_url(
            "state-token".to_string(),
            Some("challenge"),
            &[("prompt", "create")],
        );

        // Then
        assert!(url.starts_with(&format!("{}/authorize?", server.url())));
        assert!(url.contains("client_id=girder-app"));
        assert!(url.contains("state=state-token"));
        assert!(url.contains("scope=openid+email"));
        assert!(url.contains("code_challenge=challenge"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("prompt=create"));
        assert_eq!(authenticator.logout_url(), format!("{}/logout", server.url()));
    }

    #[tokio::test]
    async fn skipping_issuer_verification_overrides_issuer() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let mut config = mock_provider(&mut server).await;
        config.discovery_url = server.url();
        config.issuer_url = "https://public.example.com".to_string();
        config.skip_iss_verification = true;

        // When
        let authenticator = Authenticator::new(&config).await.unwrap();

        // Then
        assert_eq!(authenticator.metadata.issuer().as_str(), "https://public.example.com");
    }

    #[tokio::test]
    async fn exchange_without_id_token_fails_verification() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let config = mock_provider(&mut server).await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","token_type":"bearer","expires_in":60}"#)
            .create_async()
            .await;
        let authenticator = Authenticator::new(&config).await.unwrap();

        // When
        let tokens = authenticator.exchange_code("code", None).await.unwrap();
        let error = authenticator.verify_id_token(&tokens).unwrap_err();

        // Then
        assert_eq!(error.to_string(), "no id_token field in oauth2 token");
    }

    #[tokio::test]
    async fn verifies_signed_id_token() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let config = mock_provider_with_keys(&mut server, signing_jwks()).await;
        let authenticator = Authenticator::new(&config).await.unwrap();
        let raw = signed_id_token(&server.url(), "user-1");

        // When
        let claims = authenticator.verify_id_token_str(&raw).unwrap();

        // Then
        assert_eq!(claims.subject().as_str(), "user-1");
        assert!(authenticator.verify_id_token_str(&raw.replace('.', "x")).is_err());
    }

    #[tokio::test]
    async fn garbage_raw_token_is_rejected() {
        // Given
        let mut server = mockito::Server::new_async().await;
        let mut config = mock_provider(&mut server).await;
        config.raw_token_clientids = vec!["cli".to_string()];
        let authenticator = Authenticator::new(&config).await.unwrap();

        // When
        let result = authenticator.verify_raw_token("not-a-jwt");

        // Then
        assert!(matches!(result, Err(OidcError::Verification(_))));
    }
}
