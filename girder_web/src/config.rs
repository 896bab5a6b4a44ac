use secure_string::SecureString;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// The OIDC provider that authenticates users of the web app.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OidcProviderConfig {
    /// Full issuer URL, including scheme and path.
    #[serde(default)]
    pub issuer_url: String,
    /// OAuth2 client ID.
    #[serde(default, alias = "client_id")]
    pub clientid: String,
    /// OAuth2 client secret.
    #[serde(default = "empty_secret", alias = "client_secret")]
    pub secret: SecureString,
    /// Client IDs that raw bearer tokens may be issued for.
    #[serde(default)]
    pub raw_token_clientids: Vec<String>,
    /// Whether the code exchange uses PKCE.
    #[serde(default)]
    pub with_pkce: bool,
    /// Discover through [`discovery_url`](Self::discovery_url) and trust
    /// [`issuer_url`](Self::issuer_url) instead of the advertised issuer.
    /// Only for providers whose discovery document lives elsewhere.
    #[serde(default)]
    pub skip_iss_verification: bool,
    /// Base URL of the discovery document; used only with
    /// [`skip_iss_verification`](Self::skip_iss_verification).
    #[serde(default)]
    pub discovery_url: String,
    /// Scopes requested on top of `openid`.
    #[serde(default)]
    pub additional_scopes: Vec<String>,
    /// Full URL of the callback route. Set by the application.
    #[serde(skip)]
    pub callback_url: String,
}

fn empty_secret() -> SecureString {
    SecureString::from(String::new())
}

impl OidcProviderConfig {
    /// Creates a config for the given issuer and client credentials.
    pub fn new(
        issuer_url: impl Into<String>,
        clientid: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            clientid: clientid.into(),
            secret: SecureString::from(secret.into()),
            raw_token_clientids: Vec::new(),
            with_pkce: false,
            skip_iss_verification: false,
            discovery_url: String::new(),
            additional_scopes: Vec::new(),
            callback_url: String::new(),
        }
    }

    /// Sets the callback URL.
    pub fn with_callback_url(self, callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            ..self
        }
    }
}

/// The session and its cookie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a session lives after it is first stored, regardless of
    /// activity.
    #[serde(deserialize_with = "girder_config::de::duration")]
    pub lifetime: Duration,
    /// Name of the session ID cookie.
    pub cookie_name: String,
    /// Whether the cookie is marked `Secure`.
    pub cookie_secure: bool,
    /// SameSite mode of the cookie: `lax`, `strict` or `none`.
    pub cookie_samesite: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(336 * 60 * 60),
            cookie_name: "session".to_string(),
            cookie_secure: true,
            cookie_samesite: "lax".to_string(),
        }
    }
}

/// CSRF protection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// `Max-Age` of the CSRF cookie in seconds; a session cookie when `0`.
    #[serde(alias = "max_age")]
    pub maxage: u64,
    /// Drops the `Secure` flag from the CSRF cookie, for plain-HTTP
    /// development servers.
    pub dev: bool,
}

/// The identity provider that manages user accounts.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Which provider to use.
    pub provider: IdpProvider,
    /// Zitadel settings; used when [`provider`](Self::provider) is Zitadel.
    pub zitadel: Option<ZitadelConfig>,
}

/// Supported identity providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdpProvider {
    /// Zitadel.
    Zitadel,
    /// No identity provider; every operation is a no-op.
    #[default]
    NopIdp,
}

impl IdpProvider {
    /// Config name of the provider.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zitadel => "zitadel",
            Self::NopIdp => "nopidp",
        }
    }
}

impl Display for IdpProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zitadel connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZitadelConfig {
    /// Name of the Zitadel instance.
    pub instance_name: String,
    /// Base64-encoded JWT key for the service user.
    pub jwt_key_base64: SecureString,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn oidc_from_map() {
        // Given
        let input = r#"
issuer_url: https://id.example.com
clientid: web
secret: s3cr3t
with_pkce: true
additional_scopes: [email, profile]
raw_token_clientids: [cli]
"#;

        // When
        let config = serde_yml::from_str::<OidcProviderConfig>(input).unwrap();

        // Then
        assert_eq!(config.issuer_url, "https://id.example.com");
        assert_eq!(config.clientid, "web");
        assert_eq!(config.secret.unsecure(), "s3cr3t");
        assert_eq!(config.with_pkce, true);
        assert_eq!(config.skip_iss_verification, false);
        assert_eq!(config.additional_scopes, vec!["email", "profile"]);
        assert_eq!(config.raw_token_clientids, vec!["cli"]);
        assert_eq!(config.callback_url, "");
    }

    #[test]
    fn session_defaults() {
        // When
        let config = serde_yml::from_str::<SessionConfig>("cookie_name: app\n").unwrap();

        // Then
        assert_eq!(
            config,
            SessionConfig {
                cookie_name: "app".to_string(),
                ..SessionConfig::default()
            },
        );
        assert_eq!(config.lifetime, Duration::from_secs(1_209_600));
    }

    #[test]
    fn session_lifetime_is_human_readable() {
        // When
        let config = serde_yml::from_str::<SessionConfig>("lifetime: 1h 30m\n").unwrap();

        // Then
        assert_eq!(config.lifetime, Duration::from_secs(5400));
    }

    #[test]
    fn idp_from_map() {
        // Given
        let input = r#"
provider: zitadel
zitadel:
    instance_name: acme
    jwt_key_base64: a2V5
"#;

        // When
        let config = serde_yml::from_str::<IdpConfig>(input).unwrap();

        // Then
        assert_eq!(config.provider, IdpProvider::Zitadel);
        let zitadel = config.zitadel.unwrap();
        assert_eq!(zitadel.instance_name, "acme");
        assert_eq!(zitadel.jwt_key_base64.unsecure(), "a2V5");
    }

    #[test]
    fn idp_defaults_to_nop() {
        // When
        let config = serde_yml::from_str::<IdpConfig>("{}").unwrap();

        // Then
        assert_eq!(config, IdpConfig::default());
        assert_eq!(config.provider.to_string(), "nopidp");
    }
}
