use crate::{Authenticator, CsrfToken};
use axum::Router;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use http::StatusCode;
use openidconnect::OAuth2TokenResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_sessions::Session;
use tracing::{error, warn};

/// Path that starts a sign-up.
pub const REGISTER_PATH: &str = "/oidc/register";
/// Path that starts a login.
pub const LOGIN_PATH: &str = "/oidc/login";
/// Path that ends the session.
pub const LOGOUT_PATH: &str = "/oidc/logout";
/// Path the provider redirects back to.
pub const CALLBACK_PATH: &str = "/oidc/callback";

/// Session key of the raw ID token.
pub const ID_TOKEN_KEY: &str = "id_token";
/// Session key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Session key of the access token expiry, as RFC 3339.
pub const ACCESS_TOKEN_EXPIRY_KEY: &str = "access_token_expiry";
/// Session key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Session key of the decoded profile.
pub const PROFILE_KEY: &str = "profile";
/// Session key of the path to return to after login.
pub const CONTINUE_TO_KEY: &str = "continue_to";
/// Session key of the pending PKCE verifier.
pub const PKCE_CODE_VERIFIER_KEY: &str = "pkce_code_verifier";

/// The login, registration, logout and callback routes of an OIDC relying
/// party, storing ID token claims decoded as profile `P` in the session.
///
/// Requires [`csrf_layer`](crate::csrf_layer) and a
/// [session layer](crate::session_layer) around the returned router.
pub struct OidcRoutes<P> {
    authenticator: Arc<Authenticator>,
    home_path: String,
    _profile: PhantomData<fn() -> P>,
}

struct OidcState {
    authenticator: Arc<Authenticator>,
    home_path: String,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

impl<P> OidcRoutes<P>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates the routes. After login, users land on `home_path` unless the
    /// session names another destination.
    pub fn new(authenticator: Arc<Authenticator>, home_path: impl Into<String>) -> Self {
        Self {
            authenticator,
            home_path: home_path.into(),
            _profile: PhantomData,
        }
    }

    /// Builds the router.
    pub fn router<S>(self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let state = Arc::new(OidcState {
            authenticator: self.authenticator,
            home_path: self.home_path,
        });

        Router::new()
            .route(REGISTER_PATH, get(register))
            .route(LOGIN_PATH, get(login))
            .route(LOGOUT_PATH, get(logout))
            .route(CALLBACK_PATH, get(callback::<P>))
            .with_state(state)
    }
}

async fn register(
    State(state): State<Arc<OidcState>>,
    csrf: CsrfToken,
    session: Session,
) -> Response {
    start_login(&state, &csrf, &session, &[("prompt", "create")]).await
}

async fn login(State(state): State<Arc<OidcState>>, csrf: CsrfToken, session: Session) -> Response {
    start_login(&state, &csrf, &session, &[]).await
}

async fn start_login(
    state: &OidcState,
    csrf: &CsrfToken,
    session: &Session,
    extra_params: &[(&str, &str)],
) -> Response {
    let challenge = if state.authenticator.with_pkce() {
        let pkce = Authenticator::new_code_verifier();

        if let Err(error) = session.insert(PKCE_CODE_VERIFIER_KEY, &pkce.verifier).await {
            error!(?error, error_message = %error, "Failed to store PKCE verifier in session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        Some(pkce.challenge)
    } else {
        None
    };

    let url = state
        .authenticator
        .auth_code_url(csrf.masked(), challenge.as_deref(), extra_params);

    Redirect::temporary(&url).into_response()
}

async fn logout(session: Session) -> Response {
    if let Err(error) = session.flush().await {
        error!(?error, error_message = %error, "Failed to flush session on logout");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    Redirect::temporary(LOGIN_PATH).into_response()
}

async fn callback<P>(
    State(state): State<Arc<OidcState>>,
    csrf: CsrfToken,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Response
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    if !csrf.verify(&params.state) {
        warn!("Detected wrong state parameter on oidc login. Possible XSRF attack.");
        return Redirect::temporary(LOGIN_PATH).into_response();
    }

    let verifier = if state.authenticator.with_pkce() {
        match session.get::<String>(PKCE_CODE_VERIFIER_KEY).await {
            Ok(Some(verifier)) => Some(verifier),
            Ok(None) => {
                error!("No PKCE verifier in session");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            Err(error) => {
                error!(?error, error_message = %error, "Failed to read PKCE verifier from session");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    } else {
        None
    };

    let tokens = match state.authenticator.exchange_code(params.code, verifier).await {
        Ok(tokens) => tokens,
        Err(error) => {
            warn!(?error, error_message = %error, "Failed to exchange authorization code");
            return Redirect::temporary(LOGIN_PATH).into_response();
        }
    };

    let profile = state
        .authenticator
        .verify_id_token(&tokens)
        .map_err(|error| error.to_string())
        .and_then(|(raw, claims)| {
            serde_json::to_value(&claims)
                .and_then(serde_json::from_value::<P>)
                .map(|profile| (raw, profile))
                .map_err(|error| error.to_string())
        });

    let (id_token, profile) = match profile {
        Ok(verified) => verified,
        Err(error) => {
            warn!(error_message = error.as_str(), "Failed to verify ID token");
            return Redirect::temporary(LOGIN_PATH).into_response();
        }
    };

    let expiry = tokens
        .expires_in()
        .and_then(|expires_in| time::Duration::try_from(expires_in).ok())
        .and_then(|expires_in| (OffsetDateTime::now_utc() + expires_in).format(&Rfc3339).ok());
    let refresh_token = tokens.refresh_token().map(|token| token.secret().clone());

    let stored = async {
        session.insert(ID_TOKEN_KEY, id_token).await?;
        session
            .insert(ACCESS_TOKEN_KEY, tokens.access_token().secret())
            .await?;
        session.insert(ACCESS_TOKEN_EXPIRY_KEY, expiry).await?;
        session.insert(REFRESH_TOKEN_KEY, refresh_token).await?;
        session.insert(PROFILE_KEY, profile).await?;
        session.remove::<String>(PKCE_CODE_VERIFIER_KEY).await?;

        session.get::<String>(CONTINUE_TO_KEY).await
    };

    match stored.await {
        Ok(continue_to) => {
            let target = continue_to.unwrap_or_else(|| state.home_path.clone());
            Redirect::temporary(&target).into_response()
        }
        Err(error) => {
            error!(?error, error_message = %error, "Failed to store login in session");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::tests::{mock_provider, mock_provider_with_keys, signed_id_token, signing_jwks};
    use crate::{CsrfConfig, OidcProviderConfig, csrf_layer};
    use axum::Json;
    use axum::body::{Body, to_bytes};
    use axum::extract::Request;
    use http::header::{COOKIE, LOCATION, SET_COOKIE};
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use reqwest::Url;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    #[derive(Debug, Serialize, Deserialize)]
    struct Profile {
        sub: String,
    }

    async fn routes(with_pkce: bool) -> (mockito::ServerGuard, Router) {
        let mut server = mockito::Server::new_async().await;
        let mut config = mock_provider(&mut server).await;
        config.with_pkce = with_pkce;

        (server, router_for(config).await)
    }

    /// Routes against a provider that signs its ID tokens and accepts the
    /// code `auth-code`, returning the raw ID token it issues.
    async fn signing_routes(with_pkce: bool) -> (mockito::ServerGuard, Router, String) {
        let mut server = mockito::Server::new_async().await;
        let mut config = mock_provider_with_keys(&mut server, signing_jwks()).await;
        config.with_pkce = with_pkce;
        let id_token = signed_id_token(&server.url(), "user-1");

        server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("code".to_string(), "auth-code".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "access_token": "at",
                    "token_type": "bearer",
                    "expires_in": 3600,
                    "refresh_token": "rt",
                    "id_token": id_token,
                })
                .to_string(),
            )
            .create_async()
            .await;

        (server, router_for(config).await, id_token)
    }

    async fn router_for(config: OidcProviderConfig) -> Router {
        let authenticator = Arc::new(Authenticator::new(&config).await.unwrap());

        OidcRoutes::<Profile>::new(authenticator, "/home")
            .router()
            .route("/session", get(session_snapshot))
            .route("/remember", get(remember_destination))
            .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false))
            .layer(csrf_layer(&CsrfConfig {
                maxage: 0,
                dev: true,
            }))
    }

    async fn session_snapshot(session: Session) -> Json<Value> {
        let mut snapshot = serde_json::Map::new();

        for key in [ID_TOKEN_KEY, REFRESH_TOKEN_KEY, PROFILE_KEY, PKCE_CODE_VERIFIER_KEY] {
            let value = session.get::<Value>(key).await.unwrap();
            snapshot.insert(key.to_string(), value.unwrap_or(Value::Null));
        }

        Json(Value::Object(snapshot))
    }

    async fn remember_destination(session: Session) -> &'static str {
        session.insert(CONTINUE_TO_KEY, "/reports").await.unwrap();

        "remembered"
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with_cookies(uri: &str, cookies: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header(COOKIE, cookies)
            .body(Body::empty())
            .unwrap()
    }

    fn cookies_of(response: &Response) -> String {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The callback URI a provider would redirect to after the given login
    /// response.
    fn callback_uri(login: &Response) -> String {
        let location = Url::parse(login.headers()[LOCATION].to_str().unwrap()).unwrap();
        let state = location
            .query_pairs()
            .find(|(name, _)| name == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap();

        let mut callback = Url::parse("http://localhost").unwrap();
        callback.set_path(CALLBACK_PATH);
        callback
            .query_pairs_mut()
            .append_pair("state", &state)
            .append_pair("code", "auth-code");

        format!("{}?{}", callback.path(), callback.query().unwrap())
    }

    async fn snapshot(router: &Router, cookies: &str) -> Value {
        let response = router
            .clone()
            .oneshot(get_with_cookies("/session", cookies))
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();

        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn login_redirects_to_provider() {
        // Given
        let (server, router) = routes(true).await;

        // When
        let response = router.oneshot(get_request(LOGIN_PATH)).await.unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with(&format!("{}/authorize?", server.url())));
        assert!(location.contains("code_challenge_method=S256"));
        assert!(!location.contains("prompt=create"));
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert!(cookies.iter().any(|cookie| cookie.starts_with("csrf_token=")));
        assert!(cookies.iter().any(|cookie| cookie.starts_with("id=")));
    }

    #[tokio::test]
    async fn register_asks_for_account_creation() {
        // Given
        let (_server, router) = routes(false).await;

        // When
        let response = router.oneshot(get_request(REGISTER_PATH)).await.unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.contains("prompt=create"));
        assert!(!location.contains("code_challenge"));
    }

    #[tokio::test]
    async fn callback_with_wrong_state_returns_to_login() {
        // Given
        let (_server, router) = routes(false).await;
        let request = Request::builder()
            .uri(format!("{CALLBACK_PATH}?state=forged&code=abc"))
            .header(COOKIE, "csrf_token=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .body(Body::empty())
            .unwrap();

        // When
        let response = router.oneshot(request).await.unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], LOGIN_PATH);
    }

    #[tokio::test]
    async fn logout_returns_to_login() {
        // Given
        let (_server, router) = routes(false).await;

        // When
        let response = router.oneshot(get_request(LOGOUT_PATH)).await.unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], LOGIN_PATH);
    }

    #[tokio::test]
    async fn callback_stores_login_and_returns_home() {
        // Given
        let (_server, router, id_token) = signing_routes(true).await;
        let login = router.clone().oneshot(get_request(LOGIN_PATH)).await.unwrap();
        let cookies = cookies_of(&login);
        let before = snapshot(&router, &cookies).await;

        // When
        let response = router
            .clone()
            .oneshot(get_with_cookies(&callback_uri(&login), &cookies))
            .await
            .unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/home");
        assert!(before[PKCE_CODE_VERIFIER_KEY].is_string());
        let after = snapshot(&router, &cookies).await;
        assert_eq!(after[ID_TOKEN_KEY], Value::String(id_token));
        assert_eq!(after[PROFILE_KEY]["sub"], "user-1");
        assert_eq!(after[REFRESH_TOKEN_KEY], "rt");
        assert_eq!(after[PKCE_CODE_VERIFIER_KEY], Value::Null);
    }

    #[tokio::test]
    async fn callback_returns_to_remembered_destination() {
        // Given
        let (_server, router, _) = signing_routes(false).await;
        let remember = router.clone().oneshot(get_request("/remember")).await.unwrap();
        let cookies = cookies_of(&remember);
        let login = router
            .clone()
            .oneshot(get_with_cookies(LOGIN_PATH, &cookies))
            .await
            .unwrap();

        // When
        let response = router
            .clone()
            .oneshot(get_with_cookies(&callback_uri(&login), &cookies))
            .await
            .unwrap();

        // Then
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/reports");
        assert_eq!(snapshot(&router, &cookies).await[PROFILE_KEY]["sub"], "user-1");
    }
}
