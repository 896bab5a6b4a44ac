use crate::CsrfConfig;
use axum::body::{Body, to_bytes};
use axum::extract::{FromRequestParts, Request};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE, VARY};
use http::request::Parts;
use http::{HeaderValue, Method, StatusCode};
use percent_encoding::percent_decode_str;
use rand::RngCore;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tower_sessions::cookie::{Cookie, SameSite};
use tracing::{debug, warn};

/// Name of the CSRF cookie and of the form field that may carry the token.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";
/// Header that may carry the token.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

const TOKEN_LENGTH: usize = 32;
const FORM_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The real CSRF token of the current request, available as a request
/// extension behind [`csrf_layer`].
#[derive(Debug, Clone)]
pub struct CsrfToken {
    real: Arc<[u8; TOKEN_LENGTH]>,
}

impl CsrfToken {
    fn generate() -> Self {
        let mut real = [0u8; TOKEN_LENGTH];
        rand::rng().fill_bytes(&mut real);

        Self {
            real: Arc::new(real),
        }
    }

    fn from_cookie(value: &str) -> Option<Self> {
        let decoded = STANDARD.decode(value).ok()?;
        let real: [u8; TOKEN_LENGTH] = decoded.try_into().ok()?;

        Some(Self {
            real: Arc::new(real),
        })
    }

    /// A masked rendition of the token, different on every call: base64 of a
    /// random pad followed by the pad XOR the real token.
    pub fn masked(&self) -> String {
        let mut masked = [0u8; TOKEN_LENGTH * 2];
        let (pad, sealed) = masked.split_at_mut(TOKEN_LENGTH);
        rand::rng().fill_bytes(pad);

        for ((sealed, pad), real) in sealed.iter_mut().zip(pad.iter()).zip(self.real.iter()) {
            *sealed = pad ^ real;
        }

        STANDARD.encode(masked)
    }

    /// Checks a token sent by the client against this one.
    pub fn verify(&self, sent: &str) -> bool {
        verify_token(self.real.as_slice(), sent)
    }

    fn cookie_value(&self) -> String {
        STANDARD.encode(self.real.as_slice())
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Compares the `real` token with a `sent` one, masked or raw, in constant
/// time.
pub fn verify_token(real: &[u8], sent: &str) -> bool {
    let Ok(sent) = STANDARD.decode(sent.trim()) else {
        return false;
    };

    let unmasked = match sent.len() {
        len if len == TOKEN_LENGTH * 2 => {
            let (pad, sealed) = sent.split_at(TOKEN_LENGTH);
            pad.iter().zip(sealed).map(|(pad, sealed)| pad ^ sealed).collect()
        }
        TOKEN_LENGTH => sent,
        _ => return false,
    };

    real.len() == TOKEN_LENGTH && bool::from(real.ct_eq(&unmasked))
}

/// Creates the double-submit-cookie CSRF [`Layer`].
pub fn csrf_layer(config: &CsrfConfig) -> CsrfLayer {
    CsrfLayer {
        settings: Arc::new(CsrfSettings {
            maxage: config.maxage,
            secure: !config.dev,
        }),
    }
}

#[derive(Debug)]
struct CsrfSettings {
    maxage: u64,
    secure: bool,
}

/// See [`csrf_layer`].
#[derive(Debug, Clone)]
pub struct CsrfLayer {
    settings: Arc<CsrfSettings>,
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// The [`Service`] produced by [`CsrfLayer`].
#[derive(Debug, Clone)]
pub struct CsrfService<S> {
    inner: S,
    settings: Arc<CsrfSettings>,
}

impl<S> Service<Request> for CsrfService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The readied service handles this request; its clone waits for the next
        let ready = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, ready);
        let settings = Arc::clone(&self.settings);

        Box::pin(async move { Ok(settings.handle(request, inner).await) })
    }
}

impl CsrfSettings {
    async fn handle<S>(&self, request: Request, mut inner: S) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible>,
    {
        let (token, fresh) = match cookie_token(&request) {
            Some(token) => (token, false),
            None => (CsrfToken::generate(), true),
        };

        let (mut parts, body) = request.into_parts();
        parts.extensions.insert(token.clone());

        let mut response = if is_safe(&parts.method) {
            match inner.call(Request::from_parts(parts, body)).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        } else {
            let (sent, body) = sent_token(&parts, body).await;

            if sent.as_deref().is_some_and(|sent| token.verify(sent)) {
                match inner.call(Request::from_parts(parts, body)).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            } else {
                warn!(
                    method = %parts.method,
                    path = parts.uri.path(),
                    token_sent = sent.is_some(),
                    "Rejected request that failed the CSRF check",
                );
                StatusCode::BAD_REQUEST.into_response()
            }
        };

        if fresh {
            match HeaderValue::try_from(self.cookie(&token)) {
                Ok(cookie) => {
                    response.headers_mut().append(SET_COOKIE, cookie);
                }
                Err(error) => debug!(?error, "Failed to encode CSRF cookie"),
            }
        }
        response
            .headers_mut()
            .append(VARY, HeaderValue::from_static("Cookie"));

        response
    }

    fn cookie(&self, token: &CsrfToken) -> String {
        let mut cookie = Cookie::build((CSRF_COOKIE_NAME, token.cookie_value()))
            .http_only(true)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure);

        if self.maxage > 0 {
            let maxage = i64::try_from(self.maxage).unwrap_or(i64::MAX);
            cookie = cookie.max_age(time::Duration::seconds(maxage));
        }

        cookie.build().to_string()
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn cookie_token(request: &Request) -> Option<CsrfToken> {
    request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == CSRF_COOKIE_NAME)
        .and_then(|cookie| CsrfToken::from_cookie(cookie.value()))
}

/// Finds the token sent with a request, buffering an urlencoded form body to
/// look for it. The returned body replaces the consumed one.
async fn sent_token(parts: &Parts, body: Body) -> (Option<String>, Body) {
    if let Some(header) = parts
        .headers
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
    {
        return (Some(header.to_string()), body);
    }

    let is_form = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    if !is_form {
        return (None, body);
    }

    let Ok(bytes) = to_bytes(body, FORM_BODY_LIMIT).await else {
        return (None, Body::empty());
    };

    let sent = form_field(&bytes, CSRF_COOKIE_NAME);

    (sent, Body::from(bytes))
}

fn form_field(body: &[u8], name: &str) -> Option<String> {
    let body = std::str::from_utf8(body).ok()?;

    body.split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| decode_form(key) == name)
        .map(|(_, value)| decode_form(value))
}

fn decode_form(input: &str) -> String {
    percent_decode_str(&input.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
