use crate::oidc_url_params;
use axum::Router;
use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::middleware::{Next, from_fn};
use axum::response::Response;
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use std::net::{IpAddr, SocketAddr};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

/// Replacement for the values of sanitized query parameters.
pub const REDACTED: &str = "REDACTED";

/// The client address of a request, as reported by proxies or, failing that,
/// by the peer socket.
///
/// Inserted as a request extension by [`with_default_middlewares`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealIp(pub IpAddr);

impl<S> FromRequestParts<S> for RealIp
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RealIp>()
            .copied()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Adds the recommended middlewares to the given router, outermost first:
///
/// - a UUID `x-request-id` on requests that lack one;
/// - request logging, with OIDC secrets in the query [redacted](sanitize_query);
/// - `x-request-id` propagation to the response;
/// - conversion of panics into `500 Internal Server Error`;
/// - [`RealIp`] detection.
pub fn with_default_middlewares<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default();

                info_span!(
                    "request",
                    method = %request.method(),
                    uri = %sanitize_query(request.uri(), oidc_url_params()),
                    request_id = request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::new())
            .layer(from_fn(detect_real_ip)),
    )
}

async fn detect_real_ip(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip());

    if let Some(ip) = real_ip(request.headers(), peer) {
        request.extensions_mut().insert(RealIp(ip));
    }

    next.run(request).await
}

/// Resolves the client address from the first present header among
/// `True-Client-IP`, `X-Real-IP` and `X-Forwarded-For` (its first entry).
///
/// Falls back to the `peer` address when none is present or the chosen one
/// does not parse.
pub fn real_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let claimed = header("true-client-ip")
        .or_else(|| header("x-real-ip"))
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .map(str::trim)
        });

    claimed
        .and_then(|claimed| claimed.parse().ok())
        .or(peer)
}

/// Renders the path and query of `uri`, with the values of the given query
/// parameters replaced by [`REDACTED`].
pub fn sanitize_query(uri: &http::Uri, params: &[&str]) -> String {
    let path = uri.path();

    let Some(query) = uri.query() else {
        return path.to_string();
    };

    let query = query
        .split('&')
        .map(|pair| {
            let name = pair.split_once('=').map_or(pair, |(name, _)| name);

            if params.contains(&name) {
                format!("{name}={REDACTED}")
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{path}?{query}")
}
