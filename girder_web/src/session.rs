use crate::SessionConfig;
use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::task::{Context, Poll};
use time::{OffsetDateTime, PrimitiveDateTime};
use tower::layer::util::Stack;
use tower::{Layer, Service};
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};
use tracing::{debug, warn};

/// Session key of the absolute session deadline, as a Unix timestamp.
pub const SESSION_DEADLINE_KEY: &str = "session_deadline";

/// Creates the session layers for the given store: an HTTP-only cookie for a
/// session that ends `lifetime` after it was first stored, however active it
/// is.
pub fn session_layer<S>(
    store: S,
    config: &SessionConfig,
) -> Stack<SessionDeadlineLayer, SessionManagerLayer<S>>
where
    S: SessionStore,
{
    let lifetime = time::Duration::try_from(config.lifetime).unwrap_or(time::Duration::MAX);

    // Replaced by the pinned deadline once a session holds data
    let manager = SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_http_only(true)
        .with_secure(config.cookie_secure)
        .with_same_site(parse_same_site(&config.cookie_samesite))
        .with_expiry(Expiry::OnInactivity(lifetime));

    Stack::new(SessionDeadlineLayer { lifetime }, manager)
}

/// Pins every non-empty session to an absolute deadline and starts expired
/// sessions over. Must sit inside a [`SessionManagerLayer`].
#[derive(Debug, Clone, Copy)]
pub struct SessionDeadlineLayer {
    lifetime: time::Duration,
}

impl<S> Layer<S> for SessionDeadlineLayer {
    type Service = SessionDeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionDeadlineService {
            inner,
            lifetime: self.lifetime,
        }
    }
}

/// The [`Service`] produced by [`SessionDeadlineLayer`].
#[derive(Debug, Clone)]
pub struct SessionDeadlineService<S> {
    inner: S,
    lifetime: time::Duration,
}

impl<S> Service<Request> for SessionDeadlineService<S>
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
        let ready = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, ready);
        let lifetime = self.lifetime;

        Box::pin(async move { Ok(enforce_deadline(lifetime, request, inner).await) })
    }
}

async fn enforce_deadline<S>(lifetime: time::Duration, request: Request, mut inner: S) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    let Some(session) = request.extensions().get::<Session>().cloned() else {
        warn!("No session found; the deadline layer must sit inside the session manager");
        return match inner.call(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
    };

    let now = OffsetDateTime::now_utc();
    let deadline = match stored_deadline(&session).await {
        Some(deadline) if deadline <= now => {
            debug!("Session reached its deadline; starting over");
            if let Err(error) = session.flush().await {
                warn!(?error, error_message = %error, "Failed to flush expired session");
            }
            None
        }
        deadline => deadline,
    };

    let response = match inner.call(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if session.is_empty().await {
        return response;
    }

    let deadline = match deadline {
        Some(deadline) => deadline,
        None => {
            let deadline = now
                .checked_add(lifetime)
                .unwrap_or(PrimitiveDateTime::MAX.assume_utc());

            if let Err(error) = session
                .insert(SESSION_DEADLINE_KEY, deadline.unix_timestamp())
                .await
            {
                warn!(?error, error_message = %error, "Failed to store session deadline");
            }

            deadline
        }
    };

    session.set_expiry(Some(Expiry::AtDateTime(deadline)));

    response
}

async fn stored_deadline(session: &Session) -> Option<OffsetDateTime> {
    match session.get::<i64>(SESSION_DEADLINE_KEY).await {
        Ok(deadline) => deadline.and_then(|deadline| OffsetDateTime::from_unix_timestamp(deadline).ok()),
        Err(error) => {
            warn!(?error, error_message = %error, "Failed to read session deadline");
            None
        }
    }
}

/// Maps a configured SameSite mode, falling back to `Lax`.
pub fn parse_same_site(mode: &str) -> SameSite {
    match mode {
        "lax" => SameSite::Lax,
        "strict" => SameSite::Strict,
        "none" => {
            warn!("Session cookie samesite mode 'none' is prone to XSRF attacks");
            SameSite::None
        }
        other => {
            warn!(
                mode = other,
                "Could not parse cookie samesite mode \"{other}\". Using default mode.",
            );
            SameSite::Lax
        }
    }
}
