#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements the web application configuration sections.
mod config;
pub use self::config::{
    CsrfConfig, IdpConfig, IdpProvider, OidcProviderConfig, SessionConfig, ZitadelConfig,
};

/// Implements [`WebError`].
mod error;
pub use self::error::WebError;

/// Implements the [`WebApp`] server lifecycle.
mod server;
pub use self::server::{CloseFn, WebApp};

/// Implements the default middleware stack.
mod middleware;
pub use self::middleware::{REDACTED, RealIp, real_ip, sanitize_query, with_default_middlewares};

/// Implements double-submit cookie CSRF protection.
mod csrf;
pub use self::csrf::{
    CSRF_COOKIE_NAME, CSRF_HEADER_NAME, CsrfLayer, CsrfService, CsrfToken, csrf_layer, verify_token,
};

/// Implements the session layer.
mod session;
pub use self::session::{
    SESSION_DEADLINE_KEY, SessionDeadlineLayer, SessionDeadlineService, parse_same_site,
    session_layer,
};

/// Implements [`DocstoreSessionStore`].
mod session_store;
pub use self::session_store::{DocstoreSessionStore, SESSION_KEY_FIELD};

/// Implements the OIDC [`Authenticator`].
mod oidc;
pub use self::oidc::{Authenticator, OidcError, PkceCodeVerifier, oidc_url_params};

/// Implements the OIDC login routes.
mod oidc_routes;
pub use self::oidc_routes::{
    ACCESS_TOKEN_EXPIRY_KEY, ACCESS_TOKEN_KEY, CALLBACK_PATH, CONTINUE_TO_KEY, ID_TOKEN_KEY,
    LOGIN_PATH, LOGOUT_PATH, OidcRoutes, PKCE_CODE_VERIFIER_KEY, PROFILE_KEY, REFRESH_TOKEN_KEY,
    REGISTER_PATH,
};

/// Implements bearer token extraction.
mod bearer;
pub use self::bearer::{BearerToken, bearer_token};

/// Implements static asset routes.
mod static_routes;
pub use self::static_routes::static_routes;

/// Implements handlebars rendering.
mod render;
pub use self::render::{FileRenderer, RenderError, Renderer, RendererOptions};

/// Implements the [`IdentityProvider`] abstraction.
mod idp;
pub use self::idp::{IdentityProvider, IdpError, NopIdp, UserProfile, identity_provider};

/// Command-line flags for the web configuration sections.
pub mod cli;
