use crate::IdpProvider;
use clap::{Arg, ArgAction, Command, value_parser};
use girder_config::FlagBindings;

/// Adds the OIDC provider flags, bound under `{prefix}oidc.`.
pub fn oidc_args(cmd: Command, bindings: &mut FlagBindings, prefix: &str) -> Command {
    bindings
        .bind(format!("{prefix}oidc.issuer_url"), "oidc-issuer")
        .bind(format!("{prefix}oidc.clientid"), "oidc-clientid")
        .bind(format!("{prefix}oidc.secret"), "oidc-secret")
        .bind(format!("{prefix}oidc.with_pkce"), "oidc-with-pkce")
        .bind(format!("{prefix}oidc.skip_iss_verification"), "oidc-skip-issuer-verification")
        .bind(format!("{prefix}oidc.discovery_url"), "oidc-discovery")
        .bind_many(format!("{prefix}oidc.additional_scopes"), "oidc-scopes");

    cmd.arg(
        Arg::new("oidc-issuer")
            .long("oidc-issuer")
            .help("The full URL (including domain and path) of the OIDC provider issuer."),
    )
    .arg(
        Arg::new("oidc-clientid")
            .long("oidc-clientid")
            .help("The oauth2 application client ID to use for the OIDC protocol."),
    )
    .arg(
        Arg::new("oidc-secret")
            .long("oidc-secret")
            .help("The oauth2 application client secret. Prefer setting it through the environment."),
    )
    .arg(
        Arg::new("oidc-with-pkce")
            .long("oidc-with-pkce")
            .action(ArgAction::SetTrue)
            .help("Use the PKCE flow for the oauth2 exchange."),
    )
    .arg(
        Arg::new("oidc-skip-issuer-verification")
            .long("oidc-skip-issuer-verification")
            .action(ArgAction::SetTrue)
            .help("Skip matching the issuer against the discovery URL. Requires --oidc-discovery."),
    )
    .arg(
        Arg::new("oidc-discovery")
            .long("oidc-discovery")
            .help("The full base URL of the OIDC provider discovery page."),
    )
    .arg(
        Arg::new("oidc-scopes")
            .long("oidc-scopes")
            .action(ArgAction::Append)
            .value_delimiter(',')
            .help("Additional oauth2 scopes to request for the OIDC token."),
    )
}

/// Adds the session cookie flags, bound under `{prefix}session.`.
pub fn session_args(
    cmd: Command,
    bindings: &mut FlagBindings,
    prefix: &str,
    default_cookie: &'static str,
) -> Command {
    bindings
        .bind(format!("{prefix}session.lifetime"), "session-lifetime")
        .bind(format!("{prefix}session.cookie_name"), "session-cookie")
        .bind(format!("{prefix}session.cookie_secure"), "session-cookie-secure")
        .bind(format!("{prefix}session.cookie_samesite"), "session-cookie-samesite");

    cmd.arg(
        Arg::new("session-lifetime")
            .long("session-lifetime")
            .default_value("336h")
            .help("The lifetime of the session cookie."),
    )
    .arg(
        Arg::new("session-cookie")
            .long("session-cookie")
            .default_value(default_cookie)
            .help("The name of the cookie that stores the session ID."),
    )
    .arg(
        Arg::new("session-cookie-secure")
            .long("session-cookie-secure")
            .value_parser(value_parser!(bool))
            .num_args(0..=1)
            .default_value("true")
            .default_missing_value("true")
            .help("Whether the session cookie is marked secure."),
    )
    .arg(
        Arg::new("session-cookie-samesite")
            .long("session-cookie-samesite")
            .default_value("lax")
            .help("The SameSite mode of the session cookie."),
    )
}

/// Adds the CSRF cookie flags, bound under `{prefix}csrf.`.
pub fn csrf_args(cmd: Command, bindings: &mut FlagBindings, prefix: &str) -> Command {
    bindings
        .bind(format!("{prefix}csrf.maxage"), "csrf-maxage")
        .bind(format!("{prefix}csrf.dev"), "csrf-dev");

    cmd.arg(
        Arg::new("csrf-maxage")
            .long("csrf-maxage")
            .value_parser(value_parser!(u64))
            .default_value("0")
            .help("Maximum age of CSRF token cookies, in seconds."),
    )
    .arg(
        Arg::new("csrf-dev")
            .long("csrf-dev")
            .action(ArgAction::SetTrue)
            .help("Do not mark CSRF cookies secure, allowing plain http."),
    )
}

/// Adds the identity provider flags, bound under `{prefix}idp.`.
pub fn idp_args(
    cmd: Command,
    bindings: &mut FlagBindings,
    prefix: &str,
    default_provider: IdpProvider,
) -> Command {
    bindings
        .bind(format!("{prefix}idp.provider"), "idp-provider")
        .bind(format!("{prefix}idp.zitadel.instance_name"), "zitadel-instance-name")
        .bind(format!("{prefix}idp.zitadel.jwt_key_base64"), "zitadel-jwt-key");

    cmd.arg(
        Arg::new("idp-provider")
            .long("idp-provider")
            .value_parser(["zitadel", "nopidp"])
            .default_value(default_provider.as_str())
            .help("The identity provider that manages user accounts."),
    )
    .arg(
        Arg::new("zitadel-instance-name")
            .long("zitadel-instance-name")
            .help("The Zitadel instance hosting the users. Used with the zitadel provider."),
    )
    .arg(
        Arg::new("zitadel-jwt-key")
            .long("zitadel-jwt-key")
            .help("Base64-encoded JWT key for the Zitadel admin API. Prefer setting it through the environment."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CsrfConfig, IdpConfig, OidcProviderConfig, SessionConfig};
    use config::builder::DefaultState;
    use config::ConfigBuilder;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Web {
        oidc: OidcProviderConfig,
        session: SessionConfig,
        csrf: CsrfConfig,
        idp: IdpConfig,
    }

    fn command(bindings: &mut FlagBindings) -> Command {
        let cmd = Command::new("app");
        let cmd = oidc_args(cmd, bindings, "web.");
        let cmd = session_args(cmd, bindings, "web.", "app_session");
        let cmd = csrf_args(cmd, bindings, "web.");
        idp_args(cmd, bindings, "web.", IdpProvider::NopIdp)
    }

    #[test]
    fn flags_populate_web_config() {
        // Given
        let mut bindings = FlagBindings::new();
        let matches = command(&mut bindings)
            .try_get_matches_from([
                "app",
                "--oidc-issuer",
                "https://id.example.com",
                "--oidc-clientid",
                "web",
                "--oidc-with-pkce",
                "--oidc-scopes",
                "email,profile",
                "--session-cookie-secure",
                "false",
                "--csrf-maxage",
                "600",
                "--idp-provider",
                "zitadel",
                "--zitadel-instance-name",
                "acme",
                "--zitadel-jwt-key",
                "a2V5",
            ])
            .unwrap();

        // When
        let web = bindings
            .apply(ConfigBuilder::<DefaultState>::default(), &matches)
            .unwrap()
            .build()
            .unwrap()
            .get::<Web>("web")
            .unwrap();

        // Then
        assert_eq!(web.oidc.issuer_url, "https://id.example.com");
        assert_eq!(web.oidc.clientid, "web");
        assert_eq!(web.oidc.with_pkce, true);
        assert_eq!(web.oidc.skip_iss_verification, false);
        assert_eq!(web.oidc.additional_scopes, vec!["email", "profile"]);
        assert_eq!(web.session.cookie_name, "app_session");
        assert_eq!(web.session.cookie_secure, false);
        assert_eq!(web.session.lifetime, Duration::from_secs(336 * 3600));
        assert_eq!(web.csrf.maxage, 600);
        assert_eq!(web.csrf.dev, false);
        assert_eq!(web.idp.provider, IdpProvider::Zitadel);
        assert_eq!(web.idp.zitadel.unwrap().instance_name, "acme");
    }

    #[test]
    fn bindings_follow_prefix() {
        // Given
        let mut bindings = FlagBindings::new();

        // When
        let _ = csrf_args(Command::new("app"), &mut bindings, "admin.");

        // Then
        assert_eq!(
            bindings.keys().collect::<Vec<_>>(),
            vec!["admin.csrf.maxage", "admin.csrf.dev"],
        );
    }
}
