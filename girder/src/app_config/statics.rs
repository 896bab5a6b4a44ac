use crate::AppConfig;
use config::Config as ProxyConfig;
use std::sync::OnceLock;

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

static PROXY_CONFIG: OnceLock<ProxyConfig> = OnceLock::new();

pub(crate) struct StaticAppConfig;

impl StaticAppConfig {
    pub(crate) fn app_config() -> &'static AppConfig {
        APP_CONFIG
            .get()
            .expect("the application configuration should not be accessed before boot")
    }

    pub(crate) fn proxy_config() -> &'static ProxyConfig {
        PROXY_CONFIG
            .get()
            .expect("the proxy configuration should not be accessed before boot")
    }

    pub(crate) fn seed(proxy_config: ProxyConfig) {
        let app_config = proxy_config
            .clone()
            .try_deserialize::<AppConfig>()
            .unwrap_or_else(|error| {
                panic!("failed to parse the application configuration: {}", error)
            });

        PROXY_CONFIG
            .set(proxy_config)
            .expect("the proxy configuration should not be seeded more than once");

        APP_CONFIG
            .set(app_config)
            .expect("the application configuration should not be seeded more than once");
    }
}
