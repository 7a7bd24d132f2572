//! Configuration loading

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, BackoffSettings, GatewaySettings, LogFormat, LoggingConfig,
    ProviderConfig, default_providers,
};
