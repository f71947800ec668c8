mod app_config;

pub use app_config::{
    AppConfig, DatabaseConfig, EndpointConfig, GatewayCredentials, JazzCashConfig, LoggingConfig,
    RegistrationConfig, ServerConfig,
};
