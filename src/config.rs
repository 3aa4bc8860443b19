use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_MP_API_BASE: &str = "https://api.mercadopago.com";
const DEFAULT_MP_AUTH_BASE: &str = "https://auth.mercadopago.com.ar";

/// Application configuration structure.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key used to verify bearer tokens
    pub jwt_secret: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Public base URL of this deployment. Used to build the payment
    /// notification callback and the OAuth redirect URI.
    pub site_url: String,

    /// Mercado Pago REST API base URL
    #[serde(default = "default_mp_api_base")]
    pub mp_api_base_url: String,

    /// Mercado Pago authorization (OAuth) base URL
    #[serde(default = "default_mp_auth_base")]
    pub mp_auth_base_url: String,

    /// Whether to create missing tables on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_mp_api_base() -> String {
    DEFAULT_MP_API_BASE.to_string()
}

fn default_mp_auth_base() -> String {
    DEFAULT_MP_AUTH_BASE.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Site URL without a trailing slash, ready for path concatenation.
    pub fn site_url_trimmed(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// overlay, and `APP_*` environment variables (highest precedence).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", run_env.clone())?
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    // DATABASE_URL is honored without the APP_ prefix for deployment convenience.
    if let Ok(url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database_url", url)?;
    }

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

/// Initializes the tracing subscriber. `log_json` switches to structured output.
pub fn init_tracing(log_level: &str, log_json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
