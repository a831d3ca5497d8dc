use crate::errors::ServiceError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_ORDER_STORE: &str = "in-memory";
const DEFAULT_REDIS_NAMESPACE: &str = "quota-pay";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Credentials and endpoints for the payment gateway.
///
/// Every field is required before a payment operation may run. Missing
/// values are tolerated at startup so the rest of the service can boot;
/// each payment operation checks [`PaymentConfig::ensure_complete`] first.
#[derive(Clone, Default, Deserialize, Validate)]
pub struct PaymentConfig {
    #[serde(default)]
    #[validate(custom = "validate_non_blank")]
    pub app_id: String,

    #[serde(default)]
    #[validate(custom = "validate_non_blank")]
    pub app_secret: String,

    #[serde(default)]
    #[validate(custom = "validate_non_blank")]
    pub pay_url: String,

    #[serde(default)]
    #[validate(custom = "validate_non_blank")]
    pub query_url: String,

    #[serde(default)]
    #[validate(custom = "validate_non_blank")]
    pub notify_url: String,

    #[serde(default)]
    #[validate(custom = "validate_non_blank")]
    pub return_url: String,

    /// Site name shown on the gateway's checkout page
    #[serde(default, alias = "display_name")]
    #[validate(custom = "validate_non_blank")]
    pub wap_name: String,
}

impl PaymentConfig {
    /// Fails with [`ServiceError::ConfigError`] naming every blank setting.
    pub fn ensure_complete(&self) -> Result<(), ServiceError> {
        self.validate().map_err(|errors| {
            let mut missing: Vec<&str> = errors.field_errors().keys().copied().collect();
            missing.sort_unstable();
            ServiceError::ConfigError(format!(
                "missing payment settings: {}",
                missing.join(", ")
            ))
        })
    }
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("pay_url", &self.pay_url)
            .field("query_url", &self.query_url)
            .field("notify_url", &self.notify_url)
            .field("return_url", &self.return_url)
            .field("wap_name", &self.wap_name)
            .finish()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// HS256 secret used to verify caller bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Order store backend ("in-memory" or "redis")
    #[serde(default = "default_order_store")]
    #[validate(custom = "validate_order_store")]
    pub order_store: String,

    /// Redis connection URL, used when `order_store = "redis"`
    pub redis_url: String,

    /// Key prefix for everything this service writes to Redis
    #[serde(default = "default_redis_namespace")]
    pub redis_namespace: String,

    /// Timeout for each outbound gateway call (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub gateway_timeout_secs: u64,

    /// Timeout for a whole inbound request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// CORS: comma-separated list of allowed origins; permissive when unset
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Payment gateway settings
    #[serde(default)]
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything except the token
    /// secret and the gateway settings.
    pub fn new(jwt_secret: String, payment: PaymentConfig) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            jwt_secret,
            order_store: default_order_store(),
            redis_url: "redis://localhost:6379".to_string(),
            redis_namespace: default_redis_namespace(),
            gateway_timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cors_allowed_origins: None,
            payment,
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn uses_redis_store(&self) -> bool {
        self.order_store.eq_ignore_ascii_case("redis")
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_order_store() -> String {
    DEFAULT_ORDER_STORE.to_string()
}

fn default_redis_namespace() -> String {
    DEFAULT_REDIS_NAMESPACE.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn validate_non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_order_store(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("order_store");
            err.message = Some("order_store must be either 'in-memory' or 'redis'".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("quota_pay={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, e.g. APP__PAYMENT__APP_SECRET)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory and profile name.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    // jwt_secret has no default; it must come from a file or APP__JWT_SECRET
    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("redis_url", "redis://localhost:6379")?
        .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
        .add_source(File::with_name(&dir.join(run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if let Err(err) = app_config.payment.ensure_complete() {
        // Not fatal: payment endpoints answer with a configuration error until fixed
        error!("{}", err);
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}
