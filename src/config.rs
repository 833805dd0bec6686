use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Checkout pricing and cart lifecycle settings.
///
/// All monetary values are integer minor units of `currency`; the tax
/// rate is expressed in basis points so pricing math stays in integers.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// ISO 4217 currency code applied to every order
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    /// Tax rate in basis points (500 = 5%)
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,

    /// Flat shipping fee charged per vendor group
    #[serde(default = "default_shipping_flat_fee")]
    pub shipping_flat_fee: i64,

    /// Vendor-group subtotal at or above which shipping is waived
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: i64,

    /// Idle cart time-to-live in seconds (entries expire lazily on read)
    #[serde(default = "default_cart_ttl_secs")]
    pub cart_ttl_secs: u64,

    /// How many times order-number generation retries on collision
    #[serde(default = "default_order_number_retries")]
    pub order_number_retries: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            tax_rate_bps: default_tax_rate_bps(),
            shipping_flat_fee: default_shipping_flat_fee(),
            free_shipping_threshold: default_free_shipping_threshold(),
            cart_ttl_secs: default_cart_ttl_secs(),
            order_number_retries: default_order_number_retries(),
        }
    }
}

/// Payment gateway client settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the payment provider API
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Bearer secret used to authorize gateway calls
    #[serde(default)]
    pub secret_key: String,

    /// URL the provider redirects to after authorization
    #[serde(default)]
    pub callback_url: String,

    /// Bound on each gateway round-trip, in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            secret_key: String::new(),
            callback_url: String::new(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

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

    /// Checkout pricing settings
    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,

    /// Payment gateway settings
    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,

    /// Create missing tables on startup (development and SQLite runs)
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
}

impl AppConfig {
    /// Minimal constructor used by tests and embedded callers.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            checkout: CheckoutConfig::default(),
            gateway: GatewayConfig::default(),
            auto_migrate: true,
            db_max_connections: 5,
            db_min_connections: 1,
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
        }
    }

    /// Load configuration from `config/default.toml`, an optional
    /// per-environment file, then `APP_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
            .add_source(File::from(Path::new(CONFIG_DIR).join(&environment)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        builder = builder.set_default("environment", environment)?;

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn default_currency() -> String {
    "NGN".to_string()
}
fn default_tax_rate_bps() -> u32 {
    500
}
fn default_shipping_flat_fee() -> i64 {
    500
}
fn default_free_shipping_threshold() -> i64 {
    50_000
}
fn default_cart_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_order_number_retries() -> u32 {
    3
}
fn default_gateway_base_url() -> String {
    "https://api.paystack.co".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    15
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
fn default_db_max_connections() -> u32 {
    20
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::new("sqlite::memory:");
        assert_eq!(cfg.checkout.currency, "NGN");
        assert_eq!(cfg.checkout.tax_rate_bps, 500);
        assert_eq!(cfg.checkout.shipping_flat_fee, 500);
        assert_eq!(cfg.checkout.cart_ttl_secs, 86_400);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn currency_must_be_three_chars() {
        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.checkout.currency = "NAIRA".to_string();
        assert!(cfg.validate().is_err());
    }
}
