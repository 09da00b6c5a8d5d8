use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Storefront business constants (tax rate, shipping fee, free-shipping
/// threshold, COD ceiling, per-line quantity cap, return window) live here so
/// the pricing and checkout paths never hard-code them.
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

    /// Whether to create the database schema on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Flat tax rate applied to the taxable cart amount (e.g., 0.03 for 3%)
    #[serde(default = "default_tax_rate")]
    #[validate(range(min = 0.0, max = 0.99))]
    pub tax_rate: f64,

    /// Flat delivery charge below the free-shipping threshold
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: f64,

    /// Order value (after discounts) at which shipping becomes free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,

    /// Maximum order total eligible for cash on delivery
    #[serde(default = "default_cod_ceiling")]
    pub cod_ceiling: f64,

    /// Maximum quantity per cart line
    #[serde(default = "default_max_quantity_per_line")]
    pub max_quantity_per_line: i32,

    /// Days after delivery during which a return may be requested
    #[serde(default = "default_return_window_days")]
    pub return_window_days: i64,

    /// ISO currency code sent to the payment gateway
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Payment gateway API base URL
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Payment gateway key id (basic auth user)
    #[serde(default)]
    pub gateway_key_id: String,

    /// Payment gateway shared secret (basic auth password + HMAC key)
    #[serde(default)]
    pub gateway_key_secret: String,

    /// Bounded timeout for gateway calls, in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
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
fn default_tax_rate() -> f64 {
    0.03
}
fn default_shipping_fee() -> f64 {
    99.0
}
fn default_free_shipping_threshold() -> f64 {
    1000.0
}
fn default_cod_ceiling() -> f64 {
    1000.0
}
fn default_max_quantity_per_line() -> i32 {
    5
}
fn default_return_window_days() -> i64 {
    7
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_gateway_base_url() -> String {
    "https://api.gateway.example.com/v1".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    10
}
fn default_event_channel_capacity() -> usize {
    1024
}

impl AppConfig {
    /// Minimal configuration for tests and embedded use.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: 0,
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            tax_rate: default_tax_rate(),
            shipping_fee: default_shipping_fee(),
            free_shipping_threshold: default_free_shipping_threshold(),
            cod_ceiling: default_cod_ceiling(),
            max_quantity_per_line: default_max_quantity_per_line(),
            return_window_days: default_return_window_days(),
            currency: default_currency(),
            gateway_base_url: default_gateway_base_url(),
            gateway_key_id: "test_key".to_string(),
            gateway_key_secret: "test_secret".to_string(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn tax_rate(&self) -> Decimal {
        Decimal::from_f64(self.tax_rate).unwrap_or(Decimal::ZERO)
    }

    pub fn shipping_fee(&self) -> Decimal {
        Decimal::from_f64(self.shipping_fee).unwrap_or(Decimal::ZERO)
    }

    pub fn free_shipping_threshold(&self) -> Decimal {
        Decimal::from_f64(self.free_shipping_threshold).unwrap_or(Decimal::ZERO)
    }

    pub fn cod_ceiling(&self) -> Decimal {
        Decimal::from_f64(self.cod_ceiling).unwrap_or(Decimal::ZERO)
    }
}

/// Loads configuration from `config/{default,<env>}.toml` plus
/// `STOREFRONT_*` environment overrides, then validates it.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment =
        std::env::var("STOREFRONT_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("STOREFRONT"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(environment = %app_config.environment, "configuration loaded");
    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_storefront_constants() {
        let cfg = AppConfig::for_tests("sqlite::memory:");
        assert_eq!(cfg.tax_rate(), dec!(0.03));
        assert_eq!(cfg.shipping_fee(), dec!(99));
        assert_eq!(cfg.free_shipping_threshold(), dec!(1000));
        assert_eq!(cfg.cod_ceiling(), dec!(1000));
        assert_eq!(cfg.max_quantity_per_line, 5);
        assert_eq!(cfg.return_window_days, 7);
    }

    #[test]
    fn rate_validation_rejects_out_of_range() {
        let mut cfg = AppConfig::for_tests("sqlite::memory:");
        cfg.tax_rate = 1.5;
        assert!(cfg.validate().is_err());
    }
}
