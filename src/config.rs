use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::money;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_REFUND_WINDOW_DAYS: u32 = 30;
const DEFAULT_REFUND_SUFFIX: &str = "-R-";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(ValidationErrors),
}

/// Store-wide money, tax and refund policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// ISO 4217 currency code orders are recorded in
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    /// Overrides the decimal precision derived from the currency
    #[serde(default)]
    pub currency_decimals: Option<u32>,

    /// Whether checkout charges tax
    #[serde(default)]
    pub tax_enabled: bool,

    /// Percent applied when no location-specific rate matches (e.g. 8.25)
    #[serde(default)]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: Decimal,

    /// Days after completion an order may still be refunded, 0 = no limit
    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: u32,

    /// Separator placed between a parent order number and the refund counter
    #[serde(default = "default_refund_suffix")]
    #[validate(length(min = 1, max = 16))]
    pub refund_suffix: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            currency_decimals: None,
            tax_enabled: false,
            default_tax_rate: Decimal::ZERO,
            refund_window_days: default_refund_window_days(),
            refund_suffix: default_refund_suffix(),
        }
    }
}

impl StoreSettings {
    /// Decimal places amounts are sanitized to
    pub fn decimals(&self) -> u32 {
        self.currency_decimals
            .unwrap_or_else(|| money::currency_decimals(&self.currency))
    }
}

/// Stripe credentials and webhook verification settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StripeSettings {
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Signing secret; when absent webhook signatures are not checked
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: i64,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            api_base: default_stripe_api_base(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

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

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub store: StoreSettings,

    #[serde(default)]
    #[validate]
    pub stripe: StripeSettings,
}

impl AppConfig {
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            store: StoreSettings::default(),
            stripe: StripeSettings::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.is_production() && self.stripe.secret_key.is_some() && self.stripe.webhook_secret.is_none() {
            let mut err = ValidationError::new("webhook_secret");
            err.message = Some("stripe.webhook_secret is required in production".into());
            errors.add("stripe", err);
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_refund_window_days() -> u32 {
    DEFAULT_REFUND_WINDOW_DAYS
}

fn default_refund_suffix() -> String {
    DEFAULT_REFUND_SUFFIX.to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_webhook_tolerance_secs() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

/// Validates log level values
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

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("currency must be a three letter ISO 4217 code".into());
        Err(err)
    }
}

fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a percent between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("edd_orders={},tower_http=info,sea_orm=warn", level);
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
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// [`load_config`] reading its files from `dir`.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://edd_orders.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "production".into())
    }

    #[test]
    fn store_defaults_follow_currency() {
        let mut store = StoreSettings::default();
        assert_eq!(store.decimals(), 2);
        store.currency = "JPY".into();
        assert_eq!(store.decimals(), 0);
        store.currency_decimals = Some(3);
        assert_eq!(store.decimals(), 3);
    }

    #[test]
    fn tax_rate_must_be_a_percent() {
        let mut cfg = base_config();
        cfg.store.default_tax_rate = dec!(8.25);
        assert!(cfg.validate().is_ok());
        cfg.store.default_tax_rate = dec!(120);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn currency_must_be_iso_code() {
        let mut cfg = base_config();
        cfg.store.currency = "DOLLARS".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_stripe_requires_webhook_secret() {
        let mut cfg = base_config();
        cfg.stripe.secret_key = Some("sk_test_123".into());
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.stripe.webhook_secret = Some("whsec_123".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    fn write_config(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(format!("{}.toml", name)), content).unwrap();
    }

    #[test]
    fn environment_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        write_config(
            dir.path(),
            "default",
            r#"
                database_url = "sqlite::memory:"
                port = 9000

                [store]
                currency = "EUR"
                refund_window_days = 14
            "#,
        );
        write_config(
            dir.path(),
            "staging",
            r#"
                port = 9100
                log_level = "debug"
            "#,
        );

        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.store.currency, "EUR");
        assert_eq!(cfg.store.refund_window_days, 14);
    }

    #[test]
    fn invalid_file_fails_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        write_config(
            dir.path(),
            "default",
            r#"
                [store]
                currency = "EURO"
            "#,
        );

        let result = load_config_from(dir.path(), "development");
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }
}
