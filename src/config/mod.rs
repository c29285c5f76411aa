use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::{security_headers, CallbackVerifier};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_addr: SocketAddr,
    pub is_production: bool,
    /// Currency units needed for one loyalty point.
    pub point_currency_ratio: Decimal,
    pub gateway_url: String,
    pub gateway_secret_key: String,
    pub callback_token: String,
    pub invoice_duration: Duration,
    pub pos_base_url: String,
    pub pos_api_key: String,
    pub allow_same_invoice_redemption: bool,
    pub cors_allowed_origins: String,
    pub redis_url: String,
    pub badge_topic_prefix: String,
    pub badge_invoice_topic: String,
    pub push_api_url: String,
    pub push_app_id: String,
    pub push_api_key: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

fn parsed<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    let raw = var_or(name, default);
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw))
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let is_production = env::var("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        let point_currency_ratio: Decimal = parsed("POINT_CURRENCY_RATIO", "1000")?;
        if point_currency_ratio <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue(
                "POINT_CURRENCY_RATIO".to_string(),
                point_currency_ratio.to_string(),
            ));
        }

        let allow_same_invoice_redemption = if is_production {
            if flag("ALLOW_SAME_INVOICE_REDEMPTION") {
                tracing::warn!("ALLOW_SAME_INVOICE_REDEMPTION ignored in production");
            }
            false
        } else {
            flag("ALLOW_SAME_INVOICE_REDEMPTION")
        };

        Ok(Self {
            database_url: var_or("DATABASE_URL", "postgres://localhost/arena"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", "5")?,
            server_addr: parsed("SERVER_ADDR", "0.0.0.0:3001")?,
            is_production,
            point_currency_ratio,
            gateway_url: var_or("PAYMENT_GATEWAY_URL", "https://api.xendit.co"),
            gateway_secret_key: required("PAYMENT_GATEWAY_SECRET_KEY")?,
            callback_token: required("PAYMENT_CALLBACK_TOKEN")?,
            invoice_duration: Duration::from_secs(parsed("INVOICE_DURATION_SECS", "86400")?),
            pos_base_url: required("POS_BASE_URL")?,
            pos_api_key: required("POS_API_KEY")?,
            allow_same_invoice_redemption,
            cors_allowed_origins: var_or("CORS_ALLOWED_ORIGINS", cors::DEFAULT_ALLOWED_ORIGINS),
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379"),
            badge_topic_prefix: var_or("BADGE_TOPIC_PREFIX", "badge.check"),
            badge_invoice_topic: var_or("BADGE_INVOICE_TOPIC", "badge.invoice"),
            push_api_url: var_or(
                "PUSH_API_URL",
                "https://onesignal.com/api/v1/notifications",
            ),
            push_app_id: var_or("PUSH_APP_ID", ""),
            push_api_key: var_or("PUSH_API_KEY", ""),
        })
    }
}
