use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use url::Url;

use crate::domain::entities::payment_account::SelectionStrategy;

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: HeaderValue,
    /// How AccountSelector picks among eligible accounts
    pub selection_strategy: SelectionStrategy,
    pub max_fallback_attempts: usize,
    /// Bound on every gateway HTTP call, so a slow provider cannot stall a
    /// recovery batch indefinitely
    pub gateway_http_timeout: Duration,
    pub recovery_interval: Duration,
    pub recovery_min_age: chrono::Duration,
    pub recovery_max_age: chrono::Duration,
    pub recovery_batch_limit: i64,
    /// Courtesy delay between gateway calls inside one recovery batch
    pub recovery_call_delay: Duration,
    pub sweep_interval: Duration,
    /// Where the gateway sends the customer back after checkout
    pub checkout_success_url: Url,
    pub checkout_cancel_url: Url,
}

impl AppConfig {
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            database_url: String::new(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            selection_strategy: SelectionStrategy::LeastUsed,
            max_fallback_attempts: 3,
            gateway_http_timeout: Duration::from_secs(5),
            recovery_interval: Duration::from_secs(300),
            recovery_min_age: chrono::Duration::minutes(10),
            recovery_max_age: chrono::Duration::hours(48),
            recovery_batch_limit: 100,
            recovery_call_delay: Duration::ZERO,
            sweep_interval: Duration::from_secs(3600),
            checkout_success_url: "https://shop.test/checkout/success".parse().unwrap(),
            checkout_cancel_url: "https://shop.test/checkout/cancel".parse().unwrap(),
        }
    }

    pub fn from_env() -> Self {
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3002".parse().unwrap());
        let database_url: String = get_env("DATABASE_URL");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let selection_strategy: SelectionStrategy =
            get_env_default("SELECTION_STRATEGY", String::from("least_used"))
                .parse()
                .expect("SELECTION_STRATEGY must be least_used, round_robin, weighted or manual");
        let max_fallback_attempts: usize = get_env_default("MAX_FALLBACK_ATTEMPTS", 3);

        let gateway_http_timeout_secs: u64 = get_env_default("GATEWAY_HTTP_TIMEOUT_SECS", 10);
        let recovery_interval_secs: u64 = get_env_default("RECOVERY_INTERVAL_SECS", 300);
        let recovery_min_age_minutes: i64 = get_env_default("RECOVERY_MIN_AGE_MINUTES", 10);
        let recovery_max_age_hours: i64 = get_env_default("RECOVERY_MAX_AGE_HOURS", 48);
        let recovery_batch_limit: i64 = get_env_default("RECOVERY_BATCH_LIMIT", 100);
        let recovery_call_delay_ms: u64 = get_env_default("RECOVERY_CALL_DELAY_MS", 250);
        let sweep_interval_secs: u64 = get_env_default("SWEEP_INTERVAL_SECS", 3600);

        let checkout_success_url: Url = get_env("CHECKOUT_SUCCESS_URL");
        let checkout_cancel_url: Url = get_env("CHECKOUT_CANCEL_URL");

        Self {
            bind_addr,
            database_url,
            cors_origin,
            selection_strategy,
            max_fallback_attempts,
            gateway_http_timeout: Duration::from_secs(gateway_http_timeout_secs),
            recovery_interval: Duration::from_secs(recovery_interval_secs),
            recovery_min_age: chrono::Duration::minutes(recovery_min_age_minutes),
            recovery_max_age: chrono::Duration::hours(recovery_max_age_hours),
            recovery_batch_limit,
            recovery_call_delay: Duration::from_millis(recovery_call_delay_ms),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            checkout_success_url,
            checkout_cancel_url,
        }
    }
}
