use std::sync::Arc;

use tokio::time::interval;
use tracing::{error, info};

use crate::{
    application::use_cases::{
        recovery_scanner::{RecoveryScanner, ScanParams},
        subscription_engine::SubscriptionEngine,
    },
    infra::config::AppConfig,
};

/// Periodic lost-payment recovery. Runs forever; a failed cycle is logged
/// and the next tick retries.
pub async fn run_recovery_loop(scanner: Arc<RecoveryScanner>, config: Arc<AppConfig>) {
    let mut ticker = interval(config.recovery_interval);

    info!(
        interval_secs = config.recovery_interval.as_secs(),
        "Recovery worker started"
    );

    loop {
        ticker.tick().await;

        let params = ScanParams {
            min_age: config.recovery_min_age,
            max_age: config.recovery_max_age,
            limit: config.recovery_batch_limit,
            dry_run: false,
        };
        if let Err(err) = scanner.scan(&params).await {
            error!(error = %err, "Recovery scan failed");
        }
    }
}

/// Periodic subscription lifecycle sweep: expiry, grace windows, deferred
/// cancellations and scheduled plan changes.
pub async fn run_expiry_sweep_loop(engine: Arc<SubscriptionEngine>, config: Arc<AppConfig>) {
    let mut ticker = interval(config.sweep_interval);

    info!(
        interval_secs = config.sweep_interval.as_secs(),
        "Subscription sweep worker started"
    );

    loop {
        ticker.tick().await;

        if let Err(err) = engine.sweep().await {
            error!(error = %err, "Subscription sweep failed");
        }
    }
}
