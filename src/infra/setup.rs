use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::PostgresPersistence},
    application::ports::{
        clock::{Clock, SystemClock},
        notifier::Notifier,
    },
    application::use_cases::{
        account_selector::{AccountSelector, PaymentAccountRepo},
        gateway_client_factory::GatewayClientFactory,
        gateway_reconciler::GatewayReconciler,
        payment_ledger::{PaymentLedger, PaymentRepo},
        recovery_scanner::{RecoveryAuditRepo, RecoveryScanner},
        subscription_engine::{
            PlanRepo, SubscriptionEngine, SubscriptionEventRepo, SubscriptionRepo,
        },
    },
    infra::{config::AppConfig, notify::TracingNotifier},
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = Arc::new(AppConfig::from_env());

    let persistence = Arc::new(PostgresPersistence::connect(&config.database_url).await?);

    let clock = Arc::new(SystemClock) as Arc<dyn Clock>;
    let notifier = Arc::new(TracingNotifier) as Arc<dyn Notifier>;

    let accounts = persistence.clone() as Arc<dyn PaymentAccountRepo>;
    let payments = persistence.clone() as Arc<dyn PaymentRepo>;
    let subscriptions = persistence.clone() as Arc<dyn SubscriptionRepo>;
    let plans = persistence.clone() as Arc<dyn PlanRepo>;
    let events = persistence.clone() as Arc<dyn SubscriptionEventRepo>;
    let audit = persistence.clone() as Arc<dyn RecoveryAuditRepo>;

    let selector = Arc::new(AccountSelector::new(
        accounts.clone(),
        config.selection_strategy,
        config.max_fallback_attempts,
        clock.clone(),
    ));
    let engine = Arc::new(SubscriptionEngine::new(
        subscriptions,
        plans,
        events,
        payments.clone(),
        notifier.clone(),
        clock.clone(),
    ));
    let ledger = Arc::new(PaymentLedger::new(
        payments.clone(),
        selector.clone(),
        engine.clone(),
        notifier,
        clock.clone(),
    ));
    let gateway_clients = Arc::new(GatewayClientFactory::new(config.gateway_http_timeout));
    let reconciler = Arc::new(GatewayReconciler::new(accounts, gateway_clients.clone()));
    let scanner = Arc::new(RecoveryScanner::new(
        payments,
        reconciler.clone(),
        ledger.clone(),
        audit,
        clock,
        config.recovery_call_delay,
    ));

    Ok(AppState {
        config,
        selector,
        ledger,
        engine,
        reconciler,
        scanner,
        gateway_clients,
    })
}

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "paygrid=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
