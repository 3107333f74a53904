use std::sync::Arc;

use crate::{
    application::use_cases::{
        account_selector::AccountSelector, gateway_client_factory::GatewayClientFactory,
        gateway_reconciler::GatewayReconciler, payment_ledger::PaymentLedger,
        recovery_scanner::RecoveryScanner, subscription_engine::SubscriptionEngine,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub selector: Arc<AccountSelector>,
    pub ledger: Arc<PaymentLedger>,
    pub engine: Arc<SubscriptionEngine>,
    pub reconciler: Arc<GatewayReconciler>,
    pub scanner: Arc<RecoveryScanner>,
    pub gateway_clients: Arc<GatewayClientFactory>,
}
