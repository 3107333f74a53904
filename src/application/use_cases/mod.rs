pub mod account_selector;
pub mod gateway_client_factory;
pub mod gateway_reconciler;
pub mod payment_ledger;
pub mod recovery_scanner;
pub mod subscription_engine;
