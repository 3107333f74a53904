use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        account_selector::PaymentAccountRepo, gateway_client_factory::GatewayClientFactory,
    },
    domain::entities::{payment::Payment, recovery::RecoveryProbe},
};

/// Queries a gateway's authoritative status for a payment and maps it to a
/// canonical verdict.
///
/// A transport or auth failure is an error outcome, never a verdict: callers
/// must not transition payment state on it. `Unknown` (no usable reference,
/// unrecognized status vocabulary) must not be treated as `Failed`.
pub struct GatewayReconciler {
    accounts: Arc<dyn PaymentAccountRepo>,
    clients: Arc<GatewayClientFactory>,
}

impl GatewayReconciler {
    pub fn new(accounts: Arc<dyn PaymentAccountRepo>, clients: Arc<GatewayClientFactory>) -> Self {
        Self { accounts, clients }
    }

    pub async fn check_status(&self, payment: &Payment) -> AppResult<RecoveryProbe> {
        let account = self
            .accounts
            .get_by_id(payment.account_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    payment_id = %payment.id,
                    account_id = %payment.account_id,
                    "Payment references a missing account"
                );
                AppError::GatewayNotConfigured
            })?;

        let client = self.clients.for_account(&account)?;

        // Prefer the checkout-session reference; fall back to the intent
        let status = if let Some(session_ref) = payment.session_ref.as_deref() {
            client.fetch_session_status(session_ref).await?
        } else if let Some(intent_ref) = payment.intent_ref.as_deref() {
            client.fetch_intent_status(intent_ref).await?
        } else {
            return Ok(RecoveryProbe::unknown("payment has no gateway reference"));
        };

        Ok(RecoveryProbe {
            verdict: status.verdict,
            native_status: Some(status.native_status),
            raw: status.raw,
        })
    }
}
