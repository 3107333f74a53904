use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{gateway_kind::GatewayKind, recovery::StatusVerdict},
};

/// A gateway's answer to one status lookup.
#[derive(Debug, Clone)]
pub struct GatewayChargeStatus {
    /// The gateway's own status string (e.g. "succeeded", "COMPLETED")
    pub native_status: String,
    pub verdict: StatusVerdict,
    /// Raw provider payload for the audit trail
    pub raw: JsonValue,
}

/// What the checkout flow needs to open a hosted gateway session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Internal payment id, round-tripped as the gateway-side reference
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A freshly created hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_ref: String,
    pub intent_ref: Option<String>,
    /// URL the customer is redirected to
    pub redirect_url: String,
}

/// Capability interface one gateway client implements.
///
/// One implementation per `GatewayKind`, instantiated with a specific
/// account's credentials by `GatewayClientFactory`. All calls have bounded
/// timeouts; transport failures surface as `AppError::GatewayUnavailable`
/// and are never folded into a verdict.
#[async_trait]
pub trait GatewayStatusClient: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Authoritative status for a checkout-session-style reference.
    async fn fetch_session_status(&self, session_ref: &str) -> AppResult<GatewayChargeStatus>;

    /// Authoritative status for a payment-intent-style reference.
    async fn fetch_intent_status(&self, intent_ref: &str) -> AppResult<GatewayChargeStatus>;

    /// Open a hosted checkout session for a new pending payment.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession>;
}
