use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateway::{
        CheckoutSession, CheckoutSessionRequest, GatewayChargeStatus, GatewayStatusClient,
    },
    domain::entities::{gateway_kind::GatewayKind, recovery::StatusVerdict},
};

/// Scriptable gateway client. Tests register the status each reference
/// should report; unregistered references come back as `Unknown`.
#[derive(Default)]
pub struct MockGatewayClient {
    statuses: Mutex<HashMap<String, GatewayChargeStatus>>,
    transport_errors: Mutex<HashSet<String>>,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkout session settled: payment_status "paid".
    pub fn set_paid(&self, reference: &str) {
        self.set_native(reference, "complete", "paid");
    }

    /// Checkout session expired without payment.
    pub fn set_expired(&self, reference: &str) {
        self.set_native(reference, "expired", "unpaid");
    }

    /// Checkout session still open.
    pub fn set_open(&self, reference: &str) {
        self.set_native(reference, "open", "unpaid");
    }

    /// Register a raw session/payment status pair.
    pub fn set_native(&self, reference: &str, session_status: &str, payment_status: &str) {
        let status = GatewayChargeStatus {
            native_status: payment_status.to_string(),
            verdict: StatusVerdict::from_stripe_session(session_status, payment_status),
            raw: json!({
                "id": reference,
                "status": session_status,
                "payment_status": payment_status,
            }),
        };
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), status);
    }

    /// Simulate a transport failure for this reference.
    pub fn set_error(&self, reference: &str) {
        self.transport_errors
            .lock()
            .unwrap()
            .insert(reference.to_string());
    }

    fn lookup(&self, reference: &str) -> AppResult<GatewayChargeStatus> {
        if self.transport_errors.lock().unwrap().contains(reference) {
            return Err(AppError::GatewayUnavailable(format!(
                "simulated transport failure for {reference}"
            )));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or(GatewayChargeStatus {
                native_status: "not_found".to_string(),
                verdict: StatusVerdict::Unknown,
                raw: json!({ "id": reference, "error": "no such reference" }),
            }))
    }
}

#[async_trait]
impl GatewayStatusClient for MockGatewayClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    async fn fetch_session_status(&self, session_ref: &str) -> AppResult<GatewayChargeStatus> {
        self.lookup(session_ref)
    }

    async fn fetch_intent_status(&self, intent_ref: &str) -> AppResult<GatewayChargeStatus> {
        self.lookup(intent_ref)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        let session_ref = format!("cs_test_{}", request.payment_id.simple());
        Ok(CheckoutSession {
            redirect_url: format!("https://checkout.test/pay/{session_ref}"),
            session_ref,
            intent_ref: None,
        })
    }
}
