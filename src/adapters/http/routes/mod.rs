use axum::{
    Router,
    routing::{get, post},
};

use crate::adapters::http::app_state::AppState;

pub mod checkout;
pub mod gateway_return;
pub mod gateway_webhook;
pub mod ops;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout::create_checkout))
        .route(
            "/payments/{payment_id}/verify",
            get(gateway_return::verify_payment),
        )
        .route(
            "/webhooks/{gateway}",
            post(gateway_webhook::receive_webhook),
        )
        .route("/ops/recovery/scan", post(ops::run_recovery_scan))
        .route(
            "/ops/recovery/payments/{payment_id}",
            post(ops::recover_payment),
        )
        .route("/ops/payments/{payment_id}/refund", post(ops::refund_payment))
        .route("/ops/subscriptions/sweep", post(ops::run_subscription_sweep))
        .route(
            "/ops/subscriptions/{subscription_id}/cancel",
            post(ops::cancel_subscription),
        )
        .route(
            "/ops/subscriptions/{subscription_id}/pause",
            post(ops::pause_subscription),
        )
        .route(
            "/ops/subscriptions/{subscription_id}/resume",
            post(ops::resume_subscription),
        )
        .route(
            "/ops/subscriptions/{subscription_id}/plan",
            post(ops::change_subscription_plan),
        )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum_test::TestServer;
    use serde_json::json;

    use crate::{
        adapters::http::app_state::AppState,
        application::use_cases::payment_ledger::PaymentRepo,
        domain::entities::payment::PaymentStatus,
        infra::{app::create_app, config::AppConfig},
        test_utils::harness::TestHarness,
    };

    fn server_for(harness: &TestHarness) -> TestServer {
        let state = AppState {
            config: Arc::new(AppConfig::for_tests()),
            selector: harness.selector.clone(),
            ledger: harness.ledger.clone(),
            engine: harness.engine.clone(),
            reconciler: harness.reconciler.clone(),
            scanner: harness.scanner.clone(),
            gateway_clients: harness.gateway_clients.clone(),
        };
        TestServer::new(create_app(state)).expect("failed to build test server")
    }

    #[tokio::test]
    async fn webhook_completes_payment_and_duplicate_is_a_noop() {
        let harness = TestHarness::new().await;
        let payment = harness.pending_payment_with_session("cs_hook").await;
        let server = server_for(&harness);

        let body = json!({
            "event_type": "checkout.session.completed",
            "reference": "cs_hook",
            "data": { "event_id": "evt_1" },
        });

        let first = server.post("/api/webhooks/stripe").json(&body).await;
        first.assert_status_ok();
        let first_body: serde_json::Value = first.json();
        assert_eq!(first_body["outcome"], "applied");

        let second = server.post("/api/webhooks/stripe").json(&body).await;
        second.assert_status_ok();
        let second_body: serde_json::Value = second.json();
        assert_eq!(second_body["outcome"], "already_settled");

        let stored = harness.payments.get_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(harness.subscription_count(), 1);
    }

    #[tokio::test]
    async fn webhook_accepts_payment_id_as_reference() {
        let harness = TestHarness::new().await;
        let payment = harness.pending_purchase_payment().await;
        let server = server_for(&harness);

        let response = server
            .post("/api/webhooks/stripe")
            .json(&json!({
                "event_type": "payment.failed",
                "reference": payment.id.to_string(),
                "reason": "card_declined",
            }))
            .await;
        response.assert_status_ok();

        let stored = harness.payments.get_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn webhook_for_unknown_reference_is_acknowledged() {
        let harness = TestHarness::new().await;
        let server = server_for(&harness);

        let response = server
            .post("/api/webhooks/stripe")
            .json(&json!({
                "event_type": "checkout.session.completed",
                "reference": "cs_nobody",
            }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["outcome"], "ignored");
    }

    #[tokio::test]
    async fn return_verification_settles_a_paid_session() {
        let harness = TestHarness::new().await;
        let payment = harness.pending_payment_with_session("cs_back").await;
        harness.gateway.set_paid("cs_back");
        let server = server_for(&harness);

        let response = server
            .get(&format!("/api/payments/{}/verify", payment.id))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "completed");
        assert_eq!(harness.subscription_count(), 1);
    }

    #[tokio::test]
    async fn return_verification_reports_pending_when_gateway_is_down() {
        let harness = TestHarness::new().await;
        let payment = harness.pending_payment_with_session("cs_down").await;
        harness.gateway.set_error("cs_down");
        let server = server_for(&harness);

        let response = server
            .get(&format!("/api/payments/{}/verify", payment.id))
            .await;

        // The customer sees pending verification, never an error
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "pending_verification");
        let stored = harness.payments.get_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn recovery_scan_endpoint_supports_dry_run() {
        let harness = TestHarness::new().await;
        let payment = harness.pending_payment_with_session("cs_ops").await;
        harness.gateway.set_paid("cs_ops");
        harness.clock.advance(chrono::Duration::minutes(20));
        let server = server_for(&harness);

        let response = server
            .post("/api/ops/recovery/scan")
            .json(&json!({ "min_age_minutes": 10, "max_age_hours": 48, "dry_run": true }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["dry_run"], true);
        assert_eq!(body["recovered"], json!([payment.id.to_string()]));
        let stored = harness.payments.get_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }
}
