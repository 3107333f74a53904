use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::use_cases::payment_ledger::{PaymentRepo, TransitionOutcome},
    domain::entities::{gateway_kind::GatewayKind, payment::Payment},
};

/// Minimal event shape the webhook receiver hands us after verifying the
/// provider's signature upstream. Full provider wire formats stay outside
/// the core; only the settlement signal crosses this boundary.
#[derive(Debug, Deserialize)]
pub struct GatewayWebhookEvent {
    pub event_type: String,
    /// Gateway session/intent reference, or our own payment id
    pub reference: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub data: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// applied | already_settled | ignored
    pub outcome: &'static str,
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<GatewayKind>,
    Json(event): Json<GatewayWebhookEvent>,
) -> AppResult<Json<WebhookResponse>> {
    let Some(payment) = lookup_payment(&state, &event.reference).await? else {
        // Unknown reference: acknowledge so the provider stops retrying,
        // but keep the event on record in the log
        tracing::warn!(
            gateway = %gateway,
            reference = %event.reference,
            event_type = %event.event_type,
            "Webhook for unknown payment reference"
        );
        return Ok(Json(WebhookResponse { outcome: "ignored" }));
    };

    if payment.gateway != gateway {
        tracing::warn!(
            payment_id = %payment.id,
            expected = %payment.gateway,
            got = %gateway,
            "Webhook gateway does not match the payment, ignoring"
        );
        return Ok(Json(WebhookResponse { outcome: "ignored" }));
    }

    let outcome = match classify(&event.event_type) {
        EventClass::Completed => state.ledger.mark_completed(payment.id, &event.data).await?,
        EventClass::Failed => {
            let reason = event.reason.as_deref().unwrap_or(&event.event_type);
            state
                .ledger
                .mark_failed(payment.id, reason, &event.data)
                .await?
        }
        EventClass::Cancelled => state.ledger.mark_cancelled(payment.id).await?,
        EventClass::Unhandled => {
            tracing::debug!(
                payment_id = %payment.id,
                event_type = %event.event_type,
                "Unhandled webhook event type"
            );
            return Ok(Json(WebhookResponse { outcome: "ignored" }));
        }
    };

    Ok(Json(WebhookResponse {
        outcome: match outcome {
            TransitionOutcome::Applied => "applied",
            TransitionOutcome::AlreadySettled => "already_settled",
        },
    }))
}

async fn lookup_payment(state: &AppState, reference: &str) -> AppResult<Option<Payment>> {
    // client_reference_id round-trips our payment id; otherwise it is a
    // gateway-side reference
    if let Ok(payment_id) = Uuid::parse_str(reference) {
        return state.ledger.payments().get_by_id(payment_id).await;
    }
    state.ledger.payments().find_by_gateway_ref(reference).await
}

enum EventClass {
    Completed,
    Failed,
    Cancelled,
    Unhandled,
}

fn classify(event_type: &str) -> EventClass {
    match event_type {
        "payment.completed" | "checkout.session.completed" | "PAYMENT.CAPTURE.COMPLETED" => {
            EventClass::Completed
        }
        "payment.failed"
        | "checkout.session.expired"
        | "PAYMENT.CAPTURE.DENIED"
        | "CHECKOUT.ORDER.VOIDED" => EventClass::Failed,
        "payment.cancelled" => EventClass::Cancelled,
        _ => EventClass::Unhandled,
    }
}
