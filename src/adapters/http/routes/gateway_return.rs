use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::payment_ledger::PaymentRepo,
    domain::entities::{payment::PaymentStatus, recovery::StatusVerdict},
};

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub payment_id: Uuid,
    /// completed | failed | cancelled | pending_verification
    pub status: &'static str,
}

/// Browser-return verification: the customer came back from the hosted
/// checkout page, so ask the gateway for ground truth right away instead of
/// waiting for the webhook.
///
/// A genuinely stuck payment reports `pending_verification`, never an
/// error; recovery resolves it later.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<VerifyResponse>> {
    let payment = state
        .ledger
        .payments()
        .get_by_id(payment_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = match payment.status {
        PaymentStatus::Completed | PaymentStatus::Refunded => "completed",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Cancelled => "cancelled",
        PaymentStatus::Pending => match state.reconciler.check_status(&payment).await {
            Ok(probe) => match probe.verdict {
                StatusVerdict::Completed => {
                    state
                        .ledger
                        .mark_completed(
                            payment.id,
                            &json!({ "return_verification": probe.raw }),
                        )
                        .await?;
                    "completed"
                }
                StatusVerdict::Failed => {
                    let reason = probe
                        .native_status
                        .unwrap_or_else(|| "gateway reported failure".to_string());
                    state
                        .ledger
                        .mark_failed(payment.id, &reason, &json!({ "return_verification": probe.raw }))
                        .await?;
                    "failed"
                }
                StatusVerdict::Pending | StatusVerdict::Unknown => "pending_verification",
            },
            Err(AppError::GatewayUnavailable(err)) => {
                // Transient: the scheduled recovery scan retries this
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %err,
                    "Return verification could not reach the gateway"
                );
                "pending_verification"
            }
            Err(other) => return Err(other),
        },
    };

    Ok(Json(VerifyResponse {
        payment_id: payment.id,
        status,
    }))
}
