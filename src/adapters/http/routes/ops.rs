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
    application::use_cases::{
        recovery_scanner::{RecoveryOutcome, ScanParams, ScanReport},
        subscription_engine::{PlanChangeOutcome, SweepReport},
    },
    domain::entities::{payment::Payment, subscription::Subscription},
};

// ============================================================================
// Recovery
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub min_age_minutes: Option<i64>,
    pub max_age_hours: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn run_recovery_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> AppResult<Json<ScanReport>> {
    let defaults = ScanParams::default();
    let params = ScanParams {
        min_age: request
            .min_age_minutes
            .map(chrono::Duration::minutes)
            .unwrap_or(defaults.min_age),
        max_age: request
            .max_age_hours
            .map(chrono::Duration::hours)
            .unwrap_or(defaults.max_age),
        limit: request.limit.unwrap_or(defaults.limit),
        dry_run: request.dry_run,
    };
    let report = state.scanner.scan(&params).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize, Default)]
pub struct RecoverOneRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RecoverOneResponse {
    pub payment_id: Uuid,
    pub outcome: RecoveryOutcome,
}

pub async fn recover_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<RecoverOneRequest>,
) -> AppResult<Json<RecoverOneResponse>> {
    let outcome = state.scanner.recover_one(payment_id, request.dry_run).await?;
    Ok(Json(RecoverOneResponse {
        payment_id,
        outcome,
    }))
}

// ============================================================================
// Refunds
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct RefundRequest {
    /// Omit for a full refund
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub gateway_data: JsonValue,
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> AppResult<Json<Payment>> {
    let refund = state
        .ledger
        .refund(payment_id, request.amount_cents, &request.gateway_data)
        .await?;
    Ok(Json(refund))
}

// ============================================================================
// Subscriptions
// ============================================================================

pub async fn run_subscription_sweep(
    State(state): State<AppState>,
) -> AppResult<Json<SweepReport>> {
    let report = state.engine.sweep().await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub at_period_end: bool,
    pub reason: Option<String>,
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> AppResult<Json<Subscription>> {
    let subscription = state
        .engine
        .cancel(subscription_id, request.at_period_end, request.reason.as_deref())
        .await?;
    Ok(Json(subscription))
}

pub async fn pause_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<Subscription>> {
    Ok(Json(state.engine.pause(subscription_id).await?))
}

pub async fn resume_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<Subscription>> {
    Ok(Json(state.engine.resume(subscription_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan_id: Uuid,
    /// true: upgrade now with proration. false: defer to the next boundary.
    #[serde(default = "default_immediate")]
    pub immediate: bool,
}

fn default_immediate() -> bool {
    true
}

pub async fn change_subscription_plan(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(request): Json<ChangePlanRequest>,
) -> AppResult<Json<PlanChangeOutcome>> {
    let outcome = state
        .engine
        .change_plan(subscription_id, request.plan_id, request.immediate)
        .await?;
    Ok(Json(outcome))
}
