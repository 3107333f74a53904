use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::clock::Clock,
    application::use_cases::{
        gateway_reconciler::GatewayReconciler,
        payment_ledger::{PaymentLedger, PaymentRepo},
    },
    domain::entities::{
        payment::Payment,
        recovery::{RecoveryAttempt, RecoveryProbe, StatusVerdict},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait RecoveryAuditRepo: Send + Sync {
    /// Append-only: one row per probe, kept so an operator can reconstruct
    /// why a webhook was missed.
    async fn append(&self, attempt: &RecoveryAttempt) -> AppResult<()>;

    async fn list_for_payment(
        &self,
        payment_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<RecoveryAttempt>>;
}

// ============================================================================
// Parameters & Reports
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Skip payments younger than this: they are still inside their normal
    /// processing window and a probe would race the webhook.
    pub min_age: Duration,
    /// Skip payments older than this: the customer has abandoned them.
    pub max_age: Duration,
    pub limit: i64,
    /// Probe and report without transitioning anything. Uses the identical
    /// selection and lookup path as a live scan.
    pub dry_run: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            min_age: Duration::minutes(10),
            max_age: Duration::hours(48),
            limit: 100,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub recovered: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    pub still_pending: usize,
    pub errors: usize,
    pub dry_run: bool,
}

/// What happened to a single payment during recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered,
    MarkedFailed,
    StillPending,
    AlreadySettled,
}

// ============================================================================
// RecoveryScanner
// ============================================================================

/// Finds payments stuck in `pending` past a threshold and drives them
/// through the reconciler to resolution.
///
/// Candidates are processed sequentially with a small inter-item delay to
/// respect gateway rate limits; this is a deliberate throughput cap. One
/// payment's failure never aborts the batch.
pub struct RecoveryScanner {
    payments: Arc<dyn PaymentRepo>,
    reconciler: Arc<GatewayReconciler>,
    ledger: Arc<PaymentLedger>,
    audit: Arc<dyn RecoveryAuditRepo>,
    clock: Arc<dyn Clock>,
    inter_item_delay: std::time::Duration,
}

impl RecoveryScanner {
    pub fn new(
        payments: Arc<dyn PaymentRepo>,
        reconciler: Arc<GatewayReconciler>,
        ledger: Arc<PaymentLedger>,
        audit: Arc<dyn RecoveryAuditRepo>,
        clock: Arc<dyn Clock>,
        inter_item_delay: std::time::Duration,
    ) -> Self {
        Self {
            payments,
            reconciler,
            ledger,
            audit,
            clock,
            inter_item_delay,
        }
    }

    pub async fn scan(&self, params: &ScanParams) -> AppResult<ScanReport> {
        if params.min_age >= params.max_age {
            return Err(AppError::InvalidInput(
                "min_age must be smaller than max_age".to_string(),
            ));
        }

        let now = self.clock.now();
        let candidates = self
            .payments
            .list_pending_in_window(now - params.max_age, now - params.min_age, params.limit)
            .await?;

        let mut report = ScanReport {
            scanned: candidates.len(),
            dry_run: params.dry_run,
            ..ScanReport::default()
        };

        for (index, payment) in candidates.iter().enumerate() {
            if index > 0 && !self.inter_item_delay.is_zero() {
                tokio::time::sleep(self.inter_item_delay).await;
            }

            match self.resolve(payment, params.dry_run).await {
                Ok(RecoveryOutcome::Recovered) => report.recovered.push(payment.id),
                Ok(RecoveryOutcome::MarkedFailed) => report.failed.push(payment.id),
                Ok(RecoveryOutcome::StillPending | RecoveryOutcome::AlreadySettled) => {
                    report.still_pending += 1;
                }
                Err(err) => {
                    // Transient: the payment stays pending and the next
                    // scheduled scan retries it
                    report.errors += 1;
                    tracing::warn!(
                        payment_id = %payment.id,
                        error = %err,
                        "Recovery probe failed, leaving payment for a later scan"
                    );
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            still_pending = report.still_pending,
            errors = report.errors,
            dry_run = params.dry_run,
            "Recovery scan finished"
        );

        Ok(report)
    }

    /// Operator surface: reconcile exactly one payment, idempotently.
    pub async fn recover_one(
        &self,
        payment_id: Uuid,
        dry_run: bool,
    ) -> AppResult<RecoveryOutcome> {
        let payment = self
            .payments
            .get_by_id(payment_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if payment.status.is_terminal() {
            return Ok(RecoveryOutcome::AlreadySettled);
        }

        self.resolve(&payment, dry_run).await
    }

    async fn resolve(&self, payment: &Payment, dry_run: bool) -> AppResult<RecoveryOutcome> {
        let probe = self.reconciler.check_status(payment).await?;
        self.append_audit(payment, &probe, dry_run).await;

        match probe.verdict {
            StatusVerdict::Completed => {
                if dry_run {
                    tracing::info!(
                        payment_id = %payment.id,
                        native_status = probe.native_status.as_deref().unwrap_or("-"),
                        "Dry run: payment would be marked completed"
                    );
                } else {
                    let data = json!({
                        "recovery": {
                            "native_status": probe.native_status,
                            "raw": probe.raw,
                        }
                    });
                    self.ledger.mark_completed(payment.id, &data).await?;
                }
                Ok(RecoveryOutcome::Recovered)
            }
            StatusVerdict::Failed => {
                let reason = probe
                    .native_status
                    .clone()
                    .unwrap_or_else(|| "gateway reported failure".to_string());
                if dry_run {
                    tracing::info!(
                        payment_id = %payment.id,
                        native_status = %reason,
                        "Dry run: payment would be marked failed"
                    );
                } else {
                    let data = json!({
                        "recovery": {
                            "native_status": probe.native_status,
                            "raw": probe.raw,
                        }
                    });
                    self.ledger.mark_failed(payment.id, &reason, &data).await?;
                }
                Ok(RecoveryOutcome::MarkedFailed)
            }
            // Not settled and not refuted: leave the payment untouched
            StatusVerdict::Pending | StatusVerdict::Unknown => Ok(RecoveryOutcome::StillPending),
        }
    }

    async fn append_audit(&self, payment: &Payment, probe: &RecoveryProbe, dry_run: bool) {
        let attempt = RecoveryAttempt {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            verdict: probe.verdict,
            native_status: probe.native_status.clone(),
            raw: probe.raw.clone(),
            dry_run,
            created_at: self.clock.now(),
        };
        // Audit only: a failed append never blocks reconciliation
        if let Err(err) = self.audit.append(&attempt).await {
            tracing::error!(
                payment_id = %payment.id,
                error = %err,
                "Failed to append recovery attempt"
            );
        }
    }
}
