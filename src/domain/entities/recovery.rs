use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical verdict after asking a gateway for ground truth about a payment.
///
/// `Unknown` means "we could not classify" (no usable reference, or a status
/// vocabulary we do not recognize) and must never be treated as `Failed`.
/// Transport failures are a separate error outcome, not a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "recovery_verdict", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatusVerdict {
    Completed,
    Failed,
    Pending,
    Unknown,
}

impl StatusVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusVerdict::Completed => "completed",
            StatusVerdict::Failed => "failed",
            StatusVerdict::Pending => "pending",
            StatusVerdict::Unknown => "unknown",
        }
    }

    /// Map a Stripe checkout session to a verdict. `payment_status` is the
    /// settlement signal; the session `status` only tells us whether the
    /// checkout window is still open.
    pub fn from_stripe_session(session_status: &str, payment_status: &str) -> Self {
        match payment_status {
            "paid" => StatusVerdict::Completed,
            // "no_payment_required" covers free trials and 100% discounts
            "no_payment_required" => StatusVerdict::Completed,
            "unpaid" => match session_status {
                "expired" => StatusVerdict::Failed,
                "open" | "complete" => StatusVerdict::Pending,
                _ => StatusVerdict::Unknown,
            },
            _ => StatusVerdict::Unknown,
        }
    }

    /// Map a Stripe payment intent status to a verdict.
    pub fn from_stripe_intent(status: &str) -> Self {
        match status {
            "succeeded" => StatusVerdict::Completed,
            "canceled" => StatusVerdict::Failed,
            "processing"
            | "requires_payment_method"
            | "requires_confirmation"
            | "requires_action"
            | "requires_capture" => StatusVerdict::Pending,
            _ => StatusVerdict::Unknown,
        }
    }

    /// Map a PayPal order status to a verdict.
    pub fn from_paypal_order(status: &str) -> Self {
        match status {
            "COMPLETED" => StatusVerdict::Completed,
            "VOIDED" => StatusVerdict::Failed,
            "CREATED" | "SAVED" | "APPROVED" | "PAYER_ACTION_REQUIRED" => StatusVerdict::Pending,
            _ => StatusVerdict::Unknown,
        }
    }

    /// Map a PayPal capture status to a verdict. `REFUNDED` still settled
    /// once; refunds are reconciled separately.
    pub fn from_paypal_capture(status: &str) -> Self {
        match status {
            "COMPLETED" | "REFUNDED" | "PARTIALLY_REFUNDED" => StatusVerdict::Completed,
            "DECLINED" | "FAILED" => StatusVerdict::Failed,
            "PENDING" => StatusVerdict::Pending,
            _ => StatusVerdict::Unknown,
        }
    }
}

impl std::fmt::Display for StatusVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one gateway status probe for one payment.
#[derive(Debug, Clone)]
pub struct RecoveryProbe {
    pub verdict: StatusVerdict,
    /// The gateway's own status string, kept for audit
    pub native_status: Option<String>,
    /// Raw provider payload, never parsed by core logic
    pub raw: serde_json::Value,
}

impl RecoveryProbe {
    pub fn unknown(reason: &str) -> Self {
        RecoveryProbe {
            verdict: StatusVerdict::Unknown,
            native_status: None,
            raw: serde_json::json!({ "reason": reason }),
        }
    }
}

/// Append-only audit row: one probe outcome for one payment. Kept so an
/// operator can reconstruct why a webhook was missed and what recovery saw.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAttempt {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub verdict: StatusVerdict,
    pub native_status: Option<String>,
    pub raw: serde_json::Value,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
}
