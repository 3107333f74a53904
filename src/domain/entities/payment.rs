use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gateway_kind::GatewayKind;

/// Lifecycle status of a checkout attempt.
///
/// Transitions are monotone: `pending` moves to exactly one of the terminal
/// states and never reverts. `completed` may later become `refunded`, which
/// is driven by a separate refund payment row linked via
/// `original_payment_id` so the original settled amount stays on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// True once the payment has left `pending`. Terminal statuses are never
    /// overwritten by a later notification path.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Refunded)
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of record a payment row is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// First purchase of a plan
    Purchase,
    /// Renewal of an existing subscription
    Renewal,
    /// Refund row linked back to a completed payment
    Refund,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Purchase => "purchase",
            PaymentKind::Renewal => "renewal",
            PaymentKind::Refund => "refund",
        }
    }
}

/// One checkout attempt. Created in `pending` when the customer is sent to
/// the hosted gateway page; mutated exclusively through `PaymentLedger`
/// transition operations; never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub gateway: GatewayKind,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    /// Checkout-session-style reference at the gateway (preferred for lookups)
    pub session_ref: Option<String>,
    /// Payment-intent-style reference at the gateway (fallback for lookups)
    pub intent_ref: Option<String>,
    pub plan_id: Option<Uuid>,
    /// Set once the payment has been materialized into a subscription
    pub subscription_id: Option<Uuid>,
    /// Explicit renewal target, set by the caller for renewal payments
    pub renews_subscription_id: Option<Uuid>,
    /// For refund rows, the completed payment being refunded
    pub original_payment_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    /// Raw provider payloads, merged additively across notification paths.
    /// Audit-only: core logic never parses this.
    pub gateway_response: serde_json::Value,
    pub client_ip: Option<String>,
    pub client_locale: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Whether a gateway-side status lookup is possible at all.
    pub fn has_gateway_ref(&self) -> bool {
        self.session_ref.is_some() || self.intent_ref.is_some()
    }
}
