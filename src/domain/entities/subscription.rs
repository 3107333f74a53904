use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::PlanSnapshot;

/// Billing-cycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Paused,
    /// Cancellation requested at period end; service stays usable until
    /// `expires_at`, then the sweep finalizes it.
    PendingCancellation,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::PendingCancellation => "pending_cancellation",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        )
    }

    /// States that belong to a live subscription lineage: renewals may
    /// attach to them and the sweep still tracks them.
    pub fn is_active_lineage(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the customer currently has access to the entitlement.
    /// `past_due` stays usable during its grace window; `paused` does not.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trial
                | SubscriptionStatus::Active
                | SubscriptionStatus::PastDue
                | SubscriptionStatus::PendingCancellation
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entitlement granted by a completed payment. Never deleted; only
/// transitioned to `cancelled` or `expired`.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_email: String,
    pub plan_id: Option<Uuid>,
    /// Plan terms frozen at purchase time
    pub plan: PlanSnapshot,
    pub status: SubscriptionStatus,
    pub starts_at: DateTime<Utc>,
    /// Always >= starts_at
    pub expires_at: DateTime<Utc>,
    /// None for non-recurring plans
    pub next_billing_at: Option<DateTime<Utc>>,
    pub billing_cycle_count: i32,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    /// Deferred plan change, applied by the sweep at the next boundary
    pub pending_plan_id: Option<Uuid>,
    /// The completed payment that created this subscription
    pub origin_payment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of a subscription state change.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionEvent {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: Option<SubscriptionStatus>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_not_active_lineage() {
        assert!(!SubscriptionStatus::Cancelled.is_active_lineage());
        assert!(!SubscriptionStatus::Expired.is_active_lineage());
        assert!(SubscriptionStatus::Active.is_active_lineage());
        assert!(SubscriptionStatus::PastDue.is_active_lineage());
        assert!(SubscriptionStatus::Paused.is_active_lineage());
    }

    #[test]
    fn access_during_grace_but_not_while_paused() {
        assert!(SubscriptionStatus::PastDue.grants_access());
        assert!(SubscriptionStatus::PendingCancellation.grants_access());
        assert!(!SubscriptionStatus::Paused.grants_access());
        assert!(!SubscriptionStatus::Expired.grants_access());
    }
}
