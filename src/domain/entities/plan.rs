use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing interval unit for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_interval", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

impl BillingInterval {
    /// Entitlement days granted per interval unit. Months and years use the
    /// fixed 30/365-day convention.
    pub fn days(&self) -> i64 {
        match self {
            BillingInterval::Day => 1,
            BillingInterval::Week => 7,
            BillingInterval::Month => 30,
            BillingInterval::Year => 365,
        }
    }
}

/// Catalog record for a purchasable plan.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub interval_count: i32,
    pub trial_days: i32,
    pub grace_period_days: i32,
    /// Non-recurring plans grant a single term and have no next billing date.
    pub recurring: bool,
    pub active: bool,
}

impl Plan {
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: Some(self.id),
            code: self.code.clone(),
            name: self.name.clone(),
            price_cents: self.price_cents,
            currency: self.currency.clone(),
            interval: self.interval,
            interval_count: self.interval_count,
            trial_days: self.trial_days,
            grace_period_days: self.grace_period_days,
            recurring: self.recurring,
        }
    }
}

/// Plan terms frozen at purchase time and embedded into the subscription, so
/// historical invoices stay stable even if the catalog record changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub interval_count: i32,
    pub trial_days: i32,
    pub grace_period_days: i32,
    pub recurring: bool,
}

impl PlanSnapshot {
    /// One billing term of entitlement.
    pub fn duration(&self) -> Duration {
        Duration::days(self.duration_days())
    }

    pub fn duration_days(&self) -> i64 {
        self.interval.days() * self.interval_count.max(1) as i64
    }

    pub fn grace_period(&self) -> Duration {
        Duration::days(self.grace_period_days.max(0) as i64)
    }

    /// Safe default used when a payment references a missing plan: 30 days,
    /// non-recurring, no trial. Settlement is never blocked on the catalog.
    pub fn fallback(price_cents: i64, currency: &str) -> Self {
        PlanSnapshot {
            plan_id: None,
            code: "unknown".to_string(),
            name: "Unknown plan".to_string(),
            price_cents,
            currency: currency.to_string(),
            interval: BillingInterval::Day,
            interval_count: 30,
            trial_days: 0,
            grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
            recurring: false,
        }
    }
}

impl Default for PlanSnapshot {
    fn default() -> Self {
        PlanSnapshot::fallback(0, "usd")
    }
}

/// Grace window after a failed renewal, when the plan does not specify one.
pub const DEFAULT_GRACE_PERIOD_DAYS: i32 = 3;
