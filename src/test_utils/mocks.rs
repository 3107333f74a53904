//! In-memory mock implementations for the repository traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::notifier::{NotificationEvent, Notifier},
    application::use_cases::{
        account_selector::PaymentAccountRepo,
        payment_ledger::PaymentRepo,
        recovery_scanner::RecoveryAuditRepo,
        subscription_engine::{
            PlanRepo, SubscriptionEventRepo, SubscriptionRepo, needs_sweep,
        },
    },
    domain::entities::{
        gateway_kind::GatewayKind,
        payment::{Payment, PaymentStatus},
        payment_account::PaymentAccount,
        plan::Plan,
        recovery::RecoveryAttempt,
        subscription::{Subscription, SubscriptionEvent},
    },
};

// ============================================================================
// InMemoryPaymentAccountRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentAccountRepo {
    pub accounts: Mutex<HashMap<Uuid, PaymentAccount>>,
}

impl InMemoryPaymentAccountRepo {
    pub fn with_accounts(accounts: Vec<PaymentAccount>) -> Self {
        let map = accounts.into_iter().map(|a| (a.id, a)).collect();
        Self {
            accounts: Mutex::new(map),
        }
    }
}

#[async_trait]
impl PaymentAccountRepo for InMemoryPaymentAccountRepo {
    async fn list_active(&self, gateway: GatewayKind) -> AppResult<Vec<PaymentAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.gateway == gateway && a.active)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentAccount>> {
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn record_success(
        &self,
        id: Uuid,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.get_mut(&id) {
            account.successful_transactions += 1;
            account.total_amount_cents += amount_cents;
            account.last_used_at = Some(now);
            account.updated_at = now;
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(account) = accounts.get_mut(&id) {
            account.failed_transactions += 1;
            account.last_used_at = Some(now);
            account.updated_at = now;
        }
        Ok(())
    }
}

// ============================================================================
// InMemoryPaymentRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentRepo {
    pub payments: Mutex<HashMap<Uuid, Payment>>,
}

impl InMemoryPaymentRepo {
    /// Overwrite a stored payment directly (test setup only).
    pub fn replace(&self, payment: Payment) {
        self.payments.lock().unwrap().insert(payment.id, payment);
    }
}

#[async_trait]
impl PaymentRepo for InMemoryPaymentRepo {
    async fn insert(&self, payment: &Payment) -> AppResult<()> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self.payments.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_gateway_ref(&self, reference: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| {
                p.session_ref.as_deref() == Some(reference)
                    || p.intent_ref.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn set_gateway_refs(
        &self,
        id: Uuid,
        session_ref: Option<&str>,
        intent_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut payments = self.payments.lock().unwrap();
        if let Some(payment) = payments.get_mut(&id) {
            payment.session_ref = session_ref.map(str::to_string);
            payment.intent_ref = intent_ref.map(str::to_string);
            payment.updated_at = now;
        }
        Ok(())
    }

    async fn transition_from_pending(
        &self,
        id: Uuid,
        to: PaymentStatus,
        failure_reason: Option<&str>,
        gateway_response: &JsonValue,
        paid_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = to;
                payment.failure_reason = failure_reason.map(str::to_string);
                payment.gateway_response = gateway_response.clone();
                payment.paid_at = paid_at;
                payment.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_completed_to_refunded(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Completed => {
                payment.status = PaymentStatus::Refunded;
                payment.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn link_subscription(
        &self,
        payment_id: Uuid,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut payments = self.payments.lock().unwrap();
        if let Some(payment) = payments.get_mut(&payment_id) {
            payment.subscription_id = Some(subscription_id);
            payment.updated_at = now;
        }
        Ok(())
    }

    async fn list_pending_in_window(
        &self,
        created_from: DateTime<Utc>,
        created_to: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Payment>> {
        let mut candidates: Vec<Payment> = self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.status == PaymentStatus::Pending)
            .filter(|p| p.created_at >= created_from && p.created_at <= created_to)
            .filter(|p| p.has_gateway_ref())
            .cloned()
            .collect();
        candidates.sort_by_key(|p| (p.created_at, p.id));
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionRepo {
    pub fn all(&self) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn insert(&self, subscription: &Subscription) -> AppResult<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.subscriptions.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, subscription: &Subscription) -> AppResult<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_latest_active_for_email(
        &self,
        email: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.customer_email == email && s.status.is_active_lineage())
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    async fn list_due_for_sweep(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let mut due: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| needs_sweep(s, now))
            .cloned()
            .collect();
        due.sort_by_key(|s| (s.expires_at, s.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}

// ============================================================================
// InMemoryPlanRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanRepo {
    pub plans: Mutex<HashMap<Uuid, Plan>>,
}

impl InMemoryPlanRepo {
    pub fn with_plans(plans: Vec<Plan>) -> Self {
        let map = plans.into_iter().map(|p| (p.id, p)).collect();
        Self {
            plans: Mutex::new(map),
        }
    }

    pub fn insert(&self, plan: Plan) {
        self.plans.lock().unwrap().insert(plan.id, plan);
    }
}

#[async_trait]
impl PlanRepo for InMemoryPlanRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self.plans.lock().unwrap().get(&id).cloned())
    }
}

// ============================================================================
// InMemoryRecoveryAuditRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryRecoveryAuditRepo {
    pub attempts: Mutex<Vec<RecoveryAttempt>>,
}

#[async_trait]
impl RecoveryAuditRepo for InMemoryRecoveryAuditRepo {
    async fn append(&self, attempt: &RecoveryAttempt) -> AppResult<()> {
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn list_for_payment(
        &self,
        payment_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<RecoveryAttempt>> {
        Ok(self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemorySubscriptionEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionEventRepo {
    pub events: Mutex<Vec<SubscriptionEvent>>,
}

impl InMemorySubscriptionEventRepo {
    pub fn event_types_for(&self, subscription_id: Uuid) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subscription_id == subscription_id)
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl SubscriptionEventRepo for InMemorySubscriptionEventRepo {
    async fn append(&self, event: &SubscriptionEvent) -> AppResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

/// Captures dispatched events for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}
