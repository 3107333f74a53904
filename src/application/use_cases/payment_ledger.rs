use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        clock::Clock,
        notifier::{NotificationEvent, Notifier},
    },
    application::use_cases::{
        account_selector::AccountSelector, subscription_engine::SubscriptionEngine,
    },
    domain::entities::{
        gateway_kind::GatewayKind,
        payment::{Payment, PaymentKind, PaymentStatus},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn insert(&self, payment: &Payment) -> AppResult<()>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Payment>>;

    /// Look up by either gateway reference (session or intent).
    async fn find_by_gateway_ref(&self, reference: &str) -> AppResult<Option<Payment>>;

    async fn set_gateway_refs(
        &self,
        id: Uuid,
        session_ref: Option<&str>,
        intent_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Conditional transition out of `pending`. Returns whether a row was
    /// actually changed; zero rows affected is the formal idempotent-no-op
    /// signal, not an error.
    async fn transition_from_pending(
        &self,
        id: Uuid,
        to: PaymentStatus,
        failure_reason: Option<&str>,
        gateway_response: &JsonValue,
        paid_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Conditional `completed -> refunded` transition, same contract.
    async fn transition_completed_to_refunded(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn link_subscription(
        &self,
        payment_id: Uuid,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Recovery candidates: pending payments created inside the window that
    /// carry at least one gateway reference, oldest first.
    async fn list_pending_in_window(
        &self,
        created_from: DateTime<Utc>,
        created_to: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Payment>>;
}

// ============================================================================
// Input Types
// ============================================================================

/// Ambient request data passed explicitly instead of being read from
/// globals, so ledger operations stay testable outside an HTTP request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub account_id: Uuid,
    pub gateway: GatewayKind,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub plan_id: Option<Uuid>,
    pub kind: PaymentKind,
    /// Explicit renewal target for `PaymentKind::Renewal`
    pub renews_subscription_id: Option<Uuid>,
    pub context: RequestContext,
}

/// What a transition call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This call performed the transition
    Applied,
    /// The payment had already left `pending`; the call was a no-op
    AlreadySettled,
}

// ============================================================================
// Transition Locks
// ============================================================================

/// Per-payment async locks guarding the whole read -> decide -> write ->
/// cascade sequence. Two concurrent notification paths (webhook + recovery
/// scan) must not both pass the precondition check and both create a
/// subscription.
#[derive(Default)]
struct TransitionLocks {
    inner: StdMutex<HashMap<Uuid, Arc<TokioMutex<()>>>>,
}

impl TransitionLocks {
    fn lock_for(&self, id: Uuid) -> Arc<TokioMutex<()>> {
        self.inner
            .lock()
            .expect("transition lock map poisoned")
            .entry(id)
            .or_default()
            .clone()
    }

    /// Drop the map entry once no other caller holds the handle.
    fn release(&self, id: Uuid, handle: Arc<TokioMutex<()>>) {
        let mut map = self.inner.lock().expect("transition lock map poisoned");
        // Two strong refs left: the map's and ours. Nobody is waiting.
        if Arc::strong_count(&handle) == 2 {
            map.remove(&id);
        }
    }
}

// ============================================================================
// Response Snapshot Merging
// ============================================================================

/// Merge a new provider payload into the stored snapshot additively. Keys
/// already recorded are kept at their first value; conflicting updates are
/// logged instead of silently overwriting the audit trail.
pub fn merge_gateway_response(base: &JsonValue, patch: &JsonValue) -> JsonValue {
    let mut merged = match base {
        JsonValue::Object(map) => map.clone(),
        JsonValue::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("previous".to_string(), other.clone());
            map
        }
    };

    match patch {
        JsonValue::Object(incoming) => {
            for (key, value) in incoming {
                match merged.get(key) {
                    None => {
                        merged.insert(key.clone(), value.clone());
                    }
                    Some(existing) if existing == value => {}
                    Some(_) => {
                        tracing::debug!(
                            key = %key,
                            "Conflicting gateway response key, keeping first-recorded value"
                        );
                    }
                }
            }
        }
        JsonValue::Null => {}
        other => {
            merged
                .entry("raw".to_string())
                .or_insert_with(|| other.clone());
        }
    }

    JsonValue::Object(merged)
}

// ============================================================================
// PaymentLedger
// ============================================================================

/// Owns the payment entity and its state transitions; the single authority
/// for "is this payment settled".
///
/// Settlement notice arrives through at least three independent channels
/// (webhook, browser-return verification, background recovery), so every
/// channel performs the same idempotent transition call and none may assume
/// it is the exclusive writer.
pub struct PaymentLedger {
    payments: Arc<dyn PaymentRepo>,
    selector: Arc<AccountSelector>,
    subscriptions: Arc<SubscriptionEngine>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: TransitionLocks,
}

impl PaymentLedger {
    pub fn new(
        payments: Arc<dyn PaymentRepo>,
        selector: Arc<AccountSelector>,
        subscriptions: Arc<SubscriptionEngine>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            payments,
            selector,
            subscriptions,
            notifier,
            clock,
            locks: TransitionLocks::default(),
        }
    }

    pub fn payments(&self) -> &Arc<dyn PaymentRepo> {
        &self.payments
    }

    /// Create the `pending` payment row for a new checkout attempt.
    pub async fn create_pending(&self, input: CreatePaymentInput) -> AppResult<Payment> {
        let now = self.clock.now();
        let payment = Payment {
            id: Uuid::new_v4(),
            account_id: input.account_id,
            gateway: input.gateway,
            amount_cents: input.amount_cents,
            currency: input.currency.to_lowercase(),
            status: PaymentStatus::Pending,
            kind: input.kind,
            customer_email: input.customer_email,
            customer_phone: input.customer_phone,
            session_ref: None,
            intent_ref: None,
            plan_id: input.plan_id,
            subscription_id: None,
            renews_subscription_id: input.renews_subscription_id,
            original_payment_id: None,
            failure_reason: None,
            gateway_response: JsonValue::Object(serde_json::Map::new()),
            client_ip: input.context.client_ip,
            client_locale: input.context.locale,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(&payment).await?;
        Ok(payment)
    }

    /// Store the gateway references once the hosted session exists.
    pub async fn attach_gateway_refs(
        &self,
        payment_id: Uuid,
        session_ref: Option<&str>,
        intent_ref: Option<&str>,
    ) -> AppResult<()> {
        self.payments
            .set_gateway_refs(payment_id, session_ref, intent_ref, self.clock.now())
            .await
    }

    /// Settle a payment. Duplicate calls and lost races are successful
    /// no-ops; only the first transition cascades into subscription
    /// materialization and account statistics.
    pub async fn mark_completed(
        &self,
        payment_id: Uuid,
        gateway_data: &JsonValue,
    ) -> AppResult<TransitionOutcome> {
        let handle = self.locks.lock_for(payment_id);
        let result = {
            let _guard = handle.lock().await;
            self.mark_completed_locked(payment_id, gateway_data).await
        };
        self.locks.release(payment_id, handle);
        result
    }

    async fn mark_completed_locked(
        &self,
        payment_id: Uuid,
        gateway_data: &JsonValue,
    ) -> AppResult<TransitionOutcome> {
        let mut payment = self
            .payments
            .get_by_id(payment_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if payment.status.is_terminal() {
            // A previous channel won the race. If that channel died between
            // the status write and the cascade, finish materialization here;
            // the engine's own guard keeps this duplicate-safe.
            if payment.status == PaymentStatus::Completed
                && payment.subscription_id.is_none()
                && payment.kind != PaymentKind::Refund
            {
                tracing::warn!(
                    payment_id = %payment_id,
                    "Completed payment without subscription, repairing materialization"
                );
                self.subscriptions.materialize(&payment).await?;
            }
            return Ok(TransitionOutcome::AlreadySettled);
        }

        let now = self.clock.now();
        let merged = merge_gateway_response(&payment.gateway_response, gateway_data);
        let applied = self
            .payments
            .transition_from_pending(
                payment_id,
                PaymentStatus::Completed,
                None,
                &merged,
                Some(now),
                now,
            )
            .await?;

        if !applied {
            // Lost a cross-process race after our read; the winner cascades.
            return Ok(TransitionOutcome::AlreadySettled);
        }

        payment.status = PaymentStatus::Completed;
        payment.gateway_response = merged;
        payment.paid_at = Some(now);
        payment.updated_at = now;

        tracing::info!(
            payment_id = %payment_id,
            amount_cents = payment.amount_cents,
            currency = %payment.currency,
            "Payment completed"
        );

        if let Err(err) = self
            .selector
            .record_success(payment.account_id, payment.amount_cents)
            .await
        {
            // Statistics only; the settlement itself is already committed
            tracing::error!(
                payment_id = %payment_id,
                account_id = %payment.account_id,
                error = %err,
                "Failed to record account success"
            );
        }

        if payment.kind != PaymentKind::Refund {
            self.subscriptions.materialize(&payment).await?;
        }

        self.notifier
            .notify(NotificationEvent::PaymentCompleted {
                payment_id: payment.id,
                customer_email: payment.customer_email.clone(),
                amount_cents: payment.amount_cents,
                currency: payment.currency.clone(),
            })
            .await;

        Ok(TransitionOutcome::Applied)
    }

    /// Record a terminal gateway-side failure.
    pub async fn mark_failed(
        &self,
        payment_id: Uuid,
        reason: &str,
        gateway_data: &JsonValue,
    ) -> AppResult<TransitionOutcome> {
        let handle = self.locks.lock_for(payment_id);
        let result = {
            let _guard = handle.lock().await;
            self.mark_failed_locked(payment_id, reason, gateway_data).await
        };
        self.locks.release(payment_id, handle);
        result
    }

    async fn mark_failed_locked(
        &self,
        payment_id: Uuid,
        reason: &str,
        gateway_data: &JsonValue,
    ) -> AppResult<TransitionOutcome> {
        let payment = self
            .payments
            .get_by_id(payment_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if payment.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadySettled);
        }

        let now = self.clock.now();
        let merged = merge_gateway_response(&payment.gateway_response, gateway_data);
        let applied = self
            .payments
            .transition_from_pending(
                payment_id,
                PaymentStatus::Failed,
                Some(reason),
                &merged,
                None,
                now,
            )
            .await?;

        if !applied {
            return Ok(TransitionOutcome::AlreadySettled);
        }

        tracing::info!(payment_id = %payment_id, reason = %reason, "Payment failed");

        if let Err(err) = self.selector.record_failure(payment.account_id).await {
            tracing::error!(
                payment_id = %payment_id,
                account_id = %payment.account_id,
                error = %err,
                "Failed to record account failure"
            );
        }

        if payment.kind == PaymentKind::Renewal {
            self.subscriptions.record_failed_renewal(&payment).await?;
        }

        self.notifier
            .notify(NotificationEvent::PaymentFailed {
                payment_id: payment.id,
                customer_email: payment.customer_email.clone(),
                reason: reason.to_string(),
            })
            .await;

        Ok(TransitionOutcome::Applied)
    }

    /// Explicit user-cancel path (abandoned checkout). No account counters
    /// move: the gateway was never asked to settle anything.
    pub async fn mark_cancelled(&self, payment_id: Uuid) -> AppResult<TransitionOutcome> {
        let handle = self.locks.lock_for(payment_id);
        let result = {
            let _guard = handle.lock().await;
            self.mark_cancelled_locked(payment_id).await
        };
        self.locks.release(payment_id, handle);
        result
    }

    async fn mark_cancelled_locked(&self, payment_id: Uuid) -> AppResult<TransitionOutcome> {
        let payment = self
            .payments
            .get_by_id(payment_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if payment.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadySettled);
        }

        let now = self.clock.now();
        let applied = self
            .payments
            .transition_from_pending(
                payment_id,
                PaymentStatus::Cancelled,
                None,
                &payment.gateway_response,
                None,
                now,
            )
            .await?;

        if applied {
            tracing::info!(payment_id = %payment_id, "Payment cancelled");
            Ok(TransitionOutcome::Applied)
        } else {
            Ok(TransitionOutcome::AlreadySettled)
        }
    }

    /// Refund a completed payment. The refund is a new payment row of kind
    /// `refund` linked back via `original_payment_id`; the original moves to
    /// `refunded` but keeps its settled amount on record.
    pub async fn refund(
        &self,
        original_payment_id: Uuid,
        amount_cents: Option<i64>,
        gateway_data: &JsonValue,
    ) -> AppResult<Payment> {
        let handle = self.locks.lock_for(original_payment_id);
        let result = {
            let _guard = handle.lock().await;
            self.refund_locked(original_payment_id, amount_cents, gateway_data)
                .await
        };
        self.locks.release(original_payment_id, handle);
        result
    }

    async fn refund_locked(
        &self,
        original_payment_id: Uuid,
        amount_cents: Option<i64>,
        gateway_data: &JsonValue,
    ) -> AppResult<Payment> {
        let original = self
            .payments
            .get_by_id(original_payment_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if original.status != PaymentStatus::Completed {
            return Err(AppError::InvalidInput(format!(
                "payment {} is {}, only completed payments can be refunded",
                original_payment_id, original.status
            )));
        }

        let refund_amount = amount_cents.unwrap_or(original.amount_cents);
        if refund_amount <= 0 || refund_amount > original.amount_cents {
            return Err(AppError::InvalidInput(format!(
                "refund amount {} out of range for payment of {}",
                refund_amount, original.amount_cents
            )));
        }

        let now = self.clock.now();
        let applied = self
            .payments
            .transition_completed_to_refunded(original_payment_id, now)
            .await?;
        if !applied {
            return Err(AppError::InvalidInput(
                "payment is no longer in a refundable state".to_string(),
            ));
        }

        let refund = Payment {
            id: Uuid::new_v4(),
            account_id: original.account_id,
            gateway: original.gateway,
            amount_cents: refund_amount,
            currency: original.currency.clone(),
            status: PaymentStatus::Completed,
            kind: PaymentKind::Refund,
            customer_email: original.customer_email.clone(),
            customer_phone: original.customer_phone.clone(),
            session_ref: None,
            intent_ref: None,
            plan_id: original.plan_id,
            subscription_id: original.subscription_id,
            renews_subscription_id: None,
            original_payment_id: Some(original.id),
            failure_reason: None,
            gateway_response: merge_gateway_response(&JsonValue::Null, gateway_data),
            client_ip: None,
            client_locale: None,
            paid_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(&refund).await?;

        tracing::info!(
            payment_id = %original.id,
            refund_payment_id = %refund.id,
            amount_cents = refund_amount,
            "Payment refunded"
        );

        self.notifier
            .notify(NotificationEvent::PaymentRefunded {
                payment_id: original.id,
                refund_payment_id: refund.id,
                customer_email: original.customer_email.clone(),
            })
            .await;

        Ok(refund)
    }
}
