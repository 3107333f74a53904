use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        clock::Clock,
        notifier::{NotificationEvent, Notifier},
    },
    application::use_cases::payment_ledger::PaymentRepo,
    domain::entities::{
        payment::{Payment, PaymentKind},
        plan::{Plan, PlanSnapshot},
        subscription::{Subscription, SubscriptionEvent, SubscriptionStatus},
    },
};

/// Upper bound on subscriptions touched per sweep run.
const SWEEP_BATCH_LIMIT: i64 = 500;

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn insert(&self, subscription: &Subscription) -> AppResult<()>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;

    async fn update(&self, subscription: &Subscription) -> AppResult<()>;

    /// Most recently created non-terminal subscription for a customer email.
    /// Used only as the logged best-effort renewal fallback.
    async fn find_latest_active_for_email(&self, email: &str)
    -> AppResult<Option<Subscription>>;

    /// Subscriptions the sweep needs to look at, per `needs_sweep`.
    async fn list_due_for_sweep(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;
}

#[async_trait]
pub trait PlanRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>>;
}

#[async_trait]
pub trait SubscriptionEventRepo: Send + Sync {
    async fn append(&self, event: &SubscriptionEvent) -> AppResult<()>;
}

// ============================================================================
// Output Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChangeKind {
    /// Applied now, with a prorated charge for the remaining term
    Immediate,
    /// Scheduled; the sweep or the next renewal applies it at the boundary
    Deferred,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanChangeOutcome {
    pub kind: PlanChangeKind,
    /// Remaining entitlement days priced at the new plan's daily rate
    pub prorated_charge_cents: Option<i64>,
    pub effective_at: DateTime<Utc>,
}

/// Aggregate counts from one sweep run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub trials_activated: usize,
    pub grace_expired: usize,
    pub cancellations_finalized: usize,
    pub expired: usize,
    pub plan_changes_applied: usize,
    pub errors: usize,
}

/// Sweep predicate, shared verbatim by the in-memory repository so tests and
/// production select the same rows.
pub fn needs_sweep(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    if subscription.status.is_terminal() {
        return false;
    }
    match subscription.status {
        SubscriptionStatus::Paused => false,
        SubscriptionStatus::PastDue => subscription
            .grace_period_ends_at
            .is_some_and(|at| at <= now),
        SubscriptionStatus::Trial => {
            subscription.trial_ends_at.is_some_and(|at| at <= now)
                || subscription.expires_at <= now
        }
        _ => subscription.expires_at <= now,
    }
}

// ============================================================================
// SubscriptionEngine
// ============================================================================

/// Derives and maintains subscription state from payment ledger events.
pub struct SubscriptionEngine {
    subscriptions: Arc<dyn SubscriptionRepo>,
    plans: Arc<dyn PlanRepo>,
    events: Arc<dyn SubscriptionEventRepo>,
    payments: Arc<dyn PaymentRepo>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepo>,
        plans: Arc<dyn PlanRepo>,
        events: Arc<dyn SubscriptionEventRepo>,
        payments: Arc<dyn PaymentRepo>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            events,
            payments,
            notifier,
            clock,
        }
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Turn a completed payment into subscription state: renew an existing
    /// subscription or create a new one. Callers invoke this under the
    /// payment's transition lock; the `subscription_id` guard additionally
    /// protects against duplicate invocations that slipped past it.
    pub async fn materialize(&self, payment: &Payment) -> AppResult<Option<Subscription>> {
        if payment.subscription_id.is_some() {
            tracing::debug!(
                payment_id = %payment.id,
                "Payment already materialized, skipping"
            );
            return Ok(None);
        }
        if payment.kind == PaymentKind::Refund {
            return Ok(None);
        }

        if payment.kind == PaymentKind::Renewal {
            if let Some(target) = self.resolve_renewal_target(payment).await? {
                let renewed = self.renew(target, payment).await?;
                return Ok(Some(renewed));
            }
            tracing::warn!(
                payment_id = %payment.id,
                customer_email = %payment.customer_email,
                "Renewal payment with no resolvable target, creating a new subscription"
            );
        }

        self.create_from_payment(payment).await.map(Some)
    }

    /// A failed renewal payment opens the grace window on its target.
    pub async fn record_failed_renewal(&self, payment: &Payment) -> AppResult<()> {
        let Some(mut subscription) = self.resolve_renewal_target(payment).await? else {
            tracing::warn!(
                payment_id = %payment.id,
                customer_email = %payment.customer_email,
                "Failed renewal with no resolvable target subscription"
            );
            return Ok(());
        };

        match subscription.status {
            SubscriptionStatus::Trial
            | SubscriptionStatus::Active
            | SubscriptionStatus::PendingCancellation => {}
            // Already past due: the original grace deadline stands.
            // Paused and terminal states are left alone.
            _ => return Ok(()),
        }

        let now = self.clock.now();
        let previous = subscription.status;
        subscription.status = SubscriptionStatus::PastDue;
        subscription.grace_period_ends_at = Some(now + subscription.plan.grace_period());
        subscription.updated_at = now;
        self.subscriptions.update(&subscription).await?;

        self.record_event(
            &subscription,
            "subscription.past_due",
            Some(previous),
            json!({ "payment_id": payment.id }),
        )
        .await;

        self.notifier
            .notify(NotificationEvent::SubscriptionPastDue {
                subscription_id: subscription.id,
                customer_email: subscription.customer_email.clone(),
            })
            .await;

        Ok(())
    }

    /// Resolve which subscription a renewal payment belongs to: the explicit
    /// reference when present, otherwise the most recent live subscription
    /// for the customer email. The fallback is a best-effort heuristic and
    /// is always logged as such.
    async fn resolve_renewal_target(&self, payment: &Payment) -> AppResult<Option<Subscription>> {
        if let Some(target_id) = payment.renews_subscription_id {
            match self.subscriptions.get_by_id(target_id).await? {
                Some(subscription) => {
                    if subscription.status.is_terminal() {
                        tracing::info!(
                            payment_id = %payment.id,
                            subscription_id = %target_id,
                            status = %subscription.status,
                            "Renewal explicitly targets a closed subscription, reactivating"
                        );
                    }
                    return Ok(Some(subscription));
                }
                None => {
                    tracing::warn!(
                        payment_id = %payment.id,
                        subscription_id = %target_id,
                        "Explicit renewal target missing, falling back to email match"
                    );
                }
            }
        }

        let fallback = self
            .subscriptions
            .find_latest_active_for_email(&payment.customer_email)
            .await?;
        if let Some(ref subscription) = fallback {
            // Heuristic match: can mis-attribute under concurrent
            // subscriptions for the same customer. Flagged for review.
            tracing::warn!(
                payment_id = %payment.id,
                subscription_id = %subscription.id,
                customer_email = %payment.customer_email,
                "Renewal target resolved by customer email fallback"
            );
        }
        Ok(fallback)
    }

    async fn create_from_payment(&self, payment: &Payment) -> AppResult<Subscription> {
        let now = self.clock.now();
        let snapshot = self.snapshot_for(payment).await?;

        let trial_ends_at = (snapshot.trial_days > 0)
            .then(|| now + Duration::days(snapshot.trial_days as i64));
        let status = if trial_ends_at.is_some() {
            SubscriptionStatus::Trial
        } else {
            SubscriptionStatus::Active
        };
        let expires_at = trial_ends_at.unwrap_or(now) + snapshot.duration();

        let subscription = Subscription {
            id: Uuid::new_v4(),
            customer_email: payment.customer_email.clone(),
            plan_id: snapshot.plan_id,
            status,
            starts_at: now,
            expires_at,
            next_billing_at: snapshot.recurring.then_some(expires_at),
            billing_cycle_count: 1,
            trial_ends_at,
            grace_period_ends_at: None,
            paused_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            pending_plan_id: None,
            origin_payment_id: payment.id,
            plan: snapshot,
            created_at: now,
            updated_at: now,
        };

        self.subscriptions.insert(&subscription).await?;
        self.payments
            .link_subscription(payment.id, subscription.id, now)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            payment_id = %payment.id,
            plan = %subscription.plan.code,
            status = %subscription.status,
            "Subscription created"
        );

        self.record_event(
            &subscription,
            "subscription.created",
            None,
            json!({ "payment_id": payment.id }),
        )
        .await;

        self.notifier
            .notify(NotificationEvent::SubscriptionCreated {
                subscription_id: subscription.id,
                customer_email: subscription.customer_email.clone(),
                plan_name: subscription.plan.name.clone(),
            })
            .await;

        Ok(subscription)
    }

    async fn snapshot_for(&self, payment: &Payment) -> AppResult<PlanSnapshot> {
        let Some(plan_id) = payment.plan_id else {
            tracing::warn!(
                payment_id = %payment.id,
                "Payment has no plan reference, using 30-day fallback terms"
            );
            return Ok(PlanSnapshot::fallback(payment.amount_cents, &payment.currency));
        };

        match self.plans.get_by_id(plan_id).await? {
            Some(plan) => Ok(plan.snapshot()),
            None => {
                // Settlement is never blocked on a missing catalog record
                tracing::warn!(
                    payment_id = %payment.id,
                    plan_id = %plan_id,
                    "Plan record missing, using 30-day fallback terms"
                );
                Ok(PlanSnapshot::fallback(payment.amount_cents, &payment.currency))
            }
        }
    }

    // ========================================================================
    // Renewal
    // ========================================================================

    /// Extend a subscription by one plan term. The new expiry is computed
    /// from the later of (current expiry, now) so a renewal processed late
    /// never double-credits entitlement.
    async fn renew(
        &self,
        mut subscription: Subscription,
        payment: &Payment,
    ) -> AppResult<Subscription> {
        let now = self.clock.now();
        let previous = subscription.status;

        // A scheduled downgrade lands at the billing boundary, before the
        // new term is priced in entitlement days
        if let Some(pending_plan_id) = subscription.pending_plan_id {
            self.apply_pending_plan(&mut subscription, pending_plan_id, now)
                .await;
        }

        let base = subscription.expires_at.max(now);
        subscription.expires_at = base + subscription.plan.duration();
        subscription.billing_cycle_count += 1;
        subscription.status = SubscriptionStatus::Active;
        subscription.grace_period_ends_at = None;
        subscription.next_billing_at = subscription
            .plan
            .recurring
            .then_some(subscription.expires_at);
        subscription.updated_at = now;

        self.subscriptions.update(&subscription).await?;
        self.payments
            .link_subscription(payment.id, subscription.id, now)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            payment_id = %payment.id,
            billing_cycle = subscription.billing_cycle_count,
            expires_at = %subscription.expires_at,
            "Subscription renewed"
        );

        self.record_event(
            &subscription,
            "subscription.renewed",
            Some(previous),
            json!({
                "payment_id": payment.id,
                "billing_cycle_count": subscription.billing_cycle_count,
            }),
        )
        .await;

        self.notifier
            .notify(NotificationEvent::SubscriptionRenewed {
                subscription_id: subscription.id,
                customer_email: subscription.customer_email.clone(),
                billing_cycle_count: subscription.billing_cycle_count,
            })
            .await;

        Ok(subscription)
    }

    // ========================================================================
    // Pause / Resume
    // ========================================================================

    pub async fn pause(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        let mut subscription = self.get(subscription_id).await?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(AppError::InvalidInput(format!(
                "cannot pause a {} subscription",
                subscription.status
            )));
        }

        let now = self.clock.now();
        subscription.status = SubscriptionStatus::Paused;
        subscription.paused_at = Some(now);
        subscription.updated_at = now;
        self.subscriptions.update(&subscription).await?;

        self.record_event(
            &subscription,
            "subscription.paused",
            Some(SubscriptionStatus::Active),
            json!({}),
        )
        .await;

        Ok(subscription)
    }

    /// Resume pushes `expires_at` out by the paused duration: paused time is
    /// never charged against entitlement.
    pub async fn resume(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        let mut subscription = self.get(subscription_id).await?;
        if subscription.status != SubscriptionStatus::Paused {
            return Err(AppError::InvalidInput(format!(
                "cannot resume a {} subscription",
                subscription.status
            )));
        }

        let now = self.clock.now();
        let paused_for = subscription
            .paused_at
            .map(|at| now - at)
            .unwrap_or_else(Duration::zero);

        subscription.expires_at += paused_for;
        subscription.next_billing_at = subscription.next_billing_at.map(|at| at + paused_for);
        subscription.status = SubscriptionStatus::Active;
        subscription.paused_at = None;
        subscription.updated_at = now;
        self.subscriptions.update(&subscription).await?;

        self.record_event(
            &subscription,
            "subscription.resumed",
            Some(SubscriptionStatus::Paused),
            json!({ "paused_seconds": paused_for.num_seconds() }),
        )
        .await;

        Ok(subscription)
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        at_period_end: bool,
        reason: Option<&str>,
    ) -> AppResult<Subscription> {
        let mut subscription = self.get(subscription_id).await?;
        if subscription.status.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "subscription is already {}",
                subscription.status
            )));
        }

        let now = self.clock.now();
        let previous = subscription.status;
        subscription.cancellation_reason = reason.map(str::to_string);

        if at_period_end {
            subscription.status = SubscriptionStatus::PendingCancellation;
        } else {
            subscription.status = SubscriptionStatus::Cancelled;
            subscription.cancelled_at = Some(now);
            subscription.expires_at = subscription.expires_at.min(now);
            subscription.next_billing_at = None;
        }
        subscription.updated_at = now;
        self.subscriptions.update(&subscription).await?;

        self.record_event(
            &subscription,
            "subscription.cancelled",
            Some(previous),
            json!({ "at_period_end": at_period_end }),
        )
        .await;

        self.notifier
            .notify(NotificationEvent::SubscriptionCancelled {
                subscription_id: subscription.id,
                customer_email: subscription.customer_email.clone(),
                at_period_end,
            })
            .await;

        Ok(subscription)
    }

    // ========================================================================
    // Plan Changes
    // ========================================================================

    /// Upgrades apply immediately with a prorated charge quote; downgrades
    /// may be deferred to the next billing or expiry boundary.
    pub async fn change_plan(
        &self,
        subscription_id: Uuid,
        new_plan_id: Uuid,
        immediate: bool,
    ) -> AppResult<PlanChangeOutcome> {
        let mut subscription = self.get(subscription_id).await?;
        if subscription.status.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "cannot change plan on a {} subscription",
                subscription.status
            )));
        }
        let plan = self
            .plans
            .get_by_id(new_plan_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = self.clock.now();
        let previous_plan = subscription.plan.code.clone();

        if !immediate {
            subscription.pending_plan_id = Some(plan.id);
            subscription.updated_at = now;
            let effective_at = subscription.expires_at;
            self.subscriptions.update(&subscription).await?;

            self.record_event(
                &subscription,
                "subscription.plan_change_scheduled",
                None,
                json!({ "from": previous_plan, "to": plan.code }),
            )
            .await;

            return Ok(PlanChangeOutcome {
                kind: PlanChangeKind::Deferred,
                prorated_charge_cents: None,
                effective_at,
            });
        }

        let snapshot = plan.snapshot();
        let remaining_days = (subscription.expires_at - now).num_days().max(0);
        let prorated = prorated_charge_cents(&snapshot, remaining_days);

        subscription.plan_id = Some(plan.id);
        subscription.plan = snapshot;
        subscription.pending_plan_id = None;
        subscription.updated_at = now;
        self.subscriptions.update(&subscription).await?;

        self.record_event(
            &subscription,
            "subscription.plan_changed",
            None,
            json!({
                "from": previous_plan,
                "to": plan.code,
                "remaining_days": remaining_days,
                "prorated_charge_cents": prorated,
            }),
        )
        .await;

        Ok(PlanChangeOutcome {
            kind: PlanChangeKind::Immediate,
            prorated_charge_cents: Some(prorated),
            effective_at: now,
        })
    }

    async fn apply_pending_plan(
        &self,
        subscription: &mut Subscription,
        pending_plan_id: Uuid,
        now: DateTime<Utc>,
    ) {
        match self.plans.get_by_id(pending_plan_id).await {
            Ok(Some(plan)) => {
                let previous_plan = subscription.plan.code.clone();
                subscription.plan_id = Some(plan.id);
                subscription.plan = plan.snapshot();
                subscription.pending_plan_id = None;
                subscription.updated_at = now;
                tracing::info!(
                    subscription_id = %subscription.id,
                    from = %previous_plan,
                    to = %subscription.plan.code,
                    "Applied scheduled plan change"
                );
                self.record_event(
                    subscription,
                    "subscription.plan_changed",
                    None,
                    json!({ "from": previous_plan, "to": subscription.plan.code, "scheduled": true }),
                )
                .await;
            }
            Ok(None) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    plan_id = %pending_plan_id,
                    "Scheduled plan vanished from catalog, dropping the change"
                );
                subscription.pending_plan_id = None;
            }
            Err(err) => {
                // Keep the schedule; the next boundary retries
                tracing::error!(
                    subscription_id = %subscription.id,
                    plan_id = %pending_plan_id,
                    error = %err,
                    "Failed to load scheduled plan"
                );
            }
        }
    }

    // ========================================================================
    // Expiry Sweep
    // ========================================================================

    /// Periodic pass over subscriptions at a lifecycle boundary. One
    /// subscription's failure never aborts the batch.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let now = self.clock.now();
        let due = self
            .subscriptions
            .list_due_for_sweep(now, SWEEP_BATCH_LIMIT)
            .await?;

        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };

        for subscription in due {
            let id = subscription.id;
            match self.sweep_one(subscription, now).await {
                Ok(action) => match action {
                    SweepAction::TrialActivated => report.trials_activated += 1,
                    SweepAction::GraceExpired => report.grace_expired += 1,
                    SweepAction::CancellationFinalized => report.cancellations_finalized += 1,
                    SweepAction::Expired { plan_change_applied } => {
                        report.expired += 1;
                        if plan_change_applied {
                            report.plan_changes_applied += 1;
                        }
                    }
                    SweepAction::None => {}
                },
                Err(err) => {
                    report.errors += 1;
                    tracing::error!(
                        subscription_id = %id,
                        error = %err,
                        "Sweep failed for subscription"
                    );
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                grace_expired = report.grace_expired,
                cancellations = report.cancellations_finalized,
                trials_activated = report.trials_activated,
                errors = report.errors,
                "Subscription sweep finished"
            );
        }

        Ok(report)
    }

    async fn sweep_one(
        &self,
        mut subscription: Subscription,
        now: DateTime<Utc>,
    ) -> AppResult<SweepAction> {
        // Grace window ran out without a successful retry
        if subscription.status == SubscriptionStatus::PastDue {
            if subscription
                .grace_period_ends_at
                .is_some_and(|at| at <= now)
            {
                self.expire(&mut subscription, now).await?;
                return Ok(SweepAction::GraceExpired);
            }
            return Ok(SweepAction::None);
        }

        // Deferred cancellation reaches its period end
        if subscription.status == SubscriptionStatus::PendingCancellation
            && subscription.expires_at <= now
        {
            let previous = subscription.status;
            subscription.status = SubscriptionStatus::Cancelled;
            subscription.cancelled_at = Some(now);
            subscription.next_billing_at = None;
            subscription.updated_at = now;
            self.subscriptions.update(&subscription).await?;

            self.record_event(&subscription, "subscription.cancelled", Some(previous), json!({}))
                .await;
            self.notifier
                .notify(NotificationEvent::SubscriptionCancelled {
                    subscription_id: subscription.id,
                    customer_email: subscription.customer_email.clone(),
                    at_period_end: true,
                })
                .await;
            return Ok(SweepAction::CancellationFinalized);
        }

        // Entitlement ran out entirely
        if subscription.expires_at <= now {
            let mut plan_change_applied = false;
            if let Some(pending_plan_id) = subscription.pending_plan_id {
                // Boundary reached: apply the scheduled swap so a late
                // renewal lands on the new plan
                self.apply_pending_plan(&mut subscription, pending_plan_id, now)
                    .await;
                plan_change_applied = subscription.pending_plan_id.is_none();
            }
            self.expire(&mut subscription, now).await?;
            return Ok(SweepAction::Expired { plan_change_applied });
        }

        // Trial window elapsed with the purchase payment already recorded
        if subscription.status == SubscriptionStatus::Trial
            && subscription.trial_ends_at.is_some_and(|at| at <= now)
        {
            subscription.status = SubscriptionStatus::Active;
            subscription.updated_at = now;
            self.subscriptions.update(&subscription).await?;
            self.record_event(
                &subscription,
                "subscription.trial_ended",
                Some(SubscriptionStatus::Trial),
                json!({}),
            )
            .await;
            return Ok(SweepAction::TrialActivated);
        }

        Ok(SweepAction::None)
    }

    async fn expire(
        &self,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let previous = subscription.status;
        subscription.status = SubscriptionStatus::Expired;
        subscription.next_billing_at = None;
        subscription.updated_at = now;
        self.subscriptions.update(subscription).await?;

        self.record_event(subscription, "subscription.expired", Some(previous), json!({}))
            .await;
        self.notifier
            .notify(NotificationEvent::SubscriptionExpired {
                subscription_id: subscription.id,
                customer_email: subscription.customer_email.clone(),
                previous_status: previous,
            })
            .await;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn get(&self, id: Uuid) -> AppResult<Subscription> {
        self.subscriptions
            .get_by_id(id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn record_event(
        &self,
        subscription: &Subscription,
        event_type: &str,
        previous_status: Option<SubscriptionStatus>,
        metadata: serde_json::Value,
    ) {
        let event = SubscriptionEvent {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            event_type: event_type.to_string(),
            previous_status,
            new_status: Some(subscription.status),
            metadata,
            created_at: subscription.updated_at,
        };
        // Audit only: a failed append never blocks the transition
        if let Err(err) = self.events.append(&event).await {
            tracing::error!(
                subscription_id = %subscription.id,
                event_type = %event_type,
                error = %err,
                "Failed to append subscription event"
            );
        }
    }
}

enum SweepAction {
    TrialActivated,
    GraceExpired,
    CancellationFinalized,
    Expired { plan_change_applied: bool },
    None,
}

fn prorated_charge_cents(plan: &PlanSnapshot, remaining_days: i64) -> i64 {
    let duration_days = plan.duration_days().max(1);
    plan.price_cents * remaining_days / duration_days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::harness::TestHarness;
    use serde_json::json;

    #[tokio::test]
    async fn purchase_materializes_subscription_with_plan_duration() {
        let harness = TestHarness::new().await;
        let payment = harness.pending_purchase_payment().await;

        harness
            .ledger
            .mark_completed(payment.id, &json!({}))
            .await
            .unwrap();

        let subscription = harness.only_subscription();
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.billing_cycle_count, 1);
        assert_eq!(
            subscription.expires_at,
            subscription.starts_at + subscription.plan.duration()
        );
        assert_eq!(subscription.origin_payment_id, payment.id);

        let stored_payment = harness
            .payments
            .get_by_id(payment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored_payment.subscription_id, Some(subscription.id));
    }

    #[tokio::test]
    async fn trial_plan_starts_in_trial_status() {
        let harness = TestHarness::new().await;
        let plan = harness.insert_plan(|p| p.trial_days = 14);
        let payment = harness.pending_payment_for_plan(plan.id).await;

        harness
            .ledger
            .mark_completed(payment.id, &json!({}))
            .await
            .unwrap();

        let subscription = harness.only_subscription();
        assert_eq!(subscription.status, SubscriptionStatus::Trial);
        let trial_ends = subscription.trial_ends_at.unwrap();
        assert_eq!(trial_ends, subscription.starts_at + Duration::days(14));
        // Entitlement covers the trial plus the paid term
        assert_eq!(
            subscription.expires_at,
            trial_ends + subscription.plan.duration()
        );
    }

    #[tokio::test]
    async fn missing_plan_falls_back_to_thirty_days() {
        let harness = TestHarness::new().await;
        let payment = harness
            .pending_payment_for_plan(Uuid::new_v4()) // not in the catalog
            .await;

        harness
            .ledger
            .mark_completed(payment.id, &json!({}))
            .await
            .unwrap();

        let subscription = harness.only_subscription();
        assert_eq!(subscription.plan.duration_days(), 30);
        assert_eq!(subscription.plan_id, None);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn late_renewal_extends_from_now_not_expiry() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        // Let the subscription lapse by two days without renewing
        let lapsed_expiry = subscription.expires_at;
        harness.clock.advance(lapsed_expiry - harness.clock.now() + Duration::days(2));
        let now = harness.clock.now();

        let renewal = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_completed(renewal.id, &json!({}))
            .await
            .unwrap();

        let renewed = harness.subscription(subscription.id);
        assert_eq!(renewed.expires_at, now + renewed.plan.duration());
        assert_eq!(renewed.billing_cycle_count, 2);
    }

    #[tokio::test]
    async fn early_renewal_extends_from_current_expiry() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;
        let original_expiry = subscription.expires_at;

        let renewal = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_completed(renewal.id, &json!({}))
            .await
            .unwrap();

        let renewed = harness.subscription(subscription.id);
        assert_eq!(renewed.expires_at, original_expiry + renewed.plan.duration());
    }

    #[tokio::test]
    async fn renewal_without_explicit_target_uses_email_fallback() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        let mut renewal = harness.pending_renewal_payment(subscription.id).await;
        renewal.renews_subscription_id = None;
        harness.payments.replace(renewal.clone());

        harness
            .ledger
            .mark_completed(renewal.id, &json!({}))
            .await
            .unwrap();

        let renewed = harness.subscription(subscription.id);
        assert_eq!(renewed.billing_cycle_count, 2);
        assert_eq!(harness.subscription_count(), 1, "no second subscription");
    }

    #[tokio::test]
    async fn renewal_success_clears_past_due() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        let failed = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_failed(failed.id, "card_declined", &json!({}))
            .await
            .unwrap();
        assert_eq!(
            harness.subscription(subscription.id).status,
            SubscriptionStatus::PastDue
        );

        let retry = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_completed(retry.id, &json!({}))
            .await
            .unwrap();

        let recovered = harness.subscription(subscription.id);
        assert_eq!(recovered.status, SubscriptionStatus::Active);
        assert!(recovered.grace_period_ends_at.is_none());
    }

    #[tokio::test]
    async fn grace_expiry_sweeps_to_expired() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        let failed = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_failed(failed.id, "card_declined", &json!({}))
            .await
            .unwrap();

        let past_due = harness.subscription(subscription.id);
        let grace_ends = past_due.grace_period_ends_at.unwrap();
        harness.clock.advance(grace_ends - harness.clock.now() + Duration::hours(1));

        let report = harness.engine.sweep().await.unwrap();
        assert_eq!(report.grace_expired, 1);
        assert_eq!(
            harness.subscription(subscription.id).status,
            SubscriptionStatus::Expired
        );
    }

    #[tokio::test]
    async fn payment_before_grace_expiry_keeps_subscription() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        let failed = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_failed(failed.id, "card_declined", &json!({}))
            .await
            .unwrap();

        // Still inside the grace window: the sweep must not expire it
        harness.clock.advance(Duration::days(1));
        let report = harness.engine.sweep().await.unwrap();
        assert_eq!(report.grace_expired, 0);
        assert_eq!(
            harness.subscription(subscription.id).status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn pause_and_resume_extend_expiry_by_paused_time() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;
        let original_expiry = subscription.expires_at;

        harness.engine.pause(subscription.id).await.unwrap();
        harness.clock.advance(Duration::days(5));
        let resumed = harness.engine.resume(subscription.id).await.unwrap();

        assert_eq!(resumed.status, SubscriptionStatus::Active);
        assert_eq!(resumed.expires_at, original_expiry + Duration::days(5));
        assert!(resumed.paused_at.is_none());
    }

    #[tokio::test]
    async fn paused_subscription_is_not_swept() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;
        harness.engine.pause(subscription.id).await.unwrap();

        harness.clock.advance(Duration::days(400));
        let report = harness.engine.sweep().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(
            harness.subscription(subscription.id).status,
            SubscriptionStatus::Paused
        );
    }

    #[tokio::test]
    async fn immediate_cancel_ends_entitlement_now() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        let cancelled = harness
            .engine
            .cancel(subscription.id, false, Some("user request"))
            .await
            .unwrap();

        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert_eq!(cancelled.expires_at, harness.clock.now());
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("user request"));
    }

    #[tokio::test]
    async fn deferred_cancel_finalizes_at_period_end() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;

        let pending = harness
            .engine
            .cancel(subscription.id, true, None)
            .await
            .unwrap();
        assert_eq!(pending.status, SubscriptionStatus::PendingCancellation);
        assert!(pending.status.grants_access());

        harness
            .clock
            .advance(pending.expires_at - harness.clock.now() + Duration::hours(1));
        let report = harness.engine.sweep().await.unwrap();

        assert_eq!(report.cancellations_finalized, 1);
        assert_eq!(
            harness.subscription(subscription.id).status,
            SubscriptionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn cancel_of_terminal_subscription_is_rejected() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;
        harness
            .engine
            .cancel(subscription.id, false, None)
            .await
            .unwrap();

        let result = harness.engine.cancel(subscription.id, false, None).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn trial_sweeps_to_active_after_trial_window() {
        let harness = TestHarness::new().await;
        let plan = harness.insert_plan(|p| p.trial_days = 7);
        let payment = harness.pending_payment_for_plan(plan.id).await;
        harness
            .ledger
            .mark_completed(payment.id, &json!({}))
            .await
            .unwrap();

        harness.clock.advance(Duration::days(8));
        let report = harness.engine.sweep().await.unwrap();

        assert_eq!(report.trials_activated, 1);
        assert_eq!(
            harness.only_subscription().status,
            SubscriptionStatus::Active
        );
    }

    #[tokio::test]
    async fn immediate_plan_change_quotes_proration() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;
        // 30-day plan at 3000 cents -> 100 cents/day
        let upgrade = harness.insert_plan(|p| {
            p.code = "pro".to_string();
            p.price_cents = 3000;
        });

        // Burn half the term
        harness.clock.advance(Duration::days(15));
        let outcome = harness
            .engine
            .change_plan(subscription.id, upgrade.id, true)
            .await
            .unwrap();

        assert_eq!(outcome.kind, PlanChangeKind::Immediate);
        assert_eq!(outcome.prorated_charge_cents, Some(1500));
        assert_eq!(harness.subscription(subscription.id).plan.code, "pro");
    }

    #[tokio::test]
    async fn deferred_plan_change_applies_on_renewal_boundary() {
        let harness = TestHarness::new().await;
        let subscription = harness.active_subscription().await;
        let downgrade = harness.insert_plan(|p| {
            p.code = "lite".to_string();
            p.price_cents = 500;
        });

        let outcome = harness
            .engine
            .change_plan(subscription.id, downgrade.id, false)
            .await
            .unwrap();
        assert_eq!(outcome.kind, PlanChangeKind::Deferred);
        // Current term still on the old plan
        assert_ne!(harness.subscription(subscription.id).plan.code, "lite");

        let renewal = harness.pending_renewal_payment(subscription.id).await;
        harness
            .ledger
            .mark_completed(renewal.id, &json!({}))
            .await
            .unwrap();

        let renewed = harness.subscription(subscription.id);
        assert_eq!(renewed.plan.code, "lite");
        assert!(renewed.pending_plan_id.is_none());
    }

    #[test]
    fn proration_is_days_times_new_daily_rate() {
        let mut plan = PlanSnapshot::fallback(3000, "usd");
        plan.interval = crate::domain::entities::plan::BillingInterval::Day;
        plan.interval_count = 30;
        assert_eq!(prorated_charge_cents(&plan, 15), 1500);
        assert_eq!(prorated_charge_cents(&plan, 0), 0);
        assert_eq!(prorated_charge_cents(&plan, 30), 3000);
    }
}
