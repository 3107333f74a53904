use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::subscription_engine::{SubscriptionEventRepo, SubscriptionRepo},
    domain::entities::subscription::{Subscription, SubscriptionEvent},
};

const SELECT_COLS: &str = r#"
    id, customer_email, plan_id, plan, status, starts_at, expires_at,
    next_billing_at, billing_cycle_count, trial_ends_at, grace_period_ends_at,
    paused_at, cancelled_at, cancellation_reason, pending_plan_id,
    origin_payment_id, created_at, updated_at
"#;

fn row_to_subscription(row: sqlx::postgres::PgRow) -> Subscription {
    let id: Uuid = row.get("id");
    let plan_json: serde_json::Value = row.get("plan");
    Subscription {
        id,
        customer_email: row.get("customer_email"),
        plan_id: row.get("plan_id"),
        plan: parse_json_with_fallback(&plan_json, "plan", "subscription", &id.to_string()),
        status: row.get("status"),
        starts_at: row.get("starts_at"),
        expires_at: row.get("expires_at"),
        next_billing_at: row.get("next_billing_at"),
        billing_cycle_count: row.get("billing_cycle_count"),
        trial_ends_at: row.get("trial_ends_at"),
        grace_period_ends_at: row.get("grace_period_ends_at"),
        paused_at: row.get("paused_at"),
        cancelled_at: row.get("cancelled_at"),
        cancellation_reason: row.get("cancellation_reason"),
        pending_plan_id: row.get("pending_plan_id"),
        origin_payment_id: row.get("origin_payment_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn insert(&self, subscription: &Subscription) -> AppResult<()> {
        let plan_json = serde_json::to_value(&subscription.plan)
            .map_err(|e| AppError::Internal(format!("failed to serialize plan snapshot: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, customer_email, plan_id, plan, status, starts_at, expires_at,
                next_billing_at, billing_cycle_count, trial_ends_at,
                grace_period_ends_at, paused_at, cancelled_at, cancellation_reason,
                pending_plan_id, origin_payment_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18)
            "#,
        )
        .bind(subscription.id)
        .bind(&subscription.customer_email)
        .bind(subscription.plan_id)
        .bind(&plan_json)
        .bind(subscription.status)
        .bind(subscription.starts_at)
        .bind(subscription.expires_at)
        .bind(subscription.next_billing_at)
        .bind(subscription.billing_cycle_count)
        .bind(subscription.trial_ends_at)
        .bind(subscription.grace_period_ends_at)
        .bind(subscription.paused_at)
        .bind(subscription.cancelled_at)
        .bind(&subscription.cancellation_reason)
        .bind(subscription.pending_plan_id)
        .bind(subscription.origin_payment_id)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn update(&self, subscription: &Subscription) -> AppResult<()> {
        let plan_json = serde_json::to_value(&subscription.plan)
            .map_err(|e| AppError::Internal(format!("failed to serialize plan snapshot: {}", e)))?;
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan_id = $2, plan = $3, status = $4, starts_at = $5, expires_at = $6,
                next_billing_at = $7, billing_cycle_count = $8, trial_ends_at = $9,
                grace_period_ends_at = $10, paused_at = $11, cancelled_at = $12,
                cancellation_reason = $13, pending_plan_id = $14, updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.plan_id)
        .bind(&plan_json)
        .bind(subscription.status)
        .bind(subscription.starts_at)
        .bind(subscription.expires_at)
        .bind(subscription.next_billing_at)
        .bind(subscription.billing_cycle_count)
        .bind(subscription.trial_ends_at)
        .bind(subscription.grace_period_ends_at)
        .bind(subscription.paused_at)
        .bind(subscription.cancelled_at)
        .bind(&subscription.cancellation_reason)
        .bind(subscription.pending_plan_id)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn find_latest_active_for_email(
        &self,
        email: &str,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE customer_email = $1 AND status NOT IN ('cancelled', 'expired')
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_subscription))
    }

    async fn list_due_for_sweep(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        // Mirrors `subscription_engine::needs_sweep`; keep the two in step.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE (status = 'past_due'
                   AND grace_period_ends_at IS NOT NULL AND grace_period_ends_at <= $1)
               OR (status = 'trial'
                   AND ((trial_ends_at IS NOT NULL AND trial_ends_at <= $1) OR expires_at <= $1))
               OR (status IN ('active', 'pending_cancellation') AND expires_at <= $1)
            ORDER BY expires_at ASC, id ASC
            LIMIT $2
            "#,
            SELECT_COLS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_subscription).collect())
    }
}

#[async_trait]
impl SubscriptionEventRepo for PostgresPersistence {
    async fn append(&self, event: &SubscriptionEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_events (
                id, subscription_id, event_type, previous_status, new_status,
                metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.subscription_id)
        .bind(&event.event_type)
        .bind(event.previous_status)
        .bind(event.new_status)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
