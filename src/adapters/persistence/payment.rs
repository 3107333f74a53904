use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::payment_ledger::PaymentRepo,
    domain::entities::payment::{Payment, PaymentStatus},
};

const SELECT_COLS: &str = r#"
    id, account_id, gateway, amount_cents, currency, status, kind,
    customer_email, customer_phone, session_ref, intent_ref,
    plan_id, subscription_id, renews_subscription_id, original_payment_id,
    failure_reason, gateway_response, client_ip, client_locale,
    paid_at, created_at, updated_at
"#;

fn row_to_payment(row: sqlx::postgres::PgRow) -> Payment {
    Payment {
        id: row.get("id"),
        account_id: row.get("account_id"),
        gateway: row.get("gateway"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        kind: row.get("kind"),
        customer_email: row.get("customer_email"),
        customer_phone: row.get("customer_phone"),
        session_ref: row.get("session_ref"),
        intent_ref: row.get("intent_ref"),
        plan_id: row.get("plan_id"),
        subscription_id: row.get("subscription_id"),
        renews_subscription_id: row.get("renews_subscription_id"),
        original_payment_id: row.get("original_payment_id"),
        failure_reason: row.get("failure_reason"),
        gateway_response: row.get("gateway_response"),
        client_ip: row.get("client_ip"),
        client_locale: row.get("client_locale"),
        paid_at: row.get("paid_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn insert(&self, payment: &Payment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, account_id, gateway, amount_cents, currency, status, kind,
                customer_email, customer_phone, session_ref, intent_ref,
                plan_id, subscription_id, renews_subscription_id, original_payment_id,
                failure_reason, gateway_response, client_ip, client_locale,
                paid_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(payment.id)
        .bind(payment.account_id)
        .bind(payment.gateway)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(payment.kind)
        .bind(&payment.customer_email)
        .bind(&payment.customer_phone)
        .bind(&payment.session_ref)
        .bind(&payment.intent_ref)
        .bind(payment.plan_id)
        .bind(payment.subscription_id)
        .bind(payment.renews_subscription_id)
        .bind(payment.original_payment_id)
        .bind(&payment.failure_reason)
        .bind(&payment.gateway_response)
        .bind(&payment.client_ip)
        .bind(&payment.client_locale)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {} FROM payments WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_payment))
    }

    async fn find_by_gateway_ref(&self, reference: &str) -> AppResult<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE session_ref = $1 OR intent_ref = $1 LIMIT 1",
            SELECT_COLS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_payment))
    }

    async fn set_gateway_refs(
        &self,
        id: Uuid,
        session_ref: Option<&str>,
        intent_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE payments SET session_ref = $2, intent_ref = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(session_ref)
        .bind(intent_ref)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
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
        // The status guard in the WHERE clause is the transition lock at the
        // database level: zero rows affected means another writer won.
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, failure_reason = $3, gateway_response = $4,
                paid_at = $5, updated_at = $6
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(failure_reason)
        .bind(gateway_response)
        .bind(paid_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition_completed_to_refunded(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'refunded', updated_at = $2
            WHERE id = $1 AND status = 'completed'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn link_subscription(
        &self,
        payment_id: Uuid,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE payments SET subscription_id = $2, updated_at = $3 WHERE id = $1")
            .bind(payment_id)
            .bind(subscription_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_pending_in_window(
        &self,
        created_from: DateTime<Utc>,
        created_to: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE status = 'pending'
              AND created_at >= $1 AND created_at <= $2
              AND (session_ref IS NOT NULL OR intent_ref IS NOT NULL)
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#,
            SELECT_COLS
        ))
        .bind(created_from)
        .bind(created_to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_payment).collect())
    }
}
