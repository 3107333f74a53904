use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::account_selector::PaymentAccountRepo,
    domain::entities::{gateway_kind::GatewayKind, payment_account::PaymentAccount},
};

const SELECT_COLS: &str = r#"
    id, gateway, label, secret_key, client_id, active, sandbox,
    successful_transactions, failed_transactions, total_amount_cents,
    last_used_at, currencies, countries, weight, priority,
    created_at, updated_at
"#;

fn row_to_account(row: sqlx::postgres::PgRow) -> PaymentAccount {
    PaymentAccount {
        id: row.get("id"),
        gateway: row.get("gateway"),
        label: row.get("label"),
        secret_key: row.get("secret_key"),
        client_id: row.get("client_id"),
        active: row.get("active"),
        sandbox: row.get("sandbox"),
        successful_transactions: row.get("successful_transactions"),
        failed_transactions: row.get("failed_transactions"),
        total_amount_cents: row.get("total_amount_cents"),
        last_used_at: row.get("last_used_at"),
        currencies: row.get("currencies"),
        countries: row.get("countries"),
        weight: row.get("weight"),
        priority: row.get("priority"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PaymentAccountRepo for PostgresPersistence {
    async fn list_active(&self, gateway: GatewayKind) -> AppResult<Vec<PaymentAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payment_accounts WHERE gateway = $1 AND active ORDER BY created_at ASC",
            SELECT_COLS
        ))
        .bind(gateway)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_account).collect())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_accounts WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_account))
    }

    async fn record_success(
        &self,
        id: Uuid,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        // Atomic increments: concurrent settlements on one account are
        // expected, so the counters never go through read-modify-write.
        sqlx::query(
            r#"
            UPDATE payment_accounts
            SET successful_transactions = successful_transactions + 1,
                total_amount_cents = total_amount_cents + $2,
                last_used_at = $3, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount_cents)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_accounts
            SET failed_transactions = failed_transactions + 1,
                last_used_at = $2, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
