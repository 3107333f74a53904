use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::recovery_scanner::RecoveryAuditRepo,
    domain::entities::recovery::RecoveryAttempt,
};

fn row_to_attempt(row: sqlx::postgres::PgRow) -> RecoveryAttempt {
    RecoveryAttempt {
        id: row.get("id"),
        payment_id: row.get("payment_id"),
        verdict: row.get("verdict"),
        native_status: row.get("native_status"),
        raw: row.get("raw"),
        dry_run: row.get("dry_run"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl RecoveryAuditRepo for PostgresPersistence {
    async fn append(&self, attempt: &RecoveryAttempt) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recovery_attempts (
                id, payment_id, verdict, native_status, raw, dry_run, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.payment_id)
        .bind(attempt.verdict)
        .bind(&attempt.native_status)
        .bind(&attempt.raw)
        .bind(attempt.dry_run)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_for_payment(
        &self,
        payment_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<RecoveryAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, verdict, native_status, raw, dry_run, created_at
            FROM recovery_attempts
            WHERE payment_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(payment_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_attempt).collect())
    }
}
