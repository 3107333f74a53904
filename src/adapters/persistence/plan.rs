use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription_engine::PlanRepo,
    domain::entities::plan::Plan,
};

fn row_to_plan(row: sqlx::postgres::PgRow) -> Plan {
    Plan {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        price_cents: row.get("price_cents"),
        currency: row.get("currency"),
        interval: row.get("billing_interval"),
        interval_count: row.get("interval_count"),
        trial_days: row.get("trial_days"),
        grace_period_days: row.get("grace_period_days"),
        recurring: row.get("recurring"),
        active: row.get("active"),
    }
}

#[async_trait]
impl PlanRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, price_cents, currency, billing_interval, interval_count,
                   trial_days, grace_period_days, recurring, active
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }
}
