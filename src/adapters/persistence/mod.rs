use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const MAX_JSON_LOG_LEN: usize = 200;

/// Parse a JSON column into a typed value, logging a warning on failure.
///
/// SQL NULL becomes the type's default without logging; only genuine parse
/// failures (type mismatches, corruption) are reported.
pub fn parse_json_with_fallback<T: serde::de::DeserializeOwned + Default>(
    json: &serde_json::Value,
    field_name: &str,
    entity_type: &str,
    entity_id: &str,
) -> T {
    if json.is_null() {
        return T::default();
    }

    serde_json::from_value(json.clone()).unwrap_or_else(|err| {
        // Truncate raw JSON to keep a corrupt blob from flooding the log
        let raw_str = json.to_string();
        let truncated = if raw_str.len() > MAX_JSON_LOG_LEN {
            format!("{}...", &raw_str[..MAX_JSON_LOG_LEN])
        } else {
            raw_str
        };

        tracing::warn!(
            field = field_name,
            entity_type = entity_type,
            entity_id = entity_id,
            raw_json = %truncated,
            error = %err,
            "Failed to parse JSON field, using default value"
        );
        T::default()
    })
}

/// One Postgres pool behind every repository trait.
pub struct PostgresPersistence {
    pub(crate) pool: PgPool,
}

impl PostgresPersistence {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

pub mod payment;
pub mod payment_account;
pub mod plan;
pub mod recovery_audit;
pub mod subscription;
