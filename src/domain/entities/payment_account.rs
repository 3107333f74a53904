use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::gateway_kind::GatewayKind;

/// How `AccountSelector` picks among eligible accounts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum SelectionStrategy {
    /// Lowest successful-transaction count wins, ties broken oldest-idle-first.
    /// Spreads load evenly and surfaces new accounts for verification.
    #[default]
    LeastUsed,
    /// Rotate through a stored ordering pointer.
    RoundRobin,
    /// Probabilistic pick proportional to configured weights.
    Weighted,
    /// Fixed priority list, first available wins.
    Manual,
}

/// A credential set bound to one gateway (e.g. one Stripe secret key).
///
/// Counters only move through `record_success` / `record_failure` and only
/// upward; accounts are never deleted, only soft-disabled via `active`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAccount {
    pub id: Uuid,
    pub gateway: GatewayKind,
    pub label: String,
    /// Opaque credential. Stripe: secret key. PayPal: client secret.
    #[serde(skip_serializing)]
    pub secret_key: String,
    /// PayPal client id; unused for Stripe.
    pub client_id: Option<String>,
    pub active: bool,
    pub sandbox: bool,
    pub successful_transactions: i64,
    pub failed_transactions: i64,
    pub total_amount_cents: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Supported currencies, lowercase ISO codes. Empty means any.
    pub currencies: Vec<String>,
    /// Supported customer countries, uppercase ISO codes. Empty means any.
    pub countries: Vec<String>,
    /// Relative weight for the `weighted` strategy
    pub weight: i32,
    /// Position for the `manual` strategy, lowest first
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAccount {
    pub fn supports_currency(&self, currency: &str) -> bool {
        self.currencies.is_empty()
            || self
                .currencies
                .iter()
                .any(|c| c.eq_ignore_ascii_case(currency))
    }

    pub fn supports_country(&self, country: Option<&str>) -> bool {
        match country {
            None => true,
            Some(country) => {
                self.countries.is_empty()
                    || self
                        .countries
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(country))
            }
        }
    }
}
