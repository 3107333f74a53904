use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::clock::Clock,
    domain::entities::{
        gateway_kind::GatewayKind,
        payment_account::{PaymentAccount, SelectionStrategy},
    },
};

/// Default bound on re-selection after failed attempts.
pub const DEFAULT_MAX_FALLBACK_ATTEMPTS: usize = 3;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait PaymentAccountRepo: Send + Sync {
    /// All active accounts for one gateway. Currency/country/exclusion
    /// filtering happens in the selector so every strategy sees the same
    /// candidate set.
    async fn list_active(&self, gateway: GatewayKind) -> AppResult<Vec<PaymentAccount>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentAccount>>;

    /// Atomic increment of the success counter and running amount.
    /// Never implemented as read-modify-write: concurrent settlements on the
    /// same account are expected.
    async fn record_success(
        &self,
        id: Uuid,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Atomic increment of the failure counter.
    async fn record_failure(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()>;
}

// ============================================================================
// AccountSelector
// ============================================================================

/// Chooses which credentialed gateway account handles a new payment attempt.
///
/// Selection itself mutates nothing; usage counters move only through the
/// outcome-recording operations, so a selected-but-abandoned checkout does
/// not skew statistics.
pub struct AccountSelector {
    accounts: Arc<dyn PaymentAccountRepo>,
    strategy: SelectionStrategy,
    max_fallback_attempts: usize,
    round_robin_cursor: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl AccountSelector {
    pub fn new(
        accounts: Arc<dyn PaymentAccountRepo>,
        strategy: SelectionStrategy,
        max_fallback_attempts: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            strategy,
            max_fallback_attempts,
            round_robin_cursor: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn max_fallback_attempts(&self) -> usize {
        self.max_fallback_attempts
    }

    /// Pick an account for a new payment attempt.
    ///
    /// `excluded` carries the ids of accounts that already failed for this
    /// checkout; callers grow it between retries. Once it reaches the
    /// fallback bound the selection fails closed instead of cycling through
    /// unusable accounts forever.
    pub async fn select(
        &self,
        gateway: GatewayKind,
        currency: &str,
        country: Option<&str>,
        excluded: &[Uuid],
    ) -> AppResult<PaymentAccount> {
        if excluded.len() >= self.max_fallback_attempts {
            tracing::warn!(
                gateway = %gateway,
                excluded = excluded.len(),
                "Fallback attempts exhausted, failing account selection"
            );
            return Err(AppError::NoAccountAvailable);
        }

        let mut candidates: Vec<PaymentAccount> = self
            .accounts
            .list_active(gateway)
            .await?
            .into_iter()
            .filter(|a| a.supports_currency(currency))
            .filter(|a| a.supports_country(country))
            .filter(|a| !excluded.contains(&a.id))
            .collect();

        if candidates.is_empty() {
            return Err(AppError::NoAccountAvailable);
        }

        let chosen = match self.strategy {
            SelectionStrategy::LeastUsed => self.pick_least_used(candidates),
            SelectionStrategy::RoundRobin => self.pick_round_robin(&mut candidates),
            SelectionStrategy::Weighted => self.pick_weighted(candidates),
            SelectionStrategy::Manual => self.pick_manual(candidates),
        };

        tracing::debug!(
            account_id = %chosen.id,
            gateway = %gateway,
            strategy = %self.strategy,
            "Selected payment account"
        );

        Ok(chosen)
    }

    /// Record a settled payment on the owning account.
    pub async fn record_success(&self, account_id: Uuid, amount_cents: i64) -> AppResult<()> {
        self.accounts
            .record_success(account_id, amount_cents, self.clock.now())
            .await
    }

    /// Record a failed attempt on the owning account.
    pub async fn record_failure(&self, account_id: Uuid) -> AppResult<()> {
        self.accounts.record_failure(account_id, self.clock.now()).await
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    /// Lowest success count wins; ties broken oldest-idle-first, with
    /// never-used accounts ahead of everything so new credentials get
    /// verified quickly.
    fn pick_least_used(&self, candidates: Vec<PaymentAccount>) -> PaymentAccount {
        candidates
            .into_iter()
            .min_by_key(|a| (a.successful_transactions, a.last_used_at))
            .expect("candidates checked non-empty")
    }

    fn pick_round_robin(&self, candidates: &mut Vec<PaymentAccount>) -> PaymentAccount {
        // Stable ordering so the cursor walks the same ring every time
        candidates.sort_by_key(|a| (a.created_at, a.id));
        let index = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.swap_remove(index)
    }

    fn pick_weighted(&self, candidates: Vec<PaymentAccount>) -> PaymentAccount {
        let total: i64 = candidates.iter().map(|a| a.weight.max(0) as i64).sum();
        if total == 0 {
            // All weights zero: degrade to uniform rotation
            return self.pick_least_used(candidates);
        }
        let mut roll = rand::thread_rng().gen_range(0..total);
        for account in &candidates {
            roll -= account.weight.max(0) as i64;
            if roll < 0 {
                return account.clone();
            }
        }
        candidates
            .into_iter()
            .last()
            .expect("candidates checked non-empty")
    }

    fn pick_manual(&self, candidates: Vec<PaymentAccount>) -> PaymentAccount {
        candidates
            .into_iter()
            .min_by_key(|a| (a.priority, a.created_at, a.id))
            .expect("candidates checked non-empty")
    }
}
