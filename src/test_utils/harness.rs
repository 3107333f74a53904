//! Fully wired use-case stack over in-memory repositories, for tests that
//! exercise ledger, engine and scanner together.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    application::use_cases::{
        account_selector::{AccountSelector, DEFAULT_MAX_FALLBACK_ATTEMPTS},
        gateway_client_factory::GatewayClientFactory,
        gateway_reconciler::GatewayReconciler,
        payment_ledger::{CreatePaymentInput, PaymentLedger, PaymentRepo, RequestContext},
        recovery_scanner::RecoveryScanner,
        subscription_engine::SubscriptionEngine,
    },
    domain::entities::{
        gateway_kind::GatewayKind,
        payment::{Payment, PaymentKind},
        payment_account::{PaymentAccount, SelectionStrategy},
        plan::Plan,
        subscription::Subscription,
    },
    test_utils::{
        clock::FixedClock,
        factories::{create_test_account, create_test_plan},
        gateway_mocks::MockGatewayClient,
        mocks::{
            InMemoryPaymentAccountRepo, InMemoryPaymentRepo, InMemoryPlanRepo,
            InMemoryRecoveryAuditRepo, InMemorySubscriptionEventRepo, InMemorySubscriptionRepo,
            RecordingNotifier,
        },
    },
};

pub struct TestHarness {
    pub clock: Arc<FixedClock>,
    pub accounts: Arc<InMemoryPaymentAccountRepo>,
    pub payments: Arc<InMemoryPaymentRepo>,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub plans: Arc<InMemoryPlanRepo>,
    pub events: Arc<InMemorySubscriptionEventRepo>,
    pub audit: Arc<InMemoryRecoveryAuditRepo>,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<MockGatewayClient>,
    pub selector: Arc<AccountSelector>,
    pub engine: Arc<SubscriptionEngine>,
    pub ledger: Arc<PaymentLedger>,
    pub gateway_clients: Arc<GatewayClientFactory>,
    pub reconciler: Arc<GatewayReconciler>,
    pub scanner: Arc<RecoveryScanner>,
    pub default_account: PaymentAccount,
    pub default_plan: Plan,
}

impl TestHarness {
    pub async fn new() -> Self {
        let clock = Arc::new(FixedClock::default());
        let default_account = create_test_account(|_| {});
        let default_plan = create_test_plan(|_| {});

        let accounts = Arc::new(InMemoryPaymentAccountRepo::with_accounts(vec![
            default_account.clone(),
        ]));
        let payments = Arc::new(InMemoryPaymentRepo::default());
        let subscriptions = Arc::new(InMemorySubscriptionRepo::default());
        let plans = Arc::new(InMemoryPlanRepo::with_plans(vec![default_plan.clone()]));
        let events = Arc::new(InMemorySubscriptionEventRepo::default());
        let audit = Arc::new(InMemoryRecoveryAuditRepo::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Arc::new(MockGatewayClient::new());

        let selector = Arc::new(AccountSelector::new(
            accounts.clone(),
            SelectionStrategy::LeastUsed,
            DEFAULT_MAX_FALLBACK_ATTEMPTS,
            clock.clone(),
        ));
        let engine = Arc::new(SubscriptionEngine::new(
            subscriptions.clone(),
            plans.clone(),
            events.clone(),
            payments.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let ledger = Arc::new(PaymentLedger::new(
            payments.clone(),
            selector.clone(),
            engine.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let gateway_clients = Arc::new(
            GatewayClientFactory::new(std::time::Duration::from_secs(5))
                .with_client_override(gateway.clone()),
        );
        let reconciler = Arc::new(GatewayReconciler::new(
            accounts.clone(),
            gateway_clients.clone(),
        ));
        let scanner = Arc::new(RecoveryScanner::new(
            payments.clone(),
            reconciler.clone(),
            ledger.clone(),
            audit.clone(),
            clock.clone(),
            std::time::Duration::ZERO,
        ));

        Self {
            clock,
            accounts,
            payments,
            subscriptions,
            plans,
            events,
            audit,
            notifier,
            gateway,
            selector,
            engine,
            ledger,
            gateway_clients,
            reconciler,
            scanner,
            default_account,
            default_plan,
        }
    }

    // ========================================================================
    // Payment fixtures
    // ========================================================================

    pub async fn pending_purchase_payment(&self) -> Payment {
        self.pending_payment_for_plan(self.default_plan.id).await
    }

    pub async fn pending_payment_for_plan(&self, plan_id: Uuid) -> Payment {
        self.ledger
            .create_pending(CreatePaymentInput {
                account_id: self.default_account.id,
                gateway: GatewayKind::Stripe,
                amount_cents: 999,
                currency: "usd".to_string(),
                customer_email: "customer@example.com".to_string(),
                customer_phone: None,
                plan_id: Some(plan_id),
                kind: PaymentKind::Purchase,
                renews_subscription_id: None,
                context: RequestContext::default(),
            })
            .await
            .expect("create pending payment")
    }

    pub async fn pending_payment_with_session(&self, session_ref: &str) -> Payment {
        let payment = self.pending_purchase_payment().await;
        self.ledger
            .attach_gateway_refs(payment.id, Some(session_ref), None)
            .await
            .expect("attach refs");
        self.payments
            .get_by_id(payment.id)
            .await
            .expect("reload payment")
            .expect("payment exists")
    }

    pub async fn pending_renewal_payment(&self, subscription_id: Uuid) -> Payment {
        self.ledger
            .create_pending(CreatePaymentInput {
                account_id: self.default_account.id,
                gateway: GatewayKind::Stripe,
                amount_cents: 999,
                currency: "usd".to_string(),
                customer_email: "customer@example.com".to_string(),
                customer_phone: None,
                plan_id: Some(self.default_plan.id),
                kind: PaymentKind::Renewal,
                renews_subscription_id: Some(subscription_id),
                context: RequestContext::default(),
            })
            .await
            .expect("create renewal payment")
    }

    // ========================================================================
    // Subscription fixtures & accessors
    // ========================================================================

    /// Complete a fresh purchase payment and return the subscription it
    /// materialized.
    pub async fn active_subscription(&self) -> Subscription {
        let payment = self.pending_purchase_payment().await;
        self.ledger
            .mark_completed(payment.id, &serde_json::json!({}))
            .await
            .expect("mark completed");
        let stored = self
            .payments
            .get_by_id(payment.id)
            .await
            .expect("reload payment")
            .expect("payment exists");
        self.subscription(stored.subscription_id.expect("payment materialized"))
    }

    pub fn insert_plan(&self, overrides: impl FnOnce(&mut Plan)) -> Plan {
        let plan = create_test_plan(overrides);
        self.plans.insert(plan.clone());
        plan
    }

    pub fn subscription(&self, id: Uuid) -> Subscription {
        self.subscriptions
            .all()
            .into_iter()
            .find(|s| s.id == id)
            .expect("subscription not found")
    }

    pub fn only_subscription(&self) -> Subscription {
        let mut all = self.subscriptions.all();
        assert_eq!(all.len(), 1, "expected exactly one subscription");
        all.pop().unwrap()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.all().len()
    }
}
