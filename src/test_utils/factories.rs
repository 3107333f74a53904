//! Test data factories for creating valid fixtures.
//!
//! Each factory returns a complete object with sensible defaults; use the
//! closure parameter to override specific fields.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::entities::{
    gateway_kind::GatewayKind,
    payment::{Payment, PaymentKind, PaymentStatus},
    payment_account::PaymentAccount,
    plan::{BillingInterval, Plan},
};

pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn create_test_account(overrides: impl FnOnce(&mut PaymentAccount)) -> PaymentAccount {
    let mut account = PaymentAccount {
        id: Uuid::new_v4(),
        gateway: GatewayKind::Stripe,
        label: "primary".to_string(),
        secret_key: "sk_test_123".to_string(),
        client_id: None,
        active: true,
        sandbox: true,
        successful_transactions: 0,
        failed_transactions: 0,
        total_amount_cents: 0,
        last_used_at: None,
        currencies: Vec::new(),
        countries: Vec::new(),
        weight: 1,
        priority: 0,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut account);
    account
}

pub fn create_test_plan(overrides: impl FnOnce(&mut Plan)) -> Plan {
    let mut plan = Plan {
        id: Uuid::new_v4(),
        code: "basic".to_string(),
        name: "Basic Plan".to_string(),
        price_cents: 999,
        currency: "usd".to_string(),
        interval: BillingInterval::Month,
        interval_count: 1,
        trial_days: 0,
        grace_period_days: 3,
        recurring: true,
        active: true,
    };
    overrides(&mut plan);
    plan
}

pub fn create_test_payment(
    account_id: Uuid,
    overrides: impl FnOnce(&mut Payment),
) -> Payment {
    let mut payment = Payment {
        id: Uuid::new_v4(),
        account_id,
        gateway: GatewayKind::Stripe,
        amount_cents: 999,
        currency: "usd".to_string(),
        status: PaymentStatus::Pending,
        kind: PaymentKind::Purchase,
        customer_email: "customer@example.com".to_string(),
        customer_phone: None,
        session_ref: None,
        intent_ref: None,
        plan_id: None,
        subscription_id: None,
        renews_subscription_id: None,
        original_payment_id: None,
        failure_reason: None,
        gateway_response: serde_json::Value::Object(serde_json::Map::new()),
        client_ip: None,
        client_locale: None,
        paid_at: None,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut payment);
    payment
}
