use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entities::subscription::SubscriptionStatus;

/// Domain events handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    PaymentCompleted {
        payment_id: Uuid,
        customer_email: String,
        amount_cents: i64,
        currency: String,
    },
    PaymentFailed {
        payment_id: Uuid,
        customer_email: String,
        reason: String,
    },
    PaymentRefunded {
        payment_id: Uuid,
        refund_payment_id: Uuid,
        customer_email: String,
    },
    SubscriptionCreated {
        subscription_id: Uuid,
        customer_email: String,
        plan_name: String,
    },
    SubscriptionRenewed {
        subscription_id: Uuid,
        customer_email: String,
        billing_cycle_count: i32,
    },
    SubscriptionPastDue {
        subscription_id: Uuid,
        customer_email: String,
    },
    SubscriptionCancelled {
        subscription_id: Uuid,
        customer_email: String,
        at_period_end: bool,
    },
    SubscriptionExpired {
        subscription_id: Uuid,
        customer_email: String,
        previous_status: SubscriptionStatus,
    },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::PaymentCompleted { .. } => "payment.completed",
            NotificationEvent::PaymentFailed { .. } => "payment.failed",
            NotificationEvent::PaymentRefunded { .. } => "payment.refunded",
            NotificationEvent::SubscriptionCreated { .. } => "subscription.created",
            NotificationEvent::SubscriptionRenewed { .. } => "subscription.renewed",
            NotificationEvent::SubscriptionPastDue { .. } => "subscription.past_due",
            NotificationEvent::SubscriptionCancelled { .. } => "subscription.cancelled",
            NotificationEvent::SubscriptionExpired { .. } => "subscription.expired",
        }
    }
}

/// Fire-and-forget dispatch seam. Implementations must swallow their own
/// failures: a notification problem never blocks or fails a transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}
