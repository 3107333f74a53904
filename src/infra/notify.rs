use async_trait::async_trait;

use crate::application::ports::notifier::{NotificationEvent, Notifier};

/// Log-based notification dispatcher. Downstream delivery (email, outbound
/// webhooks) is a separate collaborator; from the core's point of view a
/// notification is fire-and-forget and can never fail a transition.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        tracing::info!(event = event.name(), payload = ?event, "Notification dispatched");
    }
}
