use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateway::GatewayStatusClient,
    domain::entities::{gateway_kind::GatewayKind, payment_account::PaymentAccount},
    infra::{paypal_client::PaypalGatewayClient, stripe_client::StripeGatewayClient},
};

/// Builds the gateway client for a payment account's credentials.
///
/// Gateway behaviour is a closed set resolved here, once per account, rather
/// than string-dispatched at each call site.
pub struct GatewayClientFactory {
    http_timeout: Duration,
    #[cfg(test)]
    test_client_override: Option<Arc<dyn GatewayStatusClient>>,
}

impl GatewayClientFactory {
    pub fn new(http_timeout: Duration) -> Self {
        Self {
            http_timeout,
            #[cfg(test)]
            test_client_override: None,
        }
    }

    #[cfg(test)]
    pub fn with_client_override(mut self, client: Arc<dyn GatewayStatusClient>) -> Self {
        self.test_client_override = Some(client);
        self
    }

    pub fn for_account(&self, account: &PaymentAccount) -> AppResult<Arc<dyn GatewayStatusClient>> {
        #[cfg(test)]
        if let Some(ref client) = self.test_client_override {
            return Ok(client.clone());
        }

        match account.gateway {
            GatewayKind::Stripe => Ok(Arc::new(StripeGatewayClient::new(
                SecretString::from(account.secret_key.clone()),
                self.http_timeout,
            ))),
            GatewayKind::Paypal => {
                let client_id = account
                    .client_id
                    .clone()
                    .ok_or(AppError::GatewayNotConfigured)?;
                Ok(Arc::new(PaypalGatewayClient::new(
                    client_id,
                    SecretString::from(account.secret_key.clone()),
                    account.sandbox,
                    self.http_timeout,
                )))
            }
        }
    }
}
