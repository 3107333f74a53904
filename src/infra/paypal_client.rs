use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value as JsonValue, json};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateway::{
        CheckoutSession, CheckoutSessionRequest, GatewayChargeStatus, GatewayStatusClient,
    },
    domain::entities::{gateway_kind::GatewayKind, recovery::StatusVerdict},
};

const PAYPAL_LIVE_BASE: &str = "https://api-m.paypal.com";
const PAYPAL_SANDBOX_BASE: &str = "https://api-m.sandbox.paypal.com";

/// PayPal implementation of the gateway capability interface, bound to one
/// account's client credentials.
pub struct PaypalGatewayClient {
    client: Client,
    client_id: String,
    client_secret: SecretString,
    base_url: &'static str,
}

impl PaypalGatewayClient {
    pub fn new(
        client_id: String,
        client_secret: SecretString,
        sandbox: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
            client_id,
            client_secret,
            base_url: if sandbox {
                PAYPAL_SANDBOX_BASE
            } else {
                PAYPAL_LIVE_BASE
            },
        }
    }

    async fn access_token(&self) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("PayPal auth failed: {}", e)))?;

        let status = response.status();
        let body: JsonValue = response.json().await.map_err(|e| {
            AppError::GatewayUnavailable(format!("PayPal auth response invalid: {}", e))
        })?;

        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "PayPal auth returned {}: {}",
                status,
                paypal_error_message(&body)
            )));
        }

        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::GatewayUnavailable("PayPal auth response without a token".to_string())
            })
    }

    async fn get_json(&self, url: String) -> AppResult<(StatusCode, JsonValue)> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("PayPal request failed: {}", e)))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("PayPal response invalid: {}", e)))?;
        Ok((status, body))
    }
}

fn paypal_error_message(body: &JsonValue) -> String {
    body["message"]
        .as_str()
        .or_else(|| body["error_description"].as_str())
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait]
impl GatewayStatusClient for PaypalGatewayClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paypal
    }

    /// The session-style reference is a checkout order id.
    async fn fetch_session_status(&self, session_ref: &str) -> AppResult<GatewayChargeStatus> {
        let (status, body) = self
            .get_json(format!("{}/v2/checkout/orders/{}", self.base_url, session_ref))
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(GatewayChargeStatus {
                native_status: "NOT_FOUND".to_string(),
                verdict: StatusVerdict::Unknown,
                raw: body,
            });
        }
        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "PayPal returned {}: {}",
                status,
                paypal_error_message(&body)
            )));
        }

        let order_status = body["status"].as_str().unwrap_or_default();
        Ok(GatewayChargeStatus {
            native_status: order_status.to_string(),
            verdict: StatusVerdict::from_paypal_order(order_status),
            raw: body,
        })
    }

    /// The intent-style reference is a capture id.
    async fn fetch_intent_status(&self, intent_ref: &str) -> AppResult<GatewayChargeStatus> {
        let (status, body) = self
            .get_json(format!("{}/v2/payments/captures/{}", self.base_url, intent_ref))
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(GatewayChargeStatus {
                native_status: "NOT_FOUND".to_string(),
                verdict: StatusVerdict::Unknown,
                raw: body,
            });
        }
        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "PayPal returned {}: {}",
                status,
                paypal_error_message(&body)
            )));
        }

        let capture_status = body["status"].as_str().unwrap_or_default();
        Ok(GatewayChargeStatus {
            native_status: capture_status.to_string(),
            verdict: StatusVerdict::from_paypal_capture(capture_status),
            raw: body,
        })
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        let token = self.access_token().await?;
        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.payment_id.to_string(),
                "description": request.description,
                "amount": {
                    "currency_code": request.currency.to_uppercase(),
                    "value": format_amount(request.amount_cents),
                },
            }],
            "application_context": {
                "return_url": request.success_url,
                "cancel_url": request.cancel_url,
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("PayPal request failed: {}", e)))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("PayPal response invalid: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "PayPal returned {}: {}",
                status,
                paypal_error_message(&body)
            )));
        }

        let order_id = body["id"]
            .as_str()
            .ok_or_else(|| {
                AppError::GatewayUnavailable("PayPal order without an id".to_string())
            })?
            .to_string();
        let approve_url = body["links"]
            .as_array()
            .and_then(|links| {
                links.iter().find(|link| {
                    matches!(link["rel"].as_str(), Some("approve" | "payer-action"))
                })
            })
            .and_then(|link| link["href"].as_str())
            .ok_or_else(|| {
                AppError::GatewayUnavailable("PayPal order without an approval link".to_string())
            })?
            .to_string();

        Ok(CheckoutSession {
            session_ref: order_id,
            intent_ref: None,
            redirect_url: approve_url,
        })
    }
}

/// Cents to PayPal's decimal string, e.g. 1999 -> "19.99".
fn format_amount(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(1999), "19.99");
        assert_eq!(format_amount(100), "1.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(0), "0.00");
    }
}
