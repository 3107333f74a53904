use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateway::{
        CheckoutSession, CheckoutSessionRequest, GatewayChargeStatus, GatewayStatusClient,
    },
    domain::entities::{gateway_kind::GatewayKind, recovery::StatusVerdict},
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe implementation of the gateway capability interface, bound to one
/// account's secret key.
pub struct StripeGatewayClient {
    client: Client,
    secret_key: SecretString,
}

impl StripeGatewayClient {
    pub fn new(secret_key: SecretString, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build reqwest client"),
            secret_key,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn get_json(&self, url: String) -> AppResult<(StatusCode, JsonValue)> {
        let response = self
            .client
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Stripe request failed: {}", e)))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Stripe response invalid: {}", e)))?;
        Ok((status, body))
    }

    async fn post_form(
        &self,
        url: String,
        params: &[(String, String)],
    ) -> AppResult<JsonValue> {
        let response = self
            .client
            .post(url)
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Stripe request failed: {}", e)))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Stripe response invalid: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "Stripe returned {}: {}",
                status,
                stripe_error_message(&body)
            )));
        }
        Ok(body)
    }
}

fn stripe_error_message(body: &JsonValue) -> String {
    body["error"]["message"]
        .as_str()
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait]
impl GatewayStatusClient for StripeGatewayClient {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    async fn fetch_session_status(&self, session_ref: &str) -> AppResult<GatewayChargeStatus> {
        let (status, body) = self
            .get_json(format!("{}/checkout/sessions/{}", STRIPE_API_BASE, session_ref))
            .await?;

        if status == StatusCode::NOT_FOUND {
            // Gateway reachable, reference unknown: a verdict, not an error
            return Ok(GatewayChargeStatus {
                native_status: "not_found".to_string(),
                verdict: StatusVerdict::Unknown,
                raw: body,
            });
        }
        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "Stripe returned {}: {}",
                status,
                stripe_error_message(&body)
            )));
        }

        let session_status = body["status"].as_str().unwrap_or_default();
        let payment_status = body["payment_status"].as_str().unwrap_or_default();
        Ok(GatewayChargeStatus {
            native_status: payment_status.to_string(),
            verdict: StatusVerdict::from_stripe_session(session_status, payment_status),
            raw: body,
        })
    }

    async fn fetch_intent_status(&self, intent_ref: &str) -> AppResult<GatewayChargeStatus> {
        let (status, body) = self
            .get_json(format!("{}/payment_intents/{}", STRIPE_API_BASE, intent_ref))
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(GatewayChargeStatus {
                native_status: "not_found".to_string(),
                verdict: StatusVerdict::Unknown,
                raw: body,
            });
        }
        if !status.is_success() {
            return Err(AppError::GatewayUnavailable(format!(
                "Stripe returned {}: {}",
                status,
                stripe_error_message(&body)
            )));
        }

        let intent_status = body["status"].as_str().unwrap_or_default();
        Ok(GatewayChargeStatus {
            native_status: intent_status.to_string(),
            verdict: StatusVerdict::from_stripe_intent(intent_status),
            raw: body,
        })
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        let params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "customer_email".to_string(),
                request.customer_email.clone(),
            ),
            (
                "client_reference_id".to_string(),
                request.payment_id.to_string(),
            ),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        let body = self
            .post_form(format!("{}/checkout/sessions", STRIPE_API_BASE), &params)
            .await?;

        let session_ref = body["id"]
            .as_str()
            .ok_or_else(|| {
                AppError::GatewayUnavailable("Stripe session without an id".to_string())
            })?
            .to_string();
        let redirect_url = body["url"]
            .as_str()
            .ok_or_else(|| {
                AppError::GatewayUnavailable("Stripe session without a checkout URL".to_string())
            })?
            .to_string();
        let intent_ref = body["payment_intent"].as_str().map(str::to_string);

        Ok(CheckoutSession {
            session_ref,
            intent_ref,
            redirect_url,
        })
    }
}
