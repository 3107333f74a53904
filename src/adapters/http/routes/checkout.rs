use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::ports::gateway::CheckoutSessionRequest,
    application::use_cases::payment_ledger::{CreatePaymentInput, RequestContext},
    domain::entities::{gateway_kind::GatewayKind, payment::PaymentKind},
};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub gateway: GatewayKind,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub plan_id: Option<Uuid>,
    pub country: Option<String>,
    /// Present when this checkout renews an existing subscription
    pub renews_subscription_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub payment_id: Uuid,
    pub session_ref: String,
    /// Hosted gateway page the customer is sent to
    pub redirect_url: String,
}

/// Open a hosted checkout session. Walks the account fallback chain: a
/// gateway-side failure marks the attempt failed and retries on the
/// next-best account, bounded by the selector's fallback limit.
pub async fn create_checkout(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    if request.amount_cents <= 0 {
        return Err(AppError::InvalidInput(
            "amount_cents must be positive".to_string(),
        ));
    }
    if request.currency.len() != 3 {
        return Err(AppError::InvalidInput(
            "currency must be a 3-letter ISO code".to_string(),
        ));
    }

    let context = RequestContext {
        client_ip: Some(addr.ip().to_string()),
        locale: headers
            .get("accept-language")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let kind = if request.renews_subscription_id.is_some() {
        PaymentKind::Renewal
    } else {
        PaymentKind::Purchase
    };

    let mut excluded: Vec<Uuid> = Vec::new();
    loop {
        // Fails closed with NoAccountAvailable once the chain is exhausted
        let account = state
            .selector
            .select(
                request.gateway,
                &request.currency,
                request.country.as_deref(),
                &excluded,
            )
            .await?;

        let payment = state
            .ledger
            .create_pending(CreatePaymentInput {
                account_id: account.id,
                gateway: request.gateway,
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
                customer_email: request.customer_email.clone(),
                customer_phone: request.customer_phone.clone(),
                plan_id: request.plan_id,
                kind,
                renews_subscription_id: request.renews_subscription_id,
                context: context.clone(),
            })
            .await?;

        let client = state.gateway_clients.for_account(&account)?;
        let session_request = CheckoutSessionRequest {
            payment_id: payment.id,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            customer_email: request.customer_email.clone(),
            description: format!("Order {}", payment.id.simple()),
            success_url: state.config.checkout_success_url.to_string(),
            cancel_url: state.config.checkout_cancel_url.to_string(),
        };

        match client.create_checkout_session(&session_request).await {
            Ok(session) => {
                state
                    .ledger
                    .attach_gateway_refs(
                        payment.id,
                        Some(&session.session_ref),
                        session.intent_ref.as_deref(),
                    )
                    .await?;
                return Ok(Json(CheckoutResponse {
                    payment_id: payment.id,
                    session_ref: session.session_ref,
                    redirect_url: session.redirect_url,
                }));
            }
            Err(err @ (AppError::GatewayUnavailable(_) | AppError::GatewayNotConfigured)) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    account_id = %account.id,
                    error = %err,
                    "Checkout session failed, trying fallback account"
                );
                state
                    .ledger
                    .mark_failed(
                        payment.id,
                        "checkout session creation failed",
                        &json!({ "error": err.to_string() }),
                    )
                    .await?;
                excluded.push(account.id);
            }
            Err(other) => return Err(other),
        }
    }
}
