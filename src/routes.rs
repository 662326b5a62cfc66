use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::gateway::PaymentGateway;
use crate::models::{
    AccountSyncRequest, AccountSyncResponse, CancelRefundRequest, CancelRefundResponse,
    CheckoutIntentRequest, CheckoutIntentResponse, FanoutRequest, FanoutResponse,
    PayoutRequest, PayoutResponse, PromoMarkUsedRequest, PromoMarkUsedResponse,
    PromoValidateRequest, PromoValidateResponse, WebhookAck,
};
use crate::store::Store;
use crate::{checkout, fanout, payout, promo, reconcile, refund};

/// Name of the signature header the gateway sets on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "gateway-signature";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub settlement: SettlementConfig,
    pub webhook_secret: String,
}

pub fn settlement_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/checkout/intent", post(create_intent))
        .route("/checkout/fanout", post(fan_out_cart))
        .route("/payout", post(execute_payout))
        .route("/cancel/refund", post(cancel_refund))
        .route("/webhooks/payment", post(receive_payment_webhook))
        .route("/account/sync", post(sync_account))
        .route("/promo/validate", post(validate_promo))
        .route("/promo/markUsed", post(mark_promo_used))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "settlements-rs"
    }))
}

/// POST /checkout/intent - Resolve a cart into one confirmable charge
async fn create_intent(
    State(state): State<AppState>,
    Json(req): Json<CheckoutIntentRequest>,
) -> Result<Json<CheckoutIntentResponse>, SettlementError> {
    let promo = match req.promo_code.as_deref() {
        Some(code) if !code.trim().is_empty() => {
            let total = checkout::cart_total(&req.cart);
            let discount =
                promo::validate(state.store.as_ref(), code, &req.customer_id, total).await?;
            Some((promo::normalize_code(code), discount))
        }
        _ => None,
    };

    let intent = checkout::create_checkout_intent(
        state.store.as_ref(),
        state.gateway.as_ref(),
        &state.settlement,
        &req.cart,
        &req.customer_id,
        promo.as_ref().map(|(code, discount)| (code.as_str(), *discount)),
    )
    .await?;

    Ok(Json(CheckoutIntentResponse {
        charge_reference: intent.charge.id,
        client_secret: intent.charge.client_secret,
        connected_account_id: intent.connected_account_id,
        amount: intent.amount,
        discount_amount: intent.discount,
    }))
}

/// POST /checkout/fanout - Split a confirmed charge into pending payouts
async fn fan_out_cart(
    State(state): State<AppState>,
    Json(req): Json<FanoutRequest>,
) -> Result<Json<FanoutResponse>, SettlementError> {
    fanout::fan_out(state.store.as_ref(), &req.charge_reference, &req.cart).await?;
    Ok(Json(FanoutResponse { ok: true }))
}

/// POST /payout - Transfer a provider's share of a settled charge
async fn execute_payout(
    State(state): State<AppState>,
    Json(req): Json<PayoutRequest>,
) -> Result<Json<PayoutResponse>, SettlementError> {
    let outcome = payout::execute_payout(
        state.store.as_ref(),
        state.gateway.as_ref(),
        &state.settlement,
        &req.charge_reference,
        &req.connected_account_id,
        &req.mission_id,
        req.amount,
    )
    .await?;

    Ok(Json(PayoutResponse {
        transfer_reference: outcome.transfer.id,
        provider_amount: outcome.breakdown.provider_amount,
        commission: outcome.breakdown.commission,
        platform_fee: outcome.breakdown.platform_fee,
    }))
}

/// POST /cancel/refund - Refund the original charge per the policy decision
async fn cancel_refund(
    State(state): State<AppState>,
    Json(req): Json<CancelRefundRequest>,
) -> Result<Json<CancelRefundResponse>, SettlementError> {
    let record = refund::cancel_refund(
        state.store.as_ref(),
        state.gateway.as_ref(),
        &req.charge_reference,
        req.refund_type,
        req.refund_percentage,
        req.order_id.as_deref(),
    )
    .await?;

    Ok(Json(CancelRefundResponse {
        refund_reference: record.refund_id,
        refunded_amount: record.refunded_amount,
        status: record.status,
    }))
}

/// POST /webhooks/payment - Signed gateway notifications, raw body
async fn receive_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, SettlementError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(SettlementError::SignatureInvalid)?;

    reconcile::handle_webhook(state.store.as_ref(), &body, signature, &state.webhook_secret)
        .await?;

    Ok(Json(WebhookAck { received: true }))
}

/// POST /account/sync - Pull-reconcile a connected account
async fn sync_account(
    State(state): State<AppState>,
    Json(req): Json<AccountSyncRequest>,
) -> Result<Json<AccountSyncResponse>, SettlementError> {
    let account = reconcile::sync_account(
        state.store.as_ref(),
        state.gateway.as_ref(),
        req.account_id.as_deref(),
        req.provider_id.as_deref(),
    )
    .await?;

    Ok(Json(AccountSyncResponse {
        onboarding_status: account.onboarding_status,
        charges_enabled: account.charges_enabled,
        payouts_enabled: account.payouts_enabled,
    }))
}

/// POST /promo/validate - Read-only promo check, run before charging
async fn validate_promo(
    State(state): State<AppState>,
    Json(req): Json<PromoValidateRequest>,
) -> Result<Json<PromoValidateResponse>, SettlementError> {
    let discount =
        promo::validate(state.store.as_ref(), &req.code, &req.user_id, req.cart_total).await?;

    Ok(Json(PromoValidateResponse {
        valid: true,
        discount,
    }))
}

/// POST /promo/markUsed - Atomically consume a promo code for a user
async fn mark_promo_used(
    State(state): State<AppState>,
    Json(req): Json<PromoMarkUsedRequest>,
) -> Result<Json<PromoMarkUsedResponse>, SettlementError> {
    let already_used = promo::mark_used(state.store.as_ref(), &req.code, &req.user_id).await?;

    Ok(Json(PromoMarkUsedResponse {
        ok: true,
        already_used,
    }))
}
