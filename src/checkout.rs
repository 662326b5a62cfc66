//! Checkout-time payment intent orchestration.
//!
//! Resolves a single-provider cart into one gateway charge against the
//! provider's connected account. The charge metadata is the only channel the
//! asynchronous consumers (reconciler, fan-out) will ever see, so it has to
//! carry everything they need.

use rust_decimal::Decimal;

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::gateway::types::{Charge, CreateChargeRequest, Metadata};
use crate::gateway::PaymentGateway;
use crate::models::CartItem;
use crate::settlement;
use crate::store::Store;

/// A created charge plus what the client needs to confirm it.
#[derive(Debug, Clone)]
pub struct CheckoutIntent {
    pub charge: Charge,
    pub connected_account_id: String,
    pub amount: Decimal,
    pub discount: Decimal,
}

pub fn cart_total(cart: &[CartItem]) -> Decimal {
    cart.iter().map(|item| item.price).sum()
}

/// The single provider a cart resolves to. Mixed-provider carts cannot be
/// charged as one intent and are rejected outright.
fn single_provider_id(cart: &[CartItem]) -> Result<String, SettlementError> {
    if cart.is_empty() {
        return Err(SettlementError::Validation(
            "cart must contain at least one item".to_string(),
        ));
    }

    let mut provider_id: Option<&str> = None;
    for item in cart {
        if item.price < Decimal::ZERO {
            return Err(SettlementError::Validation(format!(
                "cart item {} has a negative price",
                item.service_id
            )));
        }
        let Some(item_provider) = item.provider_id.as_deref() else {
            return Err(SettlementError::Validation(format!(
                "cart item {} has no provider",
                item.service_id
            )));
        };
        match provider_id {
            None => provider_id = Some(item_provider),
            Some(existing) if existing != item_provider => {
                return Err(SettlementError::Validation(
                    "cart mixes services from different providers; checkout supports one provider per payment".to_string(),
                ));
            }
            Some(_) => {}
        }
    }

    provider_id
        .map(str::to_string)
        .ok_or_else(|| SettlementError::Validation("cart has no provider".to_string()))
}

pub async fn create_checkout_intent(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    config: &SettlementConfig,
    cart: &[CartItem],
    customer_id: &str,
    promo: Option<(&str, Decimal)>,
) -> Result<CheckoutIntent, SettlementError> {
    if customer_id.trim().is_empty() {
        return Err(SettlementError::Validation(
            "customer_id is required".to_string(),
        ));
    }

    let provider_id = single_provider_id(cart)?;

    let account = store
        .provider_account(&provider_id)
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("provider {provider_id} not found")))?;

    let connected_account_id = account.connected_account_id.ok_or_else(|| {
        SettlementError::NotFound(format!(
            "provider {provider_id} has not completed payout onboarding"
        ))
    })?;

    let total = cart_total(cart);
    let discount = promo.map(|(_, d)| d).unwrap_or(Decimal::ZERO);
    let amount = settlement::checkout_amount(config, total, discount);

    let item_names: Vec<&str> = cart.iter().map(|i| i.service_name.as_str()).collect();

    let mut metadata = Metadata::new();
    metadata.insert("customer_id".to_string(), customer_id.to_string());
    metadata.insert("provider_id".to_string(), provider_id.clone());
    metadata.insert(
        "provider_account_id".to_string(),
        connected_account_id.clone(),
    );
    metadata.insert("items".to_string(), item_names.join(", "));
    metadata.insert("discount_amount".to_string(), discount.to_string());
    if let Some((code, _)) = promo {
        metadata.insert("promo_code".to_string(), code.to_string());
    }

    let charge = gateway
        .create_charge(CreateChargeRequest {
            amount: settlement::to_minor_units(amount)?,
            currency: config.currency.clone(),
            destination_account: Some(connected_account_id.clone()),
            description: Some(format!("Checkout for customer {customer_id}")),
            metadata: Some(metadata),
        })
        .await?;

    tracing::info!(
        charge_id = %charge.id,
        customer_id = %customer_id,
        provider_id = %provider_id,
        amount = %amount,
        discount = %discount,
        "created checkout payment intent"
    );

    Ok(CheckoutIntent {
        charge,
        connected_account_id,
        amount,
        discount,
    })
}
