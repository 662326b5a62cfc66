//! Promo code validation and redemption.
//!
//! `validate` is read-only and runs before any charge is created; the
//! mutation lives entirely in `mark_used`, which leans on the store's atomic
//! set-add so concurrent redemptions of the same code cannot overshoot
//! `max_uses` or record a user twice.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::SettlementError;
use crate::settlement;
use crate::store::{PromoUseOutcome, Store};

/// Codes are case-insensitive; everything below the HTTP layer works on the
/// normalized form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Check a code against a user and cart total, returning the discount it
/// would yield. Rejections carry the specific reason the code does not
/// apply.
pub async fn validate(
    store: &dyn Store,
    code: &str,
    user_id: &str,
    cart_total: Decimal,
) -> Result<Decimal, SettlementError> {
    if cart_total < Decimal::ZERO {
        return Err(SettlementError::Validation(
            "cart_total must not be negative".to_string(),
        ));
    }

    let code = normalize_code(code);
    let promo = store
        .promo_code(&code)
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("promo code {code} not found")))?;

    if !promo.is_active {
        return Err(SettlementError::PreconditionFailed(format!(
            "promo code {code} is no longer active"
        )));
    }

    if let Some(expires_at) = promo.expires_at {
        if expires_at < Utc::now() {
            return Err(SettlementError::PreconditionFailed(format!(
                "promo code {code} has expired"
            )));
        }
    }

    if promo.used_by.iter().any(|u| u == user_id) {
        return Err(SettlementError::PreconditionFailed(format!(
            "promo code {code} was already used by this customer"
        )));
    }

    if let Some(max_uses) = promo.max_uses {
        if promo.used_by.len() as i64 >= max_uses as i64 {
            return Err(SettlementError::PreconditionFailed(format!(
                "promo code {code} has reached its maximum number of uses"
            )));
        }
    }

    if let Some(min_purchase) = promo.min_purchase_amount {
        if cart_total < min_purchase {
            return Err(SettlementError::PreconditionFailed(format!(
                "cart total is below the minimum purchase amount of {min_purchase}"
            )));
        }
    }

    Ok(settlement::promo_discount(&promo, cart_total))
}

/// Consume the code for this user. Returns whether the user had already
/// redeemed it (a benign outcome for retried requests).
pub async fn mark_used(
    store: &dyn Store,
    code: &str,
    user_id: &str,
) -> Result<bool, SettlementError> {
    let code = normalize_code(code);
    let outcome = store
        .add_promo_use(&code, user_id)
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("promo code {code} not found")))?;

    match outcome {
        PromoUseOutcome::Added => {
            tracing::info!(code = %code, user_id = %user_id, "promo code redeemed");
            Ok(false)
        }
        PromoUseOutcome::AlreadyUsed => Ok(true),
        PromoUseOutcome::MaxUsesReached => Err(SettlementError::PreconditionFailed(format!(
            "promo code {code} has reached its maximum number of uses"
        ))),
    }
}
