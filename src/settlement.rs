//! Pure settlement arithmetic: checkout amounts, promo discounts, payout
//! breakdowns, and refund amounts. No I/O; rounding is half-up to two
//! decimal places everywhere so the ledger and the local records can never
//! drift by more than one minor unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::models::{DiscountType, PromoCode, RefundType};

/// Audit breakdown of a charged total into its three destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutBreakdown {
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub commission: Decimal,
    pub provider_amount: Decimal,
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount to charge at checkout: cart total minus discount, floored at the
/// gateway's minimum chargeable amount. The discount is clamped to
/// `[0, cart_total]` before subtraction.
pub fn checkout_amount(config: &SettlementConfig, cart_total: Decimal, discount: Decimal) -> Decimal {
    let cart_total = cart_total.max(Decimal::ZERO);
    let clamped = discount.max(Decimal::ZERO).min(cart_total);
    let amount = round_money(cart_total - clamped);
    amount.max(config.minimum_charge)
}

/// Discount a promo code yields on a cart total, clamped to the total.
pub fn promo_discount(promo: &PromoCode, cart_total: Decimal) -> Decimal {
    let raw = match promo.discount_type {
        DiscountType::Percentage => {
            round_money(cart_total * promo.discount_value / Decimal::ONE_HUNDRED)
        }
        DiscountType::Fixed => promo.discount_value,
    };
    raw.min(cart_total)
}

/// Split a charged total into provider amount, commission, and platform fee.
///
/// The platform fee was added on top of the provider subtotal at pricing
/// time, so the subtotal is recovered by dividing the total by
/// `1 + platform_fee_rate`. The three parts always reconstruct the total
/// exactly, because fee and provider amount are both derived by subtraction.
pub fn payout_breakdown(config: &SettlementConfig, total_charged: Decimal) -> PayoutBreakdown {
    let subtotal = round_money(total_charged / (Decimal::ONE + config.platform_fee_rate));
    let platform_fee = total_charged - subtotal;
    let commission = round_money(subtotal * config.commission_rate);
    let provider_amount = subtotal - commission;

    PayoutBreakdown {
        subtotal,
        platform_fee,
        commission,
        provider_amount,
    }
}

/// Refund amount for a cancellation decision.
///
/// A partial refund with a fraction of zero or one is a configuration error
/// on the caller's side and is rejected rather than coerced.
pub fn refund_amount(
    original_amount: Decimal,
    refund_type: RefundType,
    refund_percentage: Option<Decimal>,
) -> Result<Decimal, SettlementError> {
    match refund_type {
        RefundType::None => Ok(Decimal::ZERO),
        RefundType::Full => Ok(original_amount),
        RefundType::Partial => {
            let pct = refund_percentage.ok_or_else(|| {
                SettlementError::Validation(
                    "partial refund requires a refund_percentage".to_string(),
                )
            })?;
            if pct <= Decimal::ZERO || pct >= Decimal::ONE {
                return Err(SettlementError::Validation(format!(
                    "partial refund percentage must be between 0 and 1, got {pct}"
                )));
            }
            Ok(round_money(original_amount * pct))
        }
    }
}

/// Convert a display-currency amount to gateway minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, SettlementError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            SettlementError::Validation(format!("amount {amount} is not representable"))
        })
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal literal")
    }

    fn config() -> SettlementConfig {
        SettlementConfig::default()
    }

    #[test]
    fn checkout_amount_without_discount_is_cart_total() {
        assert_eq!(
            checkout_amount(&config(), dec("1000"), Decimal::ZERO),
            dec("1000")
        );
    }

    #[test]
    fn checkout_amount_applies_percentage_promo() {
        let promo = PromoCode {
            code: "SPRING20".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: dec("20"),
            is_active: true,
            expires_at: None,
            min_purchase_amount: None,
            max_uses: None,
            used_by: vec![],
        };
        let discount = promo_discount(&promo, dec("500"));
        assert_eq!(discount, dec("100"));
        assert_eq!(checkout_amount(&config(), dec("500"), discount), dec("400"));
    }

    #[test]
    fn fixed_discount_is_clamped_to_cart_total() {
        let promo = PromoCode {
            code: "BIGFIXED".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: dec("80"),
            is_active: true,
            expires_at: None,
            min_purchase_amount: None,
            max_uses: None,
            used_by: vec![],
        };
        assert_eq!(promo_discount(&promo, dec("50")), dec("50"));
    }

    #[test]
    fn checkout_amount_enforces_minimum_charge() {
        let cfg = config();
        // Discount covering the whole cart still leaves the gateway minimum.
        assert_eq!(
            checkout_amount(&cfg, dec("10"), dec("10")),
            cfg.minimum_charge
        );
    }

    #[test]
    fn checkout_amount_is_monotone_in_discount_and_never_negative() {
        let cfg = config();
        let total = dec("250");
        let mut previous = checkout_amount(&cfg, total, Decimal::ZERO);
        let mut discount = Decimal::ZERO;
        while discount <= total {
            let amount = checkout_amount(&cfg, total, discount);
            assert!(amount <= previous, "amount must not grow with discount");
            assert!(amount >= Decimal::ZERO);
            previous = amount;
            discount += dec("12.5");
        }
    }

    #[test]
    fn payout_breakdown_matches_worked_example() {
        let breakdown = payout_breakdown(&config(), dec("1000"));
        assert_eq!(breakdown.subtotal, dec("909.09"));
        assert_eq!(breakdown.platform_fee, dec("90.91"));
        assert_eq!(breakdown.commission, dec("68.18"));
        assert_eq!(breakdown.provider_amount, dec("840.91"));
    }

    #[test]
    fn payout_breakdown_reconstructs_total_within_one_cent() {
        let cfg = config();
        for raw in ["0.50", "1", "33.33", "100", "999.99", "1000", "123456.78"] {
            let total = dec(raw);
            let b = payout_breakdown(&cfg, total);
            let rebuilt = b.provider_amount + b.commission + b.platform_fee;
            let drift = (rebuilt - total).abs();
            assert!(drift <= dec("0.01"), "drift {drift} for total {total}");
        }
    }

    #[test]
    fn refund_amount_handles_each_policy() {
        assert_eq!(
            refund_amount(dec("2000"), RefundType::None, None).expect("none is valid"),
            Decimal::ZERO
        );
        assert_eq!(
            refund_amount(dec("2000"), RefundType::Full, None).expect("full is valid"),
            dec("2000")
        );
        assert_eq!(
            refund_amount(dec("2000"), RefundType::Partial, Some(dec("0.5")))
                .expect("half is valid"),
            dec("1000")
        );
    }

    #[test]
    fn partial_refund_rejects_degenerate_fractions() {
        for pct in ["0", "1", "1.5", "-0.25"] {
            let result = refund_amount(dec("100"), RefundType::Partial, Some(dec(pct)));
            assert!(result.is_err(), "fraction {pct} must be rejected");
        }
        assert!(refund_amount(dec("100"), RefundType::Partial, None).is_err());
    }

    #[test]
    fn minor_unit_conversion_round_trips() {
        assert_eq!(to_minor_units(dec("400")).expect("fits"), 40_000);
        assert_eq!(to_minor_units(dec("909.09")).expect("fits"), 90_909);
        assert_eq!(from_minor_units(90_909), dec("909.09"));
    }
}
