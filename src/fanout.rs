//! Post-charge cart fan-out.
//!
//! Once the customer has confirmed the charge, the cart is split into one
//! pending payout per provider. Keys are deterministic per (charge,
//! provider) and the whole batch is written atomically with write-if-absent
//! semantics, so double-clicks and crash-retries can never duplicate or
//! half-apply a fan-out.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::error::SettlementError;
use crate::models::{CartItem, PayoutStatus, PendingPayout};
use crate::settlement;
use crate::store::Store;

/// Group a cart into per-provider payout obligations. Pure; fails the whole
/// batch if any item is missing its provider.
pub fn group_cart(charge_id: &str, cart: &[CartItem]) -> Result<Vec<PendingPayout>, SettlementError> {
    if cart.is_empty() {
        return Err(SettlementError::Validation(
            "cart must contain at least one item".to_string(),
        ));
    }

    let mut groups: BTreeMap<String, (Decimal, Vec<String>)> = BTreeMap::new();
    for item in cart {
        let Some(provider_id) = item.provider_id.as_deref() else {
            return Err(SettlementError::Validation(format!(
                "cart item {} has no provider; refusing to fan out",
                item.service_id
            )));
        };
        let entry = groups
            .entry(provider_id.to_string())
            .or_insert_with(|| (Decimal::ZERO, Vec::new()));
        entry.0 += item.price;
        entry.1.push(item.service_name.clone());
    }

    let created_at = Utc::now();
    Ok(groups
        .into_iter()
        .map(|(provider_id, (amount, items))| PendingPayout {
            id: PendingPayout::key(charge_id, &provider_id),
            charge_id: charge_id.to_string(),
            provider_id,
            amount: settlement::round_money(amount),
            items,
            status: PayoutStatus::PendingValidation,
            created_at,
        })
        .collect())
}

/// Fan a confirmed charge out into pending payouts. Retries are no-ops for
/// records that already exist.
pub async fn fan_out(
    store: &dyn Store,
    charge_id: &str,
    cart: &[CartItem],
) -> Result<usize, SettlementError> {
    if charge_id.trim().is_empty() {
        return Err(SettlementError::Validation(
            "charge_reference is required".to_string(),
        ));
    }

    let payouts = group_cart(charge_id, cart)?;
    let created = store.insert_pending_payouts(&payouts).await?;

    tracing::info!(
        charge_id = %charge_id,
        providers = payouts.len(),
        created = created,
        "fanned cart out into pending payouts"
    );

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal literal")
    }

    fn item(service: &str, price: &str, provider: Option<&str>) -> CartItem {
        CartItem {
            service_id: service.to_string(),
            service_name: service.to_string(),
            price: dec(price),
            provider_id: provider.map(str::to_string),
            subservices: None,
        }
    }

    #[test]
    fn groups_sum_per_provider_with_deterministic_keys() {
        let cart = vec![
            item("cleaning", "120.50", Some("prov_b")),
            item("gardening", "80", Some("prov_a")),
            item("windows", "29.50", Some("prov_b")),
        ];

        let payouts = group_cart("pi_77", &cart).unwrap();
        assert_eq!(payouts.len(), 2);

        // BTreeMap ordering makes the output stable across retries.
        assert_eq!(payouts[0].id, "pi_77_prov_a");
        assert_eq!(payouts[0].amount, dec("80"));
        assert_eq!(payouts[1].id, "pi_77_prov_b");
        assert_eq!(payouts[1].amount, dec("150.00"));
        assert_eq!(payouts[1].items, vec!["cleaning", "windows"]);
    }

    #[test]
    fn item_without_provider_fails_the_whole_batch() {
        let cart = vec![
            item("cleaning", "100", Some("prov_a")),
            item("mystery", "50", None),
        ];
        assert!(group_cart("pi_77", &cart).is_err());
    }

    #[tokio::test]
    async fn retried_fan_out_is_a_no_op() {
        let store = MemoryStore::new();
        let cart = vec![
            item("cleaning", "100", Some("prov_a")),
            item("gardening", "60", Some("prov_b")),
        ];

        assert_eq!(fan_out(&store, "pi_1", &cart).await.unwrap(), 2);
        assert_eq!(fan_out(&store, "pi_1", &cart).await.unwrap(), 0);
        assert_eq!(
            store.pending_payouts_for_charge("pi_1").await.unwrap().len(),
            2
        );
    }
}
