//! Cancellation refunds against the original charge.
//!
//! The refund policy decision (full, partial plus fraction, or none) is made
//! by a collaborator before this engine runs; here it is only priced and
//! executed. Gateway rejections travel back to the caller verbatim so an
//! operator sees exactly what the ledger said.

use rust_decimal::Decimal;

use crate::error::SettlementError;
use crate::gateway::types::{CreateRefundRequest, Metadata};
use crate::gateway::PaymentGateway;
use crate::models::{RefundRecord, RefundStatus, RefundType};
use crate::settlement;
use crate::store::Store;

pub async fn cancel_refund(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    charge_id: &str,
    refund_type: RefundType,
    refund_percentage: Option<Decimal>,
    order_id: Option<&str>,
) -> Result<RefundRecord, SettlementError> {
    if charge_id.trim().is_empty() {
        return Err(SettlementError::Validation(
            "charge_reference is required".to_string(),
        ));
    }

    // No refund owed: report the outcome without contacting the gateway.
    if refund_type == RefundType::None
        || (refund_type == RefundType::Partial && refund_percentage == Some(Decimal::ZERO))
    {
        let record = RefundRecord {
            refund_id: None,
            refund_type: RefundType::None,
            refunded_amount: Decimal::ZERO,
            status: RefundStatus::NoRefund,
        };
        if let Some(order_id) = order_id {
            store.record_mission_refund(order_id, &record).await?;
        }
        tracing::info!(charge_id = %charge_id, "cancellation owes no refund");
        return Ok(record);
    }

    let charge = match gateway.retrieve_charge(charge_id).await {
        Ok(charge) => charge,
        Err(err) if err.not_found() => {
            return Err(SettlementError::NotFound(format!(
                "charge {charge_id} not found"
            )))
        }
        Err(err) => return Err(err.into()),
    };

    let original_amount = settlement::from_minor_units(charge.amount);
    let amount = settlement::refund_amount(original_amount, refund_type, refund_percentage)?;

    let mut metadata = Metadata::new();
    metadata.insert("refund_type".to_string(), refund_type_label(refund_type));
    if let Some(order_id) = order_id {
        metadata.insert("order_id".to_string(), order_id.to_string());
    }

    let refund = gateway
        .create_refund(CreateRefundRequest {
            payment_intent_id: charge_id.to_string(),
            amount: settlement::to_minor_units(amount)?,
            currency: charge.currency.clone(),
            reason: Some("requested_by_customer".to_string()),
            metadata: Some(metadata),
        })
        .await?;

    let record = RefundRecord {
        refund_id: Some(refund.id.clone()),
        refund_type,
        refunded_amount: amount,
        status: RefundStatus::Refunded,
    };

    if let Some(order_id) = order_id {
        store.record_mission_refund(order_id, &record).await?;
    }

    tracing::info!(
        charge_id = %charge_id,
        refund_id = %refund.id,
        refunded_amount = %amount,
        refund_type = ?refund_type,
        "issued cancellation refund"
    );

    Ok(record)
}

fn refund_type_label(refund_type: RefundType) -> String {
    match refund_type {
        RefundType::Full => "full",
        RefundType::Partial => "partial",
        RefundType::None => "none",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::gateway::types::Charge;
    use crate::models::{Mission, MissionStatus};
    use crate::store::memory::MemoryStore;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal literal")
    }

    fn charge(id: &str, amount: i64) -> Charge {
        Charge {
            id: id.to_string(),
            amount,
            currency: "eur".to_string(),
            status: "succeeded".to_string(),
            client_secret: None,
            balance_transaction: Some("txn_1".to_string()),
            destination_account: None,
            metadata: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn none_policy_short_circuits_without_gateway_contact() {
        let store = MemoryStore::new();
        // No charge seeded: any gateway lookup would fail loudly.
        let gateway = MockGateway::new();

        let record = cancel_refund(&store, &gateway, "pi_1", RefundType::None, None, None)
            .await
            .unwrap();

        assert_eq!(record.status, RefundStatus::NoRefund);
        assert_eq!(record.refunded_amount, Decimal::ZERO);
        assert!(record.refund_id.is_none());
        assert!(gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn zero_fraction_partial_short_circuits_too() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();

        let record = cancel_refund(
            &store,
            &gateway,
            "pi_1",
            RefundType::Partial,
            Some(Decimal::ZERO),
            None,
        )
        .await
        .unwrap();

        assert_eq!(record.status, RefundStatus::NoRefund);
        assert!(gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn half_refund_of_2000_is_1000_and_recorded_on_the_mission() {
        let store = MemoryStore::new();
        store
            .put_mission(&Mission {
                id: "order-1".to_string(),
                status: MissionStatus::Assigned,
                provider_id: "prov_a".to_string(),
                price: dec("2000"),
                payment_intent_id: Some("pi_1".to_string()),
                transfer_id: None,
                transfer_status: None,
                cancellation_refund_type: None,
                refund: None,
            })
            .await
            .unwrap();
        let gateway = MockGateway::new();
        gateway.seed_charge(charge("pi_1", 200_000)).await;

        let record = cancel_refund(
            &store,
            &gateway,
            "pi_1",
            RefundType::Partial,
            Some(dec("0.5")),
            Some("order-1"),
        )
        .await
        .unwrap();

        assert_eq!(record.refunded_amount, dec("1000.00"));
        assert_eq!(record.status, RefundStatus::Refunded);

        let refunds = gateway.refunds().await;
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 100_000);
        let metadata = refunds[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.get("order_id").map(String::as_str), Some("order-1"));
        assert_eq!(metadata.get("refund_type").map(String::as_str), Some("partial"));

        let mission = store.mission("order-1").await.unwrap().unwrap();
        assert_eq!(mission.status, MissionStatus::Cancelled);
        assert_eq!(mission.cancellation_refund_type, Some(RefundType::Partial));
        let refund = mission.refund.unwrap();
        assert_eq!(refund.refunded_amount, dec("1000.00"));
    }

    #[tokio::test]
    async fn degenerate_partial_fraction_is_a_validation_error() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        gateway.seed_charge(charge("pi_1", 200_000)).await;

        let err = cancel_refund(
            &store,
            &gateway,
            "pi_1",
            RefundType::Partial,
            Some(dec("1.0")),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SettlementError::Validation(_)));
        assert!(gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn gateway_rejection_is_surfaced_verbatim() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();
        gateway.seed_charge(charge("pi_1", 200_000)).await;

        // Drain the charge first so the next refund is over the remainder.
        cancel_refund(&store, &gateway, "pi_1", RefundType::Full, None, None)
            .await
            .unwrap();

        let err = cancel_refund(&store, &gateway, "pi_1", RefundType::Full, None, None)
            .await
            .unwrap_err();

        match err {
            SettlementError::Gateway { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("exceed the amount remaining"));
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refund_against_unknown_charge_is_not_found() {
        let store = MemoryStore::new();
        let gateway = MockGateway::new();

        let err = cancel_refund(&store, &gateway, "pi_ghost", RefundType::Full, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, SettlementError::NotFound(_)));
    }
}
