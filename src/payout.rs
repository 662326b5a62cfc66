//! Payout execution: one transfer of the provider's share of a settled
//! charge to their connected account.
//!
//! The transfer amount is always recomputed from the charge the gateway
//! holds. A caller-supplied amount is treated as advisory and logged when it
//! disagrees; trusting it would let a tampered request over- or under-pay a
//! provider. The executor itself is not idempotent, so it state-gates on the
//! mission and pending-payout records before moving any money.

use rust_decimal::Decimal;

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::gateway::types::{CreateTransferRequest, Metadata, Transfer};
use crate::gateway::PaymentGateway;
use crate::models::{MissionStatus, PayoutStatus, PendingPayout};
use crate::settlement::{self, PayoutBreakdown};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct PayoutOutcome {
    pub transfer: Transfer,
    pub breakdown: PayoutBreakdown,
}

pub async fn execute_payout(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    config: &SettlementConfig,
    charge_id: &str,
    connected_account_id: &str,
    mission_id: &str,
    claimed_amount: Option<Decimal>,
) -> Result<PayoutOutcome, SettlementError> {
    if charge_id.trim().is_empty() || connected_account_id.trim().is_empty() {
        return Err(SettlementError::Validation(
            "charge_reference and connected_account_id are required".to_string(),
        ));
    }

    // At-most-once is the caller's responsibility; this is that check.
    if let Some(mission) = store.mission(mission_id).await? {
        if mission.status == MissionStatus::PaidOut {
            return Err(SettlementError::PreconditionFailed(format!(
                "mission {mission_id} has already been paid out"
            )));
        }
        if mission.status == MissionStatus::Cancelled {
            return Err(SettlementError::PreconditionFailed(format!(
                "mission {mission_id} was cancelled"
            )));
        }
    }

    let provider = store
        .provider_by_connected_account(connected_account_id)
        .await?;
    let payout_key = provider
        .as_ref()
        .map(|p| PendingPayout::key(charge_id, &p.provider_id));
    if let Some(key) = payout_key.as_deref() {
        if let Some(pending) = store.pending_payout(key).await? {
            if pending.status == PayoutStatus::Transferred {
                return Err(SettlementError::PreconditionFailed(format!(
                    "payout {key} has already been transferred"
                )));
            }
        }
    }

    // The gateway's view of the charge is authoritative for both the
    // precondition checks and the amount.
    let charge = match gateway.retrieve_charge(charge_id).await {
        Ok(charge) => charge,
        Err(err) if err.not_found() => {
            return Err(SettlementError::NotFound(format!(
                "charge {charge_id} not found"
            )))
        }
        Err(err) => return Err(err.into()),
    };

    if !charge.succeeded() {
        return Err(SettlementError::PreconditionFailed(format!(
            "charge {charge_id} is not in a transferable state (status {})",
            charge.status
        )));
    }

    let Some(source_transaction) = charge.balance_transaction.clone() else {
        return Err(SettlementError::PreconditionFailed(format!(
            "charge {charge_id} has no settled transaction to draw funds from"
        )));
    };

    let total_charged = settlement::from_minor_units(charge.amount);
    let breakdown = settlement::payout_breakdown(config, total_charged);

    if let Some(claimed) = claimed_amount {
        if claimed != total_charged {
            tracing::warn!(
                charge_id = %charge_id,
                claimed = %claimed,
                charged = %total_charged,
                "caller-supplied amount disagrees with the charge; using the charge"
            );
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("mission_id".to_string(), mission_id.to_string());
    metadata.insert("charge_id".to_string(), charge_id.to_string());
    metadata.insert(
        "provider_amount".to_string(),
        breakdown.provider_amount.to_string(),
    );
    metadata.insert("commission".to_string(), breakdown.commission.to_string());
    metadata.insert(
        "platform_fee".to_string(),
        breakdown.platform_fee.to_string(),
    );

    let transfer = gateway
        .create_transfer(CreateTransferRequest {
            amount: settlement::to_minor_units(breakdown.provider_amount)?,
            currency: config.currency.clone(),
            destination: connected_account_id.to_string(),
            source_transaction: Some(source_transaction),
            metadata: Some(metadata),
        })
        .await?;

    if let Some(key) = payout_key.as_deref() {
        store
            .update_payout_status(key, PayoutStatus::Transferred)
            .await?;
    }
    store.mark_mission_paid_out(mission_id, &transfer.id).await?;

    tracing::info!(
        mission_id = %mission_id,
        charge_id = %charge_id,
        transfer_id = %transfer.id,
        provider_amount = %breakdown.provider_amount,
        commission = %breakdown.commission,
        platform_fee = %breakdown.platform_fee,
        "executed provider payout"
    );

    Ok(PayoutOutcome {
        transfer,
        breakdown,
    })
}
