//! Webhook-driven reconciliation and on-demand account sync.
//!
//! The gateway delivers notifications at least once and in no particular
//! order, so every mutation here is an idempotent overwrite: re-applying an
//! event leaves state exactly as it was. Both the push path (webhook) and
//! the pull path (`sync_account`) derive onboarding status through the same
//! precedence rule, so they cannot disagree about the same underlying
//! account state.

use serde::Deserialize;

use crate::error::SettlementError;
use crate::gateway::types::{GatewayAccount, Metadata};
use crate::gateway::{webhook, PaymentGateway};
use crate::models::{OnboardingStatus, ProviderAccount};
use crate::store::Store;

/// Envelope of a gateway notification.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TransferObject {
    id: String,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    id: String,
}

/// Onboarding status precedence shared by push and pull reconciliation:
/// outstanding requirements win, then the charges capability, then pending.
pub fn derive_onboarding_status(charges_enabled: bool, currently_due: &[String]) -> OnboardingStatus {
    if !currently_due.is_empty() {
        OnboardingStatus::Incomplete
    } else if charges_enabled {
        OnboardingStatus::Active
    } else {
        OnboardingStatus::Pending
    }
}

/// Verify and apply one raw webhook delivery.
///
/// Signature verification runs over the raw bytes before the payload is
/// even parsed; a bad signature mutates nothing regardless of how plausible
/// the body looks.
pub async fn handle_webhook(
    store: &dyn Store,
    raw_body: &[u8],
    signature: &str,
    webhook_secret: &str,
) -> Result<(), SettlementError> {
    let body = std::str::from_utf8(raw_body)
        .map_err(|_| SettlementError::Validation("webhook body is not valid UTF-8".to_string()))?;

    webhook::verify_webhook_signature(body, signature, webhook_secret, None)?;

    let event: WebhookEvent = serde_json::from_str(body).map_err(|e| {
        SettlementError::Validation(format!("webhook payload is not valid JSON: {e}"))
    })?;

    apply_event(store, event).await
}

/// Apply a verified event. Unknown event types are accepted and logged so
/// new gateway event types never bounce deliveries.
pub async fn apply_event(store: &dyn Store, event: WebhookEvent) -> Result<(), SettlementError> {
    let event_id = event.id.as_deref().unwrap_or("unknown");

    match event.event_type.as_str() {
        "account.updated" => {
            let object = event_object(event.data)?;
            let account: GatewayAccount = serde_json::from_value(object).map_err(|e| {
                SettlementError::Validation(format!("malformed account.updated payload: {e}"))
            })?;
            apply_account_updated(store, event_id, &account).await
        }
        "payment_intent.succeeded" | "charge.succeeded" => {
            let object = event_object(event.data)?;
            let charge: ChargeObject = serde_json::from_value(object).map_err(|e| {
                SettlementError::Validation(format!("malformed charge payload: {e}"))
            })?;
            store.mark_mission_chargeable(&charge.id).await?;
            tracing::info!(
                event_id = %event_id,
                charge_id = %charge.id,
                "charge settled; mission marked chargeable"
            );
            Ok(())
        }
        "transfer.created" => {
            let object = event_object(event.data)?;
            let transfer: TransferObject = serde_json::from_value(object).map_err(|e| {
                SettlementError::Validation(format!("malformed transfer payload: {e}"))
            })?;
            apply_transfer_created(store, event_id, &transfer).await
        }
        other => {
            tracing::info!(event_id = %event_id, event_type = %other, "ignoring unhandled gateway event");
            Ok(())
        }
    }
}

fn event_object(data: Option<EventData>) -> Result<serde_json::Value, SettlementError> {
    data.map(|d| d.object)
        .ok_or_else(|| SettlementError::Validation("webhook event has no data object".to_string()))
}

async fn apply_account_updated(
    store: &dyn Store,
    event_id: &str,
    account: &GatewayAccount,
) -> Result<(), SettlementError> {
    let provider_id = account
        .metadata
        .as_ref()
        .and_then(|m| m.get("provider_id"))
        .cloned();

    // Not every account on the gateway belongs to us.
    let Some(provider_id) = provider_id else {
        tracing::info!(
            event_id = %event_id,
            account_id = %account.id,
            "account event without provider metadata, skipping"
        );
        return Ok(());
    };

    let currently_due = account
        .requirements
        .as_ref()
        .map(|r| r.currently_due.as_slice())
        .unwrap_or(&[]);
    let status = derive_onboarding_status(account.charges_enabled, currently_due);

    store
        .sync_provider_account(
            &provider_id,
            Some(&account.id),
            status,
            account.charges_enabled,
            account.payouts_enabled,
        )
        .await?;

    tracing::info!(
        event_id = %event_id,
        provider_id = %provider_id,
        account_id = %account.id,
        onboarding_status = ?status,
        charges_enabled = account.charges_enabled,
        payouts_enabled = account.payouts_enabled,
        "reconciled provider account from webhook"
    );

    Ok(())
}

async fn apply_transfer_created(
    store: &dyn Store,
    event_id: &str,
    transfer: &TransferObject,
) -> Result<(), SettlementError> {
    let mission_id = transfer
        .metadata
        .as_ref()
        .and_then(|m| m.get("mission_id"))
        .cloned();

    let Some(mission_id) = mission_id else {
        tracing::info!(
            event_id = %event_id,
            transfer_id = %transfer.id,
            "transfer event without mission metadata, skipping"
        );
        return Ok(());
    };

    store
        .record_mission_transfer(&mission_id, &transfer.id)
        .await?;

    tracing::info!(
        event_id = %event_id,
        mission_id = %mission_id,
        transfer_id = %transfer.id,
        "recorded transfer on mission"
    );

    Ok(())
}

/// On-demand pull reconciliation of one provider's connected account.
pub async fn sync_account(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    account_id: Option<&str>,
    provider_id: Option<&str>,
) -> Result<ProviderAccount, SettlementError> {
    let (provider_id, account_id) = match (provider_id, account_id) {
        (Some(provider_id), account_id) => {
            let local = store.provider_account(provider_id).await?.ok_or_else(|| {
                SettlementError::NotFound(format!("provider {provider_id} not found"))
            })?;
            let account_id = account_id
                .map(str::to_string)
                .or(local.connected_account_id)
                .ok_or_else(|| {
                    SettlementError::NotFound(format!(
                        "provider {provider_id} has no connected account"
                    ))
                })?;
            (provider_id.to_string(), account_id)
        }
        (None, Some(account_id)) => {
            let local = store
                .provider_by_connected_account(account_id)
                .await?
                .ok_or_else(|| {
                    SettlementError::NotFound(format!(
                        "no provider holds connected account {account_id}"
                    ))
                })?;
            (local.provider_id, account_id.to_string())
        }
        (None, None) => {
            return Err(SettlementError::Validation(
                "account_id or provider_id is required".to_string(),
            ))
        }
    };

    let live = match gateway.retrieve_account(&account_id).await {
        Ok(account) => account,
        Err(err) if err.not_found() => {
            return Err(SettlementError::NotFound(format!(
                "connected account {account_id} does not exist at the gateway"
            )))
        }
        Err(err) => return Err(err.into()),
    };

    let currently_due = live
        .requirements
        .as_ref()
        .map(|r| r.currently_due.as_slice())
        .unwrap_or(&[]);
    let status = derive_onboarding_status(live.charges_enabled, currently_due);

    store
        .sync_provider_account(
            &provider_id,
            Some(&account_id),
            status,
            live.charges_enabled,
            live.payouts_enabled,
        )
        .await?;

    tracing::info!(
        provider_id = %provider_id,
        account_id = %account_id,
        onboarding_status = ?status,
        "synced provider account from gateway"
    );

    store
        .provider_account(&provider_id)
        .await?
        .ok_or_else(|| SettlementError::Store("provider vanished during sync".to_string()))
}
