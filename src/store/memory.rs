//! In-memory store for development and testing
//!
//! In production the service runs against `PgStore`; the in-memory backend
//! keeps the same per-operation atomicity by doing every mutation inside a
//! single mutex critical section.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use async_trait::async_trait;

use super::{PromoUseOutcome, Store};
use crate::error::SettlementError;
use crate::models::{
    Mission, MissionStatus, OnboardingStatus, PayoutStatus, PendingPayout, PromoCode,
    ProviderAccount, RefundRecord,
};

#[derive(Default)]
struct Inner {
    providers: HashMap<String, ProviderAccount>,
    promos: HashMap<String, PromoCode>,
    missions: HashMap<String, Mission>,
    payouts: BTreeMap<String, PendingPayout>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn provider_account(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderAccount>, SettlementError> {
        Ok(self.inner.lock().await.providers.get(provider_id).cloned())
    }

    async fn provider_by_connected_account(
        &self,
        connected_account_id: &str,
    ) -> Result<Option<ProviderAccount>, SettlementError> {
        Ok(self
            .inner
            .lock()
            .await
            .providers
            .values()
            .find(|p| p.connected_account_id.as_deref() == Some(connected_account_id))
            .cloned())
    }

    async fn upsert_provider_account(
        &self,
        account: &ProviderAccount,
    ) -> Result<(), SettlementError> {
        self.inner
            .lock()
            .await
            .providers
            .insert(account.provider_id.clone(), account.clone());
        Ok(())
    }

    async fn sync_provider_account(
        &self,
        provider_id: &str,
        connected_account_id: Option<&str>,
        onboarding_status: OnboardingStatus,
        charges_enabled: bool,
        payouts_enabled: bool,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderAccount {
                provider_id: provider_id.to_string(),
                connected_account_id: None,
                onboarding_status: OnboardingStatus::Pending,
                charges_enabled: false,
                payouts_enabled: false,
            });

        if let Some(account_id) = connected_account_id {
            entry.connected_account_id = Some(account_id.to_string());
        }
        entry.onboarding_status = onboarding_status;
        entry.charges_enabled = charges_enabled;
        entry.payouts_enabled = payouts_enabled;
        Ok(())
    }

    async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>, SettlementError> {
        Ok(self.inner.lock().await.promos.get(code).cloned())
    }

    async fn put_promo_code(&self, promo: &PromoCode) -> Result<(), SettlementError> {
        self.inner
            .lock()
            .await
            .promos
            .insert(promo.code.clone(), promo.clone());
        Ok(())
    }

    async fn add_promo_use(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<Option<PromoUseOutcome>, SettlementError> {
        let mut inner = self.inner.lock().await;
        let Some(promo) = inner.promos.get_mut(code) else {
            return Ok(None);
        };

        if promo.used_by.iter().any(|u| u == user_id) {
            return Ok(Some(PromoUseOutcome::AlreadyUsed));
        }
        if let Some(max_uses) = promo.max_uses {
            if promo.used_by.len() as i64 >= max_uses as i64 {
                return Ok(Some(PromoUseOutcome::MaxUsesReached));
            }
        }

        promo.used_by.push(user_id.to_string());
        Ok(Some(PromoUseOutcome::Added))
    }

    async fn insert_pending_payouts(
        &self,
        payouts: &[PendingPayout],
    ) -> Result<usize, SettlementError> {
        let mut inner = self.inner.lock().await;
        let mut created = 0;
        for payout in payouts {
            if !inner.payouts.contains_key(&payout.id) {
                inner.payouts.insert(payout.id.clone(), payout.clone());
                created += 1;
            }
        }
        Ok(created)
    }

    async fn pending_payout(&self, id: &str) -> Result<Option<PendingPayout>, SettlementError> {
        Ok(self.inner.lock().await.payouts.get(id).cloned())
    }

    async fn pending_payouts_for_charge(
        &self,
        charge_id: &str,
    ) -> Result<Vec<PendingPayout>, SettlementError> {
        Ok(self
            .inner
            .lock()
            .await
            .payouts
            .values()
            .filter(|p| p.charge_id == charge_id)
            .cloned()
            .collect())
    }

    async fn update_payout_status(
        &self,
        id: &str,
        status: PayoutStatus,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().await;
        if let Some(payout) = inner.payouts.get_mut(id) {
            payout.status = status;
        }
        Ok(())
    }

    async fn mission(&self, mission_id: &str) -> Result<Option<Mission>, SettlementError> {
        Ok(self.inner.lock().await.missions.get(mission_id).cloned())
    }

    async fn put_mission(&self, mission: &Mission) -> Result<(), SettlementError> {
        self.inner
            .lock()
            .await
            .missions
            .insert(mission.id.clone(), mission.clone());
        Ok(())
    }

    async fn mark_mission_chargeable(
        &self,
        payment_intent_id: &str,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().await;
        for mission in inner.missions.values_mut() {
            if mission.payment_intent_id.as_deref() == Some(payment_intent_id)
                && mission.status == MissionStatus::Assigned
            {
                mission.status = MissionStatus::CompletedByCustomer;
            }
        }
        Ok(())
    }

    async fn record_mission_transfer(
        &self,
        mission_id: &str,
        transfer_id: &str,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().await;
        if let Some(mission) = inner.missions.get_mut(mission_id) {
            mission.transfer_id = Some(transfer_id.to_string());
            mission.transfer_status = Some("completed".to_string());
        }
        Ok(())
    }

    async fn mark_mission_paid_out(
        &self,
        mission_id: &str,
        transfer_id: &str,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().await;
        if let Some(mission) = inner.missions.get_mut(mission_id) {
            if mission.status != MissionStatus::PaidOut {
                mission.status = MissionStatus::PaidOut;
                mission.transfer_id = Some(transfer_id.to_string());
            }
        }
        Ok(())
    }

    async fn record_mission_refund(
        &self,
        mission_id: &str,
        refund: &RefundRecord,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().await;
        if let Some(mission) = inner.missions.get_mut(mission_id) {
            mission.cancellation_refund_type = Some(refund.refund_type);
            mission.refund = Some(refund.clone());
            if matches!(
                mission.status,
                MissionStatus::Pending | MissionStatus::Assigned
            ) {
                mission.status = MissionStatus::Cancelled;
            }
        }
        Ok(())
    }
}
