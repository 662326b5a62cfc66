pub mod memory;
pub mod pg;

use async_trait::async_trait;

use crate::error::SettlementError;
use crate::models::{
    Mission, OnboardingStatus, PayoutStatus, PendingPayout, PromoCode, ProviderAccount,
    RefundRecord,
};

/// Result of the atomic promo set-add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoUseOutcome {
    /// The user was appended to `used_by`.
    Added,
    /// The user was already present; nothing changed.
    AlreadyUsed,
    /// The code is at `max_uses` and the user was not among the redeemers.
    MaxUsesReached,
}

/// Durable-state boundary of the settlement engine.
///
/// Implementations must honor the atomicity contracts spelled out per
/// method: these are what make duplicate webhook delivery, double-click
/// checkout, and concurrent promo redemption safe. The engine itself never
/// retries; callers retry against these idempotent primitives.
#[async_trait]
pub trait Store: Send + Sync {
    // ---- provider accounts -------------------------------------------------

    async fn provider_account(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderAccount>, SettlementError>;

    async fn provider_by_connected_account(
        &self,
        connected_account_id: &str,
    ) -> Result<Option<ProviderAccount>, SettlementError>;

    async fn upsert_provider_account(
        &self,
        account: &ProviderAccount,
    ) -> Result<(), SettlementError>;

    /// Overwrite the reconciled gateway flags on a provider. Passing the
    /// connected account id links it when the local record does not have one
    /// yet. Re-applying the same values must be a no-op.
    async fn sync_provider_account(
        &self,
        provider_id: &str,
        connected_account_id: Option<&str>,
        onboarding_status: OnboardingStatus,
        charges_enabled: bool,
        payouts_enabled: bool,
    ) -> Result<(), SettlementError>;

    // ---- promo codes -------------------------------------------------------

    async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>, SettlementError>;

    async fn put_promo_code(&self, promo: &PromoCode) -> Result<(), SettlementError>;

    /// Atomic set-add of `user_id` to the code's `used_by`, enforcing
    /// `max_uses` in the same critical section. A read-modify-write is not
    /// an acceptable implementation: concurrent redeemers must serialize on
    /// the store's own conditional-update primitive.
    async fn add_promo_use(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<Option<PromoUseOutcome>, SettlementError>;

    // ---- pending payouts ---------------------------------------------------

    /// Write-if-absent for the whole batch, atomically: after this returns,
    /// every payout in `payouts` exists, and records that already existed
    /// are untouched. Returns how many records were newly created.
    async fn insert_pending_payouts(
        &self,
        payouts: &[PendingPayout],
    ) -> Result<usize, SettlementError>;

    async fn pending_payout(&self, id: &str) -> Result<Option<PendingPayout>, SettlementError>;

    async fn pending_payouts_for_charge(
        &self,
        charge_id: &str,
    ) -> Result<Vec<PendingPayout>, SettlementError>;

    async fn update_payout_status(
        &self,
        id: &str,
        status: PayoutStatus,
    ) -> Result<(), SettlementError>;

    // ---- missions ----------------------------------------------------------

    async fn mission(&self, mission_id: &str) -> Result<Option<Mission>, SettlementError>;

    async fn put_mission(&self, mission: &Mission) -> Result<(), SettlementError>;

    /// Mark the mission holding this payment intent as confirmed by the
    /// customer. Unknown intents and repeated delivery are no-ops.
    async fn mark_mission_chargeable(
        &self,
        payment_intent_id: &str,
    ) -> Result<(), SettlementError>;

    /// Record the gateway transfer on a mission. Idempotent: re-recording
    /// the same transfer leaves the mission unchanged.
    async fn record_mission_transfer(
        &self,
        mission_id: &str,
        transfer_id: &str,
    ) -> Result<(), SettlementError>;

    /// Terminal payout transition. A no-op when the mission is already
    /// paid out.
    async fn mark_mission_paid_out(
        &self,
        mission_id: &str,
        transfer_id: &str,
    ) -> Result<(), SettlementError>;

    /// Record a cancellation refund outcome, moving the mission to
    /// cancelled when it has not settled yet.
    async fn record_mission_refund(
        &self,
        mission_id: &str,
        refund: &RefundRecord,
    ) -> Result<(), SettlementError>;
}
