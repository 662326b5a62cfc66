//! Postgres-backed store. Every contract the trait promises maps to a
//! single SQL statement (or one transaction for the fan-out batch), so the
//! database is what serializes concurrent invocations.

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use async_trait::async_trait;

use super::{PromoUseOutcome, Store};
use crate::error::SettlementError;
use crate::models::{
    Mission, MissionStatus, OnboardingStatus, PayoutStatus, PendingPayout, PromoCode,
    ProviderAccount, RefundRecord, RefundStatus, RefundType,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, SettlementError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./db/migrations")
            .run(&pool)
            .await
            .map_err(|e| SettlementError::Store(e.to_string()))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Flat row shape for missions; the refund sub-record is flattened into
/// nullable columns and folded back on read.
#[derive(sqlx::FromRow)]
struct MissionRow {
    id: String,
    status: MissionStatus,
    provider_id: String,
    price: Decimal,
    payment_intent_id: Option<String>,
    transfer_id: Option<String>,
    transfer_status: Option<String>,
    cancellation_refund_type: Option<RefundType>,
    refund_id: Option<String>,
    refunded_amount: Option<Decimal>,
    refund_status: Option<RefundStatus>,
}

impl From<MissionRow> for Mission {
    fn from(row: MissionRow) -> Self {
        let refund = row.refund_status.map(|status| RefundRecord {
            refund_id: row.refund_id.clone(),
            refund_type: row.cancellation_refund_type.unwrap_or(RefundType::None),
            refunded_amount: row.refunded_amount.unwrap_or(Decimal::ZERO),
            status,
        });
        Mission {
            id: row.id,
            status: row.status,
            provider_id: row.provider_id,
            price: row.price,
            payment_intent_id: row.payment_intent_id,
            transfer_id: row.transfer_id,
            transfer_status: row.transfer_status,
            cancellation_refund_type: row.cancellation_refund_type,
            refund,
        }
    }
}

const MISSION_COLUMNS: &str = "id, status, provider_id, price, payment_intent_id, transfer_id, \
     transfer_status, cancellation_refund_type, refund_id, refunded_amount, refund_status";

#[async_trait]
impl Store for PgStore {
    async fn provider_account(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderAccount>, SettlementError> {
        let account = sqlx::query_as::<_, ProviderAccount>(
            r#"
            SELECT provider_id, connected_account_id, onboarding_status,
                   charges_enabled, payouts_enabled
            FROM provider_accounts
            WHERE provider_id = $1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn provider_by_connected_account(
        &self,
        connected_account_id: &str,
    ) -> Result<Option<ProviderAccount>, SettlementError> {
        let account = sqlx::query_as::<_, ProviderAccount>(
            r#"
            SELECT provider_id, connected_account_id, onboarding_status,
                   charges_enabled, payouts_enabled
            FROM provider_accounts
            WHERE connected_account_id = $1
            "#,
        )
        .bind(connected_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn upsert_provider_account(
        &self,
        account: &ProviderAccount,
    ) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            INSERT INTO provider_accounts
                (provider_id, connected_account_id, onboarding_status,
                 charges_enabled, payouts_enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (provider_id) DO UPDATE SET
                connected_account_id = EXCLUDED.connected_account_id,
                onboarding_status = EXCLUDED.onboarding_status,
                charges_enabled = EXCLUDED.charges_enabled,
                payouts_enabled = EXCLUDED.payouts_enabled,
                updated_at = NOW()
            "#,
        )
        .bind(&account.provider_id)
        .bind(&account.connected_account_id)
        .bind(account.onboarding_status)
        .bind(account.charges_enabled)
        .bind(account.payouts_enabled)
        .execute(&self.pool)
        .await?;

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
        sqlx::query(
            r#"
            INSERT INTO provider_accounts
                (provider_id, connected_account_id, onboarding_status,
                 charges_enabled, payouts_enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (provider_id) DO UPDATE SET
                connected_account_id =
                    COALESCE(EXCLUDED.connected_account_id, provider_accounts.connected_account_id),
                onboarding_status = EXCLUDED.onboarding_status,
                charges_enabled = EXCLUDED.charges_enabled,
                payouts_enabled = EXCLUDED.payouts_enabled,
                updated_at = NOW()
            "#,
        )
        .bind(provider_id)
        .bind(connected_account_id)
        .bind(onboarding_status)
        .bind(charges_enabled)
        .bind(payouts_enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>, SettlementError> {
        let promo = sqlx::query_as::<_, PromoCode>(
            r#"
            SELECT code, discount_type, discount_value, is_active, expires_at,
                   min_purchase_amount, max_uses, used_by
            FROM promo_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(promo)
    }

    async fn put_promo_code(&self, promo: &PromoCode) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            INSERT INTO promo_codes
                (code, discount_type, discount_value, is_active, expires_at,
                 min_purchase_amount, max_uses, used_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (code) DO UPDATE SET
                discount_type = EXCLUDED.discount_type,
                discount_value = EXCLUDED.discount_value,
                is_active = EXCLUDED.is_active,
                expires_at = EXCLUDED.expires_at,
                min_purchase_amount = EXCLUDED.min_purchase_amount,
                max_uses = EXCLUDED.max_uses,
                used_by = EXCLUDED.used_by
            "#,
        )
        .bind(&promo.code)
        .bind(promo.discount_type)
        .bind(promo.discount_value)
        .bind(promo.is_active)
        .bind(promo.expires_at)
        .bind(promo.min_purchase_amount)
        .bind(promo.max_uses)
        .bind(&promo.used_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_promo_use(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<Option<PromoUseOutcome>, SettlementError> {
        // Single conditional statement: the append, the duplicate check, and
        // the max-uses cap all race inside the row lock, so two concurrent
        // redeemers can never both win the last slot.
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET used_by = array_append(used_by, $2)
            WHERE code = $1
              AND NOT ($2 = ANY(used_by))
              AND (max_uses IS NULL OR cardinality(used_by) < max_uses)
            "#,
        )
        .bind(code)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Some(PromoUseOutcome::Added));
        }

        // Nothing changed; classify why.
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT ($2 = ANY(used_by)) FROM promo_codes WHERE code = $1")
                .bind(code)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(already_used,)| {
            if already_used {
                PromoUseOutcome::AlreadyUsed
            } else {
                PromoUseOutcome::MaxUsesReached
            }
        }))
    }

    async fn insert_pending_payouts(
        &self,
        payouts: &[PendingPayout],
    ) -> Result<usize, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0usize;

        for payout in payouts {
            let result = sqlx::query(
                r#"
                INSERT INTO pending_payouts
                    (id, charge_id, provider_id, amount, items, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&payout.id)
            .bind(&payout.charge_id)
            .bind(&payout.provider_id)
            .bind(payout.amount)
            .bind(&payout.items)
            .bind(payout.status)
            .bind(payout.created_at)
            .execute(&mut *tx)
            .await?;

            created += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn pending_payout(&self, id: &str) -> Result<Option<PendingPayout>, SettlementError> {
        let payout = sqlx::query_as::<_, PendingPayout>(
            r#"
            SELECT id, charge_id, provider_id, amount, items, status, created_at
            FROM pending_payouts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn pending_payouts_for_charge(
        &self,
        charge_id: &str,
    ) -> Result<Vec<PendingPayout>, SettlementError> {
        let payouts = sqlx::query_as::<_, PendingPayout>(
            r#"
            SELECT id, charge_id, provider_id, amount, items, status, created_at
            FROM pending_payouts
            WHERE charge_id = $1
            ORDER BY id
            "#,
        )
        .bind(charge_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    async fn update_payout_status(
        &self,
        id: &str,
        status: PayoutStatus,
    ) -> Result<(), SettlementError> {
        sqlx::query("UPDATE pending_payouts SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mission(&self, mission_id: &str) -> Result<Option<Mission>, SettlementError> {
        let row = sqlx::query_as::<_, MissionRow>(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions WHERE id = $1"
        ))
        .bind(mission_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Mission::from))
    }

    async fn put_mission(&self, mission: &Mission) -> Result<(), SettlementError> {
        let refund = mission.refund.as_ref();
        sqlx::query(
            r#"
            INSERT INTO missions
                (id, status, provider_id, price, payment_intent_id, transfer_id,
                 transfer_status, cancellation_refund_type, refund_id,
                 refunded_amount, refund_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                provider_id = EXCLUDED.provider_id,
                price = EXCLUDED.price,
                payment_intent_id = EXCLUDED.payment_intent_id,
                transfer_id = EXCLUDED.transfer_id,
                transfer_status = EXCLUDED.transfer_status,
                cancellation_refund_type = EXCLUDED.cancellation_refund_type,
                refund_id = EXCLUDED.refund_id,
                refunded_amount = EXCLUDED.refunded_amount,
                refund_status = EXCLUDED.refund_status,
                updated_at = NOW()
            "#,
        )
        .bind(&mission.id)
        .bind(mission.status)
        .bind(&mission.provider_id)
        .bind(mission.price)
        .bind(&mission.payment_intent_id)
        .bind(&mission.transfer_id)
        .bind(&mission.transfer_status)
        .bind(mission.cancellation_refund_type)
        .bind(refund.and_then(|r| r.refund_id.clone()))
        .bind(refund.map(|r| r.refunded_amount))
        .bind(refund.map(|r| r.status))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_mission_chargeable(
        &self,
        payment_intent_id: &str,
    ) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            UPDATE missions
            SET status = 'completed_by_customer', updated_at = NOW()
            WHERE payment_intent_id = $1
              AND status = 'assigned'
            "#,
        )
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_mission_transfer(
        &self,
        mission_id: &str,
        transfer_id: &str,
    ) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            UPDATE missions
            SET transfer_id = $2, transfer_status = 'completed', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(mission_id)
        .bind(transfer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_mission_paid_out(
        &self,
        mission_id: &str,
        transfer_id: &str,
    ) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            UPDATE missions
            SET status = 'paid_out', transfer_id = $2, updated_at = NOW()
            WHERE id = $1
              AND status != 'paid_out'
            "#,
        )
        .bind(mission_id)
        .bind(transfer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_mission_refund(
        &self,
        mission_id: &str,
        refund: &RefundRecord,
    ) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            UPDATE missions
            SET cancellation_refund_type = $2,
                refund_id = $3,
                refunded_amount = $4,
                refund_status = $5,
                status = CASE
                    WHEN status IN ('pending', 'assigned') THEN 'cancelled'::settlement_mission_status
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(mission_id)
        .bind(refund.refund_type)
        .bind(&refund.refund_id)
        .bind(refund.refunded_amount)
        .bind(refund.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
