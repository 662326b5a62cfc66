use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// DOMAIN RECORDS
// ============================================================================

/// One service line in a customer cart. Carts are ephemeral: they exist only
/// in the checkout request and are never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub service_id: String,
    pub service_name: String,
    /// Display-currency price, not minor units.
    pub price: Decimal,
    pub provider_id: Option<String>,
    /// Sub-service name to booked duration in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subservices: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_discount_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Discount code. `used_by` has set semantics and grows monotonically; it is
/// mutated only through the store's atomic set-add.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoCode {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase_amount: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub used_by: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_onboarding_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    Pending,
    Active,
    Incomplete,
}

/// Local mirror of a provider's connected gateway account. Written only by
/// the reconciliation subsystem; checkout reads it to resolve the
/// destination account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProviderAccount {
    pub provider_id: String,
    pub connected_account_id: Option<String>,
    pub onboarding_status: OnboardingStatus,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_mission_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Pending,
    Assigned,
    CompletedByCustomer,
    PaidOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_refund_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    NoRefund,
    Refunded,
}

/// Outcome of the cancellation refund engine, owned by its mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: Option<String>,
    pub refund_type: RefundType,
    pub refunded_amount: Decimal,
    pub status: RefundStatus,
}

/// A booking. paid_out and cancelled are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub status: MissionStatus,
    pub provider_id: String,
    pub price: Decimal,
    pub payment_intent_id: Option<String>,
    pub transfer_id: Option<String>,
    pub transfer_status: Option<String>,
    pub cancellation_refund_type: Option<RefundType>,
    pub refund: Option<RefundRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    PendingValidation,
    Transferred,
    Failed,
}

/// One payout obligation per (charge, provider) pair, keyed
/// `{charge_id}_{provider_id}` so retried fan-outs are no-ops.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingPayout {
    pub id: String,
    pub charge_id: String,
    pub provider_id: String,
    pub amount: Decimal,
    pub items: Vec<String>,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
}

impl PendingPayout {
    pub fn key(charge_id: &str, provider_id: &str) -> String {
        format!("{charge_id}_{provider_id}")
    }
}

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutIntentRequest {
    pub cart: Vec<CartItem>,
    pub customer_id: String,
    pub promo_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutIntentResponse {
    pub charge_reference: String,
    pub client_secret: Option<String>,
    pub connected_account_id: String,
    pub amount: Decimal,
    pub discount_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct FanoutRequest {
    pub cart: Vec<CartItem>,
    pub charge_reference: String,
}

#[derive(Debug, Serialize)]
pub struct FanoutResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub charge_reference: String,
    pub connected_account_id: String,
    pub mission_id: String,
    /// Advisory only. The executor recomputes the payout from the charge the
    /// gateway holds; a disagreeing value is logged and ignored.
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub transfer_reference: String,
    pub provider_amount: Decimal,
    pub commission: Decimal,
    pub platform_fee: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CancelRefundRequest {
    pub charge_reference: String,
    pub refund_type: RefundType,
    pub refund_percentage: Option<Decimal>,
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelRefundResponse {
    pub refund_reference: Option<String>,
    pub refunded_amount: Decimal,
    pub status: RefundStatus,
}

#[derive(Debug, Deserialize)]
pub struct AccountSyncRequest {
    pub account_id: Option<String>,
    pub provider_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountSyncResponse {
    pub onboarding_status: OnboardingStatus,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PromoValidateRequest {
    pub code: String,
    pub user_id: String,
    pub cart_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PromoValidateResponse {
    pub valid: bool,
    pub discount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PromoMarkUsedRequest {
    pub code: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct PromoMarkUsedResponse {
    pub ok: bool,
    pub already_used: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
