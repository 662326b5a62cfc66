use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Common metadata type
pub type Metadata = HashMap<String, String>;

/// Charge (payment intent) as the gateway reports it. `balance_transaction`
/// is the settled transaction transfers draw funds from; it stays empty
/// until the charge has actually settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub client_secret: Option<String>,
    pub balance_transaction: Option<String>,
    pub destination_account: Option<String>,
    pub metadata: Option<Metadata>,
    pub created_at: Option<i64>,
}

impl Charge {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

/// Outbound fund movement to a connected account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    pub source_transaction: Option<String>,
    pub metadata: Option<Metadata>,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub charge_id: Option<String>,
    pub metadata: Option<Metadata>,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRequirements {
    #[serde(default)]
    pub currently_due: Vec<String>,
}

/// Connected account state as the gateway reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAccount {
    pub id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
    pub requirements: Option<AccountRequirements>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateChargeRequest {
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTransferRequest {
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRefundRequest {
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}
