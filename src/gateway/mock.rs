use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use async_trait::async_trait;

use super::error::GatewayError;
use super::types::{
    Charge, CreateChargeRequest, CreateRefundRequest, CreateTransferRequest, GatewayAccount,
    Refund, Transfer,
};
use super::PaymentGateway;

/// Mock payment gateway for development and testing
///
/// In production this is replaced by `GatewayClient` talking to the hosted
/// gateway. The mock keeps an in-memory ledger so tests can assert on the
/// charges, transfers, and refunds the engine issued.
///
/// Destination accounts whose id starts with `acct_fail` simulate a charge
/// the gateway declines.
#[derive(Default)]
pub struct MockGateway {
    charges: Mutex<HashMap<String, Charge>>,
    transfers: Mutex<Vec<Transfer>>,
    refunds: Mutex<Vec<Refund>>,
    accounts: Mutex<HashMap<String, GatewayAccount>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a charge as the gateway would report it, e.g. an already
    /// settled one for payout tests.
    pub async fn seed_charge(&self, charge: Charge) {
        self.charges.lock().await.insert(charge.id.clone(), charge);
    }

    pub async fn seed_account(&self, account: GatewayAccount) {
        self.accounts.lock().await.insert(account.id.clone(), account);
    }

    /// Flip a charge to `succeeded` with a settled transaction, as the
    /// gateway does once the customer confirms and funds clear.
    pub async fn settle_charge(&self, charge_id: &str) {
        if let Some(charge) = self.charges.lock().await.get_mut(charge_id) {
            charge.status = "succeeded".to_string();
            charge.balance_transaction = Some(format!("txn_{}", Uuid::new_v4().simple()));
        }
    }

    pub async fn charge(&self, charge_id: &str) -> Option<Charge> {
        self.charges.lock().await.get(charge_id).cloned()
    }

    pub async fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().await.clone()
    }

    pub async fn refunds(&self) -> Vec<Refund> {
        self.refunds.lock().await.clone()
    }

    async fn refunded_total(&self, charge_id: &str) -> i64 {
        self.refunds
            .lock()
            .await
            .iter()
            .filter(|r| r.charge_id.as_deref() == Some(charge_id))
            .map(|r| r.amount)
            .sum()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge, GatewayError> {
        if request
            .destination_account
            .as_deref()
            .is_some_and(|acct| acct.starts_with("acct_fail"))
        {
            return Err(GatewayError::ApiError {
                status_code: 402,
                message: "The payment was declined by the card network".to_string(),
            });
        }

        let id = format!("pi_{}", Uuid::new_v4().simple());
        let charge = Charge {
            client_secret: Some(format!("{id}_secret_{}", Uuid::new_v4().simple())),
            id: id.clone(),
            amount: request.amount,
            currency: request.currency,
            status: "requires_action".to_string(),
            balance_transaction: None,
            destination_account: request.destination_account,
            metadata: request.metadata,
            created_at: None,
        };

        self.charges.lock().await.insert(id, charge.clone());
        Ok(charge)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        self.charges
            .lock()
            .await
            .get(charge_id)
            .cloned()
            .ok_or_else(|| GatewayError::ApiError {
                status_code: 404,
                message: format!("No such payment intent: {charge_id}"),
            })
    }

    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<Transfer, GatewayError> {
        let transfer = Transfer {
            id: format!("tr_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency,
            destination: request.destination,
            source_transaction: request.source_transaction,
            metadata: request.metadata,
            created_at: None,
        };

        self.transfers.lock().await.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, GatewayError> {
        let charge = self.retrieve_charge(&request.payment_intent_id).await?;

        let already_refunded = self.refunded_total(&charge.id).await;
        if already_refunded + request.amount > charge.amount {
            return Err(GatewayError::ApiError {
                status_code: 400,
                message: format!(
                    "Refund amount would exceed the amount remaining on charge {}",
                    charge.id
                ),
            });
        }

        let refund = Refund {
            id: format!("re_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency,
            status: "succeeded".to_string(),
            charge_id: Some(charge.id),
            metadata: request.metadata,
            created_at: None,
        };

        self.refunds.lock().await.push(refund.clone());
        Ok(refund)
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<GatewayAccount, GatewayError> {
        self.accounts
            .lock()
            .await
            .get(account_id)
            .cloned()
            .ok_or_else(|| GatewayError::ApiError {
                status_code: 404,
                message: format!("No such account: {account_id}"),
            })
    }
}
