pub mod error;
pub mod mock;
pub mod types;
pub mod webhook;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use error::GatewayError;
use types::{
    Charge, CreateChargeRequest, CreateRefundRequest, CreateTransferRequest, GatewayAccount,
    Refund, Transfer,
};

/// Seam between the settlement engine and the hosted payment gateway.
///
/// The engine only ever needs these five operations; everything else the
/// gateway offers (onboarding links, dashboards, disputes) belongs to
/// collaborators outside this service.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge, GatewayError>;
    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;
    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<Transfer, GatewayError>;
    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, GatewayError>;
    async fn retrieve_account(&self, account_id: &str) -> Result<GatewayAccount, GatewayError>;
}

/// Configuration for the hosted gateway API client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub sandbox: bool,
    pub base_path: String,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GatewayError> {
        let secret_key = std::env::var("GATEWAY_SECRET_KEY")
            .map_err(|_| GatewayError::ConfigError("Missing GATEWAY_SECRET_KEY".to_string()))?;
        let webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET")
            .map_err(|_| GatewayError::ConfigError("Missing GATEWAY_WEBHOOK_SECRET".to_string()))?;

        let sandbox = std::env::var("GATEWAY_SANDBOX")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let base_path = match std::env::var("GATEWAY_BASE_PATH") {
            Ok(path) => path,
            Err(_) if sandbox => "https://sandbox-api.paygate.example.com".to_string(),
            Err(_) => "https://api.paygate.example.com".to_string(),
        };

        Ok(GatewayConfig {
            secret_key,
            webhook_secret,
            sandbox,
            base_path,
        })
    }
}

/// HTTP client for the hosted gateway
#[derive(Clone)]
pub struct GatewayClient {
    config: Arc<GatewayConfig>,
    http_client: Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        Ok(GatewayClient {
            config: Arc::new(config),
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.base_path, path);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.secret_key))
            .send()
            .await
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn post<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.base_path, path);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.secret_key))
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        Self::handle_response(response).await
    }

    /// Convert a gateway response into the expected type, or surface the
    /// gateway's error body verbatim.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::ParseError(e.to_string()))
        } else {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            Err(GatewayError::ApiError {
                status_code: status.as_u16(),
                message: error_body,
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge, GatewayError> {
        self.post("/v1/payment-intents", &request).await
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        self.get(&format!("/v1/payment-intents/{charge_id}")).await
    }

    async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<Transfer, GatewayError> {
        self.post("/v1/transfers", &request).await
    }

    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, GatewayError> {
        self.post("/v1/refunds", &request).await
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<GatewayAccount, GatewayError> {
        self.get(&format!("/v1/accounts/{account_id}")).await
    }
}
