use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::error::SettlementError;

/// Rates and floors used by all settlement arithmetic.
///
/// Passed explicitly into the calculator so environments and tests can
/// override rates without touching globals.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Fraction the platform adds on top of the provider subtotal, e.g. 0.10.
    pub platform_fee_rate: Decimal,
    /// Fraction of the subtotal withheld from the provider, e.g. 0.075.
    pub commission_rate: Decimal,
    /// Smallest amount the gateway will charge, in display currency.
    pub minimum_charge: Decimal,
    pub currency: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(10, 2),
            commission_rate: Decimal::new(75, 3),
            minimum_charge: Decimal::new(50, 2),
            currency: "eur".to_string(),
        }
    }
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, SettlementError> {
        let defaults = Self::default();
        Ok(Self {
            platform_fee_rate: decimal_var("PLATFORM_FEE_RATE", defaults.platform_fee_rate)?,
            commission_rate: decimal_var("COMMISSION_RATE", defaults.commission_rate)?,
            minimum_charge: decimal_var("MINIMUM_CHARGE", defaults.minimum_charge)?,
            currency: env::var("SETTLEMENT_CURRENCY").unwrap_or(defaults.currency),
        })
    }
}

fn decimal_var(name: &str, default: Decimal) -> Result<Decimal, SettlementError> {
    match env::var(name) {
        Ok(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| SettlementError::Validation(format!("invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Process-level configuration for the HTTP binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `memory` or `postgres`.
    pub store_backend: String,
    /// `mock` or `live`.
    pub gateway_backend: String,
    pub webhook_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, SettlementError> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8090".to_string())
            .parse::<u16>()
            .map_err(|e| SettlementError::Validation(format!("invalid PORT: {e}")))?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            store_backend: env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string()),
            gateway_backend: env::var("GATEWAY_BACKEND").unwrap_or_else(|_| "mock".to_string()),
            webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_dev_secret".to_string()),
        })
    }
}
