pub mod checkout;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod models;
pub mod payout;
pub mod promo;
pub mod reconcile;
pub mod refund;
pub mod routes;
pub mod settlement;
pub mod store;

pub use config::{AppConfig, SettlementConfig};
pub use error::SettlementError;
pub use routes::{settlement_router, AppState};
