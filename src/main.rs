use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use settlements_rs::gateway::mock::MockGateway;
use settlements_rs::gateway::{GatewayClient, PaymentGateway};
use settlements_rs::store::memory::MemoryStore;
use settlements_rs::store::pg::PgStore;
use settlements_rs::store::Store;
use settlements_rs::{settlement_router, AppConfig, AppState, SettlementConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let app_config = AppConfig::from_env()?;
    let settlement = SettlementConfig::from_env()?;

    let store: Arc<dyn Store> = match app_config.store_backend.to_lowercase().as_str() {
        "postgres" => {
            let database_url = std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set for the postgres store"))?;
            let store = PgStore::connect(&database_url).await?;
            tracing::info!("connected to Postgres store, migrations applied");
            Arc::new(store)
        }
        _ => {
            tracing::info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match app_config.gateway_backend.to_lowercase().as_str()
    {
        "live" => {
            let client = GatewayClient::from_env()?;
            tracing::info!(base_path = %client.config().base_path, "using hosted payment gateway");
            Arc::new(client)
        }
        _ => {
            tracing::info!("using mock payment gateway");
            Arc::new(MockGateway::new())
        }
    };

    let state = AppState {
        store,
        gateway,
        settlement,
        webhook_secret: app_config.webhook_secret.clone(),
    };

    let origins: [HeaderValue; 2] = [
        "http://localhost:5173".parse()?,
        "http://localhost:3000".parse()?,
    ];
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let app = settlement_router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", app_config.host, app_config.port).parse()?;
    tracing::info!("settlement service listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
