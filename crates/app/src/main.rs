mod accounts;
mod companies;
mod identity;
mod jobs;
mod problem;
mod router;
mod telemetry;

use std::net::SocketAddr;

use chrono::Duration;
use tracing::info;

use jobtrack_auth::TokenService;
use jobtrack_storage::Database;
use jobtrack_util::{load_env_file, AppConfig};

const REFRESH_TTL_DAYS: i64 = 7;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let tokens = TokenService::new(
        config.jwt_secret.as_bytes(),
        Duration::seconds(config.access_ttl_secs as i64),
        Duration::days(REFRESH_TTL_DAYS),
    );
    let state = router::AppState::new(database, tokens, metrics);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
