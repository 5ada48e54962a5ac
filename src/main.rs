use splitly_api::auth::TokenKeys;
use splitly_api::config::{AppConfig, ConfigError};
use splitly_api::db::{self, GroupStore, MigrationError};
use splitly_api::{build_rocket, currency};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("could not open the database pool: {0}")]
    Database(#[from] sqlx::Error),
    #[error("CORS configuration failed: {0}")]
    Cors(String),
    #[error("server failed: {0}")]
    Launch(#[from] Box<rocket::Error>),
}

#[rocket::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,splitly_api=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    db::run_migrations(&config.database_url).await?;
    let pool = db::connect(&config).await?;
    tracing::info!(max_connections = config.max_connections, "database ready");

    let rates = currency::load_rates(&config).await;

    let rocket = build_rocket(
        GroupStore::new(pool),
        TokenKeys::from_secret(&config.jwt_secret),
        rates,
    )
    .map_err(|e| StartupError::Cors(e.to_string()))?;

    rocket.launch().await.map_err(Box::new)?;
    tracing::info!("server stopped");
    Ok(())
}
