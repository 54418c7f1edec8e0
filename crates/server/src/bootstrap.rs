use std::sync::Arc;

use pollbot_core::config::{AppConfig, ConfigError, LoadOptions};
use pollbot_core::PollEngine;
use pollbot_db::{connect_with_settings, migrations, DbPool, SqlPollStore};
use pollbot_mattermost::TokenPolicy;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: PollEngine,
    pub token_policy: TokenPolicy,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let token_policy = TokenPolicy::from_config(&config.mattermost);
    info!(
        event_name = "system.bootstrap.token_policy",
        correlation_id = "bootstrap",
        accepted_tokens = token_policy.len(),
        accepts_all = token_policy.is_empty(),
        "slash command token policy loaded"
    );

    let engine = PollEngine::new(Arc::new(SqlPollStore::new(db_pool.clone())));

    Ok(Application { config, db_pool, engine, token_policy })
}
