use std::sync::Arc;

use ledgerbot_agent::{AgentRuntime, HttpLlmClient, LlmClient};
use ledgerbot_core::config::{AppConfig, ConfigError, LoadOptions};
use ledgerbot_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("language service client could not be built: {0}")]
    LlmClient(String),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let llm: Arc<dyn LlmClient> = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::LlmClient(format!("{error:#}")))?,
    );
    bootstrap_with_client(config, llm).await
}

/// Bootstrap against an already-built language-service client.
pub async fn bootstrap_with_client(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let agent = Arc::new(AgentRuntime::from_config(&config, db_pool.clone(), llm));
    info!(
        event_name = "system.bootstrap.agent_ready",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "conversation pipeline ready"
    );

    Ok(Application { config, db_pool, agent })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ledgerbot_agent::ScriptedLlmClient;
    use ledgerbot_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::{bootstrap, bootstrap_with_client};

    #[tokio::test]
    async fn bootstrap_fails_fast_when_hosted_provider_has_no_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::Anthropic),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing api key must fail").to_string();
        assert!(message.contains("llm.api_key"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_ledger_schema() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;

        let app = bootstrap_with_client(config, Arc::new(ScriptedLlmClient::default()))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('products', 'stock_movements', 'sales', 'sale_items', 'expenses')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 5);
        assert!(app.agent.sessions().is_empty().await);

        app.db_pool.close().await;
    }
}
