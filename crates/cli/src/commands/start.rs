use ledgerbot_agent::HttpLlmClient;
use ledgerbot_core::config::LoadOptions;
use ledgerbot_db::{connect_with_settings, migrations};

use crate::commands::{
    async_runtime, load_config, CommandResult, EXIT_DATABASE, EXIT_MIGRATION, EXIT_RUNTIME,
};

/// Preflight for the long-running service: everything `ledgerbot-server`
/// needs before it binds.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("start", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    if let Err(error) = HttpLlmClient::from_config(&config.llm) {
        return CommandResult::failure(
            "start",
            "llm_client",
            format!("language service client could not be built: {error}"),
            EXIT_RUNTIME,
        );
    }

    let runtime = match async_runtime("start") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "preflight passed: database `{}`, llm {:?}/{}, listening target {}:{}",
                config.database.url,
                config.llm.provider,
                config.llm.model,
                config.server.bind_address,
                config.server.port
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
