use std::sync::Arc;

use ledgerbot_agent::{AgentRuntime, HttpLlmClient, LlmClient, PipelineReply};
use ledgerbot_core::config::{AppConfig, LoadOptions};
use ledgerbot_db::{connect_with_settings, migrations};
use serde::Serialize;

use crate::commands::{
    async_runtime, load_config, CommandResult, EXIT_DATABASE, EXIT_MIGRATION, EXIT_RUNTIME,
};

#[derive(Debug, Serialize)]
struct ChatOutcome<'a> {
    command: &'static str,
    status: &'static str,
    reply: &'a str,
    intent: &'static str,
    operation: &'static str,
    confidence: f64,
    correlation_id: &'a str,
}

pub fn run(options: &LoadOptions, conversation_id: &str, message: &str) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let llm: Arc<dyn LlmClient> = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "llm_client",
                format!("language service client could not be built: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(run_with_client(&config, llm, conversation_id, message))
}

/// Runs one message against the configured database with the given
/// language-service client.
pub async fn run_with_client(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    conversation_id: &str,
    message: &str,
) -> CommandResult {
    let pool = match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => pool,
        Err(error) => {
            return CommandResult::failure("chat", "db_connectivity", error.to_string(), EXIT_DATABASE)
        }
    };
    if let Err(error) = migrations::run_pending(&pool).await {
        return CommandResult::failure("chat", "migration", error.to_string(), EXIT_MIGRATION);
    }

    let agent = AgentRuntime::from_config(config, pool.clone(), llm);
    let reply = agent.handle_message(conversation_id, message).await;
    pool.close().await;

    render(&reply)
}

fn render(reply: &PipelineReply) -> CommandResult {
    let outcome = ChatOutcome {
        command: "chat",
        status: "ok",
        reply: &reply.reply,
        intent: reply.intent.as_str(),
        operation: reply.operation.as_str(),
        confidence: reply.confidence,
        correlation_id: &reply.correlation_id,
    };
    match serde_json::to_string(&outcome) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("chat", "serialization", error.to_string(), EXIT_RUNTIME),
    }
}
