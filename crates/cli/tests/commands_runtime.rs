use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use ledgerbot_agent::{LlmClient, ScriptedLlmClient};
use ledgerbot_cli::commands::{chat, config, migrate, seed, start};
use ledgerbot_core::config::{AppConfig, LoadOptions};
use serde_json::Value;

const MEMORY_DB: &[(&str, &str)] =
    &[("LEDGERBOT_DATABASE_URL", "sqlite::memory:"), ("LEDGERBOT_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn start_returns_success_with_default_provider() {
    with_env(MEMORY_DB, || {
        let result = start::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful start preflight: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn start_returns_config_failure_when_hosted_provider_lacks_key() {
    with_env(&[("LEDGERBOT_LLM_PROVIDER", "openai")], || {
        let result = start::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(MEMORY_DB, || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_lists_the_demo_catalog() {
    with_env(MEMORY_DB, || {
        let result = seed::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().expect("seed message");
        assert!(message.starts_with("demo catalog loaded with 4 products"), "{message}");
        assert!(
            message.contains(
                "BC-BRACELET-GOLD: Pulsera de Granos de Café - Dorada (opening stock 20)"
            ),
            "{message}"
        );
    });
}

#[test]
fn seed_reports_invalid_numeric_env_as_config_failure() {
    with_env(&[("LEDGERBOT_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = seed::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_marks_env_overrides_and_redacts_api_key() {
    with_env(
        &[
            ("LEDGERBOT_LLM_PROVIDER", "anthropic"),
            ("LEDGERBOT_LLM_API_KEY", "sk-ant-secret"),
            ("LEDGERBOT_SERVER_PORT", "9090"),
        ],
        || {
            let output = config::run(&LoadOptions::default());

            assert!(output.contains("- llm.api_key = <redacted> (source: env (LEDGERBOT_LLM_API_KEY))"));
            assert!(output.contains("- server.port = 9090 (source: env (LEDGERBOT_SERVER_PORT))"));
            assert!(output.contains("- session.max_messages = 10 (source: default)"));
            assert!(!output.contains("sk-ant-secret"));
        },
    );
}

#[test]
fn chat_answers_through_the_full_pipeline() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");

    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.database.max_connections = 1;
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::with_texts([
        r#"{"intent": "GREETING", "confidence": 0.98}"#,
    ]));

    let result = runtime.block_on(chat::run_with_client(&config, llm, "cli-test", "hola"));
    assert_eq!(result.exit_code, 0, "{}", result.output);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "chat");
    assert_eq!(payload["intent"], "GREETING");
    assert!(payload["reply"].as_str().is_some_and(|reply| reply.starts_with("Hola!")));
    assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "LEDGERBOT_DATABASE_URL",
        "LEDGERBOT_DATABASE_MAX_CONNECTIONS",
        "LEDGERBOT_DATABASE_TIMEOUT_SECS",
        "LEDGERBOT_LLM_PROVIDER",
        "LEDGERBOT_LLM_API_KEY",
        "LEDGERBOT_LLM_BASE_URL",
        "LEDGERBOT_LLM_MODEL",
        "LEDGERBOT_LLM_TIMEOUT_SECS",
        "LEDGERBOT_LLM_MAX_RETRIES",
        "LEDGERBOT_SERVER_BIND_ADDRESS",
        "LEDGERBOT_SERVER_PORT",
        "LEDGERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LEDGERBOT_SESSION_MAX_MESSAGES",
        "LEDGERBOT_LOGGING_LEVEL",
        "LEDGERBOT_LOGGING_FORMAT",
        "LEDGERBOT_LOG_LEVEL",
        "LEDGERBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
