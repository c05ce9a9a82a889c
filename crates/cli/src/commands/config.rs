use std::env;
use std::fs;
use std::path::Path;

use ledgerbot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

/// One effective setting: dotted key, rendered value, overriding env var.
struct Setting {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }
    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let setting = |key, value: String, env_key| Setting { key, value, env_key };
    vec![
        setting("database.url", config.database.url.clone(), "LEDGERBOT_DATABASE_URL"),
        setting(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "LEDGERBOT_DATABASE_MAX_CONNECTIONS",
        ),
        setting(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "LEDGERBOT_DATABASE_TIMEOUT_SECS",
        ),
        setting("llm.provider", format!("{:?}", config.llm.provider), "LEDGERBOT_LLM_PROVIDER"),
        setting("llm.model", config.llm.model.clone(), "LEDGERBOT_LLM_MODEL"),
        setting(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "LEDGERBOT_LLM_BASE_URL",
        ),
        setting("llm.api_key", redact_secret(config.llm.api_key.is_some()), "LEDGERBOT_LLM_API_KEY"),
        setting("llm.timeout_secs", config.llm.timeout_secs.to_string(), "LEDGERBOT_LLM_TIMEOUT_SECS"),
        setting("llm.max_retries", config.llm.max_retries.to_string(), "LEDGERBOT_LLM_MAX_RETRIES"),
        setting("server.bind_address", config.server.bind_address.clone(), "LEDGERBOT_SERVER_BIND_ADDRESS"),
        setting("server.port", config.server.port.to_string(), "LEDGERBOT_SERVER_PORT"),
        setting(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "LEDGERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        setting(
            "pipeline.confidence_threshold",
            config.pipeline.confidence_threshold.to_string(),
            "LEDGERBOT_PIPELINE_CONFIDENCE_THRESHOLD",
        ),
        setting(
            "pipeline.resolution_high_confidence",
            config.pipeline.resolution_high_confidence.to_string(),
            "LEDGERBOT_PIPELINE_RESOLUTION_HIGH_CONFIDENCE",
        ),
        setting(
            "pipeline.ambiguity_margin",
            config.pipeline.ambiguity_margin.to_string(),
            "LEDGERBOT_PIPELINE_AMBIGUITY_MARGIN",
        ),
        setting("pipeline.step_limit", config.pipeline.step_limit.to_string(), "LEDGERBOT_PIPELINE_STEP_LIMIT"),
        setting("session.max_messages", config.session.max_messages.to_string(), "LEDGERBOT_SESSION_MAX_MESSAGES"),
        setting(
            "session.context_messages",
            config.session.context_messages.to_string(),
            "LEDGERBOT_SESSION_CONTEXT_MESSAGES",
        ),
        setting("session.ttl_secs", config.session.ttl_secs.to_string(), "LEDGERBOT_SESSION_TTL_SECS"),
        setting(
            "session.max_conversations",
            config.session.max_conversations.to_string(),
            "LEDGERBOT_SESSION_MAX_CONVERSATIONS",
        ),
        setting("business.currency", config.business.currency.clone(), "LEDGERBOT_BUSINESS_CURRENCY"),
        setting("business.sku_prefix", config.business.sku_prefix.clone(), "LEDGERBOT_BUSINESS_SKU_PREFIX"),
        setting("logging.level", config.logging.level.clone(), "LEDGERBOT_LOGGING_LEVEL"),
        setting("logging.format", format!("{:?}", config.logging.format), "LEDGERBOT_LOGGING_FORMAT"),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(present: bool) -> String {
    if present { "<redacted>" } else { "<unset>" }.to_string()
}
