use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "ledgerbot.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
    pub business: BusinessConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    /// Upper bound for one language-service call, retries included.
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Classifications below this confidence become ambiguous.
    pub confidence_threshold: f64,
    /// A single candidate at or above this score resolves without escalation.
    pub resolution_high_confidence: f64,
    /// Candidates closer than this to the best score count as ties.
    pub ambiguity_margin: f64,
    pub step_limit: u32,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub max_messages: usize,
    pub context_messages: usize,
    pub ttl_secs: u64,
    pub max_conversations: usize,
}

#[derive(Clone, Debug)]
pub struct BusinessConfig {
    pub currency: String,
    pub sku_prefix: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://ledgerbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            pipeline: PipelineConfig {
                confidence_threshold: 0.6,
                resolution_high_confidence: 0.9,
                ambiguity_margin: 0.1,
                step_limit: 50,
            },
            session: SessionConfig {
                max_messages: 10,
                context_messages: 5,
                ttl_secs: 2 * 60 * 60,
                max_conversations: 1000,
            },
            business: BusinessConfig { currency: "USD".to_string(), sku_prefix: "BC".to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(threshold) = pipeline.confidence_threshold {
                self.pipeline.confidence_threshold = threshold;
            }
            if let Some(high) = pipeline.resolution_high_confidence {
                self.pipeline.resolution_high_confidence = high;
            }
            if let Some(margin) = pipeline.ambiguity_margin {
                self.pipeline.ambiguity_margin = margin;
            }
            if let Some(step_limit) = pipeline.step_limit {
                self.pipeline.step_limit = step_limit;
            }
        }

        if let Some(session) = patch.session {
            if let Some(max_messages) = session.max_messages {
                self.session.max_messages = max_messages;
            }
            if let Some(context_messages) = session.context_messages {
                self.session.context_messages = context_messages;
            }
            if let Some(ttl_secs) = session.ttl_secs {
                self.session.ttl_secs = ttl_secs;
            }
            if let Some(max_conversations) = session.max_conversations {
                self.session.max_conversations = max_conversations;
            }
        }

        if let Some(business) = patch.business {
            if let Some(currency) = business.currency {
                self.business.currency = currency;
            }
            if let Some(sku_prefix) = business.sku_prefix {
                self.business.sku_prefix = sku_prefix;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEDGERBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEDGERBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEDGERBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEDGERBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEDGERBOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("LEDGERBOT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEDGERBOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LEDGERBOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEDGERBOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LEDGERBOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("LEDGERBOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("LEDGERBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEDGERBOT_SERVER_PORT") {
            self.server.port = parse_u16("LEDGERBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEDGERBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LEDGERBOT_PIPELINE_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold =
                parse_f64("LEDGERBOT_PIPELINE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_PIPELINE_RESOLUTION_HIGH_CONFIDENCE") {
            self.pipeline.resolution_high_confidence =
                parse_f64("LEDGERBOT_PIPELINE_RESOLUTION_HIGH_CONFIDENCE", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_PIPELINE_AMBIGUITY_MARGIN") {
            self.pipeline.ambiguity_margin =
                parse_f64("LEDGERBOT_PIPELINE_AMBIGUITY_MARGIN", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_PIPELINE_STEP_LIMIT") {
            self.pipeline.step_limit = parse_u32("LEDGERBOT_PIPELINE_STEP_LIMIT", &value)?;
        }

        if let Some(value) = read_env("LEDGERBOT_SESSION_MAX_MESSAGES") {
            self.session.max_messages = parse_usize("LEDGERBOT_SESSION_MAX_MESSAGES", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_SESSION_CONTEXT_MESSAGES") {
            self.session.context_messages =
                parse_usize("LEDGERBOT_SESSION_CONTEXT_MESSAGES", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_u64("LEDGERBOT_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("LEDGERBOT_SESSION_MAX_CONVERSATIONS") {
            self.session.max_conversations =
                parse_usize("LEDGERBOT_SESSION_MAX_CONVERSATIONS", &value)?;
        }

        if let Some(value) = read_env("LEDGERBOT_BUSINESS_CURRENCY") {
            self.business.currency = value;
        }
        if let Some(value) = read_env("LEDGERBOT_BUSINESS_SKU_PREFIX") {
            self.business.sku_prefix = value;
        }

        let log_level =
            read_env("LEDGERBOT_LOGGING_LEVEL").or_else(|| read_env("LEDGERBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEDGERBOT_LOGGING_FORMAT").or_else(|| read_env("LEDGERBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_pipeline(&self.pipeline)?;
        validate_session(&self.session)?;
        validate_business(&self.business)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers (set LEDGERBOT_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.bind_address must not be empty".to_string(),
        ));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    let unit_interval = |value: f64| value > 0.0 && value <= 1.0;
    if !unit_interval(pipeline.confidence_threshold) {
        return Err(ConfigError::Validation(
            "pipeline.confidence_threshold must be in range (0, 1]".to_string(),
        ));
    }
    if !unit_interval(pipeline.resolution_high_confidence) {
        return Err(ConfigError::Validation(
            "pipeline.resolution_high_confidence must be in range (0, 1]".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&pipeline.ambiguity_margin) {
        return Err(ConfigError::Validation(
            "pipeline.ambiguity_margin must be in range [0, 1)".to_string(),
        ));
    }
    // router, resolver, executor and analytics can all run for a mixed request.
    if pipeline.step_limit < 4 {
        return Err(ConfigError::Validation(
            "pipeline.step_limit must be at least 4 so mixed requests can finish".to_string(),
        ));
    }
    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.max_messages == 0 {
        return Err(ConfigError::Validation(
            "session.max_messages must be greater than zero".to_string(),
        ));
    }
    if session.context_messages == 0 || session.context_messages > session.max_messages {
        return Err(ConfigError::Validation(
            "session.context_messages must be in range 1..=session.max_messages".to_string(),
        ));
    }
    if session.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "session.ttl_secs must be greater than zero".to_string(),
        ));
    }
    if session.max_conversations == 0 {
        return Err(ConfigError::Validation(
            "session.max_conversations must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_business(business: &BusinessConfig) -> Result<(), ConfigError> {
    let currency = business.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::Validation(
            "business.currency must be a three-letter uppercase ISO code such as `USD`"
                .to_string(),
        ));
    }

    let prefix = business.sku_prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ConfigError::Validation(
            "business.sku_prefix must be non-empty uppercase letters or digits".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    pipeline: Option<PipelinePatch>,
    session: Option<SessionPatch>,
    business: Option<BusinessPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    confidence_threshold: Option<f64>,
    resolution_high_confidence: Option<f64>,
    ambiguity_margin: Option<f64>,
    step_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    max_messages: Option<usize>,
    context_messages: Option<usize>,
    ttl_secs: Option<u64>,
    max_conversations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessPatch {
    currency: Option<String>,
    sku_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
