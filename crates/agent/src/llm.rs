//! Language-service clients.
//!
//! The pipeline treats the language service as an opaque text-in/text-out
//! capability. `HttpLlmClient` talks to OpenAI-compatible, Anthropic and Ollama
//! endpoints; `ScriptedLlmClient` replays canned replies in tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ledgerbot_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Runs one completion under a hard deadline. An elapsed deadline is an error
/// like any other upstream failure.
pub async fn complete_within(
    client: &dyn LlmClient,
    timeout: Duration,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    match tokio::time::timeout(timeout, client.complete(system_prompt, user_prompt)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("language service did not answer within {}s", timeout.as_secs_f64())),
    }
}

/// The JSON object inside a reply that may wrap it in prose or code fences.
pub fn json_object_slice(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

#[derive(Clone)]
pub struct HttpLlmClient {
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client for the language service")?;

        Ok(Self {
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    async fn call_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAi => self.call_openai(system_prompt, user_prompt).await,
            LlmProvider::Anthropic => self.call_anthropic(system_prompt, user_prompt).await,
            LlmProvider::Ollama => self.call_ollama(system_prompt, user_prompt).await,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("language service api key is not configured"))
    }

    async fn call_openai(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&serde_json::json!({
                "model": &self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt}
                ],
                "temperature": 0.0,
                "response_format": {"type": "json_object"}
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {status}: {body}"));
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("OpenAI returned no choices"))
    }

    async fn call_anthropic(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": 1024,
                "system": format!("{system_prompt}\n\nRespond with valid JSON only."),
                "messages": [{"role": "user", "content": user_prompt}]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {status}: {body}"));
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| anyhow!("Empty response from Anthropic"))
    }

    async fn call_ollama(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&serde_json::json!({
                "model": &self.model,
                "stream": false,
                "format": "json",
                "options": {"temperature": 0.0},
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt}
                ]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {status}: {body}"));
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            message: Message,
        }

        let api_response: ApiResponse = response.json().await?;
        Ok(api_response.message.content)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.call_once(system_prompt, user_prompt).await {
                Ok(reply) => return Ok(reply),
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        model = %self.model,
                        attempt,
                        error = %error,
                        "language service call failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedReply {
    Text(String),
    Failure(String),
    /// Never answers; exercises caller deadlines.
    Stall,
}

/// Deterministic stand-in for the language service. Replies are consumed in
/// order; every prompt received is recorded.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()), prompts: Mutex::default() }
    }

    pub fn with_texts<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| ScriptedReply::Text(reply.into())))
    }

    pub fn push(&self, reply: ScriptedReply) {
        match self.replies.lock() {
            Ok(mut replies) => replies.push_back(reply),
            Err(poisoned) => poisoned.into_inner().push_back(reply),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.replies.lock() {
            Ok(replies) => replies.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(user_prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(user_prompt.to_string()),
        }

        match self.next_reply() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => Err(anyhow!(message)),
            Some(ScriptedReply::Stall) => {
                std::future::pending::<()>().await;
                Err(anyhow!("stalled reply resumed"))
            }
            None => Err(anyhow!("no scripted reply left")),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ledgerbot_core::config::{LlmConfig, LlmProvider};

    use super::{
        complete_within, json_object_slice, HttpLlmClient, LlmClient, ScriptedLlmClient,
        ScriptedReply,
    };

    #[test]
    fn json_slice_ignores_fences_and_prose() {
        assert_eq!(json_object_slice("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(json_object_slice("Claro: {\"a\": {\"b\": 2}} listo"), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(json_object_slice("sin json"), None);
        assert_eq!(json_object_slice("} al revés {"), None);
    }

    #[tokio::test]
    async fn scripted_client_replays_in_order_and_records_prompts() {
        let client = ScriptedLlmClient::new([
            ScriptedReply::Text("{\"intent\":\"GREETING\"}".to_string()),
            ScriptedReply::Failure("upstream 503".to_string()),
        ]);

        assert_eq!(client.complete("sys", "hola").await.expect("first"), "{\"intent\":\"GREETING\"}");
        let error = client.complete("sys", "otra vez").await.expect_err("second fails");
        assert!(error.to_string().contains("503"));
        assert!(client.complete("sys", "nada").await.is_err());
        assert_eq!(client.prompts(), vec!["hola", "otra vez", "nada"]);
        assert_eq!(client.remaining(), 0);
    }

    #[tokio::test]
    async fn deadline_turns_a_stalled_call_into_an_error() {
        let client = ScriptedLlmClient::new([ScriptedReply::Stall]);

        let error = complete_within(&client, Duration::from_millis(20), "sys", "hola")
            .await
            .expect_err("stalled call times out");
        assert!(error.to_string().contains("did not answer"));
    }

    #[test]
    fn http_client_defaults_base_url_per_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Anthropic,
            api_key: None,
            base_url: None,
            model: "claude-test".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        };

        let client = HttpLlmClient::from_config(&config).expect("client builds");
        assert_eq!(client.base_url, "https://api.anthropic.com");
        assert_eq!(client.model_name(), "claude-test");
        assert!(client.api_key().is_err());
    }
}
