use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use ledgerbot_agent::{AgentRuntime, PipelineReply};
use ledgerbot_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

const MAX_MESSAGE_CHARS: usize = 2_000;

#[derive(Clone)]
pub struct ChatState {
    agent: Arc<AgentRuntime>,
}

impl ChatState {
    pub fn new(agent: Arc<AgentRuntime>) -> Self {
        Self { agent }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: &'static str,
    pub correlation_id: String,
}

pub fn router(agent: Arc<AgentRuntime>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(ChatState::new(agent))
}

/// Every message reaches the pipeline; only malformed envelopes are refused.
pub async fn chat(
    State(state): State<ChatState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<PipelineReply>, (StatusCode, Json<ChatError>)> {
    let conversation_id = body.conversation_id.trim();
    let message = body.message.trim();

    if let Some(problem) = envelope_problem(conversation_id, message) {
        let error = ApplicationError::MalformedRequest(problem.to_string())
            .into_interface(Uuid::new_v4().to_string());
        warn!(
            event_name = "system.chat.rejected",
            correlation_id = error.correlation_id(),
            reason = problem,
            "chat request rejected"
        );
        return Err(reject(&error));
    }

    Ok(Json(state.agent.handle_message(conversation_id, message).await))
}

fn envelope_problem(conversation_id: &str, message: &str) -> Option<&'static str> {
    if conversation_id.is_empty() {
        Some("conversation_id is required")
    } else if message.is_empty() {
        Some("message is required")
    } else if message.chars().count() > MAX_MESSAGE_CHARS {
        Some("message is too long")
    } else {
        None
    }
}

fn reject(error: &InterfaceError) -> (StatusCode, Json<ChatError>) {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ChatError {
            error: error.user_message(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use ledgerbot_agent::{AgentRuntime, ScriptedLlmClient};
    use ledgerbot_core::config::AppConfig;
    use ledgerbot_core::domain::intent::{Intent, OperationKind};
    use ledgerbot_db::{connect_with_settings, migrations, DemoSeed};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{chat, router, ChatRequest, ChatState};

    async fn agent_with(replies: &[Value]) -> Arc<AgentRuntime> {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");
        let llm = ScriptedLlmClient::with_texts(replies.iter().map(Value::to_string));
        Arc::new(AgentRuntime::from_config(&AppConfig::default(), pool, Arc::new(llm)))
    }

    #[tokio::test]
    async fn chat_returns_the_pipeline_reply() {
        let agent = agent_with(&[json!({
            "intent": "WRITE_OPERATION",
            "operation_type": "REGISTER_SALE",
            "confidence": 0.95,
            "normalized_entities": {"product_ref": "llavero", "quantity": 2}
        })])
        .await;

        let Json(reply) = chat(
            State(ChatState::new(agent.clone())),
            Json(ChatRequest {
                conversation_id: "web-1".to_string(),
                message: "vendí 2 llaveros".to_string(),
            }),
        )
        .await
        .expect("chat should succeed");

        assert_eq!(reply.intent, Intent::WriteOperation);
        assert_eq!(reply.operation, OperationKind::RegisterSale);
        assert!(reply.reply.contains("Venta registrada"), "{}", reply.reply);
        assert_eq!(agent.sessions().history("web-1").await.len(), 2);
    }

    #[tokio::test]
    async fn blank_message_is_a_bad_request() {
        let agent = agent_with(&[]).await;

        let result = chat(
            State(ChatState::new(agent)),
            Json(ChatRequest { conversation_id: "web-1".to_string(), message: "   ".to_string() }),
        )
        .await;

        let (status, Json(error)) = result.expect_err("blank message must be rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "No pude procesar el pedido. Revisá los datos e intentá de nuevo.");
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn router_serves_json_over_http() {
        let agent = agent_with(&[json!({"intent": "GREETING", "confidence": 0.99})]).await;

        let response = router(agent)
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"conversation_id": "web-2", "message": "hola"}).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(payload["intent"], "GREETING");
        assert_eq!(payload["operation"], "UNKNOWN");
        assert!(payload["reply"].as_str().is_some_and(|reply| reply.starts_with("Hola!")));
    }
}
