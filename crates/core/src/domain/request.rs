use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::intent::{Intent, OperationKind};
use crate::domain::ledger::{LedgerOperation, OperationReport};
use crate::domain::payload::WritePayload;
use crate::flows::FlowContext;

/// Per-request pipeline state. Owned by a single orchestrator run and dropped
/// once the reply is emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestState {
    pub conversation_id: String,
    pub correlation_id: String,
    pub user_text: String,
    /// Recent conversation rendered for the classifier, if any.
    pub context: Option<String>,
    pub intent: Option<Intent>,
    pub operation_kind: OperationKind,
    pub confidence: f64,
    pub missing_fields: Vec<String>,
    pub entities: Map<String, Value>,
    pub rationale: Option<String>,
    pub payload: Option<WritePayload>,
    pub operation: Option<LedgerOperation>,
    pub report: Option<OperationReport>,
    pub analytics: Option<String>,
    pub clarification: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
}

impl RequestState {
    pub fn new(
        conversation_id: impl Into<String>,
        correlation_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            correlation_id: correlation_id.into(),
            user_text: user_text.into(),
            context: None,
            intent: None,
            operation_kind: OperationKind::Unknown,
            confidence: 0.0,
            missing_fields: Vec::new(),
            entities: Map::new(),
            rationale: None,
            payload: None,
            operation: None,
            report: None,
            analytics: None,
            clarification: None,
            response: None,
            error: None,
        }
    }

    /// Text sent to the classifier: the rendered context when present,
    /// otherwise the bare message.
    pub fn classifier_input(&self) -> &str {
        self.context.as_deref().unwrap_or(&self.user_text)
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Snapshot of the fields the stage graph branches on.
    pub fn flow_context(&self) -> FlowContext {
        FlowContext {
            intent: self.intent,
            has_error: self.error.is_some(),
            missing_fields: self.missing_fields.clone(),
            has_payload: self.payload.is_some(),
            has_operation: self.operation.is_some(),
            has_report: self.report.is_some(),
        }
    }
}
