use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    ChatRequest,
}

/// Pipeline stages. `Router` is initial, `Final` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Router,
    Analytics,
    Resolver,
    Executor,
    Final,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Analytics => "analytics",
            Self::Resolver => "resolver",
            Self::Executor => "executor",
            Self::Final => "final",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final)
    }
}

/// Completion signal emitted by the stage that just ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    Classified,
    Resolved,
    Executed,
    Answered,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub intent: Option<Intent>,
    pub has_error: bool,
    pub missing_fields: Vec<String>,
    pub has_payload: bool,
    pub has_operation: bool,
    pub has_report: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ReplyToGreeting,
    AskForClarification,
    PromptForMissingFields,
    ResolveEntities,
    ExecuteOperation,
    QueryAnalytics,
    ReportError,
    SynthesizeResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PipelineStage,
    pub to: PipelineStage,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
