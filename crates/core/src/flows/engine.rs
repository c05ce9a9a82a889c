use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::intent::Intent;
use crate::flows::states::{
    FlowAction, FlowContext, FlowEvent, FlowType, PipelineStage, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> PipelineStage;
    fn transition(
        &self,
        current: &PipelineStage,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// router -> analytics | resolver | final; resolver -> executor | final;
/// executor -> analytics | final; analytics -> final.
#[derive(Clone, Debug, Default)]
pub struct ChatRequestFlow;

impl FlowDefinition for ChatRequestFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::ChatRequest
    }

    fn initial_state(&self) -> PipelineStage {
        PipelineStage::Router
    }

    fn transition(
        &self,
        current: &PipelineStage,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_chat_request(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> PipelineStage {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &PipelineStage,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PipelineStage,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        let record = match &result {
            Ok(outcome) => audit
                .event("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Success)
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("event", format!("{:?}", outcome.event)),
            Err(error) => audit
                .event("flow.transition_rejected", AuditCategory::Flow, AuditOutcome::Rejected)
                .with_metadata("from", current.as_str())
                .with_metadata("error", error.to_string()),
        };
        sink.emit(record);
        result
    }
}

impl Default for FlowEngine<ChatRequestFlow> {
    fn default() -> Self {
        Self::new(ChatRequestFlow)
    }
}

/// Upper bound on stage visits for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepBudget {
    limit: u32,
    taken: u32,
}

impl StepBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, taken: 0 }
    }

    pub fn taken(&self) -> u32 {
        self.taken
    }

    pub fn consume(&mut self) -> Result<(), FlowTransitionError> {
        if self.taken >= self.limit {
            return Err(FlowTransitionError::StepLimitExceeded { limit: self.limit });
        }
        self.taken += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: PipelineStage, missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PipelineStage, event: FlowEvent },
    #[error("stage limit of {limit} reached before the request finished")]
    StepLimitExceeded { limit: u32 },
}

fn transition_chat_request(
    current: &PipelineStage,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        AskForClarification, ExecuteOperation, PromptForMissingFields, QueryAnalytics,
        ReplyToGreeting, ReportError, ResolveEntities, SynthesizeResponse,
    };
    use FlowEvent::{Answered, Classified, Executed, Resolved};
    use PipelineStage::{Analytics, Executor, Final, Resolver, Router};

    let (to, actions) = match (current, event) {
        _ if context.has_error && !current.is_terminal() => {
            (Final, vec![ReportError, SynthesizeResponse])
        }
        (Router, Classified) => match context.intent {
            None | Some(Intent::Ambiguous) => (Final, vec![AskForClarification]),
            Some(Intent::Greeting) => (Final, vec![ReplyToGreeting]),
            Some(Intent::ReadAnalytics) => (Analytics, vec![QueryAnalytics]),
            Some(Intent::WriteOperation) | Some(Intent::Mixed) => {
                if !context.missing_fields.is_empty() {
                    (Final, vec![PromptForMissingFields])
                } else if context.has_payload {
                    (Resolver, vec![ResolveEntities])
                } else {
                    return Err(FlowTransitionError::MissingRequiredFields {
                        state: *current,
                        missing_fields: vec!["payload".to_owned()],
                    });
                }
            }
        },
        (Resolver, Resolved) => {
            if !context.missing_fields.is_empty() {
                (Final, vec![PromptForMissingFields])
            } else if context.has_operation {
                (Executor, vec![ExecuteOperation])
            } else {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: *current,
                    missing_fields: vec!["operation".to_owned()],
                });
            }
        }
        (Executor, Executed) => match context.intent {
            Some(Intent::Mixed) => (Analytics, vec![QueryAnalytics]),
            _ => (Final, vec![SynthesizeResponse]),
        },
        (Analytics, Answered) => (Final, vec![SynthesizeResponse]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
