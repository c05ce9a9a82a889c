pub mod engine;
pub mod states;

pub use engine::{ChatRequestFlow, FlowDefinition, FlowEngine, FlowTransitionError, StepBudget};
pub use states::{
    FlowAction, FlowContext, FlowEvent, FlowType, PipelineStage, TransitionOutcome,
};
