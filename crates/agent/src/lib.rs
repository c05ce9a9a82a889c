//! Conversational pipeline for the ledger assistant.
//!
//! A message goes through a constrained loop driven by the flow graph in
//! `ledgerbot-core`:
//! 1. **Classification** (`router`) - one language-service call yields the
//!    intent, operation kind, confidence and raw entities
//! 2. **Resolution** (`resolver`) - product references become catalog ids
//! 3. **Execution** (`executor`) - one atomic ledger write
//! 4. **Analytics** (`analytics`) - read-only answers, also after a mixed write
//! 5. **Synthesis** (`synthesizer`) - the user-facing reply
//!
//! `AgentRuntime` (see `runtime`) owns the loop, the session store and the
//! audit sink.
//!
//! # Safety Principle
//!
//! The language service is strictly a translator. It never decides stock,
//! totals or which product a generic reference means; those are
//! deterministic decisions made against the ledger.

pub mod analytics;
pub mod executor;
pub mod llm;
pub mod resolver;
pub mod router;
pub mod runtime;
pub mod session;
pub mod synthesizer;

pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient, ScriptedReply};
pub use runtime::{AgentRuntime, PipelineReply, TracingAuditSink};
pub use session::SessionStore;
