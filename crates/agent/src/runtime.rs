use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use ledgerbot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use ledgerbot_core::config::AppConfig;
use ledgerbot_core::domain::intent::{Intent, OperationKind};
use ledgerbot_core::domain::payload::{PayloadError, WritePayload};
use ledgerbot_core::domain::request::RequestState;
use ledgerbot_core::errors::{ApplicationError, DomainError};
use ledgerbot_core::flows::{ChatRequestFlow, FlowEngine, FlowEvent, PipelineStage, StepBudget};
use ledgerbot_db::{AnalyticsQueries, DbPool, LedgerStore, SqlCatalogRepository};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::analytics::AnalyticsResponder;
use crate::executor::OperationExecutor;
use crate::llm::LlmClient;
use crate::resolver::{ConfidencePolicy, EntityResolver, LlmDisambiguator};
use crate::router::IntentRouter;
use crate::session::{SessionLimits, SessionStore};
use crate::synthesizer::{field_label, ResponseSynthesizer, AMBIGUOUS_REPLY};

const ACTOR: &str = "pipeline";

/// What the transport boundary gets back for one message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineReply {
    pub reply: String,
    pub intent: Intent,
    pub operation: OperationKind,
    pub confidence: f64,
    pub correlation_id: String,
}

/// Forwards audit events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            conversation_id = %event.conversation_id,
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

/// Drives one request through router, resolver, executor and analytics as
/// the flow graph dictates, then synthesizes the reply.
pub struct AgentRuntime {
    router: IntentRouter,
    resolver: EntityResolver,
    executor: OperationExecutor,
    analytics: AnalyticsResponder,
    synthesizer: ResponseSynthesizer,
    sessions: Arc<SessionStore>,
    flow: FlowEngine<ChatRequestFlow>,
    audit: Arc<dyn AuditSink>,
    step_limit: u32,
}

impl AgentRuntime {
    pub fn from_config(config: &AppConfig, pool: DbPool, llm: Arc<dyn LlmClient>) -> Self {
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        let store = Arc::new(LedgerStore::new(pool.clone(), config.business.currency.clone()));
        let resolver = EntityResolver::new(
            Arc::new(SqlCatalogRepository::new(pool.clone())),
            Arc::new(LlmDisambiguator::new(llm.clone(), timeout)),
            ConfidencePolicy::from_config(&config.pipeline),
            config.business.currency.clone(),
            config.business.sku_prefix.clone(),
        );

        Self {
            router: IntentRouter::new(llm, config.pipeline.confidence_threshold, timeout),
            resolver,
            executor: OperationExecutor::new(store),
            analytics: AnalyticsResponder::new(AnalyticsQueries::new(pool)),
            synthesizer: ResponseSynthesizer,
            sessions: Arc::new(SessionStore::new(SessionLimits::from_config(&config.session))),
            flow: FlowEngine::default(),
            audit: Arc::new(TracingAuditSink),
            step_limit: config.pipeline.step_limit,
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn handle_message(&self, conversation_id: &str, text: &str) -> PipelineReply {
        self.handle_message_on(conversation_id, text, Local::now().date_naive()).await
    }

    /// Same as [`Self::handle_message`] with an explicit "today" for relative
    /// dates.
    pub async fn handle_message_on(
        &self,
        conversation_id: &str,
        text: &str,
        today: NaiveDate,
    ) -> PipelineReply {
        let correlation_id = Uuid::new_v4().to_string();
        let mut state = RequestState::new(conversation_id, correlation_id.clone(), text);
        state.context = self.sessions.render_context(conversation_id, text).await;

        self.run(&mut state, today).await;

        let reply = self.synthesizer.compose(&state);
        state.response = Some(reply.clone());
        self.sessions.record_exchange(conversation_id, text, &reply).await;

        let intent = state.intent.unwrap_or(Intent::Ambiguous);
        info!(
            event_name = "pipeline.completed",
            correlation_id = %correlation_id,
            conversation_id,
            intent = intent.as_str(),
            operation = state.operation_kind.as_str(),
            confidence = state.confidence,
            failed = state.error.is_some(),
            "request finished"
        );

        PipelineReply {
            reply,
            intent,
            operation: state.operation_kind,
            confidence: state.confidence,
            correlation_id,
        }
    }

    async fn run(&self, state: &mut RequestState, today: NaiveDate) {
        let audit = AuditContext::new(
            state.conversation_id.clone(),
            state.correlation_id.clone(),
            ACTOR,
        );
        let mut budget = StepBudget::new(self.step_limit);
        let mut stage = self.flow.initial_state();

        while !stage.is_terminal() {
            if let Err(limit) = budget.consume() {
                self.internal_failure(state, DomainError::from(limit).into());
                return;
            }

            let event = match stage {
                PipelineStage::Router => {
                    self.route(state, &audit).await;
                    FlowEvent::Classified
                }
                PipelineStage::Resolver => {
                    self.resolve(state, &audit, today).await;
                    FlowEvent::Resolved
                }
                PipelineStage::Executor => {
                    self.execute(state, &audit).await;
                    FlowEvent::Executed
                }
                PipelineStage::Analytics => {
                    self.answer(state, today).await;
                    FlowEvent::Answered
                }
                PipelineStage::Final => return,
            };

            match self.flow.apply_with_audit(
                &stage,
                &event,
                &state.flow_context(),
                self.audit.as_ref(),
                &audit,
            ) {
                Ok(outcome) => stage = outcome.to,
                Err(rejected) => {
                    self.internal_failure(state, DomainError::from(rejected).into());
                    return;
                }
            }
        }
    }

    async fn route(&self, state: &mut RequestState, audit: &AuditContext) {
        let classification = self.router.classify(state.classifier_input()).await;
        state.intent = Some(classification.intent);
        state.operation_kind = classification.operation_kind;
        state.confidence = classification.confidence;
        state.entities = classification.entities;
        state.rationale = classification.rationale;
        state.clarification = classification.clarification;

        let outcome = if classification.intent.is_write() {
            self.validate_payload(state)
        } else {
            AuditOutcome::Success
        };

        self.audit.emit(
            audit
                .event("classification.completed", AuditCategory::Classification, outcome)
                .with_metadata("intent", state.intent.unwrap_or(Intent::Ambiguous).as_str())
                .with_metadata("operation", state.operation_kind.as_str())
                .with_metadata("confidence", format!("{:.2}", state.confidence)),
        );
    }

    /// Required fields come from typed validation, not from the classifier's
    /// own missing_fields list.
    fn validate_payload(&self, state: &mut RequestState) -> AuditOutcome {
        match WritePayload::from_entities(state.operation_kind, &state.entities) {
            Ok(payload) => {
                state.payload = Some(payload);
                AuditOutcome::Success
            }
            Err(PayloadError::MissingFields(fields)) => {
                state.missing_fields = fields;
                AuditOutcome::Rejected
            }
            Err(PayloadError::InvalidField { field, message }) => {
                info!(
                    event_name = "pipeline.router.invalid_field",
                    correlation_id = %state.correlation_id,
                    field = %field,
                    reason = %message,
                    "entity rejected by validation"
                );
                state.fail(format!("Revisá {}: el valor indicado no es válido.", field_label(&field)));
                AuditOutcome::Rejected
            }
            Err(PayloadError::UnsupportedOperation(kind)) => {
                info!(
                    event_name = "pipeline.router.unsupported_operation",
                    correlation_id = %state.correlation_id,
                    operation = %kind,
                    "write without a usable operation kind"
                );
                state.intent = Some(Intent::Ambiguous);
                state.clarification = Some(AMBIGUOUS_REPLY.to_string());
                AuditOutcome::Rejected
            }
        }
    }

    async fn resolve(&self, state: &mut RequestState, audit: &AuditContext, today: NaiveDate) {
        let Some(payload) = state.payload.as_ref() else {
            return;
        };
        let result = self.resolver.resolve(payload, &state.user_text, today).await;
        let record = match result {
            Ok(operation) => {
                state.operation = Some(operation);
                audit.event("resolution.completed", AuditCategory::Resolution, AuditOutcome::Success)
            }
            Err(error) if error.is_user_facing() => {
                state.fail(error.to_string());
                audit
                    .event("resolution.rejected", AuditCategory::Resolution, AuditOutcome::Rejected)
                    .with_metadata("reason", error.to_string())
            }
            Err(error) => {
                self.internal_failure(state, ApplicationError::Persistence(error.to_string()));
                audit.event("resolution.failed", AuditCategory::Resolution, AuditOutcome::Failed)
            }
        };
        self.audit.emit(record.with_metadata("operation", state.operation_kind.as_str()));
    }

    async fn execute(&self, state: &mut RequestState, audit: &AuditContext) {
        let Some(operation) = state.operation.as_ref() else {
            return;
        };
        let result = self.executor.execute(operation).await.map_err(ApplicationError::from);
        let record = match result {
            Ok(report) => {
                state.report = Some(report);
                audit.event("ledger.operation_committed", AuditCategory::Ledger, AuditOutcome::Success)
            }
            Err(ApplicationError::Domain(DomainError::BusinessRule(rule))) => {
                state.fail(format!("Operación fallida: {rule}"));
                audit
                    .event("ledger.operation_rejected", AuditCategory::Ledger, AuditOutcome::Rejected)
                    .with_metadata("reason", rule)
            }
            Err(error) => {
                let record = audit
                    .event("ledger.operation_failed", AuditCategory::Ledger, AuditOutcome::Failed)
                    .with_metadata("error_class", error.class());
                self.internal_failure(state, error);
                record
            }
        };
        self.audit.emit(record.with_metadata("operation", state.operation_kind.as_str()));
    }

    async fn answer(&self, state: &mut RequestState, today: NaiveDate) {
        match self.analytics.answer(&state.user_text, today).await {
            Ok(answer) => state.analytics = Some(answer),
            Err(error) => self.internal_failure(state, error.into()),
        }
    }

    fn internal_failure(&self, state: &mut RequestState, error: ApplicationError) {
        error!(
            event_name = "pipeline.failed",
            correlation_id = %state.correlation_id,
            conversation_id = %state.conversation_id,
            error_class = error.class(),
            error = %error,
            "request failed unexpectedly"
        );
        let interface = error.into_interface(state.correlation_id.clone());
        state.fail(interface.user_message());
    }
}
