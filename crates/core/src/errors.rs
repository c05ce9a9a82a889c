use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Reply used whenever an unexpected failure reaches the conversation boundary.
pub const GENERIC_APOLOGY: &str =
    "Lo siento, ocurrió un error inesperado procesando tu mensaje. Intentá de nuevo en un momento.";

const BAD_REQUEST_REPLY: &str = "No pude procesar el pedido. Revisá los datos e intentá de nuevo.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    /// A ledger rule refused the write; the text is already user-facing.
    #[error("{0}")]
    BusinessRule(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures a pipeline stage or transport handler can end with.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ApplicationError {
    /// Stable label for logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::FlowTransition(_)) => "flow_transition",
            Self::Domain(DomainError::BusinessRule(_)) => "business_rule",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::MalformedRequest(_) => "malformed_request",
            Self::Persistence(_) => "persistence",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::MalformedRequest(_) | Self::Domain(DomainError::BusinessRule(_)) => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::Domain(DomainError::FlowTransition(_) | DomainError::InvariantViolation(_))
            | Self::Persistence(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

/// What a transport boundary may show for a failed request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => BAD_REQUEST_REPLY,
            Self::Internal { .. } => GENERIC_APOLOGY,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}
