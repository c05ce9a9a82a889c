pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod money;

pub use domain::intent::{Intent, OperationKind};
pub use domain::ledger::{LedgerOperation, OperationReport, OperationTarget};
pub use domain::payload::{PayloadError, WritePayload};
pub use domain::product::{Candidate, Product, ProductId};
pub use domain::request::RequestState;
pub use errors::{ApplicationError, DomainError, InterfaceError, GENERIC_APOLOGY};
pub use flows::{FlowEngine, PipelineStage};
