use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use ledgerbot_core::domain::product::{Product, ProductId};
use ledgerbot_core::errors::ApplicationError;

pub mod catalog;
pub mod memory;

pub use catalog::SqlCatalogRepository;
pub use memory::InMemoryCatalogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Read access to the product catalog, used by entity resolution.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Product>, RepositoryError>;
    /// Active and deactivated products.
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    /// Case-insensitive exact SKU lookup over every product.
    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError>;
    /// Every SKU ever issued, so generated codes never collide with history.
    async fn list_skus(&self) -> Result<Vec<String>, RepositoryError>;
}

/// RFC 3339 UTC with microseconds; lexical order matches time order.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

pub fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.as_deref().map(parse_timestamp).transpose()
}
