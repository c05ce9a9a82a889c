pub mod analytics;
pub mod connection;
pub mod fixtures;
pub mod ledger;
pub mod migrations;
pub mod repositories;

pub use analytics::{AnalyticsQueries, SaleSummary, StockLevel};
pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeed, SeedProductInfo, SeedResult, VerificationResult};
pub use ledger::{LedgerError, LedgerStore, ProfitTotals};
pub use repositories::{
    CatalogRepository, InMemoryCatalogRepository, RepositoryError, SqlCatalogRepository,
};
