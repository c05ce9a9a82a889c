pub mod intent;
pub mod ledger;
pub mod payload;
pub mod product;
pub mod request;
