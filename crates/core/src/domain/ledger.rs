use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// Largest quantity a single sale line or stock movement may carry.
pub const MAX_LINE_QUANTITY: i64 = i32::MAX as i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    In,
    Out,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Adjustment => "ADJUSTMENT",
        }
    }

    /// Effect of a stored quantity on the stock fold, `None` on overflow.
    pub fn signed_effect(&self, quantity: i64) -> Option<i64> {
        match self {
            Self::Out => quantity.checked_neg(),
            Self::In | Self::Adjustment => Some(quantity),
        }
    }

    /// Adjustments are signed and non-zero; IN and OUT are positive.
    pub fn accepts(&self, quantity: i64) -> bool {
        let bounded = quantity.checked_abs().is_some_and(|abs| abs <= MAX_LINE_QUANTITY);
        bounded
            && match self {
                Self::Adjustment => quantity != 0,
                Self::In | Self::Out => quantity > 0,
            }
    }
}

impl std::str::FromStr for MovementKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            other => Err(format!("unknown movement type `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Paid,
    Pending,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Pending => "PENDING",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for SaleStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PAID" | "PAGADA" | "PAGADO" => Ok(Self::Paid),
            "PENDING" | "PENDIENTE" => Ok(Self::Pending),
            "CANCELLED" | "CANCELED" | "CANCELADA" => Ok(Self::Cancelled),
            other => Err(format!("unknown sale status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub sale_number: String,
    pub customer_name: Option<String>,
    pub status: SaleStatus,
    pub currency: String,
    pub total_amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub expense_date: NaiveDate,
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Which record a cancellation or payment addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationTarget {
    Last,
    Id(i64),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    /// The SKU was derived from the name rather than given by the user.
    #[serde(default)]
    pub sku_generated: bool,
    pub name: String,
    pub description: Option<String>,
    pub unit_cost_cents: i64,
    pub unit_price_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Overrides the catalog price when present.
    pub unit_price_cents: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub items: Vec<NewSaleItem>,
    pub status: SaleStatus,
    pub customer_name: Option<String>,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub expense_date: NaiveDate,
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub product_id: ProductId,
    pub kind: MovementKind,
    /// Signed effect for adjustments, magnitude for IN/OUT.
    pub quantity: i64,
    pub reason: String,
}

/// A fully resolved write. Every product reference is a concrete id and every
/// money value is in minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOperation {
    RegisterProduct(NewProduct),
    RegisterSale(NewSale),
    RegisterExpense(NewExpense),
    AddStock(Vec<StockEntry>),
    RemoveStock(Vec<StockEntry>),
    MarkSalePaid(OperationTarget),
    CancelSale(OperationTarget),
    CancelExpense(OperationTarget),
    CancelStockMovement(OperationTarget),
    CancelLastOperation,
    DeactivateProduct(ProductId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReceipt {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineReceipt {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub sale_id: i64,
    pub sale_number: String,
    pub status: SaleStatus,
    pub total_cents: i64,
    pub lines: Vec<SaleLineReceipt>,
    pub revenue_cents: i64,
    pub profit_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseReceipt {
    pub expense_id: i64,
    pub expense_date: NaiveDate,
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub profit_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceipt {
    pub movement_id: i64,
    pub product_id: ProductId,
    pub product_name: String,
    pub kind: MovementKind,
    pub quantity: i64,
    pub current_stock: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReceipt {
    Sale {
        sale_id: i64,
        sale_number: String,
        amount_cents: i64,
        restocked: Vec<StockReceipt>,
        revenue_cents: i64,
        profit_cents: i64,
    },
    Expense {
        expense_id: i64,
        description: String,
        amount_cents: i64,
        profit_cents: i64,
    },
    StockMovement {
        movement_id: i64,
        product_name: String,
        cancelled_quantity: i64,
        current_stock: i64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivationReceipt {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
}

/// Typed result of one executed operation, consumed by the response formatter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationReport {
    ProductRegistered(ProductReceipt),
    SaleRegistered(SaleReceipt),
    SalePaid(SaleReceipt),
    ExpenseRegistered(ExpenseReceipt),
    StockAdded(Vec<StockReceipt>),
    StockRemoved(Vec<StockReceipt>),
    Cancelled(CancellationReceipt),
    ProductDeactivated(DeactivationReceipt),
}
