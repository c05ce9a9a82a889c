use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqliteConnection};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use ledgerbot_core::domain::ledger::{
    CancellationReceipt, DeactivationReceipt, Expense, ExpenseReceipt, MovementKind, NewExpense,
    NewProduct, NewSale, OperationTarget, ProductReceipt, Sale, SaleItem, SaleLineReceipt,
    SaleReceipt, SaleStatus, StockEntry, StockMovement, StockReceipt, MAX_LINE_QUANTITY,
};
use ledgerbot_core::domain::product::{Product, ProductId};
use ledgerbot_core::errors::{ApplicationError, DomainError};

use crate::repositories::catalog::{product_select, row_to_product};
use crate::repositories::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, RepositoryError,
};
use crate::DbPool;

const SALE_REFERENCE_PREFIX: &str = "sale:";
const CANCEL_REFERENCE_PREFIX: &str = "cancel:";
const CANCEL_SALE_REASON: &str = "Venta cancelada";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(
        "No hay suficiente stock de {product}. Disponible: {available} unidades, solicitado: \
         {requested} unidades"
    )]
    InsufficientStock { product: String, available: i64, requested: i64 },
    #[error("Ya existe un producto con el SKU {0}")]
    DuplicateSku(String),
    #[error("generated SKU {0} collides with an existing product")]
    GeneratedSkuCollision(String),
    #[error("No se encontró el producto con ID {0}")]
    ProductNotFound(ProductId),
    #[error("El producto '{0}' está desactivado")]
    ProductInactive(String),
    #[error("El producto '{0}' ya está desactivado")]
    AlreadyInactive(String),
    #[error("No se encontró la venta con ID {0}")]
    SaleNotFound(i64),
    #[error("No hay ventas pendientes de pago")]
    NoPendingSale,
    #[error("La venta {0} ya está cancelada")]
    SaleAlreadyCancelled(String),
    #[error("La venta {sale_number} no está pendiente (estado: {status})")]
    SaleNotPending { sale_number: String, status: String },
    #[error("No se puede registrar una venta con estado {0}")]
    InvalidSaleStatus(String),
    #[error("No se encontró el gasto con ID {0}")]
    ExpenseNotFound(i64),
    #[error("El gasto con ID {0} ya está cancelado")]
    ExpenseAlreadyCancelled(i64),
    #[error("No se encontró el movimiento de stock con ID {0}")]
    MovementNotFound(i64),
    #[error("El movimiento {id} no se puede cancelar: {reason}")]
    MovementNotCancellable { id: i64, reason: String },
    #[error("No hay {0} para cancelar")]
    NothingToCancel(&'static str),
    #[error("Cantidad inválida: {0}")]
    InvalidQuantity(i64),
    #[error("Monto inválido: {0}")]
    InvalidAmount(String),
    #[error("La venta no tiene productos")]
    EmptySale,
    #[error("No se indicó ningún producto para el movimiento de stock")]
    NoStockLines,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

/// Business rules keep their user-facing text; a generated SKU clash is an
/// internal invariant break.
impl From<LedgerError> for ApplicationError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Repository(error) => error.into(),
            rule if rule.is_business_rule() => DomainError::BusinessRule(rule.to_string()).into(),
            broken => DomainError::InvariantViolation(broken.to_string()).into(),
        }
    }
}

impl LedgerError {
    /// True when the message is meant for the user as-is.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, Self::Repository(_) | Self::GeneratedSkuCollision(_))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfitTotals {
    pub revenue_cents: i64,
    pub expenses_cents: i64,
    pub profit_cents: i64,
}

/// Transactional writer over the ledger tables.
///
/// Every mutation takes the write gate before opening its transaction, and
/// runs its precondition reads on the transaction's connection, so two
/// concurrent sales of the same product cannot both pass the stock check.
pub struct LedgerStore {
    pool: DbPool,
    write_gate: Mutex<()>,
    currency: String,
}

impl LedgerStore {
    pub fn new(pool: DbPool, currency: impl Into<String>) -> Self {
        Self { pool, write_gate: Mutex::new(()), currency: currency.into() }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub async fn register_product(&self, product: &NewProduct) -> Result<ProductReceipt, LedgerError> {
        if product.unit_cost_cents < 0 {
            return Err(LedgerError::InvalidAmount(format!("costo {}", product.unit_cost_cents)));
        }
        if product.unit_price_cents < 0 {
            return Err(LedgerError::InvalidAmount(format!("precio {}", product.unit_price_cents)));
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM products WHERE UPPER(sku) = UPPER(?)")
                .bind(&product.sku)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(sku_conflict(product));
        }

        let inserted = sqlx::query(
            "INSERT INTO products \
             (sku, name, description, unit_cost_cents, unit_price_cents, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_cost_cents)
        .bind(product.unit_price_cents)
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            let unique_violation =
                error.as_database_error().is_some_and(|db| db.is_unique_violation());
            if unique_violation {
                sku_conflict(product)
            } else {
                LedgerError::from(error)
            }
        })?;
        tx.commit().await?;

        let product_id = ProductId(inserted.last_insert_rowid());
        info!(
            event_name = "ledger.product.registered",
            product_id = product_id.0,
            sku = %product.sku,
            "product registered"
        );

        Ok(ProductReceipt {
            product_id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price_cents: product.unit_price_cents,
            unit_cost_cents: product.unit_cost_cents,
        })
    }

    /// Records a sale. PAID sales check stock for every line before writing
    /// and append one OUT movement per line.
    pub async fn register_sale(&self, sale: &NewSale) -> Result<SaleReceipt, LedgerError> {
        if sale.items.is_empty() {
            return Err(LedgerError::EmptySale);
        }
        if sale.status == SaleStatus::Cancelled {
            return Err(LedgerError::InvalidSaleStatus(sale.status.as_str().to_string()));
        }
        for item in &sale.items {
            if item.quantity <= 0 || item.quantity > MAX_LINE_QUANTITY {
                return Err(LedgerError::InvalidQuantity(item.quantity));
            }
            if let Some(price) = item.unit_price_cents.filter(|price| *price < 0) {
                return Err(LedgerError::InvalidAmount(format!("precio {price}")));
            }
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut lines = Vec::with_capacity(sale.items.len());
        let mut products: BTreeMap<ProductId, Product> = BTreeMap::new();
        for item in &sale.items {
            let product = match products.get(&item.product_id) {
                Some(product) => product.clone(),
                None => {
                    let product = require_active_product(&mut tx, item.product_id).await?;
                    products.insert(product.id, product.clone());
                    product
                }
            };
            let unit_price_cents = item.unit_price_cents.unwrap_or(product.unit_price_cents);
            let line_total_cents = unit_price_cents
                .checked_mul(item.quantity)
                .ok_or_else(|| LedgerError::InvalidAmount(format!("total de {}", product.name)))?;
            lines.push(SaleLineReceipt {
                product_id: product.id,
                product_name: product.name,
                quantity: item.quantity,
                unit_price_cents,
                line_total_cents,
            });
        }

        if sale.status == SaleStatus::Paid {
            ensure_stock_for_lines(&mut tx, &lines).await?;
        }

        let total_cents = lines
            .iter()
            .try_fold(0_i64, |total, line| total.checked_add(line.line_total_cents))
            .ok_or_else(|| LedgerError::InvalidAmount("total de la venta".to_string()))?;

        let now = Utc::now();
        let created_at = format_timestamp(now);
        let sale_number = next_sale_number(now);
        let paid_at = (sale.status == SaleStatus::Paid).then(|| created_at.clone());
        let currency = if sale.currency.trim().is_empty() {
            self.currency.clone()
        } else {
            sale.currency.clone()
        };

        let sale_id = sqlx::query(
            "INSERT INTO sales \
             (sale_number, customer_name, status, currency, total_amount_cents, created_at, paid_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&sale_number)
        .bind(&sale.customer_name)
        .bind(sale.status.as_str())
        .bind(&currency)
        .bind(total_cents)
        .bind(&created_at)
        .bind(&paid_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for line in &lines {
            sqlx::query(
                "INSERT INTO sale_items \
                 (sale_id, product_id, quantity, unit_price_cents, line_total_cents) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(sale_id)
            .bind(line.product_id.0)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        if sale.status == SaleStatus::Paid {
            write_sale_outflows(&mut tx, sale_id, &sale_number, &lines, &created_at).await?;
        }

        let totals = profit_totals(&mut tx).await?;
        tx.commit().await?;

        info!(
            event_name = "ledger.sale.registered",
            sale_id,
            sale_number = %sale_number,
            status = sale.status.as_str(),
            total_cents,
            "sale registered"
        );

        Ok(SaleReceipt {
            sale_id,
            sale_number,
            status: sale.status,
            total_cents,
            lines,
            revenue_cents: totals.revenue_cents,
            profit_cents: totals.profit_cents,
        })
    }

    /// Moves a PENDING sale to PAID, checking stock and writing its outflows.
    pub async fn mark_sale_paid(&self, target: OperationTarget) -> Result<SaleReceipt, LedgerError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let sale = match target {
            OperationTarget::Id(id) => {
                load_sale(&mut tx, id).await?.ok_or(LedgerError::SaleNotFound(id))?
            }
            OperationTarget::Last => {
                let row = sqlx::query(&sale_select(
                    "WHERE status = 'PENDING' ORDER BY created_at DESC, id DESC LIMIT 1",
                ))
                .fetch_optional(&mut *tx)
                .await?;
                row.as_ref().map(row_to_sale).transpose()?.ok_or(LedgerError::NoPendingSale)?
            }
        };
        if sale.status != SaleStatus::Pending {
            return Err(LedgerError::SaleNotPending {
                sale_number: sale.sale_number,
                status: sale.status.as_str().to_string(),
            });
        }

        let lines = sale_lines(&mut tx, sale.id).await?;
        ensure_stock_for_lines(&mut tx, &lines).await?;

        let paid_at = format_timestamp(Utc::now());
        write_sale_outflows(&mut tx, sale.id, &sale.sale_number, &lines, &paid_at).await?;
        sqlx::query("UPDATE sales SET status = 'PAID', paid_at = ? WHERE id = ?")
            .bind(&paid_at)
            .bind(sale.id)
            .execute(&mut *tx)
            .await?;

        let totals = profit_totals(&mut tx).await?;
        tx.commit().await?;

        info!(
            event_name = "ledger.sale.paid",
            sale_id = sale.id,
            sale_number = %sale.sale_number,
            "pending sale marked as paid"
        );

        Ok(SaleReceipt {
            sale_id: sale.id,
            sale_number: sale.sale_number,
            status: SaleStatus::Paid,
            total_cents: sale.total_amount_cents,
            lines,
            revenue_cents: totals.revenue_cents,
            profit_cents: totals.profit_cents,
        })
    }

    pub async fn add_stock(&self, entries: &[StockEntry]) -> Result<Vec<StockReceipt>, LedgerError> {
        self.apply_stock_entries(entries, "ledger.stock.added").await
    }

    pub async fn remove_stock(
        &self,
        entries: &[StockEntry],
    ) -> Result<Vec<StockReceipt>, LedgerError> {
        self.apply_stock_entries(entries, "ledger.stock.removed").await
    }

    async fn apply_stock_entries(
        &self,
        entries: &[StockEntry],
        event_name: &'static str,
    ) -> Result<Vec<StockReceipt>, LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::NoStockLines);
        }
        for entry in entries {
            if !entry.kind.accepts(entry.quantity) {
                return Err(LedgerError::InvalidQuantity(entry.quantity));
            }
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        let now = format_timestamp(Utc::now());

        let mut receipts = Vec::with_capacity(entries.len());
        for entry in entries {
            let product = require_active_product(&mut tx, entry.product_id).await?;
            let available = stock_of(&mut tx, product.id).await?;
            let effect = entry
                .kind
                .signed_effect(entry.quantity)
                .ok_or(LedgerError::InvalidQuantity(entry.quantity))?;
            let remaining = available
                .checked_add(effect)
                .ok_or(LedgerError::InvalidQuantity(entry.quantity))?;
            if remaining < 0 {
                return Err(LedgerError::InsufficientStock {
                    product: product.name,
                    available,
                    requested: effect.saturating_abs(),
                });
            }

            let movement_id = insert_movement(
                &mut tx,
                product.id,
                entry.kind,
                entry.quantity,
                Some(entry.reason.as_str()),
                None,
                &now,
            )
            .await?;
            let current_stock = stock_of(&mut tx, product.id).await?;

            receipts.push(StockReceipt {
                movement_id,
                product_id: product.id,
                product_name: product.name,
                kind: entry.kind,
                quantity: entry.quantity,
                current_stock,
            });
        }
        tx.commit().await?;

        info!(event_name = event_name, movements = receipts.len(), "stock movements recorded");
        Ok(receipts)
    }

    pub async fn register_expense(&self, expense: &NewExpense) -> Result<ExpenseReceipt, LedgerError> {
        if expense.amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount(expense.amount_cents.to_string()));
        }

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let currency = if expense.currency.trim().is_empty() {
            self.currency.clone()
        } else {
            expense.currency.clone()
        };
        let expense_id = sqlx::query(
            "INSERT INTO expenses \
             (expense_date, category, description, amount_cents, currency, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(expense.expense_date.format("%Y-%m-%d").to_string())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(&currency)
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let totals = profit_totals(&mut tx).await?;
        tx.commit().await?;

        info!(
            event_name = "ledger.expense.registered",
            expense_id,
            amount_cents = expense.amount_cents,
            "expense registered"
        );

        Ok(ExpenseReceipt {
            expense_id,
            expense_date: expense.expense_date,
            category: expense.category.clone(),
            description: expense.description.clone(),
            amount_cents: expense.amount_cents,
            profit_cents: totals.profit_cents,
        })
    }

    pub async fn cancel_sale(
        &self,
        target: OperationTarget,
    ) -> Result<CancellationReceipt, LedgerError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let sale = match target {
            OperationTarget::Id(id) => {
                load_sale(&mut tx, id).await?.ok_or(LedgerError::SaleNotFound(id))?
            }
            OperationTarget::Last => {
                last_open_sale(&mut tx).await?.ok_or(LedgerError::NothingToCancel("ventas"))?
            }
        };
        let receipt = cancel_sale_within(&mut tx, sale).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    pub async fn cancel_expense(
        &self,
        target: OperationTarget,
    ) -> Result<CancellationReceipt, LedgerError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let expense = match target {
            OperationTarget::Id(id) => {
                load_expense(&mut tx, id).await?.ok_or(LedgerError::ExpenseNotFound(id))?
            }
            OperationTarget::Last => {
                last_open_expense(&mut tx).await?.ok_or(LedgerError::NothingToCancel("gastos"))?
            }
        };
        let receipt = cancel_expense_within(&mut tx, expense).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    /// Reverses a manual IN or ADJUSTMENT movement with an inverse ADJUSTMENT.
    pub async fn cancel_stock_movement(
        &self,
        target: OperationTarget,
    ) -> Result<CancellationReceipt, LedgerError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let movement = match target {
            OperationTarget::Id(id) => {
                let movement =
                    load_movement(&mut tx, id).await?.ok_or(LedgerError::MovementNotFound(id))?;
                ensure_movement_cancellable(&mut tx, &movement).await?;
                movement
            }
            OperationTarget::Last => last_cancellable_movement(&mut tx)
                .await?
                .ok_or(LedgerError::NothingToCancel("movimientos de stock"))?,
        };
        let receipt = cancel_movement_within(&mut tx, movement).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    /// Cancels whichever of the latest sale, expense or manual stock movement
    /// was created most recently.
    pub async fn cancel_last_operation(&self) -> Result<CancellationReceipt, LedgerError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let sale = last_open_sale(&mut tx).await?;
        let expense = last_open_expense(&mut tx).await?;
        let movement = last_cancellable_movement(&mut tx).await?;

        let mut latest: Option<(LastOperation, String)> = None;
        let mut consider = |candidate: LastOperation, created_at: String| {
            let newer = latest.as_ref().map_or(true, |(_, current)| created_at > *current);
            if newer {
                latest = Some((candidate, created_at));
            }
        };
        if let Some(sale) = sale {
            let created_at = format_timestamp(sale.created_at);
            consider(LastOperation::Sale(sale), created_at);
        }
        if let Some(expense) = expense {
            let created_at = format_timestamp(expense.created_at);
            consider(LastOperation::Expense(expense), created_at);
        }
        if let Some(movement) = movement {
            let created_at = format_timestamp(movement.created_at);
            consider(LastOperation::Movement(movement), created_at);
        }

        let receipt = match latest {
            Some((LastOperation::Sale(sale), _)) => cancel_sale_within(&mut tx, sale).await?,
            Some((LastOperation::Expense(expense), _)) => {
                cancel_expense_within(&mut tx, expense).await?
            }
            Some((LastOperation::Movement(movement), _)) => {
                cancel_movement_within(&mut tx, movement).await?
            }
            None => return Err(LedgerError::NothingToCancel("operaciones")),
        };
        tx.commit().await?;
        Ok(receipt)
    }

    pub async fn deactivate_product(
        &self,
        product_id: ProductId,
    ) -> Result<DeactivationReceipt, LedgerError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let product =
            load_product(&mut tx, product_id).await?.ok_or(LedgerError::ProductNotFound(product_id))?;
        if !product.active {
            return Err(LedgerError::AlreadyInactive(product.name));
        }
        sqlx::query("UPDATE products SET is_active = 0 WHERE id = ?")
            .bind(product_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            event_name = "ledger.product.deactivated",
            product_id = product_id.0,
            sku = %product.sku,
            "product deactivated"
        );

        Ok(DeactivationReceipt { product_id, sku: product.sku, name: product.name })
    }

    pub async fn current_stock(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        stock_of(&mut conn, product_id).await
    }

    pub async fn profit_summary(&self) -> Result<ProfitTotals, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        profit_totals(&mut conn).await
    }
}

enum LastOperation {
    Sale(Sale),
    Expense(Expense),
    Movement(StockMovement),
}

fn next_sale_number(now: chrono::DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("S-{}-{}", now.format("%Y%m%d%H%M%S"), &suffix[..8])
}

pub(crate) fn sale_select(filter: &str) -> String {
    format!(
        "SELECT id, sale_number, customer_name, status, currency, total_amount_cents, \
         created_at, paid_at, cancelled_at FROM sales {filter}"
    )
}

pub(crate) fn expense_select(filter: &str) -> String {
    format!(
        "SELECT id, expense_date, category, description, amount_cents, currency, created_at, \
         cancelled_at FROM expenses {filter}"
    )
}

fn movement_select(filter: &str) -> String {
    format!(
        "SELECT m.id, m.product_id, m.movement_type, m.quantity, m.reason, m.reference, \
         m.occurred_at, m.created_at FROM stock_movements m {filter}"
    )
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn row_to_sale(row: &sqlx::sqlite::SqliteRow) -> Result<Sale, RepositoryError> {
    let status: String = decode(row, "status")?;
    Ok(Sale {
        id: decode(row, "id")?,
        sale_number: decode(row, "sale_number")?,
        customer_name: decode(row, "customer_name")?,
        status: status.parse().map_err(RepositoryError::Decode)?,
        currency: decode(row, "currency")?,
        total_amount_cents: decode(row, "total_amount_cents")?,
        created_at: parse_timestamp(&decode::<String>(row, "created_at")?)?,
        paid_at: parse_optional_timestamp(decode(row, "paid_at")?)?,
        cancelled_at: parse_optional_timestamp(decode(row, "cancelled_at")?)?,
    })
}

pub(crate) fn row_to_sale_item(row: &sqlx::sqlite::SqliteRow) -> Result<SaleItem, RepositoryError> {
    Ok(SaleItem {
        id: decode(row, "id")?,
        sale_id: decode(row, "sale_id")?,
        product_id: ProductId(decode(row, "product_id")?),
        quantity: decode(row, "quantity")?,
        unit_price_cents: decode(row, "unit_price_cents")?,
        line_total_cents: decode(row, "line_total_cents")?,
    })
}

pub(crate) fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense, RepositoryError> {
    let expense_date: String = decode(row, "expense_date")?;
    Ok(Expense {
        id: decode(row, "id")?,
        expense_date: NaiveDate::parse_from_str(&expense_date, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(format!("invalid expense date: {e}")))?,
        category: decode(row, "category")?,
        description: decode(row, "description")?,
        amount_cents: decode(row, "amount_cents")?,
        currency: decode(row, "currency")?,
        created_at: parse_timestamp(&decode::<String>(row, "created_at")?)?,
        cancelled_at: parse_optional_timestamp(decode(row, "cancelled_at")?)?,
    })
}

pub(crate) fn row_to_movement(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<StockMovement, RepositoryError> {
    let kind: String = decode(row, "movement_type")?;
    Ok(StockMovement {
        id: decode(row, "id")?,
        product_id: ProductId(decode(row, "product_id")?),
        kind: kind.parse().map_err(RepositoryError::Decode)?,
        quantity: decode(row, "quantity")?,
        reason: decode(row, "reason")?,
        reference: decode(row, "reference")?,
        occurred_at: parse_timestamp(&decode::<String>(row, "occurred_at")?)?,
        created_at: parse_timestamp(&decode::<String>(row, "created_at")?)?,
    })
}

async fn load_product(
    conn: &mut SqliteConnection,
    product_id: ProductId,
) -> Result<Option<Product>, LedgerError> {
    let row = sqlx::query(&product_select("WHERE id = ?"))
        .bind(product_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_product).transpose()?)
}

async fn require_active_product(
    conn: &mut SqliteConnection,
    product_id: ProductId,
) -> Result<Product, LedgerError> {
    let product =
        load_product(conn, product_id).await?.ok_or(LedgerError::ProductNotFound(product_id))?;
    if !product.active {
        return Err(LedgerError::ProductInactive(product.name));
    }
    Ok(product)
}

/// The stock fold, read from movements so inactive products count too.
/// A clash on a user-supplied SKU is the user's to fix; a clash on a
/// generated one means generation missed part of the catalog.
fn sku_conflict(product: &NewProduct) -> LedgerError {
    if product.sku_generated {
        error!(
            event_name = "ledger.product.generated_sku_collision",
            sku = %product.sku,
            "generated SKU already taken"
        );
        LedgerError::GeneratedSkuCollision(product.sku.clone())
    } else {
        LedgerError::DuplicateSku(product.sku.clone())
    }
}

async fn stock_of(conn: &mut SqliteConnection, product_id: ProductId) -> Result<i64, LedgerError> {
    let stock: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(CASE movement_type WHEN 'OUT' THEN -quantity ELSE quantity END), 0) \
         FROM stock_movements WHERE product_id = ?",
    )
    .bind(product_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(stock)
}

pub(crate) async fn profit_totals(conn: &mut SqliteConnection) -> Result<ProfitTotals, LedgerError> {
    let row = sqlx::query("SELECT revenue_cents, expenses_cents, profit_cents FROM profit_summary")
        .fetch_one(&mut *conn)
        .await?;
    Ok(ProfitTotals {
        revenue_cents: decode(&row, "revenue_cents")?,
        expenses_cents: decode(&row, "expenses_cents")?,
        profit_cents: decode(&row, "profit_cents")?,
    })
}

async fn insert_movement(
    conn: &mut SqliteConnection,
    product_id: ProductId,
    kind: MovementKind,
    quantity: i64,
    reason: Option<&str>,
    reference: Option<&str>,
    timestamp: &str,
) -> Result<i64, LedgerError> {
    let result = sqlx::query(
        "INSERT INTO stock_movements \
         (product_id, movement_type, quantity, reason, reference, occurred_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(product_id.0)
    .bind(kind.as_str())
    .bind(quantity)
    .bind(reason)
    .bind(reference)
    .bind(timestamp)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Checks the summed quantity per product, so two lines of the same product
/// cannot each pass on their own.
async fn ensure_stock_for_lines(
    conn: &mut SqliteConnection,
    lines: &[SaleLineReceipt],
) -> Result<(), LedgerError> {
    let mut requested: BTreeMap<ProductId, (i64, &str)> = BTreeMap::new();
    for line in lines {
        let entry = requested.entry(line.product_id).or_insert((0, line.product_name.as_str()));
        entry.0 =
            entry.0.checked_add(line.quantity).ok_or(LedgerError::InvalidQuantity(line.quantity))?;
    }

    for (product_id, (quantity, name)) in requested {
        let available = stock_of(conn, product_id).await?;
        if available < quantity {
            warn!(
                event_name = "ledger.stock.insufficient",
                product_id = product_id.0,
                available,
                requested = quantity,
                "sale refused for insufficient stock"
            );
            return Err(LedgerError::InsufficientStock {
                product: name.to_string(),
                available,
                requested: quantity,
            });
        }
    }
    Ok(())
}

async fn write_sale_outflows(
    conn: &mut SqliteConnection,
    sale_id: i64,
    sale_number: &str,
    lines: &[SaleLineReceipt],
    timestamp: &str,
) -> Result<(), LedgerError> {
    let reason = format!("Venta {sale_number}");
    let reference = format!("{SALE_REFERENCE_PREFIX}{sale_id}");
    for line in lines {
        insert_movement(
            conn,
            line.product_id,
            MovementKind::Out,
            line.quantity,
            Some(&reason),
            Some(&reference),
            timestamp,
        )
        .await?;
    }
    Ok(())
}

async fn load_sale(conn: &mut SqliteConnection, sale_id: i64) -> Result<Option<Sale>, LedgerError> {
    let row = sqlx::query(&sale_select("WHERE id = ?"))
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_sale).transpose()?)
}

async fn last_open_sale(conn: &mut SqliteConnection) -> Result<Option<Sale>, LedgerError> {
    let row = sqlx::query(&sale_select(
        "WHERE status <> 'CANCELLED' ORDER BY created_at DESC, id DESC LIMIT 1",
    ))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(row_to_sale).transpose()?)
}

pub(crate) async fn sale_lines(
    conn: &mut SqliteConnection,
    sale_id: i64,
) -> Result<Vec<SaleLineReceipt>, LedgerError> {
    let rows = sqlx::query(
        "SELECT i.id, i.sale_id, i.product_id, i.quantity, i.unit_price_cents, \
         i.line_total_cents, p.name AS product_name \
         FROM sale_items i JOIN products p ON p.id = i.product_id \
         WHERE i.sale_id = ? ORDER BY i.id",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let item = row_to_sale_item(row)?;
            Ok(SaleLineReceipt {
                product_id: item.product_id,
                product_name: decode(row, "product_name")?,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                line_total_cents: item.line_total_cents,
            })
        })
        .collect()
}

async fn cancel_sale_within(
    conn: &mut SqliteConnection,
    sale: Sale,
) -> Result<CancellationReceipt, LedgerError> {
    if sale.status == SaleStatus::Cancelled {
        return Err(LedgerError::SaleAlreadyCancelled(sale.sale_number));
    }

    let now = format_timestamp(Utc::now());
    let mut restocked = Vec::new();
    if sale.status == SaleStatus::Paid {
        let reason = format!("{CANCEL_SALE_REASON} {}", sale.sale_number);
        let reference = format!("{CANCEL_REFERENCE_PREFIX}sale:{}", sale.id);
        for line in sale_lines(conn, sale.id).await? {
            let movement_id = insert_movement(
                conn,
                line.product_id,
                MovementKind::In,
                line.quantity,
                Some(&reason),
                Some(&reference),
                &now,
            )
            .await?;
            let current_stock = stock_of(conn, line.product_id).await?;
            restocked.push(StockReceipt {
                movement_id,
                product_id: line.product_id,
                product_name: line.product_name,
                kind: MovementKind::In,
                quantity: line.quantity,
                current_stock,
            });
        }
    }

    sqlx::query("UPDATE sales SET status = 'CANCELLED', cancelled_at = ? WHERE id = ?")
        .bind(&now)
        .bind(sale.id)
        .execute(&mut *conn)
        .await?;
    let totals = profit_totals(conn).await?;

    info!(
        event_name = "ledger.sale.cancelled",
        sale_id = sale.id,
        sale_number = %sale.sale_number,
        restocked_lines = restocked.len(),
        "sale cancelled"
    );

    Ok(CancellationReceipt::Sale {
        sale_id: sale.id,
        sale_number: sale.sale_number,
        amount_cents: sale.total_amount_cents,
        restocked,
        revenue_cents: totals.revenue_cents,
        profit_cents: totals.profit_cents,
    })
}

async fn load_expense(
    conn: &mut SqliteConnection,
    expense_id: i64,
) -> Result<Option<Expense>, LedgerError> {
    let row = sqlx::query(&expense_select("WHERE id = ?"))
        .bind(expense_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_expense).transpose()?)
}

async fn last_open_expense(conn: &mut SqliteConnection) -> Result<Option<Expense>, LedgerError> {
    let row = sqlx::query(&expense_select(
        "WHERE cancelled_at IS NULL ORDER BY created_at DESC, id DESC LIMIT 1",
    ))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(row_to_expense).transpose()?)
}

async fn cancel_expense_within(
    conn: &mut SqliteConnection,
    expense: Expense,
) -> Result<CancellationReceipt, LedgerError> {
    if expense.cancelled_at.is_some() {
        return Err(LedgerError::ExpenseAlreadyCancelled(expense.id));
    }
    sqlx::query("UPDATE expenses SET cancelled_at = ? WHERE id = ?")
        .bind(format_timestamp(Utc::now()))
        .bind(expense.id)
        .execute(&mut *conn)
        .await?;
    let totals = profit_totals(conn).await?;

    info!(
        event_name = "ledger.expense.cancelled",
        expense_id = expense.id,
        amount_cents = expense.amount_cents,
        "expense cancelled"
    );

    Ok(CancellationReceipt::Expense {
        expense_id: expense.id,
        description: expense.description,
        amount_cents: expense.amount_cents,
        profit_cents: totals.profit_cents,
    })
}

async fn load_movement(
    conn: &mut SqliteConnection,
    movement_id: i64,
) -> Result<Option<StockMovement>, LedgerError> {
    let row = sqlx::query(&movement_select("WHERE m.id = ?"))
        .bind(movement_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_movement).transpose()?)
}

async fn last_cancellable_movement(
    conn: &mut SqliteConnection,
) -> Result<Option<StockMovement>, LedgerError> {
    let row = sqlx::query(&movement_select(
        "WHERE m.movement_type IN ('IN', 'ADJUSTMENT') \
         AND (m.reference IS NULL OR (m.reference NOT LIKE 'sale:%' AND m.reference NOT LIKE 'cancel:%')) \
         AND NOT EXISTS (SELECT 1 FROM stock_movements c WHERE c.reference = 'cancel:movement:' || m.id) \
         ORDER BY m.created_at DESC, m.id DESC LIMIT 1",
    ))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(row_to_movement).transpose()?)
}

async fn ensure_movement_cancellable(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
) -> Result<(), LedgerError> {
    let refuse = |reason: &str| LedgerError::MovementNotCancellable {
        id: movement.id,
        reason: reason.to_string(),
    };

    if movement.kind == MovementKind::Out {
        return Err(refuse("solo se pueden cancelar entradas y ajustes"));
    }
    let reference = movement.reference.as_deref().unwrap_or_default();
    if reference.starts_with(SALE_REFERENCE_PREFIX) {
        return Err(refuse("pertenece a una venta, cancelá la venta"));
    }
    if reference.starts_with(CANCEL_REFERENCE_PREFIX) {
        return Err(refuse("ya es una cancelación"));
    }

    let reversed: Option<i64> =
        sqlx::query_scalar("SELECT id FROM stock_movements WHERE reference = ? LIMIT 1")
            .bind(format!("{CANCEL_REFERENCE_PREFIX}movement:{}", movement.id))
            .fetch_optional(&mut *conn)
            .await?;
    if reversed.is_some() {
        return Err(refuse("ya fue cancelado"));
    }
    Ok(())
}

async fn cancel_movement_within(
    conn: &mut SqliteConnection,
    movement: StockMovement,
) -> Result<CancellationReceipt, LedgerError> {
    let product = load_product(conn, movement.product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound(movement.product_id))?;
    let available = stock_of(conn, product.id).await?;
    let inverse = movement
        .kind
        .signed_effect(movement.quantity)
        .and_then(i64::checked_neg)
        .ok_or(LedgerError::InvalidQuantity(movement.quantity))?;
    let remaining =
        available.checked_add(inverse).ok_or(LedgerError::InvalidQuantity(movement.quantity))?;
    if remaining < 0 {
        return Err(LedgerError::InsufficientStock {
            product: product.name,
            available,
            requested: inverse.saturating_abs(),
        });
    }

    let reason =
        format!("Cancelación de: {}", movement.reason.as_deref().unwrap_or("movimiento de stock"));
    let reference = format!("{CANCEL_REFERENCE_PREFIX}movement:{}", movement.id);
    insert_movement(
        conn,
        product.id,
        MovementKind::Adjustment,
        inverse,
        Some(&reason),
        Some(&reference),
        &format_timestamp(Utc::now()),
    )
    .await?;
    let current_stock = stock_of(conn, product.id).await?;

    info!(
        event_name = "ledger.stock.cancelled",
        movement_id = movement.id,
        product_id = product.id.0,
        inverse,
        "stock movement reversed"
    );

    Ok(CancellationReceipt::StockMovement {
        movement_id: movement.id,
        product_name: product.name,
        cancelled_quantity: movement.quantity,
        current_stock,
    })
}
