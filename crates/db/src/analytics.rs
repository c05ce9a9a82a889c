use chrono::NaiveDate;
use serde::Serialize;

use ledgerbot_core::domain::ledger::{Expense, Sale, SaleLineReceipt};
use ledgerbot_core::domain::product::{Product, ProductId};

use crate::ledger::{
    expense_select, profit_totals, row_to_expense, row_to_sale, sale_lines, sale_select,
    LedgerError, ProfitTotals,
};
use crate::repositories::catalog::{product_select, row_to_product};
use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleSummary {
    pub sale: Sale,
    pub lines: Vec<SaleLineReceipt>,
}

/// Parameterized reads over the derived views.
#[derive(Clone)]
pub struct AnalyticsQueries {
    pool: DbPool,
}

impl AnalyticsQueries {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn stock_levels(&self) -> Result<Vec<StockLevel>, LedgerError> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT product_id, sku, name, stock_qty FROM stock_current ORDER BY name, product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, sku, name, quantity)| StockLevel {
                product_id: ProductId(product_id),
                sku,
                name,
                quantity,
            })
            .collect())
    }

    pub async fn revenue(&self) -> Result<i64, LedgerError> {
        let revenue: i64 = sqlx::query_scalar("SELECT total_revenue_cents FROM revenue_paid")
            .fetch_one(&self.pool)
            .await?;
        Ok(revenue)
    }

    pub async fn profit(&self) -> Result<ProfitTotals, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        profit_totals(&mut conn).await
    }

    /// Latest non-cancelled sales, newest first, with their lines.
    pub async fn recent_sales(&self, limit: u32) -> Result<Vec<SaleSummary>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&sale_select(
            "WHERE status <> 'CANCELLED' ORDER BY created_at DESC, id DESC LIMIT ?",
        ))
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;
        let sales = rows.iter().map(row_to_sale).collect::<Result<Vec<_>, RepositoryError>>()?;

        let mut summaries = Vec::with_capacity(sales.len());
        for sale in sales {
            let lines = sale_lines(&mut conn, sale.id).await?;
            summaries.push(SaleSummary { sale, lines });
        }
        Ok(summaries)
    }

    pub async fn expenses_since(
        &self,
        since: Option<NaiveDate>,
        limit: u32,
    ) -> Result<Vec<Expense>, LedgerError> {
        let rows = match since {
            Some(since) => {
                sqlx::query(&expense_select(
                    "WHERE cancelled_at IS NULL AND expense_date >= ? \
                     ORDER BY expense_date DESC, id DESC LIMIT ?",
                ))
                .bind(since.format("%Y-%m-%d").to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&expense_select(
                    "WHERE cancelled_at IS NULL ORDER BY expense_date DESC, id DESC LIMIT ?",
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(row_to_expense).collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    pub async fn active_products(&self) -> Result<Vec<Product>, LedgerError> {
        let rows = sqlx::query(&product_select("WHERE is_active = 1 ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_product).collect::<Result<Vec<_>, RepositoryError>>()?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use ledgerbot_core::domain::ledger::{
        NewExpense, NewSale, NewSaleItem, OperationTarget, SaleStatus,
    };

    use super::AnalyticsQueries;
    use crate::fixtures::DemoSeed;
    use crate::ledger::LedgerStore;
    use crate::{connect_with_settings, migrations};

    async fn seeded() -> (LedgerStore, AnalyticsQueries) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");
        (LedgerStore::new(pool.clone(), "USD"), AnalyticsQueries::new(pool))
    }

    fn expense(day: u32, amount_cents: i64) -> NewExpense {
        NewExpense {
            expense_date: NaiveDate::from_ymd_opt(2026, 3, day).expect("date"),
            category: "GENERAL".to_string(),
            description: format!("Gasto {day}"),
            amount_cents,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn stock_view_hides_inactive_products() {
        let (store, analytics) = seeded().await;
        let before = analytics.stock_levels().await.expect("stock");
        assert_eq!(before.len(), 4);

        let keychain = before.iter().find(|level| level.sku == "BC-KEYCHAIN").expect("keychain");
        store.deactivate_product(keychain.product_id).await.expect("deactivate");

        let after = analytics.stock_levels().await.expect("stock");
        assert_eq!(after.len(), 3);
        assert!(after.iter().all(|level| level.sku != "BC-KEYCHAIN"));
    }

    #[tokio::test]
    async fn recent_sales_skip_cancelled_ones() {
        let (store, analytics) = seeded().await;
        let gold = analytics
            .stock_levels()
            .await
            .expect("stock")
            .into_iter()
            .find(|level| level.sku == "BC-BRACELET-GOLD")
            .map(|level| level.product_id)
            .expect("gold bracelet is seeded");

        for quantity in [1, 2] {
            store
                .register_sale(&NewSale {
                    items: vec![NewSaleItem { product_id: gold, quantity, unit_price_cents: None }],
                    status: SaleStatus::Paid,
                    customer_name: None,
                    currency: "USD".to_string(),
                })
                .await
                .expect("sale");
        }
        store.cancel_sale(OperationTarget::Last).await.expect("cancel");

        let sales = analytics.recent_sales(10).await.expect("sales");
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].lines[0].quantity, 1);
        assert_eq!(analytics.revenue().await.expect("revenue"), 3500);
    }

    #[tokio::test]
    async fn expenses_window_and_profit_ignore_cancelled() {
        let (store, analytics) = seeded().await;
        store.register_expense(&expense(1, 1000)).await.expect("expense");
        store.register_expense(&expense(20, 250)).await.expect("expense");
        store.register_expense(&expense(21, 999)).await.expect("expense");
        store.cancel_expense(OperationTarget::Last).await.expect("cancel");

        let recent = analytics
            .expenses_since(NaiveDate::from_ymd_opt(2026, 3, 15), 20)
            .await
            .expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].amount_cents, 250);

        let all = analytics.expenses_since(None, 20).await.expect("all");
        assert_eq!(all.len(), 2);

        let profit = analytics.profit().await.expect("profit");
        assert_eq!(profit.expenses_cents, 1250);
        assert_eq!(profit.profit_cents, -1250);
    }
}
