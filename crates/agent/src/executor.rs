use std::sync::Arc;

use ledgerbot_core::domain::ledger::{CancellationReceipt, LedgerOperation, OperationReport};
use ledgerbot_db::{LedgerError, LedgerStore};
use tracing::info;

/// Applies one resolved operation to the ledger. Each call is a single atomic
/// unit inside [`LedgerStore`].
#[derive(Clone)]
pub struct OperationExecutor {
    store: Arc<LedgerStore>,
}

impl OperationExecutor {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, operation: &LedgerOperation) -> Result<OperationReport, LedgerError> {
        let report = match operation {
            LedgerOperation::RegisterProduct(product) => {
                OperationReport::ProductRegistered(self.store.register_product(product).await?)
            }
            LedgerOperation::RegisterSale(sale) => {
                OperationReport::SaleRegistered(self.store.register_sale(sale).await?)
            }
            LedgerOperation::RegisterExpense(expense) => {
                OperationReport::ExpenseRegistered(self.store.register_expense(expense).await?)
            }
            LedgerOperation::AddStock(entries) => {
                OperationReport::StockAdded(self.store.add_stock(entries).await?)
            }
            LedgerOperation::RemoveStock(entries) => {
                OperationReport::StockRemoved(self.store.remove_stock(entries).await?)
            }
            LedgerOperation::MarkSalePaid(target) => {
                OperationReport::SalePaid(self.store.mark_sale_paid(*target).await?)
            }
            LedgerOperation::CancelSale(target) => {
                OperationReport::Cancelled(self.store.cancel_sale(*target).await?)
            }
            LedgerOperation::CancelExpense(target) => {
                OperationReport::Cancelled(self.store.cancel_expense(*target).await?)
            }
            LedgerOperation::CancelStockMovement(target) => {
                OperationReport::Cancelled(self.store.cancel_stock_movement(*target).await?)
            }
            LedgerOperation::CancelLastOperation => {
                OperationReport::Cancelled(self.store.cancel_last_operation().await?)
            }
            LedgerOperation::DeactivateProduct(product_id) => {
                OperationReport::ProductDeactivated(
                    self.store.deactivate_product(*product_id).await?,
                )
            }
        };

        info!(
            event_name = "pipeline.executor.applied",
            operation = operation_label(operation),
            report = report_label(&report),
            "operation applied"
        );
        Ok(report)
    }
}

pub fn operation_label(operation: &LedgerOperation) -> &'static str {
    match operation {
        LedgerOperation::RegisterProduct(_) => "register_product",
        LedgerOperation::RegisterSale(_) => "register_sale",
        LedgerOperation::RegisterExpense(_) => "register_expense",
        LedgerOperation::AddStock(_) => "add_stock",
        LedgerOperation::RemoveStock(_) => "remove_stock",
        LedgerOperation::MarkSalePaid(_) => "mark_sale_paid",
        LedgerOperation::CancelSale(_) => "cancel_sale",
        LedgerOperation::CancelExpense(_) => "cancel_expense",
        LedgerOperation::CancelStockMovement(_) => "cancel_stock_movement",
        LedgerOperation::CancelLastOperation => "cancel_last_operation",
        LedgerOperation::DeactivateProduct(_) => "deactivate_product",
    }
}

fn report_label(report: &OperationReport) -> &'static str {
    match report {
        OperationReport::ProductRegistered(_) => "product_registered",
        OperationReport::SaleRegistered(_) => "sale_registered",
        OperationReport::SalePaid(_) => "sale_paid",
        OperationReport::ExpenseRegistered(_) => "expense_registered",
        OperationReport::StockAdded(_) => "stock_added",
        OperationReport::StockRemoved(_) => "stock_removed",
        OperationReport::Cancelled(CancellationReceipt::Sale { .. }) => "sale_cancelled",
        OperationReport::Cancelled(CancellationReceipt::Expense { .. }) => "expense_cancelled",
        OperationReport::Cancelled(CancellationReceipt::StockMovement { .. }) => {
            "stock_movement_cancelled"
        }
        OperationReport::ProductDeactivated(_) => "product_deactivated",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ledgerbot_core::domain::ledger::{
        CancellationReceipt, LedgerOperation, NewSale, NewSaleItem, OperationReport,
        OperationTarget, SaleStatus,
    };
    use ledgerbot_db::{
        connect_with_settings, migrations, CatalogRepository, DemoSeed, LedgerError, LedgerStore,
        SqlCatalogRepository,
    };

    use super::OperationExecutor;

    async fn executor() -> (OperationExecutor, Arc<LedgerStore>) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");
        let store = Arc::new(LedgerStore::new(pool, "USD"));
        (OperationExecutor::new(store.clone()), store)
    }

    #[tokio::test]
    async fn pending_sale_then_payment_then_cancel_last() {
        let (executor, store) = executor().await;
        let gold = SqlCatalogRepository::new(store.pool().clone())
            .find_by_sku("BC-BRACELET-GOLD")
            .await
            .expect("lookup")
            .expect("seeded")
            .id;

        let sale = NewSale {
            items: vec![NewSaleItem { product_id: gold, quantity: 4, unit_price_cents: None }],
            status: SaleStatus::Pending,
            customer_name: Some("Ana".to_string()),
            currency: "USD".to_string(),
        };
        let registered =
            executor.execute(&LedgerOperation::RegisterSale(sale)).await.expect("pending sale");
        assert!(matches!(registered, OperationReport::SaleRegistered(ref r) if r.status == SaleStatus::Pending));
        assert_eq!(store.current_stock(gold).await.expect("stock"), 20);

        let paid = executor
            .execute(&LedgerOperation::MarkSalePaid(OperationTarget::Last))
            .await
            .expect("paid");
        assert!(matches!(paid, OperationReport::SalePaid(ref r) if r.status == SaleStatus::Paid));
        assert_eq!(store.current_stock(gold).await.expect("stock"), 16);

        let cancelled =
            executor.execute(&LedgerOperation::CancelLastOperation).await.expect("cancelled");
        assert!(matches!(cancelled, OperationReport::Cancelled(CancellationReceipt::Sale { .. })));
        assert_eq!(store.current_stock(gold).await.expect("stock"), 20);
    }

    #[tokio::test]
    async fn business_rule_failures_pass_through() {
        let (executor, _) = executor().await;

        let error = executor
            .execute(&LedgerOperation::CancelExpense(OperationTarget::Last))
            .await
            .expect_err("nothing to cancel");
        assert!(matches!(error, LedgerError::NothingToCancel(_)));
        assert!(error.is_business_rule());
    }
}
