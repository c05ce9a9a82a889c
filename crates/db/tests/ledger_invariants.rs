use std::sync::Arc;

use ledgerbot_core::domain::ledger::{
    MovementKind, NewSale, NewSaleItem, OperationTarget, SaleStatus, StockEntry,
};
use ledgerbot_core::domain::product::ProductId;
use ledgerbot_db::{
    connect_with_settings, migrations, CatalogRepository, DemoSeed, LedgerError, LedgerStore,
    SqlCatalogRepository,
};

async fn seeded_store(max_connections: u32, url: &str) -> LedgerStore {
    let pool = connect_with_settings(url, max_connections, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoSeed::load(&pool).await.expect("seed");
    LedgerStore::new(pool, "USD")
}

async fn product_id(store: &LedgerStore, sku: &str) -> ProductId {
    SqlCatalogRepository::new(store.pool().clone())
        .find_by_sku(sku)
        .await
        .expect("lookup")
        .map(|product| product.id)
        .expect("seeded product")
}

async fn counts(store: &LedgerStore) -> (i64, i64, i64) {
    let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
        .fetch_one(store.pool())
        .await
        .expect("sales");
    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items")
        .fetch_one(store.pool())
        .await
        .expect("items");
    let movements: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements")
        .fetch_one(store.pool())
        .await
        .expect("movements");
    (sales, items, movements)
}

fn paid_sale(lines: &[(ProductId, i64)]) -> NewSale {
    NewSale {
        items: lines
            .iter()
            .map(|(product_id, quantity)| NewSaleItem {
                product_id: *product_id,
                quantity: *quantity,
                unit_price_cents: None,
            })
            .collect(),
        status: SaleStatus::Paid,
        customer_name: None,
        currency: "USD".to_string(),
    }
}

#[tokio::test]
async fn current_stock_is_the_fold_of_movements() {
    let store = seeded_store(1, "sqlite::memory:").await;
    let gold = product_id(&store, "BC-BRACELET-GOLD").await;

    store
        .add_stock(&[StockEntry {
            product_id: gold,
            kind: MovementKind::Adjustment,
            quantity: -4,
            reason: "Conteo".to_string(),
        }])
        .await
        .expect("adjustment");
    store.register_sale(&paid_sale(&[(gold, 3)])).await.expect("sale");
    store.cancel_stock_movement(OperationTarget::Last).await.expect("reverse adjustment");

    let fold: i64 = sqlx::query_scalar(
        "SELECT \
         COALESCE(SUM(CASE WHEN movement_type IN ('IN', 'ADJUSTMENT') THEN quantity ELSE 0 END), 0) \
         - COALESCE(SUM(CASE WHEN movement_type = 'OUT' THEN quantity ELSE 0 END), 0) \
         FROM stock_movements WHERE product_id = ?",
    )
    .bind(gold.0)
    .fetch_one(store.pool())
    .await
    .expect("fold");

    assert_eq!(fold, 20 - 4 - 3 + 4);
    assert_eq!(store.current_stock(gold).await.expect("stock"), fold);
}

#[tokio::test]
async fn oversold_paid_sale_leaves_ledger_untouched() {
    let store = seeded_store(1, "sqlite::memory:").await;
    let gold = product_id(&store, "BC-BRACELET-GOLD").await;
    let black = product_id(&store, "BC-BRACELET-BLACK").await;
    let before = counts(&store).await;

    let error = store
        .register_sale(&paid_sale(&[(gold, 2), (black, 1)]))
        .await
        .expect_err("black bracelet is out of stock");

    assert!(matches!(error, LedgerError::InsufficientStock { available: 0, requested: 1, .. }));
    assert_eq!(
        error.to_string(),
        "No hay suficiente stock de Pulsera de Granos de Café - Negra. Disponible: 0 unidades, \
         solicitado: 1 unidades"
    );
    assert_eq!(counts(&store).await, before);
    assert_eq!(store.current_stock(gold).await.expect("stock"), 20);
}

#[tokio::test]
async fn register_then_cancel_restores_stock_and_revenue() {
    let store = seeded_store(1, "sqlite::memory:").await;
    let gold = product_id(&store, "BC-BRACELET-GOLD").await;
    let keychain = product_id(&store, "BC-KEYCHAIN").await;
    let profit_before = store.profit_summary().await.expect("profit");

    let receipt =
        store.register_sale(&paid_sale(&[(gold, 5), (keychain, 2)])).await.expect("sale");
    assert_eq!(receipt.total_cents, 5 * 3500 + 2 * 2000);
    assert_eq!(store.current_stock(gold).await.expect("stock"), 15);

    store.cancel_sale(OperationTarget::Id(receipt.sale_id)).await.expect("cancel");

    assert_eq!(store.current_stock(gold).await.expect("stock"), 20);
    assert_eq!(store.current_stock(keychain).await.expect("stock"), 30);
    assert_eq!(store.profit_summary().await.expect("profit"), profit_before);

    let again = store
        .cancel_sale(OperationTarget::Id(receipt.sale_id))
        .await
        .expect_err("second cancellation");
    assert!(matches!(again, LedgerError::SaleAlreadyCancelled(_)));
}

#[tokio::test]
async fn concurrent_sales_cannot_oversell() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let store = Arc::new(seeded_store(4, &url).await);
    let gold = product_id(&store, "BC-BRACELET-GOLD").await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.register_sale(&paid_sale(&[(gold, 15)])).await
        }));
    }

    let mut succeeded = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientStock { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!((succeeded, refused), (1, 1));
    assert_eq!(store.current_stock(gold).await.expect("stock"), 5);
}
