use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "products",
        "stock_movements",
        "sales",
        "sale_items",
        "expenses",
        "idx_stock_movements_product_id",
        "idx_stock_movements_created_at",
        "idx_sales_status",
        "idx_sales_created_at",
        "idx_sale_items_sale_id",
        "idx_expenses_expense_date",
        "idx_expenses_created_at",
        "stock_current",
        "revenue_paid",
        "expenses_total",
        "profit_summary",
    ];

    async fn object_count(pool: &sqlx::SqlitePool, kind: &str, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = ?1 AND name = ?2",
        )
        .bind(kind)
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("query sqlite_master")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_ledger_tables_and_views() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ["products", "stock_movements", "sales", "sale_items", "expenses"] {
            assert_eq!(object_count(&pool, "table", table).await, 1, "table {table}");
        }
        for view in ["stock_current", "revenue_paid", "expenses_total", "profit_summary"] {
            assert_eq!(object_count(&pool, "view", view).await, 1, "view {view}");
        }
    }

    #[tokio::test]
    async fn derived_views_start_at_zero() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let row = sqlx::query("SELECT revenue_cents, expenses_cents, profit_cents FROM profit_summary")
            .fetch_one(&pool)
            .await
            .expect("profit summary");
        assert_eq!(row.get::<i64, _>("revenue_cents"), 0);
        assert_eq!(row.get::<i64, _>("expenses_cents"), 0);
        assert_eq!(row.get::<i64, _>("profit_cents"), 0);
    }

    #[tokio::test]
    async fn schema_rejects_zero_quantity_movements() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO products (sku, name, unit_cost_cents, unit_price_cents, created_at)
             VALUES ('BC-TEST', 'Test', 0, 100, '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert product");

        let result = sqlx::query(
            "INSERT INTO stock_movements (product_id, movement_type, quantity, occurred_at, created_at)
             VALUES (1, 'IN', 0, '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(object_count(&pool, "table", "products").await, 0);
        assert_eq!(object_count(&pool, "view", "stock_current").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index', 'view')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
