use sqlx::Row;

use ledgerbot_core::domain::product::{Product, ProductId};

use super::{parse_timestamp, CatalogRepository, RepositoryError};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "id, sku, name, description, unit_cost_cents, unit_price_cents, \
                               is_active, created_at";

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn product_select(filter: &str) -> String {
    format!("SELECT {PRODUCT_COLUMNS} FROM products {filter}")
}

pub(crate) fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sku: String = row.try_get("sku").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_cost_cents: i64 =
        row.try_get("unit_cost_cents").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_price_cents: i64 =
        row.try_get("unit_price_cents").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_active: i64 =
        row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Product {
        id: ProductId(id),
        sku,
        name,
        description,
        unit_cost_cents,
        unit_price_cents,
        active: is_active != 0,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&product_select("WHERE is_active = 1 ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows =
            sqlx::query(&product_select("ORDER BY name, id")).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&product_select("WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&product_select("WHERE UPPER(sku) = UPPER(?)"))
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_skus(&self) -> Result<Vec<String>, RepositoryError> {
        let skus: Vec<String> = sqlx::query_scalar("SELECT sku FROM products ORDER BY sku")
            .fetch_all(&self.pool)
            .await?;
        Ok(skus)
    }
}

#[cfg(test)]
mod tests {
    use ledgerbot_core::domain::product::ProductId;

    use super::SqlCatalogRepository;
    use crate::fixtures::DemoSeed;
    use crate::repositories::CatalogRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");
        pool
    }

    #[tokio::test]
    async fn lists_only_active_products() {
        let pool = setup().await;
        sqlx::query("UPDATE products SET is_active = 0 WHERE sku = 'BC-KEYCHAIN'")
            .execute(&pool)
            .await
            .expect("deactivate");

        let repo = SqlCatalogRepository::new(pool);
        let active = repo.list_active().await.expect("list active");
        let all = repo.list_all().await.expect("list all");

        assert_eq!(active.len(), 3);
        assert_eq!(all.len(), 4);
        assert!(active.iter().all(|product| product.active));
    }

    #[tokio::test]
    async fn sku_lookup_ignores_case() {
        let repo = SqlCatalogRepository::new(setup().await);

        let product = repo
            .find_by_sku("bc-bracelet-gold")
            .await
            .expect("lookup")
            .expect("gold bracelet exists");
        assert_eq!(product.sku, "BC-BRACELET-GOLD");
        assert_eq!(product.unit_price_cents, 3500);

        let by_id = repo.find_by_id(product.id).await.expect("lookup by id");
        assert_eq!(by_id.map(|found| found.name), Some(product.name));
        assert!(repo.find_by_id(ProductId(999)).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn sku_list_includes_every_product() {
        let repo = SqlCatalogRepository::new(setup().await);
        let skus = repo.list_skus().await.expect("skus");
        assert_eq!(
            skus,
            vec!["BC-BRACELET-BLACK", "BC-BRACELET-CLASSIC", "BC-BRACELET-GOLD", "BC-KEYCHAIN"]
        );
    }
}
