use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_REFERENCE: &str = "seed:opening-stock";

/// Opening catalog and stock the demo dataset guarantees.
const SEED_PRODUCTS: &[SeedProductContract] = &[
    SeedProductContract {
        sku: "BC-BRACELET-CLASSIC",
        name: "Pulsera de Granos de Café - Clásica",
        unit_price_cents: 3500,
        opening_stock: 25,
    },
    SeedProductContract {
        sku: "BC-BRACELET-BLACK",
        name: "Pulsera de Granos de Café - Negra",
        unit_price_cents: 3500,
        opening_stock: 0,
    },
    SeedProductContract {
        sku: "BC-BRACELET-GOLD",
        name: "Pulsera de Granos de Café - Dorada",
        unit_price_cents: 3500,
        opening_stock: 20,
    },
    SeedProductContract {
        sku: "BC-KEYCHAIN",
        name: "Llavero de Granos de Café",
        unit_price_cents: 2000,
        opening_stock: 30,
    },
];

/// Demo catalog for local runs and tests: three bracelet variants (the black
/// one out of stock) and a keychain.
pub struct DemoSeed;

impl DemoSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let products_seeded = SEED_PRODUCTS
            .iter()
            .map(|product| SeedProductInfo {
                sku: product.sku,
                name: product.name,
                opening_stock: product.opening_stock,
            })
            .collect();
        Ok(SeedResult { products_seeded })
    }

    /// Checks every seeded product exists with its price and opening stock.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_PRODUCTS.len() * 2);

        for product in SEED_PRODUCTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM products WHERE sku = ?1 AND name = ?2 \
                 AND unit_price_cents = ?3)",
            )
            .bind(product.sku)
            .bind(product.name)
            .bind(product.unit_price_cents)
            .fetch_one(pool)
            .await?;
            checks.push((product.sku, exists == 1));

            let opening: i64 = sqlx::query_scalar(
                "SELECT COALESCE(SUM(m.quantity), 0) FROM stock_movements m \
                 JOIN products p ON p.id = m.product_id \
                 WHERE p.sku = ?1 AND m.reference = ?2",
            )
            .bind(product.sku)
            .bind(SEED_REFERENCE)
            .fetch_one(pool)
            .await?;
            checks.push((product.stock_label(), opening == product.opening_stock));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the opening stock, and the seeded products nothing else references.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM stock_movements WHERE reference = ?")
            .bind(SEED_REFERENCE)
            .execute(&mut *tx)
            .await?;
        for product in SEED_PRODUCTS {
            sqlx::query(
                "DELETE FROM products WHERE sku = ?1 \
                 AND NOT EXISTS (SELECT 1 FROM stock_movements m WHERE m.product_id = products.id) \
                 AND NOT EXISTS (SELECT 1 FROM sale_items i WHERE i.product_id = products.id)",
            )
            .bind(product.sku)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedProductContract {
    sku: &'static str,
    name: &'static str,
    unit_price_cents: i64,
    opening_stock: i64,
}

impl SeedProductContract {
    fn stock_label(&self) -> &'static str {
        match self.sku {
            "BC-BRACELET-CLASSIC" => "stock-bracelet-classic",
            "BC-BRACELET-BLACK" => "stock-bracelet-black",
            "BC-BRACELET-GOLD" => "stock-bracelet-gold",
            _ => "stock-keychain",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: Vec<SeedProductInfo>,
}

#[derive(Debug)]
pub struct SeedProductInfo {
    pub sku: &'static str,
    pub name: &'static str,
    pub opening_stock: i64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(DemoSeed::SQL.contains("BC-BRACELET-GOLD"));
    }

    #[tokio::test]
    async fn seed_is_verifiable_and_idempotent() {
        let pool = pool().await;

        let first = DemoSeed::load(&pool).await.expect("load seed");
        let first_verification = DemoSeed::verify(&pool).await.expect("verify seed");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.products_seeded.len(), 4);

        DemoSeed::load(&pool).await.expect("reload seed");
        let second_verification = DemoSeed::verify(&pool).await.expect("re-verify seed");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);

        let gold_stock: i64 = sqlx::query_scalar(
            "SELECT stock_qty FROM stock_current WHERE sku = 'BC-BRACELET-GOLD'",
        )
        .fetch_one(&pool)
        .await
        .expect("gold stock");
        assert_eq!(gold_stock, 20);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = pool().await;
        DemoSeed::load(&pool).await.expect("load seed");
        DemoSeed::clean(&pool).await.expect("clean seed");

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .expect("count products");
        assert_eq!(remaining, 0);
        assert!(!DemoSeed::verify(&pool).await.expect("verify").all_present);
    }
}
