use std::collections::BTreeMap;

use tokio::sync::RwLock;

use ledgerbot_core::domain::product::{Product, ProductId};

use super::{CatalogRepository, RepositoryError};

/// Catalog held in memory, for resolver tests and dry runs.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    products: RwLock<BTreeMap<ProductId, Product>>,
}

impl InMemoryCatalogRepository {
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products.into_iter().map(|product| (product.id, product)).collect();
        Self { products: RwLock::new(products) }
    }

    pub async fn save(&self, product: Product) {
        let mut products = self.products.write().await;
        products.insert(product.id, product);
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().filter(|product| product.active).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().cloned().collect())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id).cloned())
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        let wanted = sku.trim();
        Ok(products.values().find(|product| product.sku.eq_ignore_ascii_case(wanted)).cloned())
    }

    async fn list_skus(&self) -> Result<Vec<String>, RepositoryError> {
        let products = self.products.read().await;
        let mut skus: Vec<String> = products.values().map(|product| product.sku.clone()).collect();
        skus.sort();
        Ok(skus)
    }
}
