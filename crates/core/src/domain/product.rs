use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_cost_cents: i64,
    pub unit_price_cents: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral fuzzy-match result. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub score: f64,
}

impl Candidate {
    pub fn from_product(product: &Product, score: f64) -> Self {
        Self {
            product_id: product.id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            score: score.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Candidate, Product, ProductId};

    #[test]
    fn candidate_score_is_clamped_to_unit_interval() {
        let product = Product {
            id: ProductId(7),
            sku: "BC-BRACELET-GOLD".to_string(),
            name: "Pulsera Dorada".to_string(),
            description: None,
            unit_cost_cents: 1200,
            unit_price_cents: 3500,
            active: true,
            created_at: Utc::now(),
        };

        assert_eq!(Candidate::from_product(&product, 1.7).score, 1.0);
        assert_eq!(Candidate::from_product(&product, -0.2).score, 0.0);
        assert_eq!(Candidate::from_product(&product, 0.5).product_id, ProductId(7));
    }
}
