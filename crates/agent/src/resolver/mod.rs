//! Entity resolution: turns a validated [`WritePayload`] into a
//! [`LedgerOperation`] whose product references are concrete catalog ids.
//!
//! Product references go through an exact SKU lookup, then deterministic
//! scoring over the catalog. The [`ConfidencePolicy`] decides whether the score
//! alone settles it or the escalation strategy has to pick among close
//! candidates. Generic references (`pulsera` with several bracelets in the
//! catalog) are never guessed.

pub mod scoring;
pub mod sku;
pub mod strategy;
pub mod text;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use ledgerbot_core::domain::ledger::{
    LedgerOperation, NewExpense, NewProduct, NewSale, NewSaleItem, StockEntry,
};
use ledgerbot_core::domain::payload::{
    ExpenseDraft, ProductDraft, SaleDraft, StockLineRequest, WritePayload,
};
use ledgerbot_core::domain::product::{Candidate, Product};
use ledgerbot_db::{CatalogRepository, RepositoryError};
use thiserror::Error;
use tracing::{debug, info};

pub use strategy::{
    ConfidencePolicy, Decision, LlmDisambiguator, ResolutionStrategy, TopScoreStrategy,
};
pub use text::detect_variant_hints;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("'{reference}' puede ser más de un producto. Necesito que especifiques cuál: {}", .options.join(", "))]
    TooGeneric { reference: String, options: Vec<String> },
    #[error("Producto no encontrado: '{reference}'. Productos disponibles: {}", available(.options))]
    NotFound { reference: String, options: Vec<String> },
    #[error("No entendí la fecha '{0}'. Usá hoy, ayer, anteayer o una fecha como 2026-03-01")]
    InvalidDate(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ResolveError {
    /// Resolution failures the user can fix by rephrasing.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Repository(_))
    }
}

fn available(options: &[String]) -> String {
    if options.is_empty() {
        "ninguno".to_string()
    } else {
        options.join(", ")
    }
}

/// Which products a reference may resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogScope {
    Active,
    /// Deactivation has to find already inactive products to report them.
    All,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub candidate: Candidate,
    pub strategy: &'static str,
}

pub struct EntityResolver {
    catalog: Arc<dyn CatalogRepository>,
    escalation: Arc<dyn ResolutionStrategy>,
    policy: ConfidencePolicy,
    currency: String,
    sku_prefix: String,
}

impl EntityResolver {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        escalation: Arc<dyn ResolutionStrategy>,
        policy: ConfidencePolicy,
        currency: impl Into<String>,
        sku_prefix: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            escalation,
            policy,
            currency: currency.into(),
            sku_prefix: sku_prefix.into(),
        }
    }

    /// Resolves every reference in `payload`. `utterance` is the user's own
    /// message, scanned for variant hints; `today` anchors relative dates.
    pub async fn resolve(
        &self,
        payload: &WritePayload,
        utterance: &str,
        today: NaiveDate,
    ) -> Result<LedgerOperation, ResolveError> {
        let hints = detect_variant_hints(utterance);

        let operation = match payload {
            WritePayload::RegisterProduct(draft) => {
                LedgerOperation::RegisterProduct(self.new_product(draft).await?)
            }
            WritePayload::RegisterSale(draft) => {
                LedgerOperation::RegisterSale(self.new_sale(draft, &hints).await?)
            }
            WritePayload::RegisterExpense(draft) => {
                LedgerOperation::RegisterExpense(self.new_expense(draft, today)?)
            }
            WritePayload::AddStock(lines) => {
                LedgerOperation::AddStock(self.stock_entries(lines, &hints).await?)
            }
            WritePayload::RemoveStock(lines) => {
                LedgerOperation::RemoveStock(self.stock_entries(lines, &hints).await?)
            }
            WritePayload::MarkSalePaid(target) => LedgerOperation::MarkSalePaid(*target),
            WritePayload::CancelSale(target) => LedgerOperation::CancelSale(*target),
            WritePayload::CancelExpense(target) => LedgerOperation::CancelExpense(*target),
            WritePayload::CancelStockMovement(target) => {
                LedgerOperation::CancelStockMovement(*target)
            }
            WritePayload::CancelLastOperation => LedgerOperation::CancelLastOperation,
            WritePayload::DeactivateProduct { product_ref } => {
                let resolution =
                    self.resolve_product(product_ref, &hints, CatalogScope::All).await?;
                LedgerOperation::DeactivateProduct(resolution.candidate.product_id)
            }
        };

        Ok(operation)
    }

    pub async fn resolve_product(
        &self,
        reference: &str,
        hints: &BTreeSet<String>,
        scope: CatalogScope,
    ) -> Result<Resolution, ResolveError> {
        let reference = reference.trim();
        if let Some(product) = self.catalog.find_by_sku(reference).await? {
            return Ok(self.accepted(reference, Candidate::from_product(&product, 1.0), "sku"));
        }

        let products = match scope {
            CatalogScope::Active => self.catalog.list_active().await?,
            CatalogScope::All => self.catalog.list_all().await?,
        };

        let hinted = text::apply_variant_hint(reference, hints);
        let mut outcome = self.resolve_among(&hinted, &products).await;
        if hinted != reference && matches!(outcome, Err(ResolveError::NotFound { .. })) {
            outcome = self.resolve_among(reference, &products).await;
        }
        let resolution = outcome?;

        if let Some(hint) = unaligned_hint(&resolution.candidate.name, hints) {
            let forced = format!("{reference} {hint}");
            if let Ok(realigned) = self.resolve_among(&forced, &products).await {
                if names_variant(&realigned.candidate.name, hint) {
                    debug!(
                        event_name = "resolver.product.realigned",
                        reference,
                        hint,
                        product_id = realigned.candidate.product_id.0,
                        "resolution retried with the variant from the message"
                    );
                    return Ok(realigned);
                }
            }
        }

        Ok(resolution)
    }

    async fn resolve_among(
        &self,
        reference: &str,
        products: &[Product],
    ) -> Result<Resolution, ResolveError> {
        let ranking = scoring::rank(reference, products);
        match self.policy.decide(&ranking) {
            Decision::Accept(candidate) => Ok(self.accepted(reference, candidate, "deterministic")),
            Decision::Escalate(candidates) => {
                let picked = self.escalation.choose(reference, &candidates).await;
                match picked {
                    Some(candidate) => {
                        Ok(self.accepted(reference, candidate, self.escalation.name()))
                    }
                    None => Err(not_found(reference, products)),
                }
            }
            Decision::TooGeneric(candidates) => Err(ResolveError::TooGeneric {
                reference: reference.to_string(),
                options: candidates.iter().map(|candidate| candidate.name.clone()).collect(),
            }),
            Decision::NoMatch => Err(not_found(reference, products)),
        }
    }

    fn accepted(&self, reference: &str, candidate: Candidate, strategy: &'static str) -> Resolution {
        info!(
            event_name = "resolver.product.resolved",
            reference,
            product_id = candidate.product_id.0,
            sku = %candidate.sku,
            score = candidate.score,
            strategy,
            "product reference resolved"
        );
        Resolution { candidate, strategy }
    }

    async fn new_product(&self, draft: &ProductDraft) -> Result<NewProduct, ResolveError> {
        let (sku, sku_generated) = match &draft.sku {
            Some(sku) => (sku.trim().to_ascii_uppercase(), false),
            None => {
                let existing = self.catalog.list_skus().await?;
                (sku::unique_sku(&sku::base_sku(&self.sku_prefix, &draft.name), &existing), true)
            }
        };

        Ok(NewProduct {
            sku,
            sku_generated,
            name: draft.name.clone(),
            description: draft.description.clone(),
            unit_cost_cents: draft.unit_cost_cents,
            unit_price_cents: draft.unit_price_cents,
        })
    }

    async fn new_sale(
        &self,
        draft: &SaleDraft,
        hints: &BTreeSet<String>,
    ) -> Result<NewSale, ResolveError> {
        let mut items = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let resolution =
                self.resolve_product(&line.product_ref, hints, CatalogScope::Active).await?;
            items.push(NewSaleItem {
                product_id: resolution.candidate.product_id,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
            });
        }

        Ok(NewSale {
            items,
            status: draft.status,
            customer_name: draft.customer_name.clone(),
            currency: self.currency.clone(),
        })
    }

    fn new_expense(&self, draft: &ExpenseDraft, today: NaiveDate) -> Result<NewExpense, ResolveError> {
        let expense_date = match &draft.date {
            Some(raw) => resolve_date(raw, today)?,
            None => today,
        };

        Ok(NewExpense {
            expense_date,
            category: draft.category.clone(),
            description: draft.description.clone(),
            amount_cents: draft.amount_cents,
            currency: self.currency.clone(),
        })
    }

    async fn stock_entries(
        &self,
        lines: &[StockLineRequest],
        hints: &BTreeSet<String>,
    ) -> Result<Vec<StockEntry>, ResolveError> {
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            let resolution =
                self.resolve_product(&line.product_ref, hints, CatalogScope::Active).await?;
            entries.push(StockEntry {
                product_id: resolution.candidate.product_id,
                kind: line.kind,
                quantity: line.quantity,
                reason: line.reason.clone(),
            });
        }
        Ok(entries)
    }
}

/// The single hint the resolved name fails to carry, if any.
fn unaligned_hint<'a>(name: &str, hints: &'a BTreeSet<String>) -> Option<&'a str> {
    if hints.len() != 1 {
        return None;
    }
    hints.iter().next().map(String::as_str).filter(|hint| !names_variant(name, hint))
}

fn names_variant(name: &str, canonical: &str) -> bool {
    text::words(name)
        .iter()
        .filter_map(|word| text::variant_of(word))
        .any(|variant| variant.canonical == canonical)
}

fn not_found(reference: &str, products: &[Product]) -> ResolveError {
    ResolveError::NotFound {
        reference: reference.to_string(),
        options: products
            .iter()
            .filter(|product| product.active)
            .map(|product| format!("{} ({})", product.name, product.sku))
            .collect(),
    }
}

/// `hoy`, `ayer`, `anteayer` (and their English forms) or an ISO date.
pub fn resolve_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, ResolveError> {
    let folded = text::fold(raw.trim());
    match folded.as_str() {
        "" | "hoy" | "today" => return Ok(today),
        "ayer" | "yesterday" => return Ok(today - Duration::days(1)),
        "anteayer" | "antier" | "day before yesterday" => return Ok(today - Duration::days(2)),
        _ => {}
    }

    let date_part = folded.get(..10).unwrap_or(&folded);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&folded, "%d/%m/%Y"))
        .map_err(|_| ResolveError::InvalidDate(raw.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use ledgerbot_core::domain::intent::OperationKind;
    use ledgerbot_core::domain::ledger::{LedgerOperation, MovementKind};
    use ledgerbot_core::domain::payload::WritePayload;
    use ledgerbot_core::domain::product::{Product, ProductId};
    use ledgerbot_db::InMemoryCatalogRepository;
    use serde_json::{json, Value};

    use super::{
        resolve_date, CatalogScope, ConfidencePolicy, EntityResolver, ResolveError,
        TopScoreStrategy,
    };

    fn product(id: i64, sku: &str, name: &str, active: bool) -> Product {
        Product {
            id: ProductId(id),
            sku: sku.to_string(),
            name: name.to_string(),
            description: None,
            unit_cost_cents: 1200,
            unit_price_cents: 3500,
            active,
            created_at: Utc::now(),
        }
    }

    fn resolver() -> EntityResolver {
        let catalog = InMemoryCatalogRepository::with_products([
            product(1, "BC-BRACELET-CLASSIC", "Pulsera de Granos de Café - Clásica", true),
            product(2, "BC-BRACELET-BLACK", "Pulsera de Granos de Café - Negra", true),
            product(3, "BC-BRACELET-GOLD", "Pulsera de Granos de Café - Dorada", true),
            product(4, "BC-KEYCHAIN", "Llavero de Granos de Café", true),
            product(5, "BC-PULS-AZUL", "Pulseras Azules", false),
        ]);
        EntityResolver::new(
            Arc::new(catalog),
            Arc::new(TopScoreStrategy),
            ConfidencePolicy::default(),
            "USD",
            "BC",
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).expect("date")
    }

    fn payload(kind: OperationKind, entities: Value) -> WritePayload {
        let map = entities.as_object().cloned().unwrap_or_default();
        WritePayload::from_entities(kind, &map).expect("valid payload")
    }

    async fn resolved_id(resolver: &EntityResolver, reference: &str) -> ProductId {
        resolver
            .resolve_product(reference, &BTreeSet::new(), CatalogScope::Active)
            .await
            .expect(reference)
            .candidate
            .product_id
    }

    #[tokio::test]
    async fn bilingual_and_plural_references_resolve_to_one_product() {
        let resolver = resolver();
        for (reference, expected) in [
            ("doradas", 3),
            ("dorada", 3),
            ("pulseras doradas", 3),
            ("gold", 3),
            ("negras", 2),
            ("black", 2),
            ("granos negra", 2),
            ("clasicas", 1),
            ("classic", 1),
            ("Pulsera Clasica", 1),
            ("LLAVERO", 4),
            ("bc-bracelet-gold", 3),
        ] {
            assert_eq!(resolved_id(&resolver, reference).await, ProductId(expected), "{reference}");
        }
    }

    #[tokio::test]
    async fn generic_reference_asks_for_specification() {
        let error = resolver()
            .resolve_product("pulsera", &BTreeSet::new(), CatalogScope::Active)
            .await
            .expect_err("too generic");

        assert!(matches!(error, ResolveError::TooGeneric { ref options, .. } if options.len() == 3));
        assert!(error.to_string().contains("especifiques"));
        assert!(error.is_user_facing());
    }

    #[tokio::test]
    async fn unknown_reference_lists_active_products() {
        let error = resolver()
            .resolve_product("taza de cerámica", &BTreeSet::new(), CatalogScope::Active)
            .await
            .expect_err("not found");

        let message = error.to_string();
        assert!(message.contains("no encontrado"), "{message}");
        assert!(message.contains("taza de cerámica"));
        assert!(message.contains("Llavero de Granos de Café (BC-KEYCHAIN)"));
        assert!(!message.contains("Pulseras Azules"));
    }

    #[tokio::test]
    async fn variant_hint_from_the_message_settles_generic_references() {
        let resolver = resolver();
        let hints = super::detect_variant_hints("vendí 20 pulseras doradas");

        let resolution = resolver
            .resolve_product("pulsera", &hints, CatalogScope::Active)
            .await
            .expect("hinted resolution");
        assert_eq!(resolution.candidate.product_id, ProductId(3));

        let keychain = resolver
            .resolve_product("llavero", &super::detect_variant_hints("2 negras y 1 llavero"), CatalogScope::Active)
            .await
            .expect("hint that does not apply is dropped");
        assert_eq!(keychain.candidate.product_id, ProductId(4));
    }

    #[tokio::test]
    async fn sale_payload_resolves_every_line() {
        let operation = resolver()
            .resolve(
                &payload(
                    OperationKind::RegisterSale,
                    json!({"items": [
                        {"product_ref": "doradas", "quantity": 2},
                        {"product_ref": "llavero", "quantity": 1, "unit_price": 15}
                    ]}),
                ),
                "vendí 2 doradas y un llavero a 15",
                today(),
            )
            .await
            .expect("resolved sale");

        let LedgerOperation::RegisterSale(sale) = operation else {
            panic!("expected a sale");
        };
        assert_eq!(sale.currency, "USD");
        assert_eq!(sale.items[0].product_id, ProductId(3));
        assert_eq!(sale.items[1].product_id, ProductId(4));
        assert_eq!(sale.items[1].unit_price_cents, Some(1500));
    }

    #[tokio::test]
    async fn product_without_sku_gets_a_generated_one() {
        let operation = resolver()
            .resolve(
                &payload(
                    OperationKind::RegisterProduct,
                    json!({"name": "Pulseras Azules", "unit_price": 12}),
                ),
                "nuevas pulseras azules a 12",
                today(),
            )
            .await
            .expect("resolved product");

        let LedgerOperation::RegisterProduct(product) = operation else {
            panic!("expected a product");
        };
        assert_eq!(product.sku, "BC-PULS-AZUL-2");
        assert!(product.sku_generated);
        assert_eq!(product.unit_price_cents, 1200);

        let given = resolver()
            .resolve(
                &payload(
                    OperationKind::RegisterProduct,
                    json!({"name": "Pulsera Azul", "unit_price": 12, "sku": "bc-azul"}),
                ),
                "nueva pulsera azul código bc-azul",
                today(),
            )
            .await
            .expect("resolved product");
        let LedgerOperation::RegisterProduct(product) = given else {
            panic!("expected a product");
        };
        assert_eq!(product.sku, "BC-AZUL");
        assert!(!product.sku_generated);
    }

    #[tokio::test]
    async fn expense_dates_and_stock_lines_resolve() {
        let resolver = resolver();
        let expense = resolver
            .resolve(
                &payload(
                    OperationKind::RegisterExpense,
                    json!({"amount": 50, "description": "envíos", "date": "ayer"}),
                ),
                "ayer gasté 50 en envíos",
                today(),
            )
            .await
            .expect("expense");
        let LedgerOperation::RegisterExpense(expense) = expense else {
            panic!("expected an expense");
        };
        assert_eq!(expense.expense_date, NaiveDate::from_ymd_opt(2026, 3, 9).expect("date"));

        let stock = resolver
            .resolve(
                &payload(
                    OperationKind::AddStock,
                    json!({"items": [
                        {"product_ref": "clasicas", "quantity": 400},
                        {"product_ref": "doradas", "quantity": 200}
                    ]}),
                ),
                "entraron 400 clásicas y 200 doradas",
                today(),
            )
            .await
            .expect("stock");
        let LedgerOperation::AddStock(entries) = stock else {
            panic!("expected stock entries");
        };
        let resolved: Vec<(ProductId, MovementKind, i64)> =
            entries.iter().map(|entry| (entry.product_id, entry.kind, entry.quantity)).collect();
        assert_eq!(
            resolved,
            vec![(ProductId(1), MovementKind::In, 400), (ProductId(3), MovementKind::In, 200)]
        );
    }

    #[tokio::test]
    async fn deactivation_finds_inactive_products() {
        let operation = resolver()
            .resolve(
                &WritePayload::DeactivateProduct { product_ref: "pulseras azules".to_string() },
                "desactivá las pulseras azules",
                today(),
            )
            .await
            .expect("resolved");
        assert_eq!(operation, LedgerOperation::DeactivateProduct(ProductId(5)));
    }

    #[test]
    fn relative_and_iso_dates_resolve() {
        let today = today();
        assert_eq!(resolve_date("Hoy", today).expect("hoy"), today);
        assert_eq!(resolve_date("yesterday", today).expect("ayer"), today.pred_opt().expect("d"));
        assert_eq!(
            resolve_date("anteayer", today).expect("anteayer"),
            NaiveDate::from_ymd_opt(2026, 3, 8).expect("date")
        );
        assert_eq!(
            resolve_date("2026-02-28T10:00:00", today).expect("iso"),
            NaiveDate::from_ymd_opt(2026, 2, 28).expect("date")
        );
        assert_eq!(
            resolve_date("01/03/2026", today).expect("dd/mm/yyyy"),
            NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")
        );
        assert!(matches!(resolve_date("el finde", today), Err(ResolveError::InvalidDate(_))));
    }
}
