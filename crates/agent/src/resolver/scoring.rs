use std::cmp::Ordering;
use std::collections::BTreeSet;

use ledgerbot_core::domain::product::{Candidate, Product};

use super::text::{is_stop_word, number_forms, product_type_code, word_variations, words};

/// A product reference split into descriptor words (variant, colour, model)
/// and product-type words. Stop words are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedReference {
    pub descriptors: Vec<String>,
    pub types: Vec<String>,
}

impl ParsedReference {
    pub fn parse(reference: &str) -> Self {
        let mut descriptors = Vec::new();
        let mut types = Vec::new();
        for word in words(reference) {
            if is_stop_word(&word) {
                continue;
            }
            if product_type_code(&word).is_some() {
                types.push(word);
            } else {
                descriptors.push(word);
            }
        }
        Self { descriptors, types }
    }

    /// Only a product-type word, nothing that tells variants apart.
    pub fn is_generic(&self) -> bool {
        self.descriptors.is_empty() && !self.types.is_empty()
    }

    fn type_codes(&self) -> BTreeSet<&'static str> {
        self.types.iter().filter_map(|word| product_type_code(word)).collect()
    }
}

/// Candidates with a positive score, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranking {
    pub reference: ParsedReference,
    pub candidates: Vec<Candidate>,
}

impl Ranking {
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

pub fn rank(reference: &str, products: &[Product]) -> Ranking {
    let parsed = ParsedReference::parse(reference);
    let mut candidates: Vec<Candidate> = products
        .iter()
        .map(|product| Candidate::from_product(product, score(&parsed, product)))
        .filter(|candidate| candidate.score > 0.0)
        .collect();

    candidates.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.name.cmp(&right.name))
    });

    Ranking { reference: parsed, candidates }
}

pub fn score(reference: &ParsedReference, product: &Product) -> f64 {
    score_name(reference, &product.name, &product.sku)
}

/// Share of the reference's descriptor words found in a product name or SKU.
/// A reference naming a product type never matches a product of another type.
pub fn score_name(reference: &ParsedReference, name: &str, sku: &str) -> f64 {
    let forms = name_forms(name, sku);
    let product_types: BTreeSet<&'static str> =
        words(name).iter().filter_map(|word| product_type_code(word)).collect();
    let reference_types = reference.type_codes();

    if !reference_types.is_empty()
        && !product_types.is_empty()
        && reference_types.is_disjoint(&product_types)
    {
        return 0.0;
    }

    if reference.descriptors.is_empty() {
        let type_matches = reference.types.iter().any(|word| matches_any(word, &forms));
        return if type_matches { 1.0 } else { 0.0 };
    }

    let matched =
        reference.descriptors.iter().filter(|word| matches_any(word, &forms)).count();
    matched as f64 / reference.descriptors.len() as f64
}

fn matches_any(word: &str, forms: &BTreeSet<String>) -> bool {
    word_variations(word).iter().any(|variation| forms.contains(variation))
}

/// Every number form of every word in a product's name and SKU.
fn name_forms(name: &str, sku: &str) -> BTreeSet<String> {
    words(name)
        .into_iter()
        .chain(words(sku))
        .flat_map(|word| number_forms(&word))
        .collect()
}
