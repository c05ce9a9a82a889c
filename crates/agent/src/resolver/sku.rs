//! SKU generation for products registered without one.
//!
//! `<prefix>-<type>-<descriptor>[-<descriptor>]`, e.g. `Pulseras Azules` ->
//! `BC-PULS-AZUL`. Colours map to one canonical code regardless of gender,
//! number or language.

use std::collections::BTreeSet;

use super::text::{is_product_type, is_stop_word, product_type_code, variant_of, words};

const GENERIC_TYPE: &str = "PROD";
const STANDARD_VARIANT: &str = "STD";
const MAX_DESCRIPTORS: usize = 2;

pub fn base_sku(prefix: &str, name: &str) -> String {
    let words = words(name);
    let type_code =
        words.iter().find_map(|word| product_type_code(word)).unwrap_or(GENERIC_TYPE);

    let descriptors: Vec<String> = words
        .iter()
        .filter(|word| !is_stop_word(word) && !is_product_type(word))
        .filter_map(|word| descriptor_code(word))
        .take(MAX_DESCRIPTORS)
        .collect();
    let descriptor =
        if descriptors.is_empty() { STANDARD_VARIANT.to_string() } else { descriptors.join("-") };

    let prefix = prefix.trim().to_ascii_uppercase();
    if prefix.is_empty() {
        format!("{type_code}-{descriptor}")
    } else {
        format!("{prefix}-{type_code}-{descriptor}")
    }
}

fn descriptor_code(word: &str) -> Option<String> {
    if let Some(variant) = variant_of(word) {
        return Some(variant.code.to_string());
    }
    let code: String =
        word.chars().filter(char::is_ascii_alphanumeric).collect::<String>().to_ascii_uppercase();
    (!code.is_empty()).then_some(code)
}

/// `base`, or `base-2`, `base-3`, ... when taken. Comparison ignores case.
pub fn unique_sku(base: &str, existing: &[String]) -> String {
    let taken: BTreeSet<String> = existing.iter().map(|sku| sku.to_ascii_uppercase()).collect();
    if !taken.contains(base) {
        return base.to_string();
    }

    let mut suffix = 2;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
