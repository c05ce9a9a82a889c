//! Text tooling for product matching: accent folding, singular/plural forms,
//! the bilingual term table and variant (colour) vocabulary.

use std::collections::BTreeSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Words that never identify a product on their own.
pub const STOP_WORDS: &[&str] =
    &["de", "del", "granos", "grano", "cafe", "con", "la", "las", "el", "los", "coffee", "bean", "beans"];

/// Product-type words with their SKU type code.
pub const PRODUCT_TYPES: &[(&str, &str)] = &[
    ("pulsera", "PULS"),
    ("pulseras", "PULS"),
    ("bracelet", "PULS"),
    ("bracelets", "PULS"),
    ("llavero", "LLAV"),
    ("llaveros", "LLAV"),
    ("keychain", "LLAV"),
    ("keychains", "LLAV"),
];

/// Bidirectional Spanish/English term table.
const TRANSLATIONS: &[(&str, &str)] = &[
    ("black", "negra"),
    ("gold", "dorada"),
    ("golden", "dorada"),
    ("classic", "clasica"),
    ("bracelet", "pulsera"),
    ("keychain", "llavero"),
    ("blue", "azul"),
    ("red", "roja"),
    ("green", "verde"),
    ("white", "blanca"),
];

pub struct Variant {
    pub canonical: &'static str,
    pub code: &'static str,
    pub forms: &'static [&'static str],
}

pub const VARIANTS: &[Variant] = &[
    Variant {
        canonical: "negra",
        code: "NEGRA",
        forms: &["negra", "negras", "negro", "negros", "black"],
    },
    Variant {
        canonical: "dorada",
        code: "DORADA",
        forms: &["dorada", "doradas", "dorado", "dorados", "gold", "golden"],
    },
    Variant {
        canonical: "clasica",
        code: "CLASICA",
        forms: &["clasica", "clasicas", "clasico", "clasicos", "classic"],
    },
    Variant { canonical: "azul", code: "AZUL", forms: &["azul", "azules", "blue"] },
    Variant { canonical: "roja", code: "ROJA", forms: &["roja", "rojas", "rojo", "rojos", "red"] },
    Variant {
        canonical: "verde",
        code: "VERDE",
        forms: &["verde", "verdes", "green"],
    },
    Variant {
        canonical: "blanca",
        code: "BLANCA",
        forms: &["blanca", "blancas", "blanco", "blancos", "white"],
    },
];

/// Lower-cases and strips diacritics (`Clásica` -> `clasica`).
pub fn fold(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

/// Folded alphanumeric words.
pub fn words(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

pub fn product_type_code(word: &str) -> Option<&'static str> {
    PRODUCT_TYPES.iter().find(|(type_word, _)| *type_word == word).map(|(_, code)| *code)
}

pub fn is_product_type(word: &str) -> bool {
    product_type_code(word).is_some()
}

pub fn variant_of(word: &str) -> Option<&'static Variant> {
    VARIANTS.iter().find(|variant| variant.forms.contains(&word))
}

/// Singular/plural forms of a folded word, the word itself first.
pub fn number_forms(word: &str) -> Vec<String> {
    let mut forms = vec![word.to_string()];
    match word.strip_suffix('s') {
        Some(stem) if stem.len() > 1 => {
            forms.push(stem.to_string());
            // azules -> azul
            if let Some(stem) =
                stem.strip_suffix('e').filter(|stem| stem.len() > 2 && ends_in_consonant(stem))
            {
                forms.push(stem.to_string());
            }
        }
        Some(_) => {}
        None => {
            forms.push(format!("{word}s"));
            if ends_in_consonant(word) {
                forms.push(format!("{word}es"));
            }
        }
    }
    forms
}

fn ends_in_consonant(stem: &str) -> bool {
    stem.chars().last().is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
}

pub fn translate(word: &str) -> Option<&'static str> {
    TRANSLATIONS.iter().find_map(|(english, spanish)| {
        if *english == word {
            Some(*spanish)
        } else if *spanish == word {
            Some(*english)
        } else {
            None
        }
    })
}

/// Every spelling a reference word may take in a product name: number forms
/// of the word and of its translation.
pub fn word_variations(word: &str) -> BTreeSet<String> {
    let mut variations = BTreeSet::new();
    for form in number_forms(word) {
        if let Some(translated) = translate(&form) {
            variations.extend(number_forms(translated));
        }
        variations.insert(form);
    }
    variations
}

/// Canonical variants mentioned anywhere in an utterance
/// (`vendí 20 pulseras doradas` -> `{dorada}`).
pub fn detect_variant_hints(utterance: &str) -> BTreeSet<String> {
    words(utterance)
        .iter()
        .filter_map(|word| variant_of(word))
        .map(|variant| variant.canonical.to_string())
        .collect()
}

pub fn has_variant_token(reference: &str) -> bool {
    words(reference).iter().any(|word| variant_of(word).is_some())
}

/// Appends the hinted variant to a reference that names none. Several hints
/// cannot be attributed to one reference and leave it unchanged.
pub fn apply_variant_hint(reference: &str, hints: &BTreeSet<String>) -> String {
    if hints.len() != 1 || has_variant_token(reference) {
        return reference.to_string();
    }
    match hints.iter().next() {
        Some(hint) => format!("{} {hint}", reference.trim()),
        None => reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    struct Case {
        input: &'static str,
        expected: &'static [&'static str],
    }

    #[test]
    fn fold_strips_accents_and_case() {
        assert_eq!(fold("Pulsera Clásica"), "pulsera clasica");
        assert_eq!(fold("CAFÉ"), "cafe");
        assert_eq!(words("Pulsera de Granos de Café - Dorada"), vec![
            "pulsera", "de", "granos", "de", "cafe", "dorada"
        ]);
    }

    #[test]
    fn variations_cover_number_and_language() {
        let cases = [
            Case { input: "doradas", expected: &["doradas", "dorada"] },
            Case { input: "gold", expected: &["gold", "dorada"] },
            Case { input: "negra", expected: &["negra", "negras", "black"] },
            Case { input: "bracelets", expected: &["bracelets", "bracelet", "pulsera"] },
            Case { input: "azules", expected: &["azules", "azul", "blue"] },
        ];

        for case in cases {
            let variations = word_variations(case.input);
            for expected in case.expected {
                assert!(variations.contains(*expected), "{} should yield {expected}", case.input);
            }
        }
    }

    #[test]
    fn hints_are_detected_in_canonical_form() {
        let cases = [
            Case { input: "vendí 20 pulseras doradas", expected: &["dorada"] },
            Case { input: "entraron 50 negras", expected: &["negra"] },
            Case { input: "agrego stock de clásicas", expected: &["clasica"] },
            Case { input: "vendí 2 gold y 1 black", expected: &["dorada", "negra"] },
            Case { input: "vendí 3 llaveros", expected: &[] },
        ];

        for case in cases {
            let expected: BTreeSet<String> = case.expected.iter().map(|s| s.to_string()).collect();
            assert_eq!(detect_variant_hints(case.input), expected, "{}", case.input);
        }
    }

    #[test]
    fn hint_is_appended_only_when_reference_lacks_a_variant() {
        let single: BTreeSet<String> = ["dorada".to_string()].into();
        let several: BTreeSet<String> = ["dorada".to_string(), "negra".to_string()].into();

        assert_eq!(apply_variant_hint("pulsera", &single), "pulsera dorada");
        assert_eq!(apply_variant_hint("pulsera dorada", &several), "pulsera dorada");
        assert_eq!(apply_variant_hint("pulsera negra", &single), "pulsera negra");
        assert_eq!(apply_variant_hint("pulsera", &several), "pulsera");
    }

    #[test]
    fn type_and_stop_words_are_recognized() {
        assert_eq!(product_type_code("llaveros"), Some("LLAV"));
        assert!(is_product_type("bracelet"));
        assert!(!is_product_type("dorada"));
        assert!(is_stop_word("granos"));
        assert_eq!(variant_of("rojo").map(|variant| variant.code), Some("ROJA"));
    }
}
