//! Fuzzy option suggestions (normalized Levenshtein)

use serde::Serialize;

use crate::domain::aggregates::OptionCatalog;

pub const DEFAULT_TOP_N: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Suggestion {
    pub option_name: String,
    pub option_code: Option<String>,
    pub unit_price: i64,
    pub score: f64,
}

/// `1 - distance / max(len)` over trimmed, lowercased input. Always in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 { return 1.0; }
    1.0 - strsim::levenshtein(&a, &b) as f64 / longest as f64
}

/// Top `top_n` catalog entries by descending similarity. Equal scores keep catalog order.
pub fn suggest(option_name: &str, catalog: &OptionCatalog, top_n: usize) -> Vec<Suggestion> {
    let mut scored: Vec<Suggestion> = catalog.iter()
        .map(|(key, product)| Suggestion {
            option_name: product.option_name.clone(),
            option_code: product.option_code.clone(),
            unit_price: product.seller_supply_price,
            score: similarity(option_name, key.as_str()),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_n);
    scored
}
