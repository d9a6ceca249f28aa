//! Option product catalog and organization alias mappings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::value_objects::OptionKey;

/// Catalog entry: canonical option name with the seller supply unit price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionProduct {
    pub option_name: String,
    pub option_code: Option<String>,
    pub seller_supply_price: i64,
}

impl OptionProduct {
    pub fn key(&self) -> OptionKey { OptionKey::new(&self.option_name) }
}

/// Organization-scoped alias: seller spelling → canonical catalog name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionNameMapping {
    pub user_option_name: String,
    pub site_option_name: String,
}

/// In-memory supply-price catalog keyed by normalized option name.
#[derive(Clone, Debug, Default)]
pub struct OptionCatalog {
    by_key: HashMap<OptionKey, OptionProduct>,
    order: Vec<OptionKey>,
}

impl OptionCatalog {
    pub fn from_products(products: impl IntoIterator<Item = OptionProduct>) -> Self {
        let mut catalog = Self::default();
        for p in products { catalog.insert(p); }
        catalog
    }

    /// Adds or replaces an entry. Later entries with the same key win; iteration order keeps first insertion.
    pub fn insert(&mut self, product: OptionProduct) {
        let key = product.key();
        if key.is_empty() { return; }
        if self.by_key.insert(key.clone(), product).is_none() { self.order.push(key); }
    }

    pub fn get(&self, key: &OptionKey) -> Option<&OptionProduct> { self.by_key.get(key) }
    pub fn lookup(&self, option_name: &str) -> Option<&OptionProduct> { self.get(&OptionKey::new(option_name)) }
    pub fn len(&self) -> usize { self.by_key.len() }
    pub fn is_empty(&self) -> bool { self.by_key.is_empty() }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&OptionKey, &OptionProduct)> {
        self.order.iter().filter_map(move |k| self.by_key.get(k).map(|p| (k, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, price: i64) -> OptionProduct {
        OptionProduct { option_name: name.into(), option_code: None, seller_supply_price: price }
    }

    #[test]
    fn test_lookup_is_normalized() {
        let catalog = OptionCatalog::from_products([product("BLACK-XL", 5000)]);
        assert_eq!(catalog.lookup(" black-xl ").map(|p| p.seller_supply_price), Some(5000));
        assert!(catalog.lookup("black-l").is_none());
    }

    #[test]
    fn test_blank_names_ignored() {
        let catalog = OptionCatalog::from_products([product("  ", 1), product("a", 2), product("A", 3)]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("a").map(|p| p.seller_supply_price), Some(3));
        assert_eq!(catalog.iter().count(), 1);
    }
}
