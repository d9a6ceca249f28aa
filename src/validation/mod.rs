//! Option mapping & validation
//!
//! Alias pass, then catalog pass. Orders whose option name is missing from the
//! supply-price catalog stay unmatched and close the gate for save and confirm.

pub mod alias;
pub mod fuzzy;
pub mod session;

pub use alias::{AliasConversion, AliasTable, MappingReport};
pub use fuzzy::{similarity, suggest, Suggestion, DEFAULT_TOP_N};
pub use session::{ValidationSession, ValidationStats};

use crate::domain::aggregates::{OptionCatalog, StagedOrder};

/// Catalog pass for one order: matched orders get the unit price and line supply price.
pub fn validate_one(order: &mut StagedOrder, catalog: &OptionCatalog) -> bool {
    match catalog.lookup(&order.option_name) {
        Some(product) => {
            order.mark_matched(product.seller_supply_price, product.option_code.clone());
            true
        }
        None => {
            order.mark_unmatched();
            false
        }
    }
}

/// Runs the catalog pass over every order and returns the unmatched count.
pub fn validate_all(orders: &mut [StagedOrder], catalog: &OptionCatalog) -> usize {
    orders.iter_mut().map(|o| validate_one(o, catalog)).filter(|matched| !matched).count()
}
