//! Organization alias pass

use serde::Serialize;
use std::collections::HashMap;

use crate::domain::aggregates::{OptionNameMapping, StagedOrder};
use crate::domain::value_objects::OptionKey;

/// One alias that fired during a pass, with how many orders it rewrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AliasConversion {
    pub original: String,
    pub mapped: String,
    pub count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MappingReport {
    pub total_orders: usize,
    pub converted_orders: usize,
    /// Filled in after the catalog pass.
    pub unmatched: usize,
    pub conversions: Vec<AliasConversion>,
}

/// Seller spelling → canonical catalog name, keyed by normalized seller spelling.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    by_key: HashMap<OptionKey, String>,
}

impl AliasTable {
    pub fn from_mappings(mappings: &[OptionNameMapping]) -> Self {
        let mut by_key = HashMap::new();
        for m in mappings {
            let key = OptionKey::new(&m.user_option_name);
            let target = m.site_option_name.trim();
            if key.is_empty() || target.is_empty() { continue; }
            by_key.insert(key, target.to_string());
        }
        Self { by_key }
    }

    pub fn resolve(&self, option_name: &str) -> Option<&str> {
        self.by_key.get(&OptionKey::new(option_name)).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.by_key.len() }
    pub fn is_empty(&self) -> bool { self.by_key.is_empty() }

    /// Rewrites one order's option name if an alias exists. Returns the `(original, mapped)` pair on a hit.
    pub fn apply_one(&self, order: &mut StagedOrder) -> Option<(String, String)> {
        let mapped = self.resolve(&order.option_name)?.to_string();
        let original = std::mem::replace(&mut order.option_name, mapped.clone());
        order.original_option_name.get_or_insert_with(|| original.clone());
        order.mapping_applied = true;
        Some((original, mapped))
    }

    pub fn apply(&self, orders: &mut [StagedOrder]) -> MappingReport {
        let mut report = MappingReport { total_orders: orders.len(), ..MappingReport::default() };
        for order in orders.iter_mut() {
            let Some((original, mapped)) = self.apply_one(order) else { continue };
            report.converted_orders += 1;
            match report.conversions.iter_mut().find(|c| c.original == original && c.mapped == mapped) {
                Some(c) => c.count += 1,
                None => report.conversions.push(AliasConversion { original, mapped, count: 1 }),
            }
        }
        if report.converted_orders > 0 {
            tracing::info!(converted = report.converted_orders, aliases = report.conversions.len(), "option aliases applied");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Quantity;

    fn order(option: &str) -> StagedOrder {
        StagedOrder { option_name: option.into(), quantity: Quantity::new(1), ..StagedOrder::default() }
    }

    fn mapping(user: &str, site: &str) -> OptionNameMapping {
        OptionNameMapping { user_option_name: user.into(), site_option_name: site.into() }
    }

    #[test]
    fn test_alias_is_normalized() {
        let table = AliasTable::from_mappings(&[mapping("블랙-XL", "BLACK-XL")]);
        let mut o = order("블랙-xl ");
        assert_eq!(table.apply_one(&mut o), Some(("블랙-xl ".to_string(), "BLACK-XL".to_string())));
        assert_eq!(o.option_name, "BLACK-XL");
        assert_eq!(o.original_option_name.as_deref(), Some("블랙-xl "));
        assert!(o.mapping_applied);
    }

    #[test]
    fn test_report_counts_per_alias() {
        let table = AliasTable::from_mappings(&[mapping("a", "Apple"), mapping("b", "Banana"), mapping(" ", "x")]);
        assert_eq!(table.len(), 2);
        let mut orders = vec![order("a"), order("A"), order("b"), order("c")];
        let report = table.apply(&mut orders);
        assert_eq!(report.total_orders, 4);
        assert_eq!(report.converted_orders, 3);
        assert_eq!(report.conversions.len(), 3);
        assert_eq!(report.conversions[0], AliasConversion { original: "a".into(), mapped: "Apple".into(), count: 1 });
        assert!(!orders[3].mapping_applied);
    }
}
