//! Validation session over one upload's staged orders

use serde::Serialize;

use super::{fuzzy, validate_all, validate_one, AliasTable, MappingReport, Suggestion};
use crate::domain::aggregates::{OptionCatalog, StagedOrder};
use crate::ports::CatalogSource;
use crate::{OrderError, StoreError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub modified: usize,
}

/// Staged orders plus the catalog and aliases they were validated against.
#[derive(Clone, Debug)]
pub struct ValidationSession {
    orders: Vec<StagedOrder>,
    catalog: OptionCatalog,
    aliases: AliasTable,
    report: MappingReport,
}

impl ValidationSession {
    /// Runs the alias pass then the catalog pass.
    pub fn new(mut orders: Vec<StagedOrder>, catalog: OptionCatalog, aliases: AliasTable) -> Self {
        let mut report = aliases.apply(&mut orders);
        report.unmatched = validate_all(&mut orders, &catalog);
        tracing::info!(total = orders.len(), unmatched = report.unmatched, "staged orders validated");
        Self { orders, catalog, aliases, report }
    }

    pub fn orders(&self) -> &[StagedOrder] { &self.orders }
    pub fn report(&self) -> &MappingReport { &self.report }
    pub fn into_orders(self) -> Vec<StagedOrder> { self.orders }

    pub fn stats(&self) -> ValidationStats {
        let matched = self.orders.iter().filter(|o| o.is_matched()).count();
        ValidationStats {
            total: self.orders.len(),
            matched,
            unmatched: self.orders.len() - matched,
            modified: self.orders.iter().filter(|o| o.modified).count(),
        }
    }

    pub fn can_proceed(&self) -> bool { self.orders.iter().all(StagedOrder::is_matched) }

    pub fn ensure_can_proceed(&self) -> crate::Result<()> {
        match self.stats().unmatched {
            0 => Ok(()),
            count => Err(OrderError::UnmatchedOptions { count }),
        }
    }

    pub fn suggestions(&self, option_name: &str, top_n: usize) -> Vec<Suggestion> {
        fuzzy::suggest(option_name, &self.catalog, top_n)
    }

    /// Replaces one order's option name and re-validates it immediately.
    pub async fn correct(&mut self, index: usize, option_name: &str, source: &dyn CatalogSource) -> crate::Result<&StagedOrder> {
        let order = self.orders.get_mut(index)
            .ok_or_else(|| OrderError::InvalidInput(format!("no staged order at index {index}")))?;
        rename(order, option_name, &self.aliases);
        let name = order.option_name.clone();

        self.ensure_in_catalog(&name, source).await?;
        let order = &mut self.orders[index];
        validate_one(order, &self.catalog);
        self.report.unmatched = self.stats().unmatched;
        tracing::debug!(index, option = %name, matched = self.orders[index].is_matched(), "option corrected");
        Ok(&self.orders[index])
    }

    /// Applies the same correction to every order whose option name equals `from`. Returns the number changed.
    pub async fn bulk_correct(&mut self, from: &str, to: &str, source: &dyn CatalogSource) -> crate::Result<usize> {
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(OrderError::InvalidInput("both source and target option names are required".into()));
        }

        // The alias table may rewrite `to` before lookup.
        let mut target = StagedOrder { option_name: to.to_string(), ..StagedOrder::default() };
        self.aliases.apply_one(&mut target);
        self.ensure_in_catalog(&target.option_name, source).await?;

        let mut changed = 0;
        for order in self.orders.iter_mut().filter(|o| o.option_name.trim() == from) {
            rename(order, to, &self.aliases);
            validate_one(order, &self.catalog);
            changed += 1;
        }
        self.report.unmatched = self.stats().unmatched;
        tracing::info!(from, to, changed, "bulk option correction");
        Ok(changed)
    }

    /// Pulls a single product from the live catalog when the cached one lacks it.
    async fn ensure_in_catalog(&mut self, option_name: &str, source: &dyn CatalogSource) -> Result<(), StoreError> {
        if option_name.trim().is_empty() || self.catalog.lookup(option_name).is_some() { return Ok(()); }
        if let Some(product) = source.find_option(option_name).await? {
            tracing::debug!(option = %product.option_name, "catalog entry fetched on demand");
            self.catalog.insert(product);
        }
        Ok(())
    }
}

fn rename(order: &mut StagedOrder, option_name: &str, aliases: &AliasTable) {
    let previous = std::mem::replace(&mut order.option_name, option_name.trim().to_string());
    order.original_option_name.get_or_insert(previous);
    order.mapping_applied = false;
    order.modified = true;
    aliases.apply_one(order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OptionNameMapping, OptionProduct};
    use crate::domain::value_objects::Quantity;
    use crate::store::memory::MemoryStore;

    fn product(name: &str, price: i64) -> OptionProduct {
        OptionProduct { option_name: name.into(), option_code: None, seller_supply_price: price }
    }

    fn staged(option: &str, qty: u32) -> StagedOrder {
        StagedOrder { option_name: option.into(), quantity: Quantity::new(qty), ..StagedOrder::default() }
    }

    fn session() -> ValidationSession {
        let catalog = OptionCatalog::from_products([product("black-xl", 5000), product("white-m", 4000)]);
        let aliases = AliasTable::from_mappings(&[OptionNameMapping { user_option_name: "흰색M".into(), site_option_name: "white-m".into() }]);
        ValidationSession::new(vec![staged("black-xl", 1), staged("blak-xl", 2), staged("blak-xl", 1), staged("흰색m", 1)], catalog, aliases)
    }

    #[test]
    fn test_gate_closed_while_unmatched() {
        let s = session();
        assert_eq!(s.stats(), ValidationStats { total: 4, matched: 2, unmatched: 2, modified: 0 });
        assert!(!s.can_proceed());
        assert!(matches!(s.ensure_can_proceed(), Err(OrderError::UnmatchedOptions { count: 2 })));
        assert_eq!(s.report().converted_orders, 1);
        assert_eq!(s.suggestions("blak-xl", 1)[0].option_name, "black-xl");
    }

    #[tokio::test]
    async fn test_single_correction_revalidates() {
        let store = MemoryStore::new();
        let mut s = session();
        let order = s.correct(1, " black-xl ", &store).await.unwrap();
        assert!(order.is_matched());
        assert_eq!(order.supply_price, 10000);
        assert_eq!(order.original_option_name.as_deref(), Some("blak-xl"));
        assert_eq!(s.stats().unmatched, 1);
        assert!(s.correct(99, "x", &store).await.is_err());
    }

    #[tokio::test]
    async fn test_bulk_correction_opens_gate() {
        let store = MemoryStore::new();
        let mut s = session();
        assert_eq!(s.bulk_correct("blak-xl", "black-xl", &store).await.unwrap(), 2);
        assert!(s.can_proceed());
        assert_eq!(s.stats().modified, 2);
        assert!(s.bulk_correct("", "black-xl", &store).await.is_err());
    }

    #[tokio::test]
    async fn test_correction_falls_back_to_live_catalog() {
        let store = MemoryStore::new().with_products(vec![product("green-s", 3000)]);
        let mut s = session();
        let order = s.correct(2, "GREEN-S", &store).await.unwrap();
        assert!(order.is_matched());
        assert_eq!(order.unit_price, 3000);
    }
}
