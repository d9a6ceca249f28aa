//! Price refresh for registered orders

use serde::Serialize;
use uuid::Uuid;

use super::SettlementEngine;
use crate::domain::aggregates::ShippingStatus;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PriceRefreshReport {
    pub refreshed: usize,
    /// Registered orders whose option is no longer in the catalog. They keep their old price and stamp.
    pub unpriced: Vec<Uuid>,
}

impl SettlementEngine {
    /// Re-prices every registered order of the organization from the current catalog.
    pub async fn refresh_prices(&self, organization_id: Uuid) -> crate::Result<PriceRefreshReport> {
        let mut orders = self.ports.orders.list_by_status(organization_id, ShippingStatus::Registered).await?;
        let catalog = self.ports.catalog.load_catalog().await?;
        let now = self.clock.now();

        let mut report = PriceRefreshReport::default();
        let mut updated = Vec::with_capacity(orders.len());
        let mut events = Vec::new();
        for mut order in orders.drain(..) {
            let Some(product) = catalog.lookup(&order.option_name) else {
                report.unpriced.push(order.id);
                continue;
            };
            order.refresh_price(product.seller_supply_price, now)?;
            events.extend(order.take_events());
            updated.push(order);
        }

        self.ports.orders.update_prices(&updated).await?;
        self.publish_events(events).await;
        report.refreshed = updated.len();
        tracing::info!(%organization_id, refreshed = report.refreshed, unpriced = report.unpriced.len(), "prices refreshed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::aggregates::OptionProduct;
    use crate::settlement::engine::tests::fixture;
    use chrono::Duration;

    #[tokio::test]
    async fn test_refresh_reprices_and_stamps() {
        let (f, ids) = fixture(&[(2, 1000), (1, 500)]);
        f.store.set_price_updated_at(ids[0], f.now - Duration::days(2));
        f.store.add_product(OptionProduct { option_name: "OPT-0".into(), option_code: None, seller_supply_price: 1200 });

        let report = f.engine.refresh_prices(f.org).await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.unpriced, vec![ids[1]]);

        let refreshed = f.store.order(ids[0]).unwrap();
        assert_eq!(refreshed.seller_supply_price, 1200);
        assert_eq!(refreshed.product_amount, 2400);
        assert_eq!(refreshed.price_updated_at, Some(f.now));

        let events = f.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "order.price_refreshed");
    }
}
