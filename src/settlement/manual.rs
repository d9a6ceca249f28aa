//! Single orders entered by hand

use serde::Deserialize;
use uuid::Uuid;

use super::SettlementEngine;
use crate::domain::aggregates::{IntegratedOrder, OptionCatalog, StagedOrder};
use crate::domain::value_objects::Quantity;
use crate::validation::{validate_one, AliasTable};
use crate::OrderError;

pub const MANUAL_MARKET: &str = "수동등록";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ManualOrder {
    pub buyer_name: String,
    pub buyer_phone: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub address: String,
    #[serde(default)]
    pub delivery_message: String,
    pub option_name: String,
    pub quantity: i64,
}

impl ManualOrder {
    /// Required fields left blank, by field name.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("buyer_name", &self.buyer_name),
            ("buyer_phone", &self.buyer_phone),
            ("recipient_name", &self.recipient_name),
            ("recipient_phone", &self.recipient_phone),
            ("address", &self.address),
            ("option_name", &self.option_name),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    fn into_staged(self, order_number: String) -> crate::Result<StagedOrder> {
        let blank = self.blank_fields();
        if !blank.is_empty() {
            return Err(OrderError::InvalidInput(format!("required: {}", blank.join(", "))));
        }
        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or_else(|| OrderError::InvalidInput("quantity must be at least 1".into()))?;
        Ok(StagedOrder {
            market_name: MANUAL_MARKET.into(),
            order_number,
            buyer_name: self.buyer_name.trim().into(),
            buyer_phone: format_phone(&self.buyer_phone),
            recipient_name: self.recipient_name.trim().into(),
            recipient_phone: format_phone(&self.recipient_phone),
            address: self.address.trim().into(),
            delivery_message: self.delivery_message.trim().into(),
            option_name: self.option_name.trim().into(),
            quantity: Quantity::new(quantity),
            ..StagedOrder::default()
        })
    }
}

/// Regroups the digits of a phone number: `0101234` → `010-1234`,
/// `0212345678` → `021-234-5678`, `01012345678` → `010-1234-5678`.
pub fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let d = digits.as_str();
    match d.len() {
        0..=3 => d.to_string(),
        4..=7 => format!("{}-{}", &d[..3], &d[3..]),
        8..=10 => format!("{}-{}-{}", &d[..3], &d[3..6], &d[6..]),
        _ => format!("{}-{}-{}", &d[..3], &d[3..7], &d[7..11]),
    }
}

impl SettlementEngine {
    /// Validates one hand-entered order against the catalog and stores it as registered.
    pub async fn register_manual(&self, organization_id: Uuid, acting_user: Uuid, input: ManualOrder) -> crate::Result<IntegratedOrder> {
        let now = self.clock.now();
        let mut staged = input.into_staged(format!("ORD-{}", now.timestamp_millis()))?;

        let aliases = self.ports.catalog.load_aliases(organization_id).await?;
        AliasTable::from_mappings(&aliases).apply_one(&mut staged);
        let catalog = OptionCatalog::from_products(self.ports.catalog.find_option(&staged.option_name).await?);
        if !validate_one(&mut staged, &catalog) {
            tracing::warn!(%organization_id, option = %staged.option_name, "manual order refused: unknown option");
            return Err(OrderError::UnmatchedOptions { count: 1 });
        }

        let mut order = IntegratedOrder::register(&staged, organization_id, acting_user, now);
        self.ports.orders.insert_orders(std::slice::from_ref(&order)).await?;
        self.publish_events(order.take_events()).await;
        tracing::info!(%organization_id, order_id = %order.id, amount = order.product_amount, "manual order registered");
        Ok(order)
    }
}
