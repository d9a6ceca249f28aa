//! Domain events
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Raised by aggregates, drained after the change is persisted and handed to the notifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
}

impl DomainEvent {
    /// Dotted event name, used as the subject suffix when published.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Order(e) => e.name(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Registered { order_id: Uuid, organization_id: Uuid },
    Confirmed { order_id: Uuid, order_no: String, product_amount: i64, confirmed_at: DateTime<Utc> },
    CancelRequested { order_id: Uuid, reason: Option<String> },
    Cancelled { order_id: Uuid },
    Preparing { order_id: Uuid },
    Shipped { order_id: Uuid, tracking: Option<String> },
    Refunded { order_id: Uuid, amount: i64 },
    PriceRefreshed { order_id: Uuid, product_amount: i64 },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Registered { order_id, .. }
            | Self::Confirmed { order_id, .. }
            | Self::CancelRequested { order_id, .. }
            | Self::Cancelled { order_id }
            | Self::Preparing { order_id }
            | Self::Shipped { order_id, .. }
            | Self::Refunded { order_id, .. }
            | Self::PriceRefreshed { order_id, .. } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "order.registered",
            Self::Confirmed { .. } => "order.confirmed",
            Self::CancelRequested { .. } => "order.cancel_requested",
            Self::Cancelled { .. } => "order.cancelled",
            Self::Preparing { .. } => "order.preparing",
            Self::Shipped { .. } => "order.shipped",
            Self::Refunded { .. } => "order.refunded",
            Self::PriceRefreshed { .. } => "order.price_refreshed",
        }
    }
}
