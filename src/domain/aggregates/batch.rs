//! Order Batch ledger row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::IntegratedOrder;

/// Aggregate of one confirmation action, keyed by (organization_id, confirmed_at).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBatch {
    pub organization_id: Uuid,
    pub confirmed_at: DateTime<Utc>,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub cash_used: i64,
    pub final_deposit_amount: i64,
    pub order_count: i32,
    pub depositor_name: Option<String>,
    pub executor_id: Uuid,
    pub payment_confirmed: bool,
}

impl OrderBatch {
    /// Sums the confirmed orders of one batch. Payment starts unconfirmed.
    pub fn from_confirmed(
        organization_id: Uuid,
        confirmed_at: DateTime<Utc>,
        executor_id: Uuid,
        depositor_name: Option<String>,
        orders: &[IntegratedOrder],
    ) -> Self {
        let mut batch = Self {
            organization_id, confirmed_at, total_amount: 0, discount_amount: 0, cash_used: 0,
            final_deposit_amount: 0, order_count: 0, depositor_name, executor_id, payment_confirmed: false,
        };
        for o in orders {
            batch.total_amount += o.product_amount;
            batch.discount_amount += o.discount_amount;
            batch.cash_used += o.cash_used;
            batch.final_deposit_amount += o.final_deposit_amount;
            batch.order_count += 1;
        }
        batch
    }
}
