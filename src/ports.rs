//! Collaborator ports consumed by the pipeline.
//!
//! `store::postgres` implements every port on top of sqlx, `store::memory`
//! implements them in-process for tests and database-less runs.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    IntegratedOrder, MarketTemplate, OptionCatalog, OptionNameMapping, OptionProduct, OrderBatch, Organization,
    ShippingStatus, SubAccount,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::DiscountRate;
use crate::StoreError;

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_orders(&self, orders: &[IntegratedOrder]) -> Result<(), StoreError>;

    /// Orders of `organization_id` among `ids`, in the order of `ids`. Unknown ids are skipped.
    async fn fetch_orders(&self, organization_id: Uuid, ids: &[Uuid]) -> Result<Vec<IntegratedOrder>, StoreError>;

    async fn list_by_status(&self, organization_id: Uuid, status: ShippingStatus) -> Result<Vec<IntegratedOrder>, StoreError>;

    /// Persists refreshed prices of orders that are still registered.
    async fn update_prices(&self, orders: &[IntegratedOrder]) -> Result<(), StoreError>;

    /// Writes the order's state only if the stored status still equals `expected`.
    /// Returns `false` when another writer moved the row first.
    async fn save_transition(&self, order: &IntegratedOrder, expected: ShippingStatus) -> Result<bool, StoreError>;

    /// Removes registered orders among `ids`; returns the number removed.
    async fn delete_registered(&self, organization_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Inserts or replaces the ledger row keyed by (organization_id, confirmed_at).
    async fn upsert_batch(&self, batch: &OrderBatch) -> Result<(), StoreError>;
}

// =============================================================================
// Catalog, templates, sellers
// =============================================================================

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_catalog(&self) -> Result<OptionCatalog, StoreError>;
    async fn find_option(&self, option_name: &str) -> Result<Option<OptionProduct>, StoreError>;
    async fn load_aliases(&self, organization_id: Uuid) -> Result<Vec<OptionNameMapping>, StoreError>;
}

#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Templates in display order; detection ties go to the earlier one.
    async fn list_templates(&self) -> Result<Vec<MarketTemplate>, StoreError>;
}

#[async_trait]
pub trait SellerDirectory: Send + Sync {
    async fn organization(&self, organization_id: Uuid) -> Result<Option<Organization>, StoreError>;
    async fn sub_accounts(&self, organization_id: Uuid) -> Result<Vec<SubAccount>, StoreError>;
}

#[async_trait]
pub trait TierDiscounts: Send + Sync {
    /// Discount for a tier code; unknown tiers get zero.
    async fn discount_rate(&self, tier_code: &str) -> Result<DiscountRate, StoreError>;
}

// =============================================================================
// Cash ledger
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DebitReceipt {
    pub new_balance: i64,
}

#[derive(Error, Debug)]
pub enum CashError {
    #[error("insufficient cash balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("organization has no cash account")]
    NoAccount,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait CashLedger: Send + Sync {
    async fn debit(
        &self,
        organization_id: Uuid,
        amount: i64,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<DebitReceipt, CashError>;
}

// =============================================================================
// Notifications
// =============================================================================

/// Admin-facing summary of a status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusChangeNotice {
    pub organization_id: Uuid,
    pub order_ids: Vec<Uuid>,
    pub new_status: ShippingStatus,
    pub total_amount: Option<i64>,
    pub title: String,
    pub message: String,
}

impl StatusChangeNotice {
    pub fn confirmed(organization_id: Uuid, business_name: &str, order_ids: Vec<Uuid>, total_amount: i64) -> Self {
        Self {
            message: format!("{} 님이 총 {}건 공급가 {}원의 주문을 발주확정 하였습니다", business_name, order_ids.len(), format_won(total_amount)),
            title: "발주확정".into(),
            organization_id, order_ids, new_status: ShippingStatus::Confirmed, total_amount: Some(total_amount),
        }
    }

    pub fn cancel_requested(organization_id: Uuid, business_name: &str, order_ids: Vec<Uuid>) -> Self {
        Self {
            message: format!("{} 님이 총 {}건의 주문을 취소요청 하였습니다", business_name, order_ids.len()),
            title: "취소요청".into(),
            organization_id, order_ids, new_status: ShippingStatus::CancelRequested, total_amount: None,
        }
    }
}

/// Thousands-separated amount, e.g. `1,234,000`.
pub fn format_won(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 { out.push('-'); }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { out.push(','); }
        out.push(ch);
    }
    out
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to encode notice: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish notice: {0}")]
    Publish(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_status_change(&self, notice: &StatusChangeNotice) -> Result<(), NotifyError>;

    /// Domain events of order changes that were already persisted.
    async fn publish_events(&self, events: &[DomainEvent]) -> Result<(), NotifyError>;
}

// =============================================================================
// Wiring
// =============================================================================

/// Every collaborator the pipeline talks to.
#[derive(Clone)]
pub struct Ports {
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn CatalogSource>,
    pub templates: Arc<dyn TemplateSource>,
    pub sellers: Arc<dyn SellerDirectory>,
    pub tiers: Arc<dyn TierDiscounts>,
    pub cash: Arc<dyn CashLedger>,
    pub notifier: Arc<dyn Notifier>,
}

impl Ports {
    /// Wires every port except notifications to one backing store.
    pub fn from_store<S>(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self
    where
        S: OrderStore + CatalogSource + TemplateSource + SellerDirectory + TierDiscounts + CashLedger + 'static,
    {
        Self {
            orders: store.clone(),
            catalog: store.clone(),
            templates: store.clone(),
            sellers: store.clone(),
            tiers: store.clone(),
            cash: store,
            notifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_won() {
        assert_eq!(format_won(0), "0");
        assert_eq!(format_won(999), "999");
        assert_eq!(format_won(1000), "1,000");
        assert_eq!(format_won(1234567), "1,234,567");
        assert_eq!(format_won(-60000), "-60,000");
    }

    #[test]
    fn test_notice_messages() {
        let org = Uuid::new_v4();
        let n = StatusChangeNotice::confirmed(org, "달래마켓", vec![Uuid::new_v4(), Uuid::new_v4()], 54000);
        assert_eq!(n.message, "달래마켓 님이 총 2건 공급가 54,000원의 주문을 발주확정 하였습니다");
        let c = StatusChangeNotice::cancel_requested(org, "달래마켓", vec![Uuid::new_v4()]);
        assert_eq!(c.message, "달래마켓 님이 총 1건의 주문을 취소요청 하였습니다");
        assert_eq!(c.new_status, ShippingStatus::CancelRequested);
    }
}
