//! In-process store used by tests and by the binary when no database is configured.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::aggregates::{
    IntegratedOrder, MarketTemplate, OptionCatalog, OptionNameMapping, OptionProduct, OrderBatch, Organization,
    ShippingStatus, SubAccount,
};
use crate::domain::value_objects::{DiscountRate, OptionKey};
use crate::ports::{
    CashError, CashLedger, CatalogSource, DebitReceipt, OrderStore, SellerDirectory, TemplateSource, TierDiscounts,
};
use crate::StoreError;
#[cfg(test)]
use chrono::{DateTime, Utc};
#[cfg(test)]
use crate::domain::events::DomainEvent;
#[cfg(test)]
use crate::ports::{Notifier, NotifyError, StatusChangeNotice};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

/// One row of the cash history.
#[derive(Clone, Debug, PartialEq)]
pub struct CashTransaction {
    pub organization_id: Uuid,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[derive(Default)]
struct State {
    orders: Vec<IntegratedOrder>,
    batches: Vec<OrderBatch>,
    products: Vec<OptionProduct>,
    aliases: HashMap<Uuid, Vec<OptionNameMapping>>,
    templates: Vec<MarketTemplate>,
    organizations: HashMap<Uuid, Organization>,
    sub_accounts: Vec<SubAccount>,
    tiers: HashMap<String, DiscountRate>,
    cash: HashMap<Uuid, i64>,
    cash_history: Vec<CashTransaction>,
    failing_transitions: HashSet<Uuid>,
    fail_batches: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }
    fn state_mut(&mut self) -> &mut State { self.state.get_mut().unwrap_or_else(PoisonError::into_inner) }

    // Builders

    pub fn with_orders(mut self, orders: Vec<IntegratedOrder>) -> Self { self.state_mut().orders.extend(orders); self }
    pub fn with_products(mut self, products: Vec<OptionProduct>) -> Self { self.state_mut().products.extend(products); self }
    pub fn with_templates(mut self, templates: Vec<MarketTemplate>) -> Self { self.state_mut().templates.extend(templates); self }
    pub fn with_sub_accounts(mut self, subs: Vec<SubAccount>) -> Self { self.state_mut().sub_accounts.extend(subs); self }

    pub fn with_aliases(mut self, organization_id: Uuid, aliases: Vec<OptionNameMapping>) -> Self {
        self.state_mut().aliases.entry(organization_id).or_default().extend(aliases);
        self
    }

    pub fn with_organization(mut self, org: Organization) -> Self {
        self.state_mut().organizations.insert(org.id, org);
        self
    }

    pub fn with_tier(mut self, tier_code: &str, rate: DiscountRate) -> Self {
        self.state_mut().tiers.insert(tier_code.to_string(), rate);
        self
    }

    pub fn with_cash(mut self, organization_id: Uuid, balance: i64) -> Self {
        self.state_mut().cash.insert(organization_id, balance);
        self
    }
}

// Inspection and fault injection
#[cfg(test)]
impl MemoryStore {
    pub fn order(&self, id: Uuid) -> Option<IntegratedOrder> { self.state().orders.iter().find(|o| o.id == id).cloned() }
    pub fn batches(&self) -> Vec<OrderBatch> { self.state().batches.clone() }
    pub fn cash_balance(&self, organization_id: Uuid) -> Option<i64> { self.state().cash.get(&organization_id).copied() }
    pub fn cash_history(&self) -> Vec<CashTransaction> { self.state().cash_history.clone() }
    pub fn set_cash(&self, organization_id: Uuid, balance: i64) { self.state().cash.insert(organization_id, balance); }
    pub fn add_product(&self, product: OptionProduct) { self.state().products.push(product); }
    pub fn add_sub_account(&self, sub: SubAccount) { self.state().sub_accounts.push(sub); }

    pub fn add_aliases(&self, organization_id: Uuid, aliases: Vec<OptionNameMapping>) {
        self.state().aliases.entry(organization_id).or_default().extend(aliases);
    }

    pub fn set_status(&self, id: Uuid, status: ShippingStatus) {
        if let Some(o) = self.state().orders.iter_mut().find(|o| o.id == id) { o.status = status; }
    }

    pub fn set_price_updated_at(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(o) = self.state().orders.iter_mut().find(|o| o.id == id) { o.price_updated_at = Some(at); }
    }

    /// Makes every later `save_transition` of `id` fail.
    pub fn fail_transition_for(&self, id: Uuid) { self.state().failing_transitions.insert(id); }
    /// Makes every later `upsert_batch` fail.
    pub fn fail_batches(&self) { self.state().fail_batches = true; }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_orders(&self, orders: &[IntegratedOrder]) -> Result<(), StoreError> {
        self.state().orders.extend(orders.iter().cloned());
        Ok(())
    }

    async fn fetch_orders(&self, organization_id: Uuid, ids: &[Uuid]) -> Result<Vec<IntegratedOrder>, StoreError> {
        let state = self.state();
        let orders = ids.iter()
            .filter_map(|id| state.orders.iter().find(|o| o.id == *id && o.organization_id == organization_id))
            .cloned()
            .collect();
        Ok(orders)
    }

    async fn list_by_status(&self, organization_id: Uuid, status: ShippingStatus) -> Result<Vec<IntegratedOrder>, StoreError> {
        Ok(self.state().orders.iter()
            .filter(|o| o.organization_id == organization_id && o.status == status)
            .cloned()
            .collect())
    }

    async fn update_prices(&self, orders: &[IntegratedOrder]) -> Result<(), StoreError> {
        let mut state = self.state();
        for updated in orders {
            let Some(stored) = state.orders.iter_mut().find(|o| o.id == updated.id && o.is_registered()) else { continue };
            stored.seller_supply_price = updated.seller_supply_price;
            stored.product_amount = updated.product_amount;
            stored.final_deposit_amount = updated.final_deposit_amount;
            stored.price_updated_at = updated.price_updated_at;
        }
        Ok(())
    }

    async fn save_transition(&self, order: &IntegratedOrder, expected: ShippingStatus) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.failing_transitions.contains(&order.id) {
            return Err(StoreError::Unavailable(format!("write to order {} rejected", order.id)));
        }
        match state.orders.iter_mut().find(|o| o.id == order.id && o.organization_id == order.organization_id) {
            Some(stored) if stored.status == expected => {
                *stored = order.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_registered(&self, organization_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut state = self.state();
        let before = state.orders.len();
        state.orders.retain(|o| !(o.organization_id == organization_id && o.is_registered() && ids.contains(&o.id)));
        Ok((before - state.orders.len()) as u64)
    }

    async fn upsert_batch(&self, batch: &OrderBatch) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_batches {
            return Err(StoreError::Unavailable("batch ledger rejected the write".into()));
        }
        match state.batches.iter_mut().find(|b| b.organization_id == batch.organization_id && b.confirmed_at == batch.confirmed_at) {
            Some(existing) => *existing = batch.clone(),
            None => state.batches.push(batch.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn load_catalog(&self) -> Result<OptionCatalog, StoreError> {
        Ok(OptionCatalog::from_products(self.state().products.clone()))
    }

    async fn find_option(&self, option_name: &str) -> Result<Option<OptionProduct>, StoreError> {
        let key = OptionKey::new(option_name);
        Ok(self.state().products.iter().rev().find(|p| p.key() == key).cloned())
    }

    async fn load_aliases(&self, organization_id: Uuid) -> Result<Vec<OptionNameMapping>, StoreError> {
        Ok(self.state().aliases.get(&organization_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl TemplateSource for MemoryStore {
    async fn list_templates(&self) -> Result<Vec<MarketTemplate>, StoreError> {
        let mut templates = self.state().templates.clone();
        templates.sort_by_key(|t| t.display_order);
        Ok(templates)
    }
}

#[async_trait]
impl SellerDirectory for MemoryStore {
    async fn organization(&self, organization_id: Uuid) -> Result<Option<Organization>, StoreError> {
        Ok(self.state().organizations.get(&organization_id).cloned())
    }

    async fn sub_accounts(&self, organization_id: Uuid) -> Result<Vec<SubAccount>, StoreError> {
        Ok(self.state().sub_accounts.iter().filter(|s| s.organization_id == organization_id).cloned().collect())
    }
}

#[async_trait]
impl TierDiscounts for MemoryStore {
    async fn discount_rate(&self, tier_code: &str) -> Result<DiscountRate, StoreError> {
        Ok(self.state().tiers.get(tier_code).copied().unwrap_or_default())
    }
}

#[async_trait]
impl CashLedger for MemoryStore {
    async fn debit(
        &self,
        organization_id: Uuid,
        amount: i64,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<DebitReceipt, CashError> {
        let mut state = self.state();
        let balance = state.cash.get_mut(&organization_id).ok_or(CashError::NoAccount)?;
        if *balance < amount {
            return Err(CashError::InsufficientBalance { balance: *balance, requested: amount });
        }
        *balance -= amount;
        let balance_after = *balance;
        state.cash_history.push(CashTransaction {
            organization_id, amount: -amount, balance_after, description: description.to_string(), metadata,
        });
        Ok(DebitReceipt { new_balance: balance_after })
    }
}

/// Notifier that keeps every notice and event; can be told to fail once.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<StatusChangeNotice>>,
    events: Mutex<Vec<DomainEvent>>,
    fail_next: AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn notices(&self) -> Vec<StatusChangeNotice> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fail_next(&self) { self.fail_next.store(true, Ordering::SeqCst); }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_status_change(&self, notice: &StatusChangeNotice) -> Result<(), NotifyError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(NotifyError::Publish("notifier unavailable".into()));
        }
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).push(notice.clone());
        Ok(())
    }

    async fn publish_events(&self, events: &[DomainEvent]) -> Result<(), NotifyError> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).extend(events.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::staged;

    #[tokio::test]
    async fn test_claim_guard_rejects_stale_expectation() {
        let org = Uuid::new_v4();
        let order = IntegratedOrder::register(&staged("a", 1, 100), org, Uuid::new_v4(), Utc::now());
        let store = MemoryStore::new().with_orders(vec![order.clone()]);

        let mut moved = order.clone();
        moved.status = ShippingStatus::Confirmed;
        assert!(store.save_transition(&moved, ShippingStatus::Registered).await.unwrap());
        assert!(!store.save_transition(&moved, ShippingStatus::Registered).await.unwrap());
    }

    #[tokio::test]
    async fn test_debit_guards_balance() {
        let org = Uuid::new_v4();
        let store = MemoryStore::new().with_cash(org, 1000);
        let receipt = store.debit(org, 400, "발주확정 캐시 사용", serde_json::json!({})).await.unwrap();
        assert_eq!(receipt.new_balance, 600);
        assert!(matches!(store.debit(org, 601, "x", serde_json::Value::Null).await, Err(CashError::InsufficientBalance { balance: 600, .. })));
        assert!(matches!(store.debit(Uuid::new_v4(), 1, "x", serde_json::Value::Null).await, Err(CashError::NoAccount)));
        assert_eq!(store.cash_history()[0].amount, -400);
    }

    #[tokio::test]
    async fn test_fetch_preserves_request_order_and_scope() {
        let org = Uuid::new_v4();
        let a = IntegratedOrder::register(&staged("a", 1, 100), org, Uuid::new_v4(), Utc::now());
        let b = IntegratedOrder::register(&staged("b", 1, 100), org, Uuid::new_v4(), Utc::now());
        let foreign = IntegratedOrder::register(&staged("c", 1, 100), Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        let store = MemoryStore::new().with_orders(vec![a.clone(), b.clone(), foreign.clone()]);
        let fetched = store.fetch_orders(org, &[b.id, foreign.id, a.id]).await.unwrap();
        assert_eq!(fetched.iter().map(|o| o.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    }
}
