//! Confirmation transaction

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::allocation::{allocate, total_discount};
use super::order_no::{assign_order_numbers, resolve_seller_code};
use super::OrgClock;
use crate::domain::aggregates::{
    missing_profile_fields, ConfirmationLine, IntegratedOrder, OrderBatch, Organization, ShippingStatus, SubAccount,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::DiscountRate;
use crate::ports::{Ports, StatusChangeNotice};
use crate::OrderError;

pub struct ConfirmRequest {
    pub organization_id: Uuid,
    pub acting_user: Uuid,
    pub order_ids: Vec<Uuid>,
    pub cash_amount: i64,
    pub sub_account_id: Option<Uuid>,
    pub depositor_name: Option<String>,
}

/// Something that went wrong after the orders were already confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationWarning {
    CashNotDeducted { amount: i64, reason: String },
    BatchLedgerFailed { reason: String },
    NotificationFailed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmedLine {
    pub order_id: Uuid,
    pub order_no: String,
    pub product_amount: i64,
    pub discount_amount: i64,
    pub cash_used: i64,
    pub final_deposit_amount: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfirmationOutcome {
    pub confirmed_at: DateTime<Utc>,
    pub seller_code: String,
    pub discount_rate: Decimal,
    pub lines: Vec<ConfirmedLine>,
    pub batch: OrderBatch,
    pub new_cash_balance: Option<i64>,
    pub warnings: Vec<ConfirmationWarning>,
}

impl ConfirmationOutcome {
    pub fn is_clean(&self) -> bool { self.warnings.is_empty() }
}

/// Settlement operations over the collaborator ports.
#[derive(Clone)]
pub struct SettlementEngine {
    pub(crate) ports: Ports,
    pub(crate) clock: OrgClock,
}

impl SettlementEngine {
    pub fn new(ports: Ports, clock: OrgClock) -> Self { Self { ports, clock } }

    pub fn clock(&self) -> &OrgClock { &self.clock }

    /// Tier discount of the organization; organizations without a tier get zero.
    pub async fn discount_rate_for(&self, org: &Organization) -> crate::Result<DiscountRate> {
        match org.tier_code.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(tier) => Ok(self.ports.tiers.discount_rate(tier).await?),
            None => Ok(DiscountRate::zero()),
        }
    }

    /// Hands persisted changes' events to the notifier. Failures are only logged.
    pub(crate) async fn publish_events(&self, events: Vec<DomainEvent>) {
        if events.is_empty() { return; }
        if let Err(e) = self.ports.notifier.publish_events(&events).await {
            tracing::warn!(error = %e, events = events.len(), "domain events not published");
        }
    }

    pub(crate) async fn organization(&self, organization_id: Uuid) -> crate::Result<Organization> {
        self.ports.sellers.organization(organization_id).await?
            .ok_or_else(|| OrderError::InvalidInput(format!("unknown organization {organization_id}")))
    }

    /// Orders of the organization in request order; any unknown id fails the whole call.
    pub(crate) async fn load_selection(&self, organization_id: Uuid, ids: &[Uuid]) -> crate::Result<Vec<IntegratedOrder>> {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) { unique.push(*id); }
        }
        if unique.is_empty() { return Err(OrderError::EmptySelection); }

        let orders = self.ports.orders.fetch_orders(organization_id, &unique).await?;
        if let Some(missing) = unique.iter().find(|id| !orders.iter().any(|o| o.id == **id)) {
            return Err(OrderError::OrderNotFound(*missing));
        }
        Ok(orders)
    }

    /// Confirms registered orders as one batch.
    ///
    /// Every precondition is checked before the first write. Row updates are
    /// claim-guarded and stop at the first failure; the ledger upsert, cash debit
    /// and notification that follow report problems as warnings.
    pub async fn confirm(&self, req: ConfirmRequest) -> crate::Result<ConfirmationOutcome> {
        let orders = self.load_selection(req.organization_id, &req.order_ids).await?;
        let org = self.organization(req.organization_id).await?;
        let sub_accounts = self.ports.sellers.sub_accounts(req.organization_id).await?;
        let selected = match req.sub_account_id {
            Some(id) => Some(sub_accounts.iter().find(|s| s.id == id)
                .ok_or_else(|| OrderError::InvalidInput(format!("unknown sub-account {id}")))?),
            None => None,
        };
        let depositor = req.depositor_name.as_deref().map(str::trim).filter(|d| !d.is_empty());

        let missing = missing_profile_fields(&org, selected, depositor);
        if !missing.is_empty() {
            tracing::warn!(organization_id = %org.id, missing = missing.len(), "confirmation blocked by incomplete profile");
            return Err(OrderError::IncompleteProfile { missing });
        }

        if let Some(o) = orders.iter().find(|o| !o.is_registered()) {
            return Err(OrderError::InvalidTransition { order_id: o.id, from: o.status, to: ShippingStatus::Confirmed });
        }
        let now = self.clock.now();
        let stale: Vec<Uuid> = orders.iter().filter(|o| !o.price_refreshed_on_day_of(now, self.clock.offset())).map(|o| o.id).collect();
        if !stale.is_empty() {
            return Err(OrderError::PriceNotRefreshed { order_ids: stale });
        }

        let rate = self.discount_rate_for(&org).await?;
        let amounts: Vec<i64> = orders.iter().map(|o| o.product_amount).collect();
        let allocations = allocate(&amounts, rate, req.cash_amount)?;
        let seller_code = resolve_seller_code(req.sub_account_id, &sub_accounts);
        let numbers = assign_order_numbers(&seller_code, now, self.clock.offset(), orders.len())?;

        let mut confirmed = Vec::with_capacity(orders.len());
        let mut events = Vec::new();
        for ((mut order, allocation), order_no) in orders.into_iter().zip(allocations).zip(numbers) {
            let order_id = order.id;
            order.confirm(ConfirmationLine {
                order_no: order_no.to_string(),
                confirmed_at: now,
                sub_account_id: req.sub_account_id,
                confirmed_by: req.acting_user,
                discount_amount: allocation.discount,
                cash_used: allocation.cash,
                final_deposit_amount: allocation.final_deposit,
                depositor_name: depositor.map(str::to_string),
            })?;

            let failure = match self.ports.orders.save_transition(&order, ShippingStatus::Registered).await {
                Ok(true) => None,
                Ok(false) => Some("order was changed by another request".to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                tracing::error!(%order_id, committed = confirmed.len(), %reason, "confirmation aborted mid-batch");
                self.publish_events(events).await;
                return Err(OrderError::PartialCommit {
                    committed: confirmed.iter().map(|o: &IntegratedOrder| o.id).collect(),
                    failed: order_id,
                    reason,
                });
            }
            events.extend(order.take_events());
            confirmed.push(order);
        }

        let mut warnings = Vec::new();
        let batch = OrderBatch::from_confirmed(
            req.organization_id, now, req.acting_user, depositor.map(str::to_string), &confirmed,
        );
        if let Err(e) = self.ports.orders.upsert_batch(&batch).await {
            tracing::warn!(error = %e, "batch ledger upsert failed after confirmation");
            warnings.push(ConfirmationWarning::BatchLedgerFailed { reason: e.to_string() });
        }

        let order_ids: Vec<Uuid> = confirmed.iter().map(|o| o.id).collect();
        let mut new_cash_balance = None;
        if req.cash_amount > 0 {
            let metadata = json!({ "order_ids": order_ids, "confirmed_at": now });
            match self.ports.cash.debit(req.organization_id, req.cash_amount, "발주확정 캐시 사용", metadata).await {
                Ok(receipt) => new_cash_balance = Some(receipt.new_balance),
                Err(e) => {
                    tracing::warn!(error = %e, amount = req.cash_amount, "orders confirmed but cash was not deducted");
                    warnings.push(ConfirmationWarning::CashNotDeducted { amount: req.cash_amount, reason: e.to_string() });
                }
            }
        }

        let notice = StatusChangeNotice::confirmed(req.organization_id, display_name(&org, selected), order_ids, batch.total_amount);
        if let Err(e) = self.ports.notifier.notify_status_change(&notice).await {
            tracing::warn!(error = %e, "confirmation notification failed");
            warnings.push(ConfirmationWarning::NotificationFailed { reason: e.to_string() });
        }
        self.publish_events(events).await;

        tracing::info!(
            organization_id = %req.organization_id, orders = confirmed.len(), total = batch.total_amount,
            discount = batch.discount_amount, cash = batch.cash_used, warnings = warnings.len(), "orders confirmed"
        );

        let lines = confirmed.iter().map(|o| ConfirmedLine {
            order_id: o.id,
            order_no: o.order_no.clone().unwrap_or_default(),
            product_amount: o.product_amount,
            discount_amount: o.discount_amount,
            cash_used: o.cash_used,
            final_deposit_amount: o.final_deposit_amount,
        }).collect();

        Ok(ConfirmationOutcome {
            confirmed_at: now,
            seller_code: seller_code.to_string(),
            discount_rate: rate.percent(),
            lines,
            batch,
            new_cash_balance,
            warnings,
        })
    }

    /// Supply total, current tier discount and the cash ceiling for a selection.
    pub async fn quote(&self, organization_id: Uuid, order_ids: &[Uuid]) -> crate::Result<(i64, i64, i64)> {
        let orders = self.load_selection(organization_id, order_ids).await?;
        let org = self.organization(organization_id).await?;
        let rate = self.discount_rate_for(&org).await?;
        let supply: i64 = orders.iter().map(|o| o.product_amount).sum();
        let discount = total_discount(supply, rate);
        Ok((supply, discount, supply - discount))
    }
}

pub(crate) fn display_name<'a>(org: &'a Organization, selected: Option<&'a SubAccount>) -> &'a str {
    selected
        .map(|s| s.business_name.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(org.business_name.as_str())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::staged;
    use crate::domain::aggregates::profile::tests::complete_org;
    use crate::domain::events::OrderEvent;
    use crate::store::memory::{MemoryStore, RecordingNotifier};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    pub(crate) struct Fixture {
        pub store: Arc<MemoryStore>,
        pub notifier: Arc<RecordingNotifier>,
        pub engine: SettlementEngine,
        pub org: Uuid,
        pub user: Uuid,
        pub now: DateTime<Utc>,
    }

    pub(crate) fn fixture(amounts: &[(u32, i64)]) -> (Fixture, Vec<Uuid>) {
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        // 2024-05-10 14:30:15 KST
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 5, 30, 15).unwrap();
        let main = SubAccount {
            id: Uuid::new_v4(), organization_id: org, business_name: "달래마켓".into(),
            seller_code: Some("S000123".into()), is_main: true, ..SubAccount::default()
        };
        let orders: Vec<IntegratedOrder> = amounts.iter().enumerate()
            .map(|(i, (qty, unit))| IntegratedOrder::register(&staged(&format!("opt-{i}"), *qty, *unit), org, user, now - Duration::hours(1)))
            .collect();
        let ids = orders.iter().map(|o| o.id).collect();
        let store = Arc::new(
            MemoryStore::new()
                .with_organization(complete_org(org))
                .with_sub_accounts(vec![main])
                .with_tier("gold", DiscountRate::new(Decimal::from(10)).unwrap())
                .with_cash(org, 100_000)
                .with_orders(orders),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = SettlementEngine::new(
            Ports::from_store(store.clone(), notifier.clone()),
            OrgClock::from_hours(9).unwrap().pinned_at(now),
        );
        (Fixture { store, notifier, engine, org, user, now }, ids)
    }

    fn request(f: &Fixture, ids: &[Uuid], cash: i64) -> ConfirmRequest {
        ConfirmRequest {
            organization_id: f.org, acting_user: f.user, order_ids: ids.to_vec(), cash_amount: cash,
            sub_account_id: None, depositor_name: Some("홍길동".into()),
        }
    }

    #[tokio::test]
    async fn test_confirm_happy_path() {
        let (f, ids) = fixture(&[(1, 10000), (2, 10000), (3, 10000)]);
        let outcome = f.engine.confirm(request(&f, &ids, 333)).await.unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.seller_code, "S000123");
        let numbers: Vec<&str> = outcome.lines.iter().map(|l| l.order_no.as_str()).collect();
        assert_eq!(numbers, vec!["S000123-240510143015-0001", "S000123-240510143015-0002", "S000123-240510143015-0003"]);
        assert_eq!(outcome.lines.iter().map(|l| l.discount_amount).sum::<i64>(), 6000);
        assert_eq!(outcome.lines.iter().map(|l| l.cash_used).sum::<i64>(), 333);
        assert_eq!(outcome.batch.total_amount, 60000);
        assert_eq!(outcome.batch.order_count, 3);
        assert_eq!(outcome.new_cash_balance, Some(100_000 - 333));

        let stored = f.store.order(ids[2]).unwrap();
        assert_eq!(stored.status, ShippingStatus::Confirmed);
        assert_eq!(stored.final_deposit_amount, stored.product_amount - stored.discount_amount - stored.cash_used);
        assert_eq!(stored.depositor_name.as_deref(), Some("홍길동"));
        assert_eq!(f.store.batches().len(), 1);
        assert_eq!(f.notifier.notices()[0].message, "달래마켓 님이 총 3건 공급가 60,000원의 주문을 발주확정 하였습니다");
    }

    #[tokio::test]
    async fn test_incomplete_profile_blocks_before_writes() {
        let (f, ids) = fixture(&[(1, 1000)]);
        let mut req = request(&f, &ids, 0);
        req.depositor_name = Some("   ".into());
        let err = f.engine.confirm(req).await.unwrap_err();
        assert!(matches!(err, OrderError::IncompleteProfile { ref missing } if missing.len() == 1));
        assert_eq!(f.store.order(ids[0]).unwrap().status, ShippingStatus::Registered);
        assert!(f.store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_stale_price_blocks() {
        let (f, ids) = fixture(&[(1, 1000), (1, 2000)]);
        f.store.set_price_updated_at(ids[1], f.now - Duration::days(1));
        let err = f.engine.confirm(request(&f, &ids, 0)).await.unwrap_err();
        assert!(matches!(err, OrderError::PriceNotRefreshed { ref order_ids } if order_ids == &vec![ids[1]]));
    }

    #[tokio::test]
    async fn test_cash_over_payable_rejected() {
        let (f, ids) = fixture(&[(1, 1000)]);
        let err = f.engine.confirm(request(&f, &ids, 901)).await.unwrap_err();
        assert!(matches!(err, OrderError::CashExceedsPayable { cash: 901, payable: 900 }));
    }

    #[tokio::test]
    async fn test_empty_and_unknown_selection() {
        let (f, _) = fixture(&[(1, 1000)]);
        assert!(matches!(f.engine.confirm(request(&f, &[], 0)).await, Err(OrderError::EmptySelection)));
        let ghost = Uuid::new_v4();
        assert!(matches!(f.engine.confirm(request(&f, &[ghost], 0)).await, Err(OrderError::OrderNotFound(id)) if id == ghost));
    }

    #[tokio::test]
    async fn test_row_failure_aborts_remaining_rows() {
        let (f, ids) = fixture(&[(1, 1000), (1, 1000), (1, 1000)]);
        f.store.fail_transition_for(ids[1]);
        let err = f.engine.confirm(request(&f, &ids, 0)).await.unwrap_err();
        match err {
            OrderError::PartialCommit { committed, failed, .. } => {
                assert_eq!(committed, vec![ids[0]]);
                assert_eq!(failed, ids[1]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.store.order(ids[0]).unwrap().status, ShippingStatus::Confirmed);
        assert_eq!(f.store.order(ids[2]).unwrap().status, ShippingStatus::Registered);
        assert!(f.store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_cash_debit_failure_is_a_warning() {
        let (f, ids) = fixture(&[(1, 10000)]);
        f.store.set_cash(f.org, 10);
        let outcome = f.engine.confirm(request(&f, &ids, 500)).await.unwrap();
        assert!(matches!(outcome.warnings[..], [ConfirmationWarning::CashNotDeducted { amount: 500, .. }]));
        assert_eq!(f.store.order(ids[0]).unwrap().status, ShippingStatus::Confirmed);
        assert_eq!(f.store.cash_balance(f.org), Some(10));
    }

    #[tokio::test]
    async fn test_batch_ledger_failure_is_a_warning() {
        let (f, ids) = fixture(&[(1, 10000), (2, 5000)]);
        f.store.fail_batches();
        let outcome = f.engine.confirm(request(&f, &ids, 1000)).await.unwrap();

        assert!(matches!(outcome.warnings[..], [ConfirmationWarning::BatchLedgerFailed { .. }]));
        assert!(f.store.batches().is_empty());
        for id in &ids {
            assert_eq!(f.store.order(*id).unwrap().status, ShippingStatus::Confirmed);
        }
        assert_eq!(outcome.new_cash_balance, Some(99_000));
        assert_eq!(f.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_is_a_warning() {
        let (f, ids) = fixture(&[(1, 10000)]);
        f.notifier.fail_next();
        let outcome = f.engine.confirm(request(&f, &ids, 0)).await.unwrap();

        assert!(matches!(outcome.warnings[..], [ConfirmationWarning::NotificationFailed { .. }]));
        assert!(!outcome.is_clean());
        assert_eq!(f.store.order(ids[0]).unwrap().status, ShippingStatus::Confirmed);
        assert_eq!(f.store.batches().len(), 1);
        assert!(f.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_events_published() {
        let (f, ids) = fixture(&[(1, 1000), (1, 2000)]);
        let outcome = f.engine.confirm(request(&f, &ids, 0)).await.unwrap();
        let events = f.notifier.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.name() == "order.confirmed"));
        let DomainEvent::Order(first) = &events[0];
        assert_eq!(first.order_id(), ids[0]);
        assert!(matches!(first, OrderEvent::Confirmed { order_no, .. } if *order_no == outcome.lines[0].order_no));
    }

    #[tokio::test]
    async fn test_second_confirmation_is_refused() {
        let (f, ids) = fixture(&[(1, 1000)]);
        f.engine.confirm(request(&f, &ids, 0)).await.unwrap();
        let err = f.engine.confirm(request(&f, &ids, 0)).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { from: ShippingStatus::Confirmed, .. }));
    }

    #[tokio::test]
    async fn test_sub_account_confirmation_uses_its_code() {
        let (f, ids) = fixture(&[(1, 1000)]);
        let sub = SubAccount {
            id: Uuid::new_v4(), organization_id: f.org, business_name: "달래 2호점".into(), seller_code: Some("S777777".into()),
            is_main: false, bank_account: Some("1".into()), bank_name: Some("농협".into()),
            account_holder: Some("김".into()), representative_name: Some("김".into()),
        };
        f.store.add_sub_account(sub.clone());
        let mut req = request(&f, &ids, 0);
        req.sub_account_id = Some(sub.id);
        req.depositor_name = None;
        let outcome = f.engine.confirm(req).await.unwrap();
        assert!(outcome.lines[0].order_no.starts_with("S777777-"));
        assert_eq!(f.store.order(ids[0]).unwrap().sub_account_id, Some(sub.id));
        assert!(f.notifier.notices()[0].message.starts_with("달래 2호점 님이"));
    }

    #[tokio::test]
    async fn test_quote() {
        let (f, ids) = fixture(&[(2, 10000), (1, 5000)]);
        assert_eq!(f.engine.quote(f.org, &ids).await.unwrap(), (25000, 2500, 22500));
    }
}
