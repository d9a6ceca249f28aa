//! Cancellation requests and deletion of registered orders

use serde::Serialize;
use uuid::Uuid;

use super::engine::display_name;
use super::SettlementEngine;
use crate::domain::aggregates::ShippingStatus;
use crate::ports::StatusChangeNotice;
use crate::OrderError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub order_ids: Vec<Uuid>,
    pub reason: Option<String>,
    pub notified: bool,
}

impl SettlementEngine {
    /// Moves confirmed or preparing orders to cancel-requested.
    ///
    /// A single order may omit the reason; several orders share one required reason.
    pub async fn request_cancellation(
        &self,
        organization_id: Uuid,
        order_ids: &[Uuid],
        reason: Option<String>,
    ) -> crate::Result<CancellationOutcome> {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let orders = self.load_selection(organization_id, order_ids).await?;
        if orders.len() > 1 && reason.is_none() {
            return Err(OrderError::ReasonRequired);
        }
        if let Some(o) = orders.iter().find(|o| !o.status.can_transition_to(ShippingStatus::CancelRequested)) {
            return Err(OrderError::InvalidTransition { order_id: o.id, from: o.status, to: ShippingStatus::CancelRequested });
        }

        let now = self.clock.now();
        let mut done = Vec::with_capacity(orders.len());
        let mut events = Vec::new();
        for mut order in orders {
            let expected = order.status;
            order.request_cancel(reason.clone(), now)?;
            let failure = match self.ports.orders.save_transition(&order, expected).await {
                Ok(true) => None,
                Ok(false) => Some("order was changed by another request".to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                tracing::error!(order_id = %order.id, committed = done.len(), %reason, "cancel request aborted mid-batch");
                self.publish_events(events).await;
                return Err(OrderError::PartialCommit { committed: done, failed: order.id, reason });
            }
            events.extend(order.take_events());
            done.push(order.id);
        }

        let org = self.organization(organization_id).await?;
        let notice = StatusChangeNotice::cancel_requested(organization_id, display_name(&org, None), done.clone());
        let notified = match self.ports.notifier.notify_status_change(&notice).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cancel request notification failed");
                false
            }
        };

        self.publish_events(events).await;
        tracing::info!(%organization_id, orders = done.len(), "cancellation requested");
        Ok(CancellationOutcome { order_ids: done, reason, notified })
    }

    /// Irreversibly removes orders that are still registered. Any other status blocks the whole call.
    pub async fn delete_orders(&self, organization_id: Uuid, order_ids: &[Uuid]) -> crate::Result<u64> {
        let orders = self.load_selection(organization_id, order_ids).await?;
        let blocked: Vec<Uuid> = orders.iter().filter(|o| o.ensure_deletable().is_err()).map(|o| o.id).collect();
        if !blocked.is_empty() {
            return Err(OrderError::NotDeletable { order_ids: blocked });
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let removed = self.ports.orders.delete_registered(organization_id, &ids).await?;
        if removed < ids.len() as u64 {
            tracing::warn!(requested = ids.len(), removed, "some orders left registered status before deletion");
        }
        tracing::info!(%organization_id, removed, "orders deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::engine::tests::fixture;

    #[tokio::test]
    async fn test_bulk_cancel_needs_reason() {
        let (f, ids) = fixture(&[(1, 1000), (1, 1000)]);
        f.store.set_status(ids[0], ShippingStatus::Confirmed);
        f.store.set_status(ids[1], ShippingStatus::Preparing);

        let err = f.engine.request_cancellation(f.org, &ids, Some("  ".into())).await.unwrap_err();
        assert!(matches!(err, OrderError::ReasonRequired));

        let outcome = f.engine.request_cancellation(f.org, &ids, Some("고객 변심".into())).await.unwrap();
        assert_eq!(outcome.order_ids, ids);
        assert!(outcome.notified);
        let stored = f.store.order(ids[1]).unwrap();
        assert_eq!(stored.status, ShippingStatus::CancelRequested);
        assert_eq!(stored.cancel_reason.as_deref(), Some("고객 변심"));
        assert_eq!(stored.cancel_requested_at, Some(f.now));
        assert_eq!(f.notifier.notices()[0].message, "달래마켓 님이 총 2건의 주문을 취소요청 하였습니다");
        let events = f.notifier.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.name() == "order.cancel_requested"));
    }

    #[tokio::test]
    async fn test_single_cancel_reason_optional() {
        let (f, ids) = fixture(&[(1, 1000)]);
        f.store.set_status(ids[0], ShippingStatus::Confirmed);
        let outcome = f.engine.request_cancellation(f.org, &ids, None).await.unwrap();
        assert_eq!(outcome.reason, None);
        assert_eq!(f.store.order(ids[0]).unwrap().status, ShippingStatus::CancelRequested);
    }

    #[tokio::test]
    async fn test_cancel_from_registered_is_invalid() {
        let (f, ids) = fixture(&[(1, 1000)]);
        let err = f.engine.request_cancellation(f.org, &ids, None).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { from: ShippingStatus::Registered, .. }));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_cancel() {
        let (f, ids) = fixture(&[(1, 1000)]);
        f.store.set_status(ids[0], ShippingStatus::Confirmed);
        f.notifier.fail_next();
        let outcome = f.engine.request_cancellation(f.org, &ids, None).await.unwrap();
        assert!(!outcome.notified);
        assert_eq!(f.store.order(ids[0]).unwrap().status, ShippingStatus::CancelRequested);
    }

    #[tokio::test]
    async fn test_delete_only_registered() {
        let (f, ids) = fixture(&[(1, 1000), (1, 1000), (1, 1000)]);
        f.store.set_status(ids[2], ShippingStatus::Confirmed);

        let err = f.engine.delete_orders(f.org, &ids).await.unwrap_err();
        assert!(matches!(err, OrderError::NotDeletable { ref order_ids } if order_ids == &vec![ids[2]]));
        assert!(f.store.order(ids[0]).is_some());

        assert_eq!(f.engine.delete_orders(f.org, &ids[..2]).await.unwrap(), 2);
        assert!(f.store.order(ids[0]).is_none());
        assert!(f.store.order(ids[2]).is_some());
    }
}
