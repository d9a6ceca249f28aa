//! Order lifecycle views: per-status column sets and summaries.

use serde::Serialize;

use crate::domain::aggregates::{IntegratedOrder, ShippingStatus};
use crate::domain::value_objects::DiscountRate;
use crate::settlement::total_discount;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ViewColumn {
    pub key: &'static str,
    pub label: &'static str,
}

const fn col(key: &'static str, label: &'static str) -> ViewColumn { ViewColumn { key, label } }

const BASE_COLUMNS: [ViewColumn; 8] = [
    col("market_name", "마켓"),
    col("seller_order_number", "주문번호"),
    col("recipient_name", "수령인"),
    col("recipient_phone", "수령인전화번호"),
    col("recipient_address", "주소"),
    col("option_name", "옵션명"),
    col("quantity", "수량"),
    col("seller_supply_price", "공급단가"),
];

const SETTLEMENT_COLUMNS: [ViewColumn; 6] = [
    col("order_no", "발주번호"),
    col("confirmed_at", "발주확정일시"),
    col("product_amount", "공급가"),
    col("discount_amount", "할인금액"),
    col("cash_used", "캐시사용"),
    col("final_deposit_amount", "입금액"),
];

pub fn columns_for(status: ShippingStatus) -> Vec<ViewColumn> {
    let mut columns = BASE_COLUMNS.to_vec();
    match status {
        ShippingStatus::Registered => {
            columns.push(col("product_amount", "공급가"));
            columns.push(col("price_updated_at", "단가갱신일시"));
        }
        ShippingStatus::Confirmed | ShippingStatus::Preparing => columns.extend(SETTLEMENT_COLUMNS),
        ShippingStatus::Shipped => {
            columns.extend(SETTLEMENT_COLUMNS);
            columns.push(col("shipped_at", "발송일시"));
            columns.push(col("tracking_number", "송장번호"));
        }
        ShippingStatus::CancelRequested => {
            columns.extend(SETTLEMENT_COLUMNS);
            columns.push(col("cancel_requested_at", "취소요청일시"));
            columns.push(col("cancel_reason", "취소사유"));
        }
        ShippingStatus::Cancelled => {
            columns.extend(SETTLEMENT_COLUMNS);
            columns.push(col("cancelled_at", "취소완료일시"));
        }
        ShippingStatus::Refunded => {
            columns.extend(SETTLEMENT_COLUMNS);
            columns.push(col("refunded_at", "환불일시"));
            columns.push(col("refund_amount", "환불금액"));
        }
    }
    columns
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ViewSummary {
    pub order_count: usize,
    pub supply_total: i64,
    pub discount_total: i64,
    pub cash_used_total: i64,
    pub settlement_total: i64,
}

/// Registered orders have no persisted discount yet, so theirs is recomputed
/// from `current_rate`. Every other status sums the stored amounts.
pub fn summarize(status: ShippingStatus, orders: &[IntegratedOrder], current_rate: DiscountRate) -> ViewSummary {
    let supply_total: i64 = orders.iter().map(|o| o.product_amount).sum();
    if status == ShippingStatus::Registered {
        let discount_total = total_discount(supply_total, current_rate);
        let cash_used_total: i64 = orders.iter().map(|o| o.cash_used).sum();
        return ViewSummary {
            order_count: orders.len(), supply_total, discount_total, cash_used_total,
            settlement_total: supply_total - discount_total - cash_used_total,
        };
    }
    ViewSummary {
        order_count: orders.len(),
        supply_total,
        discount_total: orders.iter().map(|o| o.discount_amount).sum(),
        cash_used_total: orders.iter().map(|o| o.cash_used).sum(),
        settlement_total: orders.iter().map(|o| o.final_deposit_amount).sum(),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusView {
    pub status: ShippingStatus,
    pub label: &'static str,
    pub columns: Vec<ViewColumn>,
    pub summary: ViewSummary,
    pub orders: Vec<IntegratedOrder>,
}

pub fn build_view(status: ShippingStatus, orders: Vec<IntegratedOrder>, current_rate: DiscountRate) -> StatusView {
    let orders: Vec<IntegratedOrder> = orders.into_iter().filter(|o| o.status == status).collect();
    StatusView {
        status,
        label: status.label(),
        columns: columns_for(status),
        summary: summarize(status, &orders, current_rate),
        orders,
    }
}
