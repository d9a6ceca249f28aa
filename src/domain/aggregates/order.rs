//! Integrated Order Aggregate

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::staged::StagedOrder;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::OrderError;

/// Shipping status as persisted in `integrated_orders.shipping_status`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShippingStatus {
    #[default]
    #[serde(rename = "발주서등록")]
    Registered,
    #[serde(rename = "발주서확정")]
    Confirmed,
    #[serde(rename = "상품준비중")]
    Preparing,
    #[serde(rename = "발송완료")]
    Shipped,
    #[serde(rename = "취소요청")]
    CancelRequested,
    #[serde(rename = "취소완료")]
    Cancelled,
    #[serde(rename = "환불완료")]
    Refunded,
}

impl ShippingStatus {
    pub const ALL: [ShippingStatus; 7] = [
        Self::Registered, Self::Confirmed, Self::Preparing, Self::Shipped,
        Self::CancelRequested, Self::Cancelled, Self::Refunded,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Registered => "발주서등록",
            Self::Confirmed => "발주서확정",
            Self::Preparing => "상품준비중",
            Self::Shipped => "발송완료",
            Self::CancelRequested => "취소요청",
            Self::Cancelled => "취소완료",
            Self::Refunded => "환불완료",
        }
    }

    /// Statuses reachable in one step. Cancellation is the only branch off the main line.
    pub fn successors(&self) -> &'static [ShippingStatus] {
        match self {
            Self::Registered => &[Self::Confirmed],
            Self::Confirmed => &[Self::Preparing, Self::CancelRequested],
            Self::Preparing => &[Self::Shipped, Self::CancelRequested],
            Self::Shipped => &[],
            Self::CancelRequested => &[Self::Cancelled],
            Self::Cancelled => &[Self::Refunded],
            Self::Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, next: ShippingStatus) -> bool { self.successors().contains(&next) }
}

impl fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.label()) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownStatus(pub String);
impl std::error::Error for UnknownStatus {}
impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Unknown shipping status: {}", self.0) }
}

impl FromStr for ShippingStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|st| st.label() == s.trim()).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Per-order result of a confirmation batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmationLine {
    pub order_no: String,
    pub confirmed_at: DateTime<Utc>,
    pub sub_account_id: Option<Uuid>,
    pub confirmed_by: Uuid,
    pub discount_amount: i64,
    pub cash_used: i64,
    pub final_deposit_amount: i64,
    pub depositor_name: Option<String>,
}

/// Persisted order row (`integrated_orders`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegratedOrder {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub sub_account_id: Option<Uuid>,
    pub status: ShippingStatus,
    pub market_name: String,
    pub seller_order_number: String,
    pub order_no: Option<String>,
    pub buyer_name: String,
    pub buyer_phone: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_address: String,
    pub delivery_message: String,
    pub option_name: String,
    pub option_code: Option<String>,
    pub quantity: i32,
    pub seller_supply_price: i64,
    pub product_amount: i64,
    pub discount_amount: i64,
    pub cash_used: i64,
    pub final_deposit_amount: i64,
    pub price_updated_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<i64>,
    pub created_by: Option<Uuid>,
    pub depositor_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl IntegratedOrder {
    /// Registers a validated staged order. Prices are stamped as refreshed at `now`.
    pub fn register(staged: &StagedOrder, organization_id: Uuid, created_by: Uuid, now: DateTime<Utc>) -> Self {
        let id = Uuid::now_v7();
        let quantity = staged.quantity.as_i32();
        let product_amount = staged.unit_price * i64::from(quantity);
        let mut order = Self {
            id, organization_id, sub_account_id: None, status: ShippingStatus::Registered,
            market_name: staged.market_name.clone(), seller_order_number: staged.order_number.clone(), order_no: None,
            buyer_name: staged.buyer_name.clone(), buyer_phone: staged.buyer_phone.clone(),
            recipient_name: staged.recipient_name.clone(), recipient_phone: staged.recipient_phone.clone(),
            recipient_address: staged.address.clone(), delivery_message: staged.delivery_message.clone(),
            option_name: staged.option_name.clone(), option_code: staged.option_code.clone(),
            quantity,
            seller_supply_price: staged.unit_price, product_amount, discount_amount: 0, cash_used: 0,
            final_deposit_amount: product_amount, price_updated_at: Some(now), confirmed_at: None,
            cancel_requested_at: None, cancel_reason: None, cancelled_at: None, shipped_at: None,
            tracking_number: None, refunded_at: None, refund_amount: None, created_by: Some(created_by),
            depositor_name: None, created_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Registered { order_id: id, organization_id }));
        order
    }

    pub fn is_registered(&self) -> bool { self.status == ShippingStatus::Registered }

    /// True when the price was refreshed on the same organization-local calendar day as `now`.
    pub fn price_refreshed_on_day_of(&self, now: DateTime<Utc>, offset: FixedOffset) -> bool {
        self.price_updated_at
            .map(|at| at.with_timezone(&offset).date_naive() == now.with_timezone(&offset).date_naive())
            .unwrap_or(false)
    }

    pub fn refresh_price(&mut self, unit_price: i64, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.is_registered() {
            return Err(OrderError::InvalidTransition { order_id: self.id, from: self.status, to: ShippingStatus::Registered });
        }
        self.seller_supply_price = unit_price;
        self.product_amount = unit_price * i64::from(self.quantity.max(0));
        self.final_deposit_amount = self.product_amount - self.discount_amount - self.cash_used;
        self.price_updated_at = Some(now);
        self.raise_event(DomainEvent::Order(OrderEvent::PriceRefreshed { order_id: self.id, product_amount: self.product_amount }));
        Ok(())
    }

    pub fn confirm(&mut self, line: ConfirmationLine) -> Result<(), OrderError> {
        self.transition(ShippingStatus::Confirmed)?;
        self.order_no = Some(line.order_no.clone());
        self.confirmed_at = Some(line.confirmed_at);
        self.sub_account_id = line.sub_account_id;
        self.created_by = Some(line.confirmed_by);
        self.discount_amount = line.discount_amount;
        self.cash_used = line.cash_used;
        self.final_deposit_amount = line.final_deposit_amount;
        self.depositor_name = line.depositor_name;
        self.raise_event(DomainEvent::Order(OrderEvent::Confirmed {
            order_id: self.id, order_no: line.order_no, product_amount: self.product_amount, confirmed_at: line.confirmed_at,
        }));
        Ok(())
    }

    pub fn request_cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(ShippingStatus::CancelRequested)?;
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        self.cancel_requested_at = Some(now);
        self.cancel_reason = reason.clone();
        self.raise_event(DomainEvent::Order(OrderEvent::CancelRequested { order_id: self.id, reason }));
        Ok(())
    }

    pub fn approve_cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(ShippingStatus::Cancelled)?;
        self.cancelled_at = Some(now);
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    pub fn start_preparing(&mut self) -> Result<(), OrderError> {
        self.transition(ShippingStatus::Preparing)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Preparing { order_id: self.id }));
        Ok(())
    }

    pub fn ship(&mut self, tracking: Option<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(ShippingStatus::Shipped)?;
        self.shipped_at = Some(now);
        self.tracking_number = tracking.clone();
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id, tracking }));
        Ok(())
    }

    pub fn refund(&mut self, amount: i64, now: DateTime<Utc>) -> Result<(), OrderError> {
        if amount < 0 { return Err(OrderError::InvalidInput("refund amount must not be negative".into())); }
        self.transition(ShippingStatus::Refunded)?;
        self.refunded_at = Some(now);
        self.refund_amount = Some(amount);
        self.raise_event(DomainEvent::Order(OrderEvent::Refunded { order_id: self.id, amount }));
        Ok(())
    }

    pub fn ensure_deletable(&self) -> Result<(), OrderError> {
        if self.is_registered() { Ok(()) } else { Err(OrderError::NotDeletable { order_ids: vec![self.id] }) }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }

    fn transition(&mut self, to: ShippingStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { order_id: self.id, from: self.status, to });
        }
        self.status = to;
        Ok(())
    }
}
