//! Postgres implementation of every port (sqlx).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::aggregates::{
    FieldMapping, IntegratedOrder, MarketTemplate, OptionCatalog, OptionNameMapping, OptionProduct, OrderBatch,
    Organization, ShippingStatus, SubAccount,
};
use crate::domain::value_objects::{DiscountRate, OptionKey};
use crate::ports::{CashError, CashLedger, CatalogSource, DebitReceipt, OrderStore, SellerDirectory, TemplateSource, TierDiscounts};
use crate::StoreError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, organization_id: Uuid, sub_account_id: Option<Uuid>, shipping_status: String,
    market_name: String, seller_order_number: String, order_no: Option<String>,
    buyer_name: String, buyer_phone: String, recipient_name: String, recipient_phone: String,
    recipient_address: String, delivery_message: String, option_name: String, option_code: Option<String>,
    quantity: i32, seller_supply_price: i64, product_amount: i64, discount_amount: i64, cash_used: i64,
    final_deposit_amount: i64, price_updated_at: Option<DateTime<Utc>>, confirmed_at: Option<DateTime<Utc>>,
    cancel_requested_at: Option<DateTime<Utc>>, cancel_reason: Option<String>, cancelled_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>, tracking_number: Option<String>, refunded_at: Option<DateTime<Utc>>,
    refund_amount: Option<i64>, created_by: Option<Uuid>, depositor_name: Option<String>, created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for IntegratedOrder {
    type Error = StoreError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let status: ShippingStatus = r.shipping_status.parse().map_err(|e| StoreError::Corrupt(format!("order {}: {e}", r.id)))?;
        Ok(Self {
            id: r.id, organization_id: r.organization_id, sub_account_id: r.sub_account_id, status,
            market_name: r.market_name, seller_order_number: r.seller_order_number, order_no: r.order_no,
            buyer_name: r.buyer_name, buyer_phone: r.buyer_phone, recipient_name: r.recipient_name,
            recipient_phone: r.recipient_phone, recipient_address: r.recipient_address,
            delivery_message: r.delivery_message, option_name: r.option_name, option_code: r.option_code,
            quantity: r.quantity, seller_supply_price: r.seller_supply_price, product_amount: r.product_amount,
            discount_amount: r.discount_amount, cash_used: r.cash_used, final_deposit_amount: r.final_deposit_amount,
            price_updated_at: r.price_updated_at, confirmed_at: r.confirmed_at,
            cancel_requested_at: r.cancel_requested_at, cancel_reason: r.cancel_reason, cancelled_at: r.cancelled_at,
            shipped_at: r.shipped_at, tracking_number: r.tracking_number, refunded_at: r.refunded_at,
            refund_amount: r.refund_amount, created_by: r.created_by, depositor_name: r.depositor_name,
            created_at: r.created_at, events: Vec::new(),
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<IntegratedOrder>, StoreError> {
    rows.into_iter().map(IntegratedOrder::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct OptionProductRow { option_name: String, option_code: Option<String>, seller_supply_price: i64 }

impl From<OptionProductRow> for OptionProduct {
    fn from(r: OptionProductRow) -> Self {
        Self { option_name: r.option_name, option_code: r.option_code, seller_supply_price: r.seller_supply_price }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    market_name: String, initial: Option<String>, color_rgb: Option<String>, detect_string1: String,
    detect_string2: String, header_row: i32, settlement_formula: Option<String>, display_order: i32,
    field_mappings: serde_json::Value,
}

impl TryFrom<TemplateRow> for MarketTemplate {
    type Error = StoreError;

    fn try_from(r: TemplateRow) -> Result<Self, Self::Error> {
        let columns: HashMap<String, String> = serde_json::from_value(r.field_mappings)
            .map_err(|e| StoreError::Corrupt(format!("template {}: {e}", r.market_name)))?;
        Ok(Self {
            initial: r.initial, color_rgb: r.color_rgb, detect_string1: r.detect_string1, detect_string2: r.detect_string2,
            header_row: u32::try_from(r.header_row).unwrap_or(1), settlement_formula: r.settlement_formula,
            display_order: r.display_order, field_mappings: FieldMapping::from_config(&columns), market_name: r.market_name,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrganizationRow {
    id: Uuid, business_name: String, tier_code: Option<String>, bank_account: Option<String>,
    bank_name: Option<String>, account_holder: Option<String>, representative_name: Option<String>,
    representative_phone: Option<String>, manager_name: Option<String>, manager_phone: Option<String>,
}

impl From<OrganizationRow> for Organization {
    fn from(r: OrganizationRow) -> Self {
        Self {
            id: r.id, business_name: r.business_name, tier_code: r.tier_code, bank_account: r.bank_account,
            bank_name: r.bank_name, account_holder: r.account_holder, representative_name: r.representative_name,
            representative_phone: r.representative_phone, manager_name: r.manager_name, manager_phone: r.manager_phone,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubAccountRow {
    id: Uuid, organization_id: Uuid, business_name: String, seller_code: Option<String>, is_main: bool,
    bank_account: Option<String>, bank_name: Option<String>, account_holder: Option<String>, representative_name: Option<String>,
}

impl From<SubAccountRow> for SubAccount {
    fn from(r: SubAccountRow) -> Self {
        Self {
            id: r.id, organization_id: r.organization_id, business_name: r.business_name, seller_code: r.seller_code,
            is_main: r.is_main, bank_account: r.bank_account, bank_name: r.bank_name,
            account_holder: r.account_holder, representative_name: r.representative_name,
        }
    }
}

const ORDER_COLUMNS: &str = "id, organization_id, sub_account_id, shipping_status, market_name, seller_order_number, order_no, \
    buyer_name, buyer_phone, recipient_name, recipient_phone, recipient_address, delivery_message, option_name, option_code, \
    quantity, seller_supply_price, product_amount, discount_amount, cash_used, final_deposit_amount, price_updated_at, \
    confirmed_at, cancel_requested_at, cancel_reason, cancelled_at, shipped_at, tracking_number, refunded_at, refund_amount, \
    created_by, depositor_name, created_at";

// =============================================================================
// Ports
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_orders(&self, orders: &[IntegratedOrder]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for o in orders {
            sqlx::query(&format!("INSERT INTO integrated_orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33)"))
                .bind(o.id).bind(o.organization_id).bind(o.sub_account_id).bind(o.status.label())
                .bind(&o.market_name).bind(&o.seller_order_number).bind(&o.order_no)
                .bind(&o.buyer_name).bind(&o.buyer_phone).bind(&o.recipient_name).bind(&o.recipient_phone)
                .bind(&o.recipient_address).bind(&o.delivery_message).bind(&o.option_name).bind(&o.option_code)
                .bind(o.quantity).bind(o.seller_supply_price).bind(o.product_amount).bind(o.discount_amount)
                .bind(o.cash_used).bind(o.final_deposit_amount).bind(o.price_updated_at)
                .bind(o.confirmed_at).bind(o.cancel_requested_at).bind(&o.cancel_reason).bind(o.cancelled_at)
                .bind(o.shipped_at).bind(&o.tracking_number).bind(o.refunded_at).bind(o.refund_amount)
                .bind(o.created_by).bind(&o.depositor_name).bind(o.created_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_orders(&self, organization_id: Uuid, ids: &[Uuid]) -> Result<Vec<IntegratedOrder>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM integrated_orders WHERE organization_id = $1 AND id = ANY($2)"))
            .bind(organization_id).bind(ids).fetch_all(&self.pool).await?;
        let mut by_id: HashMap<Uuid, IntegratedOrder> = into_orders(rows)?.into_iter().map(|o| (o.id, o)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_by_status(&self, organization_id: Uuid, status: ShippingStatus) -> Result<Vec<IntegratedOrder>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM integrated_orders WHERE organization_id = $1 AND shipping_status = $2 ORDER BY created_at, id"))
            .bind(organization_id).bind(status.label()).fetch_all(&self.pool).await?;
        into_orders(rows)
    }

    async fn update_prices(&self, orders: &[IntegratedOrder]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for o in orders {
            sqlx::query("UPDATE integrated_orders SET seller_supply_price = $2, product_amount = $3, final_deposit_amount = $4, price_updated_at = $5 WHERE id = $1 AND shipping_status = $6")
                .bind(o.id).bind(o.seller_supply_price).bind(o.product_amount).bind(o.final_deposit_amount)
                .bind(o.price_updated_at).bind(ShippingStatus::Registered.label())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_transition(&self, o: &IntegratedOrder, expected: ShippingStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE integrated_orders SET shipping_status = $3, sub_account_id = $4, order_no = $5, discount_amount = $6, \
             cash_used = $7, final_deposit_amount = $8, confirmed_at = $9, cancel_requested_at = $10, cancel_reason = $11, \
             cancelled_at = $12, shipped_at = $13, tracking_number = $14, refunded_at = $15, refund_amount = $16, \
             created_by = $17, depositor_name = $18 \
             WHERE id = $1 AND organization_id = $2 AND shipping_status = $19",
        )
            .bind(o.id).bind(o.organization_id).bind(o.status.label()).bind(o.sub_account_id).bind(&o.order_no)
            .bind(o.discount_amount).bind(o.cash_used).bind(o.final_deposit_amount).bind(o.confirmed_at)
            .bind(o.cancel_requested_at).bind(&o.cancel_reason).bind(o.cancelled_at).bind(o.shipped_at)
            .bind(&o.tracking_number).bind(o.refunded_at).bind(o.refund_amount).bind(o.created_by)
            .bind(&o.depositor_name).bind(expected.label())
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_registered(&self, organization_id: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM integrated_orders WHERE organization_id = $1 AND id = ANY($2) AND shipping_status = $3")
            .bind(organization_id).bind(ids).bind(ShippingStatus::Registered.label())
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn upsert_batch(&self, b: &OrderBatch) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO order_batches (id, organization_id, confirmed_at, total_amount, discount_amount, cash_used, \
             final_deposit_amount, order_count, depositor_name, executor_id, payment_confirmed, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW()) \
             ON CONFLICT (organization_id, confirmed_at) DO UPDATE SET total_amount = EXCLUDED.total_amount, \
             discount_amount = EXCLUDED.discount_amount, cash_used = EXCLUDED.cash_used, \
             final_deposit_amount = EXCLUDED.final_deposit_amount, order_count = EXCLUDED.order_count, \
             depositor_name = EXCLUDED.depositor_name, executor_id = EXCLUDED.executor_id, \
             payment_confirmed = EXCLUDED.payment_confirmed, updated_at = NOW()",
        )
            .bind(Uuid::now_v7()).bind(b.organization_id).bind(b.confirmed_at).bind(b.total_amount)
            .bind(b.discount_amount).bind(b.cash_used).bind(b.final_deposit_amount).bind(b.order_count)
            .bind(&b.depositor_name).bind(b.executor_id).bind(b.payment_confirmed)
            .execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for PgStore {
    async fn load_catalog(&self) -> Result<OptionCatalog, StoreError> {
        let rows = sqlx::query_as::<_, OptionProductRow>("SELECT option_name, option_code, seller_supply_price FROM option_products ORDER BY updated_at, id")
            .fetch_all(&self.pool).await?;
        Ok(OptionCatalog::from_products(rows.into_iter().map(OptionProduct::from)))
    }

    async fn find_option(&self, option_name: &str) -> Result<Option<OptionProduct>, StoreError> {
        let key = OptionKey::new(option_name);
        let row = sqlx::query_as::<_, OptionProductRow>("SELECT option_name, option_code, seller_supply_price FROM option_products WHERE lower(trim(option_name)) = $1 ORDER BY updated_at DESC LIMIT 1")
            .bind(key.as_str()).fetch_optional(&self.pool).await?;
        Ok(row.map(OptionProduct::from))
    }

    async fn load_aliases(&self, organization_id: Uuid) -> Result<Vec<OptionNameMapping>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT user_option_name, site_option_name FROM option_name_mappings WHERE organization_id = $1 ORDER BY created_at")
            .bind(organization_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(user_option_name, site_option_name)| OptionNameMapping { user_option_name, site_option_name }).collect())
    }
}

#[async_trait]
impl TemplateSource for PgStore {
    async fn list_templates(&self) -> Result<Vec<MarketTemplate>, StoreError> {
        let rows = sqlx::query_as::<_, TemplateRow>("SELECT market_name, initial, color_rgb, detect_string1, detect_string2, header_row, settlement_formula, display_order, field_mappings FROM market_templates ORDER BY display_order, market_name")
            .fetch_all(&self.pool).await?;
        rows.into_iter().map(MarketTemplate::try_from).collect()
    }
}

#[async_trait]
impl SellerDirectory for PgStore {
    async fn organization(&self, organization_id: Uuid) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query_as::<_, OrganizationRow>("SELECT id, business_name, tier_code, bank_account, bank_name, account_holder, representative_name, representative_phone, manager_name, manager_phone FROM organizations WHERE id = $1")
            .bind(organization_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Organization::from))
    }

    async fn sub_accounts(&self, organization_id: Uuid) -> Result<Vec<SubAccount>, StoreError> {
        let rows = sqlx::query_as::<_, SubAccountRow>("SELECT id, organization_id, business_name, seller_code, is_main, bank_account, bank_name, account_holder, representative_name FROM sub_accounts WHERE organization_id = $1 ORDER BY is_main DESC, created_at")
            .bind(organization_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(SubAccount::from).collect())
    }
}

#[async_trait]
impl TierDiscounts for PgStore {
    async fn discount_rate(&self, tier_code: &str) -> Result<DiscountRate, StoreError> {
        let row: Option<(Decimal,)> = sqlx::query_as("SELECT discount_rate FROM tier_criteria WHERE tier_code = $1")
            .bind(tier_code).fetch_optional(&self.pool).await?;
        match row {
            Some((rate,)) => DiscountRate::new(rate).map_err(|e| StoreError::Corrupt(format!("tier {tier_code}: {e}"))),
            None => Ok(DiscountRate::zero()),
        }
    }
}

#[async_trait]
impl CashLedger for PgStore {
    async fn debit(
        &self,
        organization_id: Uuid,
        amount: i64,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<DebitReceipt, CashError> {
        let updated: Option<(i64,)> = sqlx::query_as("UPDATE organization_cash SET balance = balance - $2, updated_at = NOW() WHERE organization_id = $1 AND balance >= $2 RETURNING balance")
            .bind(organization_id).bind(amount).fetch_optional(&self.pool).await.map_err(StoreError::from)?;

        let Some((new_balance,)) = updated else {
            let current: Option<(i64,)> = sqlx::query_as("SELECT balance FROM organization_cash WHERE organization_id = $1")
                .bind(organization_id).fetch_optional(&self.pool).await.map_err(StoreError::from)?;
            return Err(match current {
                Some((balance,)) => CashError::InsufficientBalance { balance, requested: amount },
                None => CashError::NoAccount,
            });
        };

        let history = sqlx::query("INSERT INTO organization_cash_transactions (id, organization_id, transaction_type, amount, balance_after, description, metadata, created_at) VALUES ($1, $2, 'usage', $3, $4, $5, $6, NOW())")
            .bind(Uuid::now_v7()).bind(organization_id).bind(-amount).bind(new_balance).bind(description).bind(&metadata)
            .execute(&self.pool).await;
        if let Err(e) = history {
            tracing::warn!(%organization_id, amount, error = %e, "cash debited but history row was not written");
        }
        Ok(DebitReceipt { new_balance })
    }
}
