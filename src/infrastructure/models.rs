use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::affiliate::{Affiliate, DaySchedule};
use crate::domain::cash_out::CashOut;
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;
use crate::domain::inventory::InventoryChange;
use crate::domain::order::Order;
use crate::domain::referral::{Coupon, Customer, Referral};
use crate::domain::settings::Settings;
use crate::schema::{
    affiliates, cash_outs, coupons, customers, inventory_changes, marketplace_outbox, orders,
    referrals, settings,
};

/// The settings table holds exactly one row.
pub const SETTINGS_ROW_ID: i32 = 1;

fn to_i32(value: u32, field: &str) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|_| DomainError::InvalidInput(format!("{} is too large", field)))
}

fn to_u32(value: i32, field: &str) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| DomainError::Internal(format!("negative {} in store", field)))
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub quantity: i32,
    pub subtotal: BigDecimal,
    pub payment_method: String,
    pub delivery_choice: String,
    pub delivery_fee_applied: BigDecimal,
    pub discount_applied: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub affiliate_id: String,
    pub affiliate_name: String,
    pub coupon_used: Option<String>,
    pub referral_code_used: Option<String>,
    pub payment_receipt: Option<String>,
    pub settled_in_cash_out_id: Option<Uuid>,
    pub is_low_inventory_order: bool,
}

impl TryFrom<Order> for OrderRow {
    type Error = DomainError;

    fn try_from(o: Order) -> Result<Self, Self::Error> {
        Ok(Self {
            id: o.id,
            customer_name: o.customer_name,
            phone: o.phone,
            address: o.address,
            quantity: to_i32(o.quantity, "quantity")?,
            subtotal: o.subtotal,
            payment_method: o.payment_method.to_string(),
            delivery_choice: o.delivery_choice.to_string(),
            delivery_fee_applied: o.delivery_fee_applied,
            discount_applied: o.discount_applied,
            status: o.status.to_string(),
            created_at: o.created_at,
            affiliate_id: o.affiliate_id,
            affiliate_name: o.affiliate_name,
            coupon_used: o.coupon_used,
            referral_code_used: o.referral_code_used,
            payment_receipt: o.payment_receipt,
            settled_in_cash_out_id: o.settled_in_cash_out_id,
            is_low_inventory_order: o.is_low_inventory_order,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            customer_name: r.customer_name,
            phone: r.phone,
            address: r.address,
            quantity: to_u32(r.quantity, "quantity")?,
            subtotal: r.subtotal,
            payment_method: r.payment_method.parse()?,
            delivery_choice: r.delivery_choice.parse()?,
            delivery_fee_applied: r.delivery_fee_applied,
            discount_applied: r.discount_applied,
            status: r.status.parse()?,
            created_at: r.created_at,
            affiliate_id: r.affiliate_id,
            affiliate_name: r.affiliate_name,
            coupon_used: r.coupon_used,
            referral_code_used: r.referral_code_used,
            payment_receipt: r.payment_receipt,
            settled_in_cash_out_id: r.settled_in_cash_out_id,
            is_low_inventory_order: r.is_low_inventory_order,
        })
    }
}

// ── Affiliates ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = affiliates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AffiliateRow {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub status: String,
    pub inventory: i64,
    pub has_delivery_service: bool,
    pub delivery_cost: BigDecimal,
    pub schedule: Value,
    pub is_temporarily_closed: bool,
    pub bank_details: Option<String>,
}

impl TryFrom<Affiliate> for AffiliateRow {
    type Error = DomainError;

    fn try_from(a: Affiliate) -> Result<Self, Self::Error> {
        let schedule = serde_json::to_value(&a.schedule)
            .map_err(|e| DomainError::Internal(format!("schedule encoding: {}", e)))?;
        Ok(Self {
            id: a.id,
            name: a.name,
            phone: a.phone,
            address: a.address,
            status: a.status.to_string(),
            inventory: a.inventory,
            has_delivery_service: a.has_delivery_service,
            delivery_cost: a.delivery_cost,
            schedule,
            is_temporarily_closed: a.is_temporarily_closed,
            bank_details: a.bank_details,
        })
    }
}

impl TryFrom<AffiliateRow> for Affiliate {
    type Error = DomainError;

    fn try_from(r: AffiliateRow) -> Result<Self, Self::Error> {
        let schedule: BTreeMap<String, DaySchedule> = serde_json::from_value(r.schedule)
            .map_err(|e| DomainError::Internal(format!("schedule of affiliate {}: {}", r.id, e)))?;
        Ok(Self {
            status: r.status.parse()?,
            id: r.id,
            name: r.name,
            phone: r.phone,
            address: r.address,
            inventory: r.inventory,
            has_delivery_service: r.has_delivery_service,
            delivery_cost: r.delivery_cost,
            schedule,
            is_temporarily_closed: r.is_temporarily_closed,
            bank_details: r.bank_details,
        })
    }
}

// ── Inventory changes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = inventory_changes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InventoryChangeRow {
    pub id: Uuid,
    pub affiliate_id: String,
    pub amount: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<InventoryChange> for InventoryChangeRow {
    fn from(c: InventoryChange) -> Self {
        Self {
            id: c.id,
            affiliate_id: c.affiliate_id,
            amount: c.amount,
            status: c.status.to_string(),
            created_at: c.created_at,
        }
    }
}

impl TryFrom<InventoryChangeRow> for InventoryChange {
    type Error = DomainError;

    fn try_from(r: InventoryChangeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            affiliate_id: r.affiliate_id,
            amount: r.amount,
            status: r.status.parse()?,
            created_at: r.created_at,
        })
    }
}

// ── Cash-outs ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = cash_outs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CashOutRow {
    pub id: Uuid,
    pub affiliate_id: String,
    pub created_at: DateTime<Utc>,
    pub orders_covered_ids: Vec<Uuid>,
    pub total_sales: BigDecimal,
    pub total_commission: BigDecimal,
    pub total_delivery_fees: BigDecimal,
    pub balance: BigDecimal,
    pub status: String,
    pub proof_of_payment: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl From<CashOut> for CashOutRow {
    fn from(c: CashOut) -> Self {
        Self {
            id: c.id,
            affiliate_id: c.affiliate_id,
            created_at: c.created_at,
            orders_covered_ids: c.orders_covered_ids,
            total_sales: c.total_sales,
            total_commission: c.total_commission,
            total_delivery_fees: c.total_delivery_fees,
            balance: c.balance,
            status: c.status.to_string(),
            proof_of_payment: c.proof_of_payment,
            start_date: c.start_date,
            end_date: c.end_date,
        }
    }
}

impl TryFrom<CashOutRow> for CashOut {
    type Error = DomainError;

    fn try_from(r: CashOutRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            affiliate_id: r.affiliate_id,
            created_at: r.created_at,
            orders_covered_ids: r.orders_covered_ids,
            total_sales: r.total_sales,
            total_commission: r.total_commission,
            total_delivery_fees: r.total_delivery_fees,
            balance: r.balance,
            status: r.status.parse()?,
            proof_of_payment: r.proof_of_payment,
            start_date: r.start_date,
            end_date: r.end_date,
        })
    }
}

// ── Referrals, coupons, customers ────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = referrals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReferralRow {
    pub id: Uuid,
    pub referrer_code: String,
    pub referrer_name: String,
    pub referrer_phone: String,
    pub referee_order_id: Uuid,
    pub referee_name: String,
    pub referee_phone: String,
    pub referee_order_quantity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<Referral> for ReferralRow {
    type Error = DomainError;

    fn try_from(r: Referral) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            referrer_code: r.referrer_code,
            referrer_name: r.referrer_name,
            referrer_phone: r.referrer_phone,
            referee_order_id: r.referee_order_id,
            referee_name: r.referee_name,
            referee_phone: r.referee_phone,
            referee_order_quantity: to_i32(r.referee_order_quantity, "referee order quantity")?,
            status: r.status.to_string(),
            created_at: r.created_at,
        })
    }
}

impl TryFrom<ReferralRow> for Referral {
    type Error = DomainError;

    fn try_from(r: ReferralRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            referrer_code: r.referrer_code,
            referrer_name: r.referrer_name,
            referrer_phone: r.referrer_phone,
            referee_order_id: r.referee_order_id,
            referee_name: r.referee_name,
            referee_phone: r.referee_phone,
            referee_order_quantity: to_u32(r.referee_order_quantity, "referee order quantity")?,
            status: r.status.parse()?,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = coupons)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CouponRow {
    pub code: String,
    pub is_used: bool,
    pub reward_amount: BigDecimal,
    pub generated_for_phone: Option<String>,
    pub is_active: bool,
}

impl From<Coupon> for CouponRow {
    fn from(c: Coupon) -> Self {
        Self {
            code: c.code,
            is_used: c.is_used,
            reward_amount: c.reward_amount,
            generated_for_phone: c.generated_for_phone,
            is_active: c.is_active,
        }
    }
}

impl From<CouponRow> for Coupon {
    fn from(r: CouponRow) -> Self {
        Self {
            code: r.code,
            is_used: r.is_used,
            reward_amount: r.reward_amount,
            generated_for_phone: r.generated_for_phone,
            is_active: r.is_active,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = customers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CustomerRow {
    pub phone: String,
    pub name: String,
}

impl From<Customer> for CustomerRow {
    fn from(c: Customer) -> Self {
        Self {
            phone: c.phone,
            name: c.name,
        }
    }
}

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self {
        Self {
            name: r.name,
            phone: r.phone,
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SettingsRow {
    pub id: i32,
    pub commission_rate_cents: i64,
    pub unit_price: BigDecimal,
    pub reward_units: i32,
    pub low_stock_threshold: i64,
}

impl TryFrom<Settings> for SettingsRow {
    type Error = DomainError;

    fn try_from(s: Settings) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SETTINGS_ROW_ID,
            commission_rate_cents: s.commission_rate_cents,
            unit_price: s.unit_price,
            reward_units: to_i32(s.reward_units, "reward units")?,
            low_stock_threshold: s.low_stock_threshold,
        })
    }
}

impl TryFrom<SettingsRow> for Settings {
    type Error = DomainError;

    fn try_from(r: SettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            commission_rate_cents: r.commission_rate_cents,
            unit_price: r.unit_price,
            reward_units: to_u32(r.reward_units, "reward units")?,
            low_stock_threshold: r.low_stock_threshold,
        })
    }
}

// ── Outbox ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = marketplace_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl From<OutboxEvent> for OutboxEventRow {
    fn from(e: OutboxEvent) -> Self {
        Self {
            id: e.id,
            aggregate_type: e.aggregate_type,
            aggregate_id: e.aggregate_id,
            event_type: e.event_type,
            payload: e.payload,
            created_at: e.created_at,
        }
    }
}

impl From<OutboxEventRow> for OutboxEvent {
    fn from(r: OutboxEventRow) -> Self {
        Self {
            id: r.id,
            aggregate_type: r.aggregate_type,
            aggregate_id: r.aggregate_id,
            event_type: r.event_type,
            payload: r.payload,
            created_at: r.created_at,
        }
    }
}
