//! Read-only views. Nothing here is persisted; every view is derived from
//! the current collections and the settings in force.

use std::collections::BTreeSet;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::affiliate::{Affiliate, AffiliateStatus, StockIndicators};
use crate::domain::cash_out::{CashOut, SettlementPreview};
use crate::domain::errors::DomainError;
use crate::domain::inventory::{InventoryChange, InventoryChangeStatus};
use crate::domain::money::{self, OrderBill};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::referral::{Coupon, Customer, Referral};

use super::MarketplaceService;

/// Marketplace-wide counters for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub total_orders: usize,
    pub total_affiliates: usize,
    pub pending_affiliates: usize,
    pub pending_transfers: usize,
    pub pending_inventory_requests: usize,
    /// Customer totals of finished orders in the window.
    pub total_sales: BigDecimal,
    pub total_units_sold: u64,
    pub urgent_affiliate_ids: Vec<String>,
}

/// Optional creation-time window, both ends inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at <= e)
    }
}

impl MarketplaceService {
    pub fn order(&self, order_id: Uuid) -> Result<Order, DomainError> {
        self.load_order(order_id)
    }

    /// Newest first.
    pub fn orders(&self) -> Result<Vec<Order>, DomainError> {
        self.store.list_orders()
    }

    pub fn affiliate_orders(&self, affiliate_id: &str) -> Result<Vec<Order>, DomainError> {
        self.load_affiliate(affiliate_id)?;
        let mut orders = self.store.orders_for_affiliate(affiliate_id)?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub fn affiliate(&self, affiliate_id: &str) -> Result<Affiliate, DomainError> {
        self.load_affiliate(affiliate_id)
    }

    pub fn affiliates(&self) -> Result<Vec<Affiliate>, DomainError> {
        self.store.list_affiliates()
    }

    /// Newest first, optionally for one affiliate.
    pub fn inventory_changes(
        &self,
        affiliate_id: Option<&str>,
    ) -> Result<Vec<InventoryChange>, DomainError> {
        let changes = self.store.list_inventory_changes()?;
        Ok(match affiliate_id {
            Some(id) => changes.into_iter().filter(|c| c.affiliate_id == id).collect(),
            None => changes,
        })
    }

    pub fn cash_out(&self, cash_out_id: Uuid) -> Result<CashOut, DomainError> {
        self.store
            .find_cash_out(cash_out_id)?
            .ok_or_else(|| DomainError::not_found("CashOut", cash_out_id))
    }

    /// The affiliate's cash-outs, newest first.
    pub fn cash_out_history(&self, affiliate_id: &str) -> Result<Vec<CashOut>, DomainError> {
        self.load_affiliate(affiliate_id)?;
        let mut history: Vec<CashOut> = self
            .store
            .list_cash_outs()?
            .into_iter()
            .filter(|c| c.affiliate_id == affiliate_id)
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    pub fn referrals(&self) -> Result<Vec<Referral>, DomainError> {
        self.store.list_referrals()
    }

    pub fn coupons(&self) -> Result<Vec<Coupon>, DomainError> {
        self.store.list_coupons()
    }

    pub fn customers(&self) -> Result<Vec<Customer>, DomainError> {
        self.store.list_customers()
    }

    /// Customer bill of one order, at the commission rate in force now.
    pub fn order_bill(&self, order_id: Uuid) -> Result<OrderBill, DomainError> {
        let order = self.load_order(order_id)?;
        let rate = self.settings()?.commission_rate_cents;
        Ok(OrderBill::for_order(&order, rate))
    }

    /// What a cash-out would cover and settle if performed now.
    pub fn settlement_preview(&self, affiliate_id: &str) -> Result<SettlementPreview, DomainError> {
        self.load_affiliate(affiliate_id)?;
        let rate = self.settings()?.commission_rate_cents;
        let orders = self.store.orders_for_affiliate(affiliate_id)?;
        Ok(SettlementPreview::compute(affiliate_id, orders, rate))
    }

    pub fn stock_indicators(&self) -> Result<Vec<StockIndicators>, DomainError> {
        let threshold = self.settings()?.low_stock_threshold;
        let orders = self.store.list_orders()?;
        let changes = self.store.list_inventory_changes()?;
        let urgent = urgent_affiliates(&orders);

        Ok(self
            .store
            .list_affiliates()?
            .into_iter()
            .filter(|a| a.status == AffiliateStatus::Approved)
            .map(|a| {
                let count = |status: InventoryChangeStatus| {
                    changes
                        .iter()
                        .filter(|c| c.affiliate_id == a.id && c.status == status)
                        .count()
                };
                StockIndicators {
                    low_stock: a.is_low_stock(threshold),
                    urgent: urgent.contains(&a.id),
                    pending_requests: count(InventoryChangeStatus::Pending),
                    awaiting_confirmation: count(InventoryChangeStatus::Approved),
                    inventory: a.inventory,
                    affiliate_name: a.name.clone(),
                    affiliate_id: a.id,
                }
            })
            .collect())
    }

    pub fn admin_overview(&self, range: DateRange) -> Result<AdminOverview, DomainError> {
        let orders = self.store.list_orders()?;
        let affiliates = self.store.list_affiliates()?;
        let changes = self.store.list_inventory_changes()?;

        let in_range: Vec<&Order> = orders
            .iter()
            .filter(|o| range.contains(o.created_at))
            .collect();
        let finished = in_range.iter().filter(|o| o.status == OrderStatus::Finished);

        Ok(AdminOverview {
            total_orders: in_range.len(),
            total_affiliates: affiliates.len(),
            pending_affiliates: affiliates
                .iter()
                .filter(|a| a.status == AffiliateStatus::Pending)
                .count(),
            pending_transfers: orders
                .iter()
                .filter(|o| o.status == OrderStatus::PendingConfirmation)
                .count(),
            pending_inventory_requests: changes
                .iter()
                .filter(|c| c.status == InventoryChangeStatus::Pending)
                .count(),
            total_sales: finished
                .clone()
                .map(|o| money::customer_total(o))
                .sum(),
            total_units_sold: finished.map(|o| u64::from(o.quantity)).sum(),
            urgent_affiliate_ids: urgent_affiliates(&orders).into_iter().collect(),
        })
    }
}

/// Affiliates with an active order that exceeded their stock when placed.
fn urgent_affiliates(orders: &[Order]) -> BTreeSet<String> {
    orders
        .iter()
        .filter(|o| o.status == OrderStatus::Active && o.is_low_inventory_order)
        .map(|o| o.affiliate_id.clone())
        .collect()
}
