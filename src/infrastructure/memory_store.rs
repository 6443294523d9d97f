use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::domain::affiliate::Affiliate;
use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::cash_out::CashOut;
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;
use crate::domain::inventory::InventoryChange;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::MarketplaceStore;
use crate::domain::referral::{Coupon, Customer, Referral};
use crate::domain::settings::Settings;

use super::snapshot::{Snapshot, CURRENT_SCHEMA_VERSION};

#[derive(Debug, Clone, Default)]
struct Collections {
    orders: BTreeMap<Uuid, Order>,
    affiliates: BTreeMap<String, Affiliate>,
    inventory_changes: BTreeMap<Uuid, InventoryChange>,
    cash_outs: BTreeMap<Uuid, CashOut>,
    referrals: BTreeMap<Uuid, Referral>,
    coupons: BTreeMap<String, Coupon>,
    customers: BTreeMap<String, Customer>,
    settings: Option<Settings>,
}

#[derive(Debug, Default)]
struct State {
    live: Collections,
    /// Kept apart from `live` so a batch never copies it.
    outbox: VecDeque<OutboxEvent>,
}

/// Events kept for a relay before the oldest are dropped.
pub const OUTBOX_CAPACITY: usize = 10_000;

/// Process-local store. One lock covers every collection, and a batch is
/// applied to a working copy that replaces the live state only on success,
/// so the live state is never observed half-written.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    outbox_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_outbox_capacity(OUTBOX_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outbox_capacity(outbox_capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            outbox_capacity,
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let collections = Collections {
            orders: snapshot.orders.into_iter().map(|o| (o.id, o)).collect(),
            affiliates: snapshot
                .affiliates
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            inventory_changes: snapshot
                .inventory_changes
                .into_iter()
                .map(|c| (c.id, c))
                .collect(),
            cash_outs: snapshot.cash_outs.into_iter().map(|c| (c.id, c)).collect(),
            referrals: snapshot.referrals.into_iter().map(|r| (r.id, r)).collect(),
            coupons: snapshot
                .coupons
                .into_iter()
                .map(|c| (c.code.clone(), c))
                .collect(),
            customers: snapshot
                .users
                .into_iter()
                .map(|u| (u.phone.clone(), u))
                .collect(),
            settings: snapshot.settings,
        };
        let store = Self::new();
        store.lock().live = collections;
        store
    }

    pub fn snapshot(&self) -> Snapshot {
        let guard = self.lock();
        let state = &guard.live;
        Snapshot {
            schema_version: CURRENT_SCHEMA_VERSION,
            orders: state.orders.values().cloned().collect(),
            affiliates: state.affiliates.values().cloned().collect(),
            inventory_changes: state.inventory_changes.values().cloned().collect(),
            cash_outs: state.cash_outs.values().cloned().collect(),
            referrals: state.referrals.values().cloned().collect(),
            coupons: state.coupons.values().cloned().collect(),
            users: state.customers.values().cloned().collect(),
            settings: state.settings.clone(),
        }
    }

    /// Pending events, oldest first, without removing them.
    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.lock().outbox.iter().cloned().collect()
    }

    /// Removes and returns up to `max` of the oldest pending events.
    pub fn drain_outbox(&self, max: usize) -> Vec<OutboxEvent> {
        let mut state = self.lock();
        let take = max.min(state.outbox.len());
        state.outbox.drain(..take).collect()
    }

    // The live state is only ever replaced whole, so a poisoned lock still
    // guards a consistent value.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stale(entity: &'static str, id: impl ToString, expected: &str, found: &str) -> DomainError {
    DomainError::invalid_transition(
        entity,
        id,
        format!("expected {} but found {}", expected, found),
    )
}

fn apply(
    state: &mut Collections,
    events: &mut Vec<OutboxEvent>,
    mutation: Mutation,
) -> Result<(), DomainError> {
    match mutation {
        Mutation::InsertOrder(order) => {
            if state.orders.contains_key(&order.id) {
                return Err(DomainError::Internal(format!("order {} already exists", order.id)));
            }
            state.orders.insert(order.id, order);
        }
        Mutation::SetOrderStatus {
            order_id,
            expected,
            status,
        } => {
            let order = order_mut(state, order_id)?;
            if order.status != expected {
                return Err(stale("Order", order_id, expected.as_str(), order.status.as_str()));
            }
            order.status = status;
        }
        Mutation::MarkOrderSettled {
            order_id,
            cash_out_id,
        } => {
            let order = order_mut(state, order_id)?;
            if !order.is_unsettled_finished() {
                return Err(DomainError::invalid_transition(
                    "Order",
                    order_id,
                    format!(
                        "cannot settle a {} order already marked {:?}",
                        order.status, order.settled_in_cash_out_id
                    ),
                ));
            }
            order.settled_in_cash_out_id = Some(cash_out_id);
        }
        Mutation::ClearOrderSettlement {
            order_id,
            cash_out_id,
        } => {
            let order = order_mut(state, order_id)?;
            if order.settled_in_cash_out_id != Some(cash_out_id) {
                return Err(DomainError::invalid_transition(
                    "Order",
                    order_id,
                    format!("not marked with cash-out {}", cash_out_id),
                ));
            }
            order.settled_in_cash_out_id = None;
        }
        Mutation::ClearCoveredLowInventoryFlags { affiliate_id } => {
            let inventory = state
                .affiliates
                .get(&affiliate_id)
                .map(|a| a.inventory)
                .ok_or_else(|| DomainError::not_found("Affiliate", &affiliate_id))?;
            for order in state.orders.values_mut().filter(|o| {
                o.affiliate_id == affiliate_id
                    && o.status == OrderStatus::Active
                    && o.is_low_inventory_order
                    && i64::from(o.quantity) <= inventory
            }) {
                order.is_low_inventory_order = false;
            }
        }

        Mutation::InsertAffiliate(affiliate) => {
            if state.affiliates.contains_key(&affiliate.id) {
                return Err(DomainError::PreconditionFailed(format!(
                    "affiliate {} is already registered",
                    affiliate.id
                )));
            }
            state.affiliates.insert(affiliate.id.clone(), affiliate);
        }
        Mutation::AdjustInventory {
            affiliate_id,
            delta,
        } => {
            let affiliate = affiliate_mut(state, &affiliate_id)?;
            affiliate.inventory =
                Affiliate::shifted_inventory(&affiliate.id, affiliate.inventory, delta)?;
        }
        Mutation::SetAffiliateStatus {
            affiliate_id,
            status,
        } => {
            affiliate_mut(state, &affiliate_id)?.status = status;
        }
        Mutation::UpdateAffiliateSettings {
            affiliate_id,
            settings,
        } => {
            settings.apply_to(affiliate_mut(state, &affiliate_id)?);
        }
        Mutation::DeleteAffiliate { affiliate_id } => {
            if !state.affiliates.contains_key(&affiliate_id) {
                return Err(DomainError::not_found("Affiliate", affiliate_id));
            }
            let referenced = state.orders.values().any(|o| o.affiliate_id == affiliate_id)
                || state
                    .inventory_changes
                    .values()
                    .any(|c| c.affiliate_id == affiliate_id)
                || state.cash_outs.values().any(|c| c.affiliate_id == affiliate_id);
            if referenced {
                return Err(DomainError::PreconditionFailed(format!(
                    "affiliate {} is referenced by its history",
                    affiliate_id
                )));
            }
            state.affiliates.remove(&affiliate_id);
        }

        Mutation::InsertInventoryChange(change) => {
            state.inventory_changes.insert(change.id, change);
        }
        Mutation::SetInventoryChangeStatus {
            change_id,
            expected,
            status,
        } => {
            let change = state
                .inventory_changes
                .get_mut(&change_id)
                .ok_or_else(|| DomainError::not_found("InventoryChange", change_id))?;
            if change.status != expected {
                return Err(stale(
                    "InventoryChange",
                    change_id,
                    expected.as_str(),
                    change.status.as_str(),
                ));
            }
            change.status = status;
        }
        Mutation::DeleteInventoryChange {
            change_id,
            expected,
        } => {
            let change = state
                .inventory_changes
                .get(&change_id)
                .ok_or_else(|| DomainError::not_found("InventoryChange", change_id))?;
            if change.status != expected {
                return Err(stale(
                    "InventoryChange",
                    change_id,
                    expected.as_str(),
                    change.status.as_str(),
                ));
            }
            state.inventory_changes.remove(&change_id);
        }

        Mutation::InsertCashOut(cash_out) => {
            state.cash_outs.insert(cash_out.id, cash_out);
        }
        Mutation::SetCashOutStatus {
            cash_out_id,
            expected,
            status,
        } => {
            let cash_out = state
                .cash_outs
                .get_mut(&cash_out_id)
                .ok_or_else(|| DomainError::not_found("CashOut", cash_out_id))?;
            if cash_out.status != expected {
                return Err(stale(
                    "CashOut",
                    cash_out_id,
                    expected.as_str(),
                    cash_out.status.as_str(),
                ));
            }
            cash_out.status = status;
        }

        Mutation::InsertReferral(referral) => {
            state.referrals.insert(referral.id, referral);
        }
        Mutation::SetReferralStatus {
            referral_id,
            expected,
            status,
        } => {
            let referral = state
                .referrals
                .get_mut(&referral_id)
                .ok_or_else(|| DomainError::not_found("Referral", referral_id))?;
            if referral.status != expected {
                return Err(stale(
                    "Referral",
                    referral_id,
                    expected.as_str(),
                    referral.status.as_str(),
                ));
            }
            referral.status = status;
        }

        Mutation::InsertCoupon(coupon) => {
            if state.coupons.contains_key(&coupon.code) {
                return Err(DomainError::PreconditionFailed(format!(
                    "coupon {} already exists",
                    coupon.code
                )));
            }
            state.coupons.insert(coupon.code.clone(), coupon);
        }
        Mutation::ConsumeCoupon { code } => {
            let coupon = coupon_mut(state, &code)?;
            if coupon.is_used || !coupon.is_active {
                return Err(DomainError::invalid_transition(
                    "Coupon",
                    &code,
                    "coupon is no longer redeemable",
                ));
            }
            coupon.is_used = true;
        }
        Mutation::SetCouponActive { code, active } => {
            let coupon = coupon_mut(state, &code)?;
            if coupon.is_used {
                return Err(DomainError::invalid_transition(
                    "Coupon",
                    &code,
                    "coupon was already used",
                ));
            }
            coupon.is_active = active;
        }
        Mutation::DeleteCoupon { code } => {
            if state.coupons.remove(&code).is_none() {
                return Err(DomainError::not_found("Coupon", code));
            }
        }

        Mutation::UpsertCustomer(customer) => {
            state.customers.insert(customer.phone.clone(), customer);
        }
        Mutation::PutSettings(settings) => state.settings = Some(settings),
        Mutation::AppendEvent(event) => events.push(event),
    }
    Ok(())
}

fn order_mut(state: &mut Collections, id: Uuid) -> Result<&mut Order, DomainError> {
    state
        .orders
        .get_mut(&id)
        .ok_or_else(|| DomainError::not_found("Order", id))
}

fn affiliate_mut<'a>(
    state: &'a mut Collections,
    id: &str,
) -> Result<&'a mut Affiliate, DomainError> {
    state
        .affiliates
        .get_mut(id)
        .ok_or_else(|| DomainError::not_found("Affiliate", id))
}

fn coupon_mut<'a>(state: &'a mut Collections, code: &str) -> Result<&'a mut Coupon, DomainError> {
    state
        .coupons
        .get_mut(code)
        .ok_or_else(|| DomainError::not_found("Coupon", code))
}

// Stable sort over id-ordered input: equal timestamps keep id order.
fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl MarketplaceStore for MemoryStore {
    fn find_order(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        Ok(self.lock().live.orders.get(&id).cloned())
    }

    fn list_orders(&self) -> Result<Vec<Order>, DomainError> {
        let mut orders: Vec<Order> = self.lock().live.orders.values().cloned().collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    fn orders_for_affiliate(&self, affiliate_id: &str) -> Result<Vec<Order>, DomainError> {
        let mut orders: Vec<Order> = self
            .lock()
            .live
            .orders
            .values()
            .filter(|o| o.affiliate_id == affiliate_id)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    fn orders_for_phone(&self, phone: &str) -> Result<Vec<Order>, DomainError> {
        let mut orders: Vec<Order> = self
            .lock()
            .live
            .orders
            .values()
            .filter(|o| o.phone == phone)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    fn find_affiliate(&self, id: &str) -> Result<Option<Affiliate>, DomainError> {
        Ok(self.lock().live.affiliates.get(id).cloned())
    }

    fn list_affiliates(&self) -> Result<Vec<Affiliate>, DomainError> {
        Ok(self.lock().live.affiliates.values().cloned().collect())
    }

    fn find_inventory_change(&self, id: Uuid) -> Result<Option<InventoryChange>, DomainError> {
        Ok(self.lock().live.inventory_changes.get(&id).cloned())
    }

    fn list_inventory_changes(&self) -> Result<Vec<InventoryChange>, DomainError> {
        let mut changes: Vec<InventoryChange> =
            self.lock().live.inventory_changes.values().cloned().collect();
        changes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(changes)
    }

    fn find_cash_out(&self, id: Uuid) -> Result<Option<CashOut>, DomainError> {
        Ok(self.lock().live.cash_outs.get(&id).cloned())
    }

    fn list_cash_outs(&self) -> Result<Vec<CashOut>, DomainError> {
        let mut cash_outs: Vec<CashOut> =
            self.lock().live.cash_outs.values().cloned().collect();
        cash_outs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cash_outs)
    }

    fn find_referral(&self, id: Uuid) -> Result<Option<Referral>, DomainError> {
        Ok(self.lock().live.referrals.get(&id).cloned())
    }

    fn referral_for_order(&self, order_id: Uuid) -> Result<Option<Referral>, DomainError> {
        Ok(self
            .lock()
            .live
            .referrals
            .values()
            .find(|r| r.referee_order_id == order_id)
            .cloned())
    }

    fn list_referrals(&self) -> Result<Vec<Referral>, DomainError> {
        let mut referrals: Vec<Referral> =
            self.lock().live.referrals.values().cloned().collect();
        referrals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(referrals)
    }

    fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, DomainError> {
        Ok(self.lock().live.coupons.get(code).cloned())
    }

    fn list_coupons(&self) -> Result<Vec<Coupon>, DomainError> {
        Ok(self.lock().live.coupons.values().cloned().collect())
    }

    fn list_customers(&self) -> Result<Vec<Customer>, DomainError> {
        Ok(self.lock().live.customers.values().cloned().collect())
    }

    fn settings(&self) -> Result<Option<Settings>, DomainError> {
        Ok(self.lock().live.settings.clone())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), DomainError> {
        let mut state = self.lock();
        let mut working = state.live.clone();
        let mut events = Vec::new();
        for mutation in batch.into_mutations() {
            apply(&mut working, &mut events, mutation)?;
        }
        state.live = working;
        state.outbox.extend(events);

        let overflow = state.outbox.len().saturating_sub(self.outbox_capacity);
        if overflow > 0 {
            state.outbox.drain(..overflow);
            log::warn!("Outbox full, dropped {} undrained events", overflow);
        }
        Ok(())
    }
}
