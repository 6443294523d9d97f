//! Guarded, all-or-nothing writes.
//!
//! The store offers no locks. Every state-changing mutation names the status
//! the writer observed; a store applies a batch only if every guard still
//! holds, otherwise it applies nothing and reports `InvalidTransition`.

use uuid::Uuid;

use super::affiliate::{Affiliate, AffiliateSettings, AffiliateStatus};
use super::cash_out::{CashOut, CashOutStatus};
use super::events::OutboxEvent;
use super::inventory::{InventoryChange, InventoryChangeStatus};
use super::order::{Order, OrderStatus};
use super::referral::{Coupon, Customer, Referral, ReferralStatus};
use super::settings::Settings;

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertOrder(Order),
    SetOrderStatus {
        order_id: Uuid,
        expected: OrderStatus,
        status: OrderStatus,
    },
    /// Guard: order is `Finished` and not yet settled.
    MarkOrderSettled { order_id: Uuid, cash_out_id: Uuid },
    /// Guard: order is currently marked with `cash_out_id`.
    ClearOrderSettlement { order_id: Uuid, cash_out_id: Uuid },
    /// Clears the exceeds-stock flag on the affiliate's `Active` orders whose
    /// quantity fits the affiliate's inventory as it stands after the
    /// preceding mutations of the batch.
    ClearCoveredLowInventoryFlags { affiliate_id: String },

    InsertAffiliate(Affiliate),
    /// Relative change, applied against the stored counter.
    AdjustInventory { affiliate_id: String, delta: i64 },
    SetAffiliateStatus {
        affiliate_id: String,
        status: AffiliateStatus,
    },
    UpdateAffiliateSettings {
        affiliate_id: String,
        settings: AffiliateSettings,
    },
    /// Guard: no order, inventory change or cash-out references the affiliate.
    DeleteAffiliate { affiliate_id: String },

    InsertInventoryChange(InventoryChange),
    SetInventoryChangeStatus {
        change_id: Uuid,
        expected: InventoryChangeStatus,
        status: InventoryChangeStatus,
    },
    DeleteInventoryChange {
        change_id: Uuid,
        expected: InventoryChangeStatus,
    },

    InsertCashOut(CashOut),
    SetCashOutStatus {
        cash_out_id: Uuid,
        expected: CashOutStatus,
        status: CashOutStatus,
    },

    InsertReferral(Referral),
    SetReferralStatus {
        referral_id: Uuid,
        expected: ReferralStatus,
        status: ReferralStatus,
    },

    InsertCoupon(Coupon),
    /// Guard: coupon is active and unused.
    ConsumeCoupon { code: String },
    /// Guard: coupon is unused.
    SetCouponActive { code: String, active: bool },
    DeleteCoupon { code: String },

    UpsertCustomer(Customer),
    PutSettings(Settings),
    AppendEvent(OutboxEvent),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn event(&mut self, event: OutboxEvent) -> &mut Self {
        self.push(Mutation::AppendEvent(event))
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }
}
