use uuid::Uuid;

use super::affiliate::Affiliate;
use super::batch::WriteBatch;
use super::cash_out::CashOut;
use super::errors::DomainError;
use super::inventory::InventoryChange;
use super::order::Order;
use super::referral::{Coupon, Customer, Referral};
use super::settings::Settings;

/// The replicated document store the engine runs against.
///
/// Reads always return the latest committed state. All writes go through
/// [`MarketplaceStore::commit`], which applies a whole batch or nothing.
pub trait MarketplaceStore: Send + Sync + 'static {
    fn find_order(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    fn list_orders(&self) -> Result<Vec<Order>, DomainError>;
    fn orders_for_affiliate(&self, affiliate_id: &str) -> Result<Vec<Order>, DomainError>;
    fn orders_for_phone(&self, phone: &str) -> Result<Vec<Order>, DomainError>;

    fn find_affiliate(&self, id: &str) -> Result<Option<Affiliate>, DomainError>;
    fn list_affiliates(&self) -> Result<Vec<Affiliate>, DomainError>;

    fn find_inventory_change(&self, id: Uuid) -> Result<Option<InventoryChange>, DomainError>;
    fn list_inventory_changes(&self) -> Result<Vec<InventoryChange>, DomainError>;

    fn find_cash_out(&self, id: Uuid) -> Result<Option<CashOut>, DomainError>;
    fn list_cash_outs(&self) -> Result<Vec<CashOut>, DomainError>;

    fn find_referral(&self, id: Uuid) -> Result<Option<Referral>, DomainError>;
    fn referral_for_order(&self, order_id: Uuid) -> Result<Option<Referral>, DomainError>;
    fn list_referrals(&self) -> Result<Vec<Referral>, DomainError>;

    fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, DomainError>;
    fn list_coupons(&self) -> Result<Vec<Coupon>, DomainError>;

    fn list_customers(&self) -> Result<Vec<Customer>, DomainError>;

    /// Stored tenant settings, or `None` before the first write.
    fn settings(&self) -> Result<Option<Settings>, DomainError>;

    fn commit(&self, batch: WriteBatch) -> Result<(), DomainError>;
}
