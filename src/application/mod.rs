//! Command handlers and read views over a [`MarketplaceStore`].
//!
//! Every handler follows the same shape: read fresh state, let the domain
//! validate the transition, then commit one guarded [`WriteBatch`] that also
//! carries the outbox event. Nothing is written when validation fails.
//!
//! [`WriteBatch`]: crate::domain::batch::WriteBatch

pub mod affiliates;
pub mod inventory;
pub mod orders;
pub mod queries;
pub mod referrals;
pub mod settlement;

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::affiliate::Affiliate;
use crate::domain::command::{Command, CommandOutcome};
use crate::domain::errors::DomainError;
use crate::domain::order::Order;
use crate::domain::ports::MarketplaceStore;
use crate::domain::settings::Settings;

pub struct MarketplaceService {
    store: Arc<dyn MarketplaceStore>,
    default_settings: Settings,
}

impl MarketplaceService {
    /// `default_settings` apply until the first `UpdateSettings` is stored.
    pub fn new(store: Arc<dyn MarketplaceStore>, default_settings: Settings) -> Self {
        Self {
            store,
            default_settings,
        }
    }

    /// Settings in force right now.
    pub fn settings(&self) -> Result<Settings, DomainError> {
        Ok(self
            .store
            .settings()?
            .unwrap_or_else(|| self.default_settings.clone()))
    }

    fn load_order(&self, order_id: Uuid) -> Result<Order, DomainError> {
        self.store
            .find_order(order_id)?
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }

    fn load_affiliate(&self, affiliate_id: &str) -> Result<Affiliate, DomainError> {
        self.store
            .find_affiliate(affiliate_id)?
            .ok_or_else(|| DomainError::not_found("Affiliate", affiliate_id))
    }

    pub fn execute(&self, command: Command) -> Result<CommandOutcome, DomainError> {
        let name = command.name();
        let result = self.dispatch(command);
        match &result {
            Ok(_) => log::debug!("{} committed", name),
            Err(DomainError::Internal(msg)) => log::error!("{} failed: {}", name, msg),
            Err(e) => log::warn!("{} refused: {}", name, e),
        }
        result
    }

    fn dispatch(&self, command: Command) -> Result<CommandOutcome, DomainError> {
        match command {
            Command::CreateOrder(create) => self
                .create_order(create)
                .map(|order_id| CommandOutcome::OrderCreated { order_id }),
            Command::ConfirmTransferPayment { order_id } => {
                self.confirm_transfer_payment(order_id)?;
                Ok(CommandOutcome::Done)
            }
            Command::SetOrderStatus { order_id, status } => {
                self.set_order_status(order_id, status)?;
                Ok(CommandOutcome::Done)
            }
            Command::ReverseCancellation { order_id } => {
                self.reverse_cancellation(order_id)?;
                Ok(CommandOutcome::Done)
            }

            Command::RequestInventoryChange {
                affiliate_id,
                amount,
            } => self
                .request_inventory_change(affiliate_id, amount)
                .map(|change_id| CommandOutcome::InventoryChangeCreated { change_id }),
            Command::AdminAdjustInventory {
                affiliate_id,
                amount,
            } => self
                .admin_adjust_inventory(affiliate_id, amount)
                .map(|change_id| CommandOutcome::InventoryChangeCreated { change_id }),
            Command::ResolveInventoryChange {
                change_id,
                resolution,
            } => {
                self.resolve_inventory_change(change_id, resolution)?;
                Ok(CommandOutcome::Done)
            }
            Command::ConfirmInventoryChange { change_id } => {
                self.confirm_inventory_change(change_id)?;
                Ok(CommandOutcome::Done)
            }
            Command::CancelInventoryRequest { change_id } => {
                self.cancel_inventory_request(change_id)?;
                Ok(CommandOutcome::Done)
            }

            Command::PerformCashOut {
                affiliate_id,
                proof,
            } => self
                .perform_cash_out(&affiliate_id, proof)
                .map(|cash_out| CommandOutcome::CashOutCreated(Box::new(cash_out))),
            Command::ConfirmCashOut { cash_out_id } => {
                self.confirm_cash_out(cash_out_id)?;
                Ok(CommandOutcome::Done)
            }
            Command::ReconcileSettlements => {
                self.reconcile_settlements().map(CommandOutcome::Reconciled)
            }

            Command::CompleteReferral { referral_id } => self
                .complete_referral(referral_id)
                .map(CommandOutcome::CouponMinted),
            Command::SetCouponActive { code, active } => {
                self.set_coupon_active(&code, active)?;
                Ok(CommandOutcome::Done)
            }
            Command::DeleteCoupon { code } => {
                self.delete_coupon(&code)?;
                Ok(CommandOutcome::Done)
            }

            Command::RegisterAffiliate(application) => self
                .register_affiliate(application)
                .map(|affiliate_id| CommandOutcome::AffiliateRegistered { affiliate_id }),
            Command::SetAffiliateStatus {
                affiliate_id,
                status,
            } => {
                self.set_affiliate_status(&affiliate_id, status)?;
                Ok(CommandOutcome::Done)
            }
            Command::UpdateAffiliateSettings {
                affiliate_id,
                settings,
            } => {
                self.update_affiliate_settings(&affiliate_id, settings)?;
                Ok(CommandOutcome::Done)
            }
            Command::DeleteAffiliate { affiliate_id } => {
                self.delete_affiliate(&affiliate_id)?;
                Ok(CommandOutcome::Done)
            }
            Command::UpdateSettings(settings) => {
                self.update_settings(settings)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::num::NonZeroU32;
    use std::sync::Arc;

    use uuid::Uuid;

    use super::MarketplaceService;
    use crate::domain::affiliate::test_support::approved_affiliate;
    use crate::domain::affiliate::Affiliate;
    use crate::domain::batch::{Mutation, WriteBatch};
    use crate::domain::command::{Command, CommandOutcome, CreateOrder};
    use crate::domain::order::{DeliveryChoice, OrderStatus, PaymentMethod, PlaceOrder};
    use crate::domain::ports::MarketplaceStore;
    use crate::domain::settings::Settings;
    use crate::infrastructure::memory_store::MemoryStore;

    pub const AFFILIATE: &str = "5599990000";

    pub struct Fixture {
        pub store: Arc<MemoryStore>,
        pub service: MarketplaceService,
    }

    impl Fixture {
        /// One approved affiliate with `inventory` units in stock.
        pub fn with_inventory(inventory: i64) -> Self {
            let store = Arc::new(MemoryStore::new());
            let mut affiliate = approved_affiliate(AFFILIATE);
            affiliate.inventory = inventory;
            let mut batch = WriteBatch::new();
            batch.push(Mutation::InsertAffiliate(affiliate));
            store.commit(batch).expect("seed failed");
            let service = MarketplaceService::new(store.clone(), Settings::default());
            Self { store, service }
        }

        pub fn affiliate(&self) -> Affiliate {
            self.store
                .find_affiliate(AFFILIATE)
                .expect("find failed")
                .expect("affiliate exists")
        }

        pub fn inventory(&self) -> i64 {
            self.affiliate().inventory
        }

        pub fn place(&self, input: PlaceOrder, coupon: Option<&str>) -> Uuid {
            let command = CreateOrder::new(AFFILIATE.to_string(), input, coupon.map(String::from))
                .expect("invalid order");
            match self
                .service
                .execute(Command::CreateOrder(command))
                .expect("create failed")
            {
                CommandOutcome::OrderCreated { order_id } => order_id,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        pub fn order(&self, payment_method: PaymentMethod, quantity: u32) -> Uuid {
            self.place(order_input("Ana Lopez", "5511112222", payment_method, quantity), None)
        }

        pub fn finished_order(&self, payment_method: PaymentMethod, quantity: u32) -> Uuid {
            let id = self.order(payment_method, quantity);
            if payment_method == PaymentMethod::Transfer {
                self.service
                    .execute(Command::ConfirmTransferPayment { order_id: id })
                    .expect("confirm failed");
            }
            self.service
                .execute(Command::SetOrderStatus {
                    order_id: id,
                    status: OrderStatus::Finished,
                })
                .expect("finish failed");
            id
        }

        pub fn request_stock(&self, amount: u32) -> Uuid {
            let amount = NonZeroU32::new(amount).expect("non-zero amount");
            match self
                .service
                .execute(Command::RequestInventoryChange {
                    affiliate_id: AFFILIATE.to_string(),
                    amount,
                })
                .expect("request failed")
            {
                CommandOutcome::InventoryChangeCreated { change_id } => change_id,
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    pub fn order_input(
        name: &str,
        phone: &str,
        payment_method: PaymentMethod,
        quantity: u32,
    ) -> PlaceOrder {
        PlaceOrder {
            customer_name: name.to_string(),
            phone: phone.to_string(),
            address: "Calle 1".to_string(),
            quantity,
            payment_method,
            delivery_choice: DeliveryChoice::Pickup,
            referral_code: None,
            payment_receipt: None,
        }
    }
}
