use std::num::{NonZeroI64, NonZeroU32};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;
use crate::domain::inventory::{InventoryChange, InventoryChangeStatus, Resolution};

use super::MarketplaceService;

impl MarketplaceService {
    fn load_inventory_change(&self, change_id: Uuid) -> Result<InventoryChange, DomainError> {
        self.store
            .find_inventory_change(change_id)?
            .ok_or_else(|| DomainError::not_found("InventoryChange", change_id))
    }

    pub(crate) fn request_inventory_change(
        &self,
        affiliate_id: String,
        amount: NonZeroU32,
    ) -> Result<Uuid, DomainError> {
        self.load_affiliate(&affiliate_id)?;
        let change = InventoryChange::requested(affiliate_id, amount, Utc::now());
        self.insert_inventory_change(change, "InventoryChangeRequested")
    }

    pub(crate) fn admin_adjust_inventory(
        &self,
        affiliate_id: String,
        amount: NonZeroI64,
    ) -> Result<Uuid, DomainError> {
        self.load_affiliate(&affiliate_id)?;
        let change = InventoryChange::admin_adjustment(affiliate_id, amount, Utc::now());
        self.insert_inventory_change(change, "InventoryAdjustmentIssued")
    }

    fn insert_inventory_change(
        &self,
        change: InventoryChange,
        event_type: &str,
    ) -> Result<Uuid, DomainError> {
        let id = change.id;
        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::InsertInventoryChange(change.clone()))
            .event(OutboxEvent::new(
                "InventoryChange",
                id,
                event_type,
                json!({
                    "changeId": id,
                    "affiliateId": change.affiliate_id,
                    "amount": change.amount,
                    "status": change.status,
                }),
            ));
        self.store.commit(batch)?;

        log::info!(
            "Inventory change {} of {} for affiliate {} created as {}",
            id,
            change.amount,
            change.affiliate_id,
            change.status
        );
        Ok(id)
    }

    pub(crate) fn resolve_inventory_change(
        &self,
        change_id: Uuid,
        resolution: Resolution,
    ) -> Result<(), DomainError> {
        let change = self.load_inventory_change(change_id)?;
        let status = change.resolve(resolution)?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::SetInventoryChangeStatus {
                change_id,
                expected: InventoryChangeStatus::Pending,
                status,
            })
            .event(OutboxEvent::new(
                "InventoryChange",
                change_id,
                "InventoryChangeResolved",
                json!({
                    "changeId": change_id,
                    "affiliateId": change.affiliate_id,
                    "status": status,
                }),
            ));
        self.store.commit(batch)?;

        log::info!("Inventory change {} resolved as {}", change_id, status);
        Ok(())
    }

    /// The only place stock moves because of an inventory change. Active
    /// orders the new stock level now covers lose their exceeds-stock flag in
    /// the same batch.
    pub(crate) fn confirm_inventory_change(&self, change_id: Uuid) -> Result<(), DomainError> {
        let change = self.load_inventory_change(change_id)?;
        let delta = change.confirm()?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::SetInventoryChangeStatus {
                change_id,
                expected: InventoryChangeStatus::Approved,
                status: InventoryChangeStatus::Completed,
            })
            .push(Mutation::AdjustInventory {
                affiliate_id: change.affiliate_id.clone(),
                delta,
            })
            .push(Mutation::ClearCoveredLowInventoryFlags {
                affiliate_id: change.affiliate_id.clone(),
            })
            .event(OutboxEvent::new(
                "InventoryChange",
                change_id,
                "InventoryChangeCompleted",
                json!({
                    "changeId": change_id,
                    "affiliateId": change.affiliate_id,
                    "amount": delta,
                }),
            ));
        self.store.commit(batch)?;

        log::info!(
            "Inventory change {} completed: {:+} units for affiliate {}",
            change_id,
            delta,
            change.affiliate_id
        );
        Ok(())
    }

    pub(crate) fn cancel_inventory_request(&self, change_id: Uuid) -> Result<(), DomainError> {
        let change = self.load_inventory_change(change_id)?;
        change.ensure_withdrawable()?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::DeleteInventoryChange {
                change_id,
                expected: InventoryChangeStatus::Pending,
            })
            .event(OutboxEvent::new(
                "InventoryChange",
                change_id,
                "InventoryRequestWithdrawn",
                json!({ "changeId": change_id, "affiliateId": change.affiliate_id }),
            ));
        self.store.commit(batch)?;

        log::info!("Inventory request {} withdrawn", change_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroI64;

    use crate::application::test_support::{Fixture, AFFILIATE};
    use crate::domain::command::{Command, CommandOutcome};
    use crate::domain::errors::DomainError;
    use crate::domain::inventory::{InventoryChangeStatus, Resolution};
    use crate::domain::order::PaymentMethod;
    use crate::domain::ports::MarketplaceStore;

    fn status(fx: &Fixture, id: uuid::Uuid) -> InventoryChangeStatus {
        fx.store
            .find_inventory_change(id)
            .expect("find failed")
            .expect("change exists")
            .status
    }

    #[test]
    fn stock_moves_only_on_confirmation() {
        let fx = Fixture::with_inventory(100);
        let id = fx.request_stock(50);
        assert_eq!(status(&fx, id), InventoryChangeStatus::Pending);

        fx.service
            .execute(Command::ResolveInventoryChange {
                change_id: id,
                resolution: Resolution::Approve,
            })
            .expect("approve failed");
        assert_eq!(fx.inventory(), 100);

        fx.service
            .execute(Command::ConfirmInventoryChange { change_id: id })
            .expect("confirm failed");
        assert_eq!(fx.inventory(), 150);
        assert_eq!(status(&fx, id), InventoryChangeStatus::Completed);
    }

    #[test]
    fn confirming_twice_applies_the_amount_once() {
        let fx = Fixture::with_inventory(0);
        let id = fx.request_stock(30);
        fx.service
            .execute(Command::ResolveInventoryChange {
                change_id: id,
                resolution: Resolution::Approve,
            })
            .expect("approve failed");

        let confirm = || {
            fx.service
                .execute(Command::ConfirmInventoryChange { change_id: id })
        };
        confirm().expect("first confirm failed");
        assert!(matches!(
            confirm(),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(fx.inventory(), 30);
    }

    #[test]
    fn pending_requests_cannot_be_confirmed_and_resolved_ones_cannot_be_resolved_again() {
        let fx = Fixture::with_inventory(10);
        let id = fx.request_stock(5);
        assert!(fx
            .service
            .execute(Command::ConfirmInventoryChange { change_id: id })
            .is_err());

        fx.service
            .execute(Command::ResolveInventoryChange {
                change_id: id,
                resolution: Resolution::Reject,
            })
            .expect("reject failed");
        assert!(matches!(
            fx.service.execute(Command::ResolveInventoryChange {
                change_id: id,
                resolution: Resolution::Approve,
            }),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(fx.inventory(), 10);
    }

    #[test]
    fn admin_adjustments_skip_approval_but_wait_for_the_affiliate() {
        let fx = Fixture::with_inventory(40);
        let outcome = fx
            .service
            .execute(Command::AdminAdjustInventory {
                affiliate_id: AFFILIATE.to_string(),
                amount: NonZeroI64::new(-15).expect("non-zero"),
            })
            .expect("adjust failed");
        let CommandOutcome::InventoryChangeCreated { change_id } = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert_eq!(status(&fx, change_id), InventoryChangeStatus::Approved);
        assert_eq!(fx.inventory(), 40);

        fx.service
            .execute(Command::ConfirmInventoryChange { change_id })
            .expect("confirm failed");
        assert_eq!(fx.inventory(), 25);
    }

    #[test]
    fn only_pending_requests_can_be_withdrawn() {
        let fx = Fixture::with_inventory(10);
        let id = fx.request_stock(5);
        fx.service
            .execute(Command::CancelInventoryRequest { change_id: id })
            .expect("withdraw failed");
        assert!(fx
            .store
            .find_inventory_change(id)
            .expect("find failed")
            .is_none());

        let approved = fx.request_stock(5);
        fx.service
            .execute(Command::ResolveInventoryChange {
                change_id: approved,
                resolution: Resolution::Approve,
            })
            .expect("approve failed");
        assert!(matches!(
            fx.service
                .execute(Command::CancelInventoryRequest { change_id: approved }),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn completed_restock_clears_covered_low_inventory_flags() {
        let fx = Fixture::with_inventory(10);
        let big = fx.order(PaymentMethod::Cash, 30);
        let huge = fx.order(PaymentMethod::Cash, 80);
        assert!(fx.service.order(big).expect("order").is_low_inventory_order);

        let id = fx.request_stock(50);
        fx.service
            .execute(Command::ResolveInventoryChange {
                change_id: id,
                resolution: Resolution::Approve,
            })
            .expect("approve failed");
        fx.service
            .execute(Command::ConfirmInventoryChange { change_id: id })
            .expect("confirm failed");

        assert_eq!(fx.inventory(), 60);
        assert!(!fx.service.order(big).expect("order").is_low_inventory_order);
        assert!(fx.service.order(huge).expect("order").is_low_inventory_order);
    }

    #[test]
    fn unknown_affiliate_cannot_request_stock() {
        let fx = Fixture::with_inventory(0);
        let result = fx.service.execute(Command::RequestInventoryChange {
            affiliate_id: "0000".to_string(),
            amount: std::num::NonZeroU32::new(1).expect("non-zero"),
        });
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
