use std::num::{NonZeroI64, NonZeroU32};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

string_enum! {
    /// `Pending → Approved → Completed`, or `Pending → Rejected`.
    pub enum InventoryChangeStatus {
        Pending,
        Approved,
        Rejected,
        Completed,
    }
}

/// Admin answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Approve,
    Reject,
}

impl Resolution {
    pub fn target(&self) -> InventoryChangeStatus {
        match self {
            Resolution::Approve => InventoryChangeStatus::Approved,
            Resolution::Reject => InventoryChangeStatus::Rejected,
        }
    }
}

/// Signed stock delta against one affiliate. Applied to the live counter only
/// on `Approved → Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChange {
    pub id: Uuid,
    pub affiliate_id: String,
    pub amount: i64,
    pub status: InventoryChangeStatus,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl InventoryChange {
    /// Affiliate asks for more stock.
    pub fn requested(affiliate_id: String, amount: NonZeroU32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            affiliate_id,
            amount: i64::from(amount.get()),
            status: InventoryChangeStatus::Pending,
            created_at: now,
        }
    }

    /// Admin-initiated adjustment; skips the approval step.
    pub fn admin_adjustment(affiliate_id: String, amount: NonZeroI64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            affiliate_id,
            amount: amount.get(),
            status: InventoryChangeStatus::Approved,
            created_at: now,
        }
    }

    pub fn resolve(&self, resolution: Resolution) -> Result<InventoryChangeStatus, DomainError> {
        self.expect_status(InventoryChangeStatus::Pending, resolution.target())?;
        Ok(resolution.target())
    }

    /// Receiving party confirms. Returns the delta to apply to the stock.
    pub fn confirm(&self) -> Result<i64, DomainError> {
        self.expect_status(InventoryChangeStatus::Approved, InventoryChangeStatus::Completed)?;
        Ok(self.amount)
    }

    /// Only a request nobody acted on may be withdrawn.
    pub fn ensure_withdrawable(&self) -> Result<(), DomainError> {
        if self.status != InventoryChangeStatus::Pending {
            return Err(DomainError::invalid_transition(
                "InventoryChange",
                self.id,
                format!("cannot withdraw a {} request", self.status),
            ));
        }
        Ok(())
    }

    fn expect_status(
        &self,
        expected: InventoryChangeStatus,
        to: InventoryChangeStatus,
    ) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(
                "InventoryChange",
                self.id,
                format!("cannot move from {} to {}", self.status, to),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: u32) -> InventoryChange {
        InventoryChange::requested(
            "5599990000".to_string(),
            NonZeroU32::new(amount).expect("non-zero"),
            Utc::now(),
        )
    }

    #[test]
    fn requests_start_pending() {
        let change = request(50);
        assert_eq!(change.status, InventoryChangeStatus::Pending);
        assert_eq!(change.amount, 50);
    }

    #[test]
    fn admin_adjustments_start_approved_and_keep_sign() {
        let change = InventoryChange::admin_adjustment(
            "5599990000".to_string(),
            NonZeroI64::new(-15).expect("non-zero"),
            Utc::now(),
        );
        assert_eq!(change.status, InventoryChangeStatus::Approved);
        assert_eq!(change.confirm().expect("confirm failed"), -15);
    }

    #[test]
    fn pending_requests_cannot_be_confirmed() {
        assert!(matches!(
            request(10).confirm(),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn only_pending_requests_can_be_resolved() {
        let mut change = request(10);
        assert_eq!(
            change.resolve(Resolution::Approve).expect("resolve failed"),
            InventoryChangeStatus::Approved
        );
        change.status = InventoryChangeStatus::Approved;
        assert!(change.resolve(Resolution::Reject).is_err());
    }

    #[test]
    fn completed_changes_are_not_applied_twice() {
        let mut change = request(10);
        change.status = InventoryChangeStatus::Completed;
        assert!(change.confirm().is_err());
        assert!(change.ensure_withdrawable().is_err());
    }
}
