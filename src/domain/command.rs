//! The closed set of commands the engine accepts.
//!
//! Each variant carries exactly what its precondition needs, in types that
//! make the static part of the precondition unrepresentable when violated:
//! positive request amounts, non-zero adjustments, a resolution that can only
//! approve or reject.

use std::num::{NonZeroI64, NonZeroU32};

use uuid::Uuid;

use super::affiliate::{AffiliateApplication, AffiliateSettings, AffiliateStatus};
use super::cash_out::{CashOut, ProofOfPayment, ReconciliationReport};
use super::errors::DomainError;
use super::inventory::Resolution;
use super::order::{OrderStatus, PlaceOrder};
use super::referral::Coupon;
use super::settings::Settings;

#[derive(Debug, Clone)]
pub struct CreateOrder {
    affiliate_id: String,
    order: PlaceOrder,
    coupon_code: Option<String>,
}

impl CreateOrder {
    pub fn new(
        affiliate_id: String,
        order: PlaceOrder,
        coupon_code: Option<String>,
    ) -> Result<Self, DomainError> {
        if order.quantity == 0 {
            return Err(DomainError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }
        if order.customer_name.trim().is_empty() || order.phone.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "customer name and phone are required".to_string(),
            ));
        }
        let coupon_code = coupon_code
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());
        let order = PlaceOrder {
            referral_code: order
                .referral_code
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty()),
            ..order
        };
        Ok(Self {
            affiliate_id,
            order,
            coupon_code,
        })
    }

    pub fn affiliate_id(&self) -> &str {
        &self.affiliate_id
    }

    pub fn into_parts(self) -> (String, PlaceOrder, Option<String>) {
        (self.affiliate_id, self.order, self.coupon_code)
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    CreateOrder(CreateOrder),
    ConfirmTransferPayment {
        order_id: Uuid,
    },
    SetOrderStatus {
        order_id: Uuid,
        status: OrderStatus,
    },
    ReverseCancellation {
        order_id: Uuid,
    },

    RequestInventoryChange {
        affiliate_id: String,
        amount: NonZeroU32,
    },
    AdminAdjustInventory {
        affiliate_id: String,
        amount: NonZeroI64,
    },
    ResolveInventoryChange {
        change_id: Uuid,
        resolution: Resolution,
    },
    ConfirmInventoryChange {
        change_id: Uuid,
    },
    CancelInventoryRequest {
        change_id: Uuid,
    },

    PerformCashOut {
        affiliate_id: String,
        proof: Option<ProofOfPayment>,
    },
    ConfirmCashOut {
        cash_out_id: Uuid,
    },
    ReconcileSettlements,

    CompleteReferral {
        referral_id: Uuid,
    },
    SetCouponActive {
        code: String,
        active: bool,
    },
    DeleteCoupon {
        code: String,
    },

    RegisterAffiliate(AffiliateApplication),
    SetAffiliateStatus {
        affiliate_id: String,
        status: AffiliateStatus,
    },
    UpdateAffiliateSettings {
        affiliate_id: String,
        settings: AffiliateSettings,
    },
    DeleteAffiliate {
        affiliate_id: String,
    },
    UpdateSettings(Settings),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateOrder(_) => "CreateOrder",
            Command::ConfirmTransferPayment { .. } => "ConfirmTransferPayment",
            Command::SetOrderStatus { .. } => "SetOrderStatus",
            Command::ReverseCancellation { .. } => "ReverseCancellation",
            Command::RequestInventoryChange { .. } => "RequestInventoryChange",
            Command::AdminAdjustInventory { .. } => "AdminAdjustInventory",
            Command::ResolveInventoryChange { .. } => "ResolveInventoryChange",
            Command::ConfirmInventoryChange { .. } => "ConfirmInventoryChange",
            Command::CancelInventoryRequest { .. } => "CancelInventoryRequest",
            Command::PerformCashOut { .. } => "PerformCashOut",
            Command::ConfirmCashOut { .. } => "ConfirmCashOut",
            Command::ReconcileSettlements => "ReconcileSettlements",
            Command::CompleteReferral { .. } => "CompleteReferral",
            Command::SetCouponActive { .. } => "SetCouponActive",
            Command::DeleteCoupon { .. } => "DeleteCoupon",
            Command::RegisterAffiliate(_) => "RegisterAffiliate",
            Command::SetAffiliateStatus { .. } => "SetAffiliateStatus",
            Command::UpdateAffiliateSettings { .. } => "UpdateAffiliateSettings",
            Command::DeleteAffiliate { .. } => "DeleteAffiliate",
            Command::UpdateSettings(_) => "UpdateSettings",
        }
    }
}

/// Result of a successfully committed command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Done,
    OrderCreated { order_id: Uuid },
    InventoryChangeCreated { change_id: Uuid },
    AffiliateRegistered { affiliate_id: String },
    CashOutCreated(Box<CashOut>),
    CouponMinted(Coupon),
    Reconciled(ReconciliationReport),
}
