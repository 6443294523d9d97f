use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::affiliate::Affiliate;
use super::errors::DomainError;
use super::referral::Coupon;
use super::settings::Settings;

string_enum! {
    pub enum OrderStatus {
        PendingConfirmation,
        Active,
        Finished,
        Cancelled,
    }
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Finished | OrderStatus::Cancelled)
    }
}

string_enum! {
    pub enum PaymentMethod {
        Cash,
        Transfer,
    }
}

string_enum! {
    pub enum DeliveryChoice {
        Delivery,
        Pickup,
    }
}

/// One customer purchase. Money fields are frozen when the order is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub quantity: u32,
    /// `quantity × unit price` at the time the order was placed.
    #[serde(rename = "totalCost")]
    pub subtotal: BigDecimal,
    pub payment_method: PaymentMethod,
    pub delivery_choice: DeliveryChoice,
    pub delivery_fee_applied: BigDecimal,
    pub discount_applied: BigDecimal,
    pub status: OrderStatus,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub affiliate_id: String,
    pub affiliate_name: String,
    pub coupon_used: Option<String>,
    pub referral_code_used: Option<String>,
    pub payment_receipt: Option<String>,
    pub settled_in_cash_out_id: Option<Uuid>,
    pub is_low_inventory_order: bool,
}

/// Everything needed to place an order besides the entities it touches.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub quantity: u32,
    pub payment_method: PaymentMethod,
    pub delivery_choice: DeliveryChoice,
    pub referral_code: Option<String>,
    pub payment_receipt: Option<String>,
}

/// What the referral linked to an order must do when the order moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralEffect {
    None,
    Cancel,
    Restore,
}

/// A validated status change together with the side effects it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransition {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Units to take off the owning affiliate's stock.
    pub inventory_debit: Option<u32>,
    pub referral: ReferralEffect,
}

impl Order {
    pub fn initial_status(payment_method: PaymentMethod) -> OrderStatus {
        match payment_method {
            PaymentMethod::Cash => OrderStatus::Active,
            PaymentMethod::Transfer => OrderStatus::PendingConfirmation,
        }
    }

    /// Builds a new order, freezing subtotal, delivery fee and discount.
    pub fn place(
        input: PlaceOrder,
        affiliate: &Affiliate,
        settings: &Settings,
        coupon: Option<&Coupon>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if input.quantity == 0 {
            return Err(DomainError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }

        let subtotal = BigDecimal::from(input.quantity) * &settings.unit_price;
        let delivery_fee_applied = affiliate.delivery_fee_for(input.delivery_choice);
        let discount_applied = match coupon {
            Some(c) if c.reward_amount > subtotal => subtotal.clone(),
            Some(c) => c.reward_amount.clone(),
            None => BigDecimal::from(0),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            customer_name: input.customer_name,
            phone: input.phone,
            address: input.address,
            quantity: input.quantity,
            subtotal,
            payment_method: input.payment_method,
            delivery_choice: input.delivery_choice,
            delivery_fee_applied,
            discount_applied,
            status: Self::initial_status(input.payment_method),
            created_at: now,
            affiliate_id: affiliate.id.clone(),
            affiliate_name: affiliate.name.clone(),
            coupon_used: coupon.map(|c| c.code.clone()),
            referral_code_used: input.referral_code,
            payment_receipt: input.payment_receipt,
            settled_in_cash_out_id: None,
            is_low_inventory_order: i64::from(input.quantity) > affiliate.inventory,
        })
    }

    pub fn is_unsettled_finished(&self) -> bool {
        self.status == OrderStatus::Finished && self.settled_in_cash_out_id.is_none()
    }

    /// Admin confirmed receipt of a transfer payment.
    pub fn confirm_transfer(&self) -> Result<OrderTransition, DomainError> {
        if self.status != OrderStatus::PendingConfirmation {
            return Err(self.rejected(OrderStatus::Active));
        }
        Ok(self.transition(OrderStatus::Active, None, ReferralEffect::None))
    }

    /// General status change. Only `Finished` and `Cancelled` are reachable
    /// this way.
    pub fn transition_to(&self, to: OrderStatus) -> Result<OrderTransition, DomainError> {
        match (self.status, to) {
            (OrderStatus::Active, OrderStatus::Finished) => Ok(self.transition(
                to,
                Some(self.quantity),
                ReferralEffect::None,
            )),
            (OrderStatus::Active | OrderStatus::PendingConfirmation, OrderStatus::Cancelled) => {
                Ok(self.transition(to, None, ReferralEffect::Cancel))
            }
            _ => Err(self.rejected(to)),
        }
    }

    /// Operator correction of a cancellation. Never debits stock again.
    pub fn reverse_cancellation(&self) -> Result<OrderTransition, DomainError> {
        if self.status != OrderStatus::Cancelled {
            return Err(self.rejected(OrderStatus::Active));
        }
        Ok(self.transition(OrderStatus::Active, None, ReferralEffect::Restore))
    }

    fn transition(
        &self,
        to: OrderStatus,
        inventory_debit: Option<u32>,
        referral: ReferralEffect,
    ) -> OrderTransition {
        OrderTransition {
            order_id: self.id,
            from: self.status,
            to,
            inventory_debit,
            referral,
        }
    }

    fn rejected(&self, to: OrderStatus) -> DomainError {
        DomainError::invalid_transition(
            "Order",
            self.id,
            format!("cannot move from {} to {}", self.status, to),
        )
    }
}
