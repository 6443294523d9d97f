//! Money model for a single order.
//!
//! Every figure is derived from the fields frozen on the order at creation
//! time plus the tenant commission rate. Nothing here reads current prices.

use bigdecimal::BigDecimal;
use serde::Serialize;

use super::order::{Order, PaymentMethod};

/// Commission the affiliate earns on `order`: `quantity × rate / 100`.
pub fn commission(order: &Order, commission_rate_cents: i64) -> BigDecimal {
    let units = BigDecimal::from(order.quantity);
    units * BigDecimal::from(commission_rate_cents) / BigDecimal::from(100)
}

/// What the customer pays: `subtotal + delivery fee − discount`.
pub fn customer_total(order: &Order) -> BigDecimal {
    &order.subtotal + &order.delivery_fee_applied - &order.discount_applied
}

/// Cash orders: the affiliate collected the money and keeps commission and
/// delivery fee, the rest goes up to the admin.
pub fn amount_affiliate_owes_admin(order: &Order, commission_rate_cents: i64) -> BigDecimal {
    (&order.subtotal - &order.discount_applied) - commission(order, commission_rate_cents)
}

/// Transfer orders: the admin holds the money and owes the affiliate its
/// commission plus the delivery fee.
pub fn amount_admin_owes_affiliate(order: &Order, commission_rate_cents: i64) -> BigDecimal {
    commission(order, commission_rate_cents) + &order.delivery_fee_applied
}

/// Signed per-order share of an affiliate balance. Positive means the
/// affiliate pays the admin, negative means the admin pays the affiliate.
pub fn balance_contribution(order: &Order, commission_rate_cents: i64) -> BigDecimal {
    match order.payment_method {
        PaymentMethod::Cash => amount_affiliate_owes_admin(order, commission_rate_cents),
        PaymentMethod::Transfer => -amount_admin_owes_affiliate(order, commission_rate_cents),
    }
}

/// Full customer bill breakdown of one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBill {
    pub subtotal: BigDecimal,
    pub delivery_fee: BigDecimal,
    pub discount: BigDecimal,
    pub customer_total: BigDecimal,
    pub commission: BigDecimal,
    pub payment_method: PaymentMethod,
    /// Set for cash orders.
    pub affiliate_owes_admin: Option<BigDecimal>,
    /// Set for transfer orders.
    pub admin_owes_affiliate: Option<BigDecimal>,
    pub balance_contribution: BigDecimal,
}

impl OrderBill {
    pub fn for_order(order: &Order, commission_rate_cents: i64) -> Self {
        let (affiliate_owes_admin, admin_owes_affiliate) = match order.payment_method {
            PaymentMethod::Cash => (
                Some(amount_affiliate_owes_admin(order, commission_rate_cents)),
                None,
            ),
            PaymentMethod::Transfer => (
                None,
                Some(amount_admin_owes_affiliate(order, commission_rate_cents)),
            ),
        };
        Self {
            subtotal: order.subtotal.clone(),
            delivery_fee: order.delivery_fee_applied.clone(),
            discount: order.discount_applied.clone(),
            customer_total: customer_total(order),
            commission: commission(order, commission_rate_cents),
            payment_method: order.payment_method,
            affiliate_owes_admin,
            admin_owes_affiliate,
            balance_contribution: balance_contribution(order, commission_rate_cents),
        }
    }
}
