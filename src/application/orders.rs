use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::command::CreateOrder;
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;
use crate::domain::order::{Order, OrderStatus, OrderTransition, ReferralEffect};
use crate::domain::referral::{Customer, Referral, ReferralStatus};

use super::MarketplaceService;

impl MarketplaceService {
    pub(crate) fn create_order(&self, command: CreateOrder) -> Result<Uuid, DomainError> {
        let (affiliate_id, input, coupon_code) = command.into_parts();
        let affiliate = self.load_affiliate(&affiliate_id)?;
        affiliate.ensure_accepts_orders()?;
        let settings = self.settings()?;

        let coupon = match coupon_code {
            Some(code) => {
                let coupon = self.store.find_coupon(&code)?.ok_or_else(|| {
                    DomainError::PreconditionFailed(format!("coupon {} does not exist", code))
                })?;
                coupon.ensure_redeemable_by(&input.phone)?;
                Some(coupon)
            }
            None => None,
        };
        let referrer = match &input.referral_code {
            Some(code) => Some(self.resolve_referrer(code, &input.phone)?),
            None => None,
        };

        let now = Utc::now();
        let order = Order::place(input, &affiliate, &settings, coupon.as_ref(), now)?;

        let mut batch = WriteBatch::new();
        batch.push(Mutation::InsertOrder(order.clone()));
        if let Some(coupon) = &coupon {
            batch.push(Mutation::ConsumeCoupon {
                code: coupon.code.clone(),
            });
        }
        batch.push(Mutation::UpsertCustomer(Customer {
            name: order.customer_name.clone(),
            phone: order.phone.clone(),
        }));
        if let Some(referrer) = &referrer {
            batch.push(Mutation::InsertReferral(Referral::for_order(
                referrer, &order, now,
            )));
        }
        batch.event(OutboxEvent::new(
            "Order",
            order.id,
            "OrderCreated",
            json!({
                "orderId": order.id,
                "affiliateId": order.affiliate_id,
                "quantity": order.quantity,
                "paymentMethod": order.payment_method,
                "status": order.status,
                "totalCost": order.subtotal.to_string(),
                "deliveryFeeApplied": order.delivery_fee_applied.to_string(),
                "discountApplied": order.discount_applied.to_string(),
                "couponUsed": order.coupon_used,
                "referralCodeUsed": order.referral_code_used,
                "isLowInventoryOrder": order.is_low_inventory_order,
            }),
        ));
        self.store.commit(batch)?;

        log::info!(
            "Order {} placed with affiliate {} ({} units, {})",
            order.id,
            order.affiliate_id,
            order.quantity,
            order.status
        );
        if order.is_low_inventory_order {
            log::warn!(
                "Order {} exceeds the stock of affiliate {} ({} in stock)",
                order.id,
                affiliate.id,
                affiliate.inventory
            );
        }
        Ok(order.id)
    }

    /// A referral code is honoured only for a new customer's first order and
    /// never for the referrer themselves.
    fn resolve_referrer(&self, code: &str, phone: &str) -> Result<Customer, DomainError> {
        let referrer = self
            .store
            .list_customers()?
            .into_iter()
            .find(|c| c.referral_code() == code)
            .ok_or_else(|| {
                DomainError::PreconditionFailed(format!("unknown referral code {}", code))
            })?;
        if referrer.phone == phone {
            return Err(DomainError::PreconditionFailed(
                "customers cannot refer themselves".to_string(),
            ));
        }
        if !self.store.orders_for_phone(phone)?.is_empty() {
            return Err(DomainError::PreconditionFailed(
                "referral codes only apply to a customer's first order".to_string(),
            ));
        }
        Ok(referrer)
    }

    pub(crate) fn confirm_transfer_payment(&self, order_id: Uuid) -> Result<(), DomainError> {
        let order = self.load_order(order_id)?;
        let transition = order.confirm_transfer()?;
        self.commit_transition(&order, transition, "TransferPaymentConfirmed")
    }

    pub(crate) fn set_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), DomainError> {
        let order = self.load_order(order_id)?;
        let transition = order.transition_to(status)?;
        let event_type = match status {
            OrderStatus::Finished => "OrderFinished",
            _ => "OrderCancelled",
        };
        self.commit_transition(&order, transition, event_type)
    }

    pub(crate) fn reverse_cancellation(&self, order_id: Uuid) -> Result<(), DomainError> {
        let order = self.load_order(order_id)?;
        let transition = order.reverse_cancellation()?;
        self.commit_transition(&order, transition, "OrderCancellationReversed")
    }

    /// Commits the status change together with its stock and referral side
    /// effects. The status guard makes a replayed transition fail instead of
    /// debiting twice.
    fn commit_transition(
        &self,
        order: &Order,
        transition: OrderTransition,
        event_type: &str,
    ) -> Result<(), DomainError> {
        let mut batch = WriteBatch::new();
        batch.push(Mutation::SetOrderStatus {
            order_id: transition.order_id,
            expected: transition.from,
            status: transition.to,
        });
        if let Some(units) = transition.inventory_debit {
            batch.push(Mutation::AdjustInventory {
                affiliate_id: order.affiliate_id.clone(),
                delta: -i64::from(units),
            });
        }

        let referral_change = match transition.referral {
            ReferralEffect::None => None,
            ReferralEffect::Cancel => {
                Some((ReferralStatus::ActiveOrder, ReferralStatus::Cancelled))
            }
            ReferralEffect::Restore => {
                Some((ReferralStatus::Cancelled, ReferralStatus::ActiveOrder))
            }
        };
        if let Some((expected, status)) = referral_change {
            if let Some(referral) = self.store.referral_for_order(order.id)? {
                if referral.status == expected {
                    batch.push(Mutation::SetReferralStatus {
                        referral_id: referral.id,
                        expected,
                        status,
                    });
                }
            }
        }

        batch.event(OutboxEvent::new(
            "Order",
            order.id,
            event_type,
            json!({
                "orderId": order.id,
                "affiliateId": order.affiliate_id,
                "from": transition.from,
                "to": transition.to,
                "inventoryDebit": transition.inventory_debit,
            }),
        ));
        self.store.commit(batch)?;

        log::info!(
            "Order {} moved {} -> {}",
            order.id,
            transition.from,
            transition.to
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use crate::application::test_support::{order_input, Fixture, AFFILIATE};
    use crate::domain::batch::{Mutation, WriteBatch};
    use crate::domain::command::{Command, CreateOrder};
    use crate::domain::errors::DomainError;
    use crate::domain::order::{DeliveryChoice, OrderStatus, PaymentMethod};
    use crate::domain::ports::MarketplaceStore;
    use crate::domain::referral::{Coupon, ReferralStatus};

    #[test]
    fn finishing_twice_debits_inventory_once() {
        let fx = Fixture::with_inventory(100);
        let id = fx.order(PaymentMethod::Cash, 10);

        let finish = || {
            fx.service.execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Finished,
            })
        };
        finish().expect("first finish failed");
        assert!(matches!(
            finish(),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(fx.inventory(), 90);
    }

    #[test]
    fn cancelling_never_touches_stock() {
        let fx = Fixture::with_inventory(100);
        let id = fx.order(PaymentMethod::Transfer, 10);
        fx.service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Cancelled,
            })
            .expect("cancel failed");

        assert_eq!(fx.inventory(), 100);
        let order = fx.service.order(id).expect("order");
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(fx
            .service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Finished,
            })
            .is_err());
    }

    #[test]
    fn oversold_order_may_drive_stock_negative() {
        let fx = Fixture::with_inventory(5);
        let id = fx.order(PaymentMethod::Cash, 8);
        assert!(fx.service.order(id).expect("order").is_low_inventory_order);

        fx.service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Finished,
            })
            .expect("finish failed");
        assert_eq!(fx.inventory(), -3);
    }

    #[test]
    fn transfer_orders_wait_for_payment_confirmation() {
        let fx = Fixture::with_inventory(100);
        let id = fx.order(PaymentMethod::Transfer, 2);
        assert!(fx
            .service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Finished,
            })
            .is_err());

        fx.service
            .execute(Command::ConfirmTransferPayment { order_id: id })
            .expect("confirm failed");
        assert_eq!(fx.service.order(id).expect("order").status, OrderStatus::Active);
        assert!(matches!(
            fx.service
                .execute(Command::ConfirmTransferPayment { order_id: id }),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn delivery_fee_and_coupon_discount_are_frozen() {
        let fx = Fixture::with_inventory(100);
        let coupon = Coupon {
            code: "REGALO-AAAAAA".to_string(),
            is_used: false,
            reward_amount: BigDecimal::from(120),
            generated_for_phone: Some("5511112222".to_string()),
            is_active: true,
        };
        let mut seed = WriteBatch::new();
        seed.push(Mutation::InsertCoupon(coupon));
        fx.store.commit(seed).expect("seed failed");

        let mut input = order_input("Ana Lopez", "5511112222", PaymentMethod::Cash, 5);
        input.delivery_choice = DeliveryChoice::Delivery;
        let id = fx.place(input, Some(" regalo-aaaaaa "));

        let order = fx.service.order(id).expect("order");
        assert_eq!(order.subtotal, BigDecimal::from(60));
        assert_eq!(order.discount_applied, BigDecimal::from(60));
        assert_eq!(order.delivery_fee_applied, BigDecimal::from(20));
        assert_eq!(order.coupon_used.as_deref(), Some("REGALO-AAAAAA"));

        let used = fx
            .store
            .find_coupon("REGALO-AAAAAA")
            .expect("find failed")
            .expect("coupon exists");
        assert!(used.is_used);

        // Consumed coupons stay consumed when the order is cancelled.
        fx.service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Cancelled,
            })
            .expect("cancel failed");
        let after = fx
            .store
            .find_coupon("REGALO-AAAAAA")
            .expect("find failed")
            .expect("coupon exists");
        assert!(after.is_used);
    }

    #[test]
    fn coupon_bound_to_another_phone_rejects_the_whole_order() {
        let fx = Fixture::with_inventory(100);
        let mut seed = WriteBatch::new();
        seed.push(Mutation::InsertCoupon(Coupon {
            code: "REGALO-BBBBBB".to_string(),
            is_used: false,
            reward_amount: BigDecimal::from(120),
            generated_for_phone: Some("5500000000".to_string()),
            is_active: true,
        }));
        fx.store.commit(seed).expect("seed failed");

        let command = CreateOrder::new(
            AFFILIATE.to_string(),
            order_input("Ana Lopez", "5511112222", PaymentMethod::Cash, 1),
            Some("REGALO-BBBBBB".to_string()),
        )
        .expect("valid command");
        assert!(matches!(
            fx.service.execute(Command::CreateOrder(command)),
            Err(DomainError::PreconditionFailed(_))
        ));
        assert!(fx.service.orders().expect("orders").is_empty());
    }

    #[test]
    fn first_order_with_referral_code_records_a_referral() {
        let fx = Fixture::with_inventory(100);
        fx.place(
            order_input("Maria Perez", "5512345678", PaymentMethod::Cash, 1),
            None,
        );

        let mut input = order_input("Luis Gomez", "5587654321", PaymentMethod::Cash, 3);
        input.referral_code = Some("mari5678".to_string());
        let id = fx.place(input, None);

        let referral = fx
            .store
            .referral_for_order(id)
            .expect("query failed")
            .expect("referral recorded");
        assert_eq!(referral.status, ReferralStatus::ActiveOrder);
        assert_eq!(referral.referrer_phone, "5512345678");
        assert_eq!(referral.referee_order_quantity, 3);

        // Second order of the same customer cannot use a code again.
        let mut again = order_input("Luis Gomez", "5587654321", PaymentMethod::Cash, 1);
        again.referral_code = Some("MARI5678".to_string());
        let command =
            CreateOrder::new(AFFILIATE.to_string(), again, None).expect("valid command");
        assert!(matches!(
            fx.service.execute(Command::CreateOrder(command)),
            Err(DomainError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn closed_affiliate_refuses_orders() {
        let fx = Fixture::with_inventory(100);
        let affiliate = fx.affiliate();
        let mut batch = WriteBatch::new();
        batch.push(Mutation::UpdateAffiliateSettings {
            affiliate_id: AFFILIATE.to_string(),
            settings: crate::domain::affiliate::AffiliateSettings {
                has_delivery_service: affiliate.has_delivery_service,
                delivery_cost: affiliate.delivery_cost,
                is_temporarily_closed: true,
                bank_details: None,
                address: None,
                schedule: None,
            },
        });
        fx.store.commit(batch).expect("update failed");

        let command = CreateOrder::new(
            AFFILIATE.to_string(),
            order_input("Ana Lopez", "5511112222", PaymentMethod::Cash, 1),
            None,
        )
        .expect("valid command");
        assert!(matches!(
            fx.service.execute(Command::CreateOrder(command)),
            Err(DomainError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn cancel_and_reverse_follow_the_linked_referral() {
        let fx = Fixture::with_inventory(100);
        fx.place(
            order_input("Maria Perez", "5512345678", PaymentMethod::Cash, 1),
            None,
        );
        let mut input = order_input("Luis Gomez", "5587654321", PaymentMethod::Cash, 4);
        input.referral_code = Some("MARI5678".to_string());
        let id = fx.place(input, None);
        let referral_status = || {
            fx.store
                .referral_for_order(id)
                .expect("query failed")
                .expect("referral recorded")
                .status
        };

        fx.service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Cancelled,
            })
            .expect("cancel failed");
        assert_eq!(referral_status(), ReferralStatus::Cancelled);

        fx.service
            .execute(Command::ReverseCancellation { order_id: id })
            .expect("reverse failed");
        assert_eq!(referral_status(), ReferralStatus::ActiveOrder);
        assert_eq!(fx.service.order(id).expect("order").status, OrderStatus::Active);
        assert_eq!(fx.inventory(), 100);

        // Only a cancelled order can be reversed.
        assert!(matches!(
            fx.service
                .execute(Command::ReverseCancellation { order_id: id }),
            Err(DomainError::InvalidTransition { .. })
        ));

        fx.service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: OrderStatus::Finished,
            })
            .expect("finish failed");
        assert_eq!(fx.inventory(), 96);
    }

    #[test]
    fn every_committed_command_appends_an_outbox_event() {
        let fx = Fixture::with_inventory(100);
        fx.finished_order(PaymentMethod::Cash, 1);

        let events = fx.store.outbox_events();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["OrderCreated", "OrderFinished"]);
    }
}
