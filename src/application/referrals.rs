use rand::thread_rng;
use serde_json::json;
use uuid::Uuid;

use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;
use crate::domain::referral::{generate_coupon_code, Coupon, ReferralStatus};

use super::MarketplaceService;

const MAX_CODE_ATTEMPTS: usize = 16;

impl MarketplaceService {
    /// Completes a referral whose referred order finished and mints the
    /// referrer's reward coupon with it.
    pub(crate) fn complete_referral(&self, referral_id: Uuid) -> Result<Coupon, DomainError> {
        let referral = self
            .store
            .find_referral(referral_id)?
            .ok_or_else(|| DomainError::not_found("Referral", referral_id))?;
        let order = self.load_order(referral.referee_order_id)?;
        referral.ensure_completable(&order)?;

        let settings = self.settings()?;
        let coupon = Coupon::mint(self.unused_coupon_code()?, &referral, &settings);

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::SetReferralStatus {
                referral_id,
                expected: ReferralStatus::ActiveOrder,
                status: ReferralStatus::Completed,
            })
            .push(Mutation::InsertCoupon(coupon.clone()))
            .event(OutboxEvent::new(
                "Referral",
                referral_id,
                "ReferralCompleted",
                json!({
                    "referralId": referral_id,
                    "refereeOrderId": referral.referee_order_id,
                    "couponCode": coupon.code,
                    "rewardAmount": coupon.reward_amount.to_string(),
                    "generatedForPhone": coupon.generated_for_phone,
                }),
            ));
        self.store.commit(batch)?;

        log::info!(
            "Referral {} completed, coupon {} minted for {}",
            referral_id,
            coupon.code,
            referral.referrer_name
        );
        Ok(coupon)
    }

    fn unused_coupon_code(&self) -> Result<String, DomainError> {
        let mut rng = thread_rng();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_coupon_code(&mut rng);
            if self.store.find_coupon(&code)?.is_none() {
                return Ok(code);
            }
        }
        Err(DomainError::Internal(
            "could not find an unused coupon code".to_string(),
        ))
    }

    pub(crate) fn set_coupon_active(&self, code: &str, active: bool) -> Result<(), DomainError> {
        let coupon = self
            .store
            .find_coupon(code)?
            .ok_or_else(|| DomainError::not_found("Coupon", code))?;
        coupon.ensure_toggleable()?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::SetCouponActive {
                code: coupon.code.clone(),
                active,
            })
            .event(OutboxEvent::new(
                "Coupon",
                &coupon.code,
                if active {
                    "CouponActivated"
                } else {
                    "CouponDeactivated"
                },
                json!({ "code": coupon.code }),
            ));
        self.store.commit(batch)?;

        log::info!("Coupon {} active = {}", coupon.code, active);
        Ok(())
    }

    pub(crate) fn delete_coupon(&self, code: &str) -> Result<(), DomainError> {
        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::DeleteCoupon {
                code: code.to_string(),
            })
            .event(OutboxEvent::new(
                "Coupon",
                code,
                "CouponDeleted",
                json!({ "code": code }),
            ));
        self.store.commit(batch)?;

        log::info!("Coupon {} deleted", code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use crate::application::test_support::{order_input, Fixture};
    use crate::domain::command::{Command, CommandOutcome};
    use crate::domain::errors::DomainError;
    use crate::domain::order::{OrderStatus, PaymentMethod};
    use crate::domain::ports::MarketplaceStore;
    use crate::domain::referral::{Coupon, ReferralStatus};

    fn referred_order(fx: &Fixture) -> uuid::Uuid {
        fx.place(
            order_input("Maria Perez", "5512345678", PaymentMethod::Cash, 1),
            None,
        );
        let mut input = order_input("Luis Gomez", "5587654321", PaymentMethod::Cash, 6);
        input.referral_code = Some("MARI5678".to_string());
        fx.place(input, None)
    }

    fn complete(fx: &Fixture, referral_id: uuid::Uuid) -> Result<Coupon, DomainError> {
        match fx
            .service
            .execute(Command::CompleteReferral { referral_id })?
        {
            CommandOutcome::CouponMinted(coupon) => Ok(coupon),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn referral_pays_out_once_the_order_is_finished() {
        let fx = Fixture::with_inventory(100);
        let order_id = referred_order(&fx);
        let referral = fx
            .store
            .referral_for_order(order_id)
            .expect("query failed")
            .expect("referral recorded");

        assert!(matches!(
            complete(&fx, referral.id),
            Err(DomainError::PreconditionFailed(_))
        ));

        fx.service
            .execute(Command::SetOrderStatus {
                order_id,
                status: OrderStatus::Finished,
            })
            .expect("finish failed");
        let coupon = complete(&fx, referral.id).expect("complete failed");

        assert!(coupon.code.starts_with("REGALO-"));
        assert_eq!(coupon.reward_amount, BigDecimal::from(120));
        assert_eq!(coupon.generated_for_phone.as_deref(), Some("5512345678"));
        assert!(coupon.is_active && !coupon.is_used);
        assert_eq!(
            fx.store
                .find_referral(referral.id)
                .expect("find failed")
                .expect("referral exists")
                .status,
            ReferralStatus::Completed
        );

        assert!(matches!(
            complete(&fx, referral.id),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(fx.store.list_coupons().expect("coupons").len(), 1);
    }

    #[test]
    fn minted_coupon_is_redeemable_only_by_the_referrer() {
        let fx = Fixture::with_inventory(100);
        let order_id = referred_order(&fx);
        fx.service
            .execute(Command::SetOrderStatus {
                order_id,
                status: OrderStatus::Finished,
            })
            .expect("finish failed");
        let referral = fx
            .store
            .referral_for_order(order_id)
            .expect("query failed")
            .expect("referral recorded");
        let coupon = complete(&fx, referral.id).expect("complete failed");

        let id = fx.place(
            order_input("Maria Perez", "5512345678", PaymentMethod::Cash, 20),
            Some(&coupon.code),
        );
        let order = fx.service.order(id).expect("order");
        assert_eq!(order.discount_applied, BigDecimal::from(120));
    }

    #[test]
    fn used_coupons_cannot_be_toggled() {
        let fx = Fixture::with_inventory(100);
        let mut batch = crate::domain::batch::WriteBatch::new();
        batch.push(crate::domain::batch::Mutation::InsertCoupon(Coupon {
            code: "REGALO-CCCCCC".to_string(),
            is_used: false,
            reward_amount: BigDecimal::from(120),
            generated_for_phone: None,
            is_active: true,
        }));
        fx.store.commit(batch).expect("seed failed");

        fx.service
            .execute(Command::SetCouponActive {
                code: "REGALO-CCCCCC".to_string(),
                active: false,
            })
            .expect("deactivate failed");
        let deactivated = fx
            .store
            .find_coupon("REGALO-CCCCCC")
            .expect("find failed")
            .expect("coupon exists");
        assert!(!deactivated.is_active);

        fx.service
            .execute(Command::SetCouponActive {
                code: "REGALO-CCCCCC".to_string(),
                active: true,
            })
            .expect("activate failed");
        fx.place(
            order_input("Ana Lopez", "5511112222", PaymentMethod::Cash, 1),
            Some("REGALO-CCCCCC"),
        );
        assert!(matches!(
            fx.service.execute(Command::SetCouponActive {
                code: "REGALO-CCCCCC".to_string(),
                active: false,
            }),
            Err(DomainError::InvalidTransition { .. })
        ));

        fx.service
            .execute(Command::DeleteCoupon {
                code: "REGALO-CCCCCC".to_string(),
            })
            .expect("delete failed");
        assert!(matches!(
            fx.service.execute(Command::DeleteCoupon {
                code: "REGALO-CCCCCC".to_string(),
            }),
            Err(DomainError::NotFound { .. })
        ));
    }
}
