use std::collections::HashSet;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::cash_out::{
    find_settlement_inconsistencies, CashOut, CashOutStatus, ProofOfPayment,
    ReconciliationReport, SettlementInconsistency,
};
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;

use super::MarketplaceService;

impl MarketplaceService {
    /// Locks the affiliate's unsettled finished orders into one cash-out and
    /// marks each of them, all in one batch.
    pub(crate) fn perform_cash_out(
        &self,
        affiliate_id: &str,
        proof: Option<ProofOfPayment>,
    ) -> Result<CashOut, DomainError> {
        let preview = self.settlement_preview(affiliate_id)?;

        let already_listed: HashSet<Uuid> = self
            .store
            .list_cash_outs()?
            .into_iter()
            .flat_map(|c| c.orders_covered_ids)
            .collect();
        if let Some(order) = preview
            .orders
            .iter()
            .find(|o| already_listed.contains(&o.id))
        {
            log::error!(
                "Order {} is unmarked but already listed by a cash-out; reconcile before settling affiliate {}",
                order.id,
                affiliate_id
            );
            return Err(DomainError::PartialCommitRisk(format!(
                "order {} is already covered by an earlier cash-out",
                order.id
            )));
        }

        let cash_out = preview.into_cash_out(proof, Utc::now())?;

        let mut batch = WriteBatch::new();
        batch.push(Mutation::InsertCashOut(cash_out.clone()));
        for order_id in &cash_out.orders_covered_ids {
            batch.push(Mutation::MarkOrderSettled {
                order_id: *order_id,
                cash_out_id: cash_out.id,
            });
        }
        batch.event(OutboxEvent::new(
            "CashOut",
            cash_out.id,
            "CashOutPerformed",
            json!({
                "cashOutId": cash_out.id,
                "affiliateId": cash_out.affiliate_id,
                "ordersCoveredIds": cash_out.orders_covered_ids,
                "totalSales": cash_out.total_sales.to_string(),
                "totalCommission": cash_out.total_commission.to_string(),
                "totalDeliveryFees": cash_out.total_delivery_fees.to_string(),
                "balance": cash_out.balance.to_string(),
                "status": cash_out.status,
            }),
        ));
        self.store.commit(batch)?;

        log::info!(
            "Cash-out {} for affiliate {}: {} orders, balance {} ({})",
            cash_out.id,
            cash_out.affiliate_id,
            cash_out.orders_covered_ids.len(),
            cash_out.balance,
            cash_out.status
        );
        Ok(cash_out)
    }

    pub(crate) fn confirm_cash_out(&self, cash_out_id: Uuid) -> Result<(), DomainError> {
        let cash_out = self
            .store
            .find_cash_out(cash_out_id)?
            .ok_or_else(|| DomainError::not_found("CashOut", cash_out_id))?;
        cash_out.confirm()?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::SetCashOutStatus {
                cash_out_id,
                expected: CashOutStatus::PendingAffiliateConfirmation,
                status: CashOutStatus::Completed,
            })
            .event(OutboxEvent::new(
                "CashOut",
                cash_out_id,
                "CashOutConfirmed",
                json!({ "cashOutId": cash_out_id, "affiliateId": cash_out.affiliate_id }),
            ));
        self.store.commit(batch)?;

        log::info!(
            "Affiliate {} confirmed receipt of cash-out {}",
            cash_out.affiliate_id,
            cash_out_id
        );
        Ok(())
    }

    /// Repairs missing or orphaned settlement marks against the cash-outs'
    /// covered lists. Anything else is reported for an operator.
    pub(crate) fn reconcile_settlements(&self) -> Result<ReconciliationReport, DomainError> {
        let orders = self.store.list_orders()?;
        let cash_outs = self.store.list_cash_outs()?;

        let mut report = ReconciliationReport::default();
        let mut batch = WriteBatch::new();
        for inconsistency in find_settlement_inconsistencies(&orders, &cash_outs) {
            match &inconsistency {
                SettlementInconsistency::UnmarkedOrder {
                    order_id,
                    cash_out_id,
                } => {
                    batch.push(Mutation::MarkOrderSettled {
                        order_id: *order_id,
                        cash_out_id: *cash_out_id,
                    });
                }
                SettlementInconsistency::OrphanMark {
                    order_id,
                    cash_out_id,
                } => {
                    batch.push(Mutation::ClearOrderSettlement {
                        order_id: *order_id,
                        cash_out_id: *cash_out_id,
                    });
                }
                conflict => {
                    log::error!("Settlement conflict needs an operator: {:?}", conflict);
                    report.conflicts.push(inconsistency);
                    continue;
                }
            }
            log::warn!("Repairing settlement inconsistency: {:?}", inconsistency);
            report.repaired.push(inconsistency);
        }

        if batch.is_empty() {
            return Ok(report);
        }
        batch.event(OutboxEvent::new(
            "Settlement",
            "reconciliation",
            "SettlementsReconciled",
            json!({ "repaired": report.repaired, "conflicts": report.conflicts }),
        ));
        self.store.commit(batch)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    use crate::application::test_support::{Fixture, AFFILIATE};
    use crate::domain::batch::{Mutation, WriteBatch};
    use crate::domain::cash_out::{
        CashOut, CashOutStatus, ProofOfPayment, SettlementInconsistency, SettlementPreview,
    };
    use crate::domain::command::{Command, CommandOutcome};
    use crate::domain::errors::DomainError;
    use crate::domain::order::PaymentMethod;
    use crate::domain::ports::MarketplaceStore;

    fn cash_out(fx: &Fixture, proof: Option<&str>) -> Result<CashOut, DomainError> {
        let proof = proof.map(|p| ProofOfPayment::new(p.to_string()).expect("valid proof"));
        match fx.service.execute(Command::PerformCashOut {
            affiliate_id: AFFILIATE.to_string(),
            proof,
        })? {
            CommandOutcome::CashOutCreated(cash_out) => Ok(*cash_out),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn cash_order_settles_immediately() {
        let fx = Fixture::with_inventory(100);
        let id = fx.finished_order(PaymentMethod::Cash, 10);

        let cash_out = cash_out(&fx, None).expect("cash-out failed");

        assert_eq!(cash_out.balance, BigDecimal::from(110));
        assert_eq!(cash_out.total_commission, BigDecimal::from(10));
        assert_eq!(cash_out.status, CashOutStatus::Completed);
        assert_eq!(cash_out.orders_covered_ids, vec![id]);
        assert_eq!(
            fx.service.order(id).expect("order").settled_in_cash_out_id,
            Some(cash_out.id)
        );
    }

    #[test]
    fn negative_balance_needs_proof_and_affiliate_confirmation() {
        let fx = Fixture::with_inventory(100);
        let mut input = crate::application::test_support::order_input(
            "Ana Lopez",
            "5511112222",
            PaymentMethod::Transfer,
            10,
        );
        input.delivery_choice = crate::domain::order::DeliveryChoice::Delivery;
        let id = fx.place(input, None);
        fx.service
            .execute(Command::ConfirmTransferPayment { order_id: id })
            .expect("confirm failed");
        fx.service
            .execute(Command::SetOrderStatus {
                order_id: id,
                status: crate::domain::order::OrderStatus::Finished,
            })
            .expect("finish failed");

        assert!(matches!(
            cash_out(&fx, None),
            Err(DomainError::PreconditionFailed(_))
        ));
        assert!(fx
            .service
            .order(id)
            .expect("order")
            .settled_in_cash_out_id
            .is_none());

        let created = cash_out(&fx, Some("data:image/png;base64,AAAA")).expect("cash-out failed");
        assert_eq!(created.balance, BigDecimal::from(-30));
        assert_eq!(created.status, CashOutStatus::PendingAffiliateConfirmation);

        fx.service
            .execute(Command::ConfirmCashOut {
                cash_out_id: created.id,
            })
            .expect("confirm failed");
        let confirmed = fx
            .store
            .find_cash_out(created.id)
            .expect("find failed")
            .expect("cash-out exists");
        assert_eq!(confirmed.status, CashOutStatus::Completed);
        assert!(matches!(
            fx.service.execute(Command::ConfirmCashOut {
                cash_out_id: created.id
            }),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn empty_unsettled_set_is_refused() {
        let fx = Fixture::with_inventory(100);
        fx.order(PaymentMethod::Cash, 3);
        assert!(matches!(
            cash_out(&fx, None),
            Err(DomainError::PreconditionFailed(_))
        ));
        assert!(fx.store.list_cash_outs().expect("list").is_empty());
    }

    #[test]
    fn settled_orders_never_reappear() {
        let fx = Fixture::with_inventory(100);
        fx.finished_order(PaymentMethod::Cash, 2);
        fx.finished_order(PaymentMethod::Cash, 3);
        let first = cash_out(&fx, None).expect("first cash-out failed");
        assert_eq!(first.orders_covered_ids.len(), 2);
        assert!(fx
            .service
            .settlement_preview(AFFILIATE)
            .expect("preview")
            .orders
            .is_empty());

        let later = fx.finished_order(PaymentMethod::Cash, 1);
        let second = cash_out(&fx, None).expect("second cash-out failed");
        assert_eq!(second.orders_covered_ids, vec![later]);

        let history = fx.service.cash_out_history(AFFILIATE).expect("history");
        let mut covered: Vec<_> = history
            .iter()
            .flat_map(|c| c.orders_covered_ids.iter().copied())
            .collect();
        let total = covered.len();
        covered.sort();
        covered.dedup();
        assert_eq!(covered.len(), total);
    }

    /// A cash-out whose order marks were lost, as a non-atomic store could
    /// leave behind.
    fn half_applied(fx: &Fixture) -> (uuid::Uuid, CashOut) {
        let id = fx.finished_order(PaymentMethod::Cash, 4);
        let order = fx.service.order(id).expect("order");
        let cash_out = SettlementPreview::compute(AFFILIATE, vec![order], 100)
            .into_cash_out(None, Utc::now())
            .expect("cash-out");
        let mut batch = WriteBatch::new();
        batch.push(Mutation::InsertCashOut(cash_out.clone()));
        fx.store.commit(batch).expect("insert failed");
        (id, cash_out)
    }

    #[test]
    fn listed_but_unmarked_orders_block_new_cash_outs_until_reconciled() {
        let fx = Fixture::with_inventory(100);
        let (id, lost) = half_applied(&fx);

        assert!(matches!(
            cash_out(&fx, None),
            Err(DomainError::PartialCommitRisk(_))
        ));

        let CommandOutcome::Reconciled(report) = fx
            .service
            .execute(Command::ReconcileSettlements)
            .expect("reconcile failed")
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(
            report.repaired,
            vec![SettlementInconsistency::UnmarkedOrder {
                order_id: id,
                cash_out_id: lost.id,
            }]
        );
        assert!(report.conflicts.is_empty());
        assert_eq!(
            fx.service.order(id).expect("order").settled_in_cash_out_id,
            Some(lost.id)
        );

        let CommandOutcome::Reconciled(again) = fx
            .service
            .execute(Command::ReconcileSettlements)
            .expect("reconcile failed")
        else {
            panic!("unexpected outcome");
        };
        assert!(again.is_clean());
    }

    #[test]
    fn orphan_marks_are_cleared() {
        let fx = Fixture::with_inventory(100);
        let id = fx.finished_order(PaymentMethod::Cash, 2);
        let mut batch = WriteBatch::new();
        batch.push(Mutation::MarkOrderSettled {
            order_id: id,
            cash_out_id: uuid::Uuid::new_v4(),
        });
        fx.store.commit(batch).expect("mark failed");

        let CommandOutcome::Reconciled(report) = fx
            .service
            .execute(Command::ReconcileSettlements)
            .expect("reconcile failed")
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(report.repaired.len(), 1);
        assert!(fx
            .service
            .order(id)
            .expect("order")
            .settled_in_cash_out_id
            .is_none());
        assert_eq!(
            fx.service
                .settlement_preview(AFFILIATE)
                .expect("preview")
                .orders
                .len(),
            1
        );
    }
}
