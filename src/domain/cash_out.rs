use std::collections::{BTreeMap, HashMap};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::money;
use super::order::{Order, OrderStatus};

string_enum! {
    pub enum CashOutStatus {
        PendingAffiliateConfirmation,
        Completed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SettlementDirection {
    /// Balance ≥ 0: the affiliate hands collected cash to the admin.
    AffiliatePaysAdmin,
    /// Balance < 0: the admin transfers to the affiliate.
    AdminPaysAffiliate,
}

/// Proof that the admin made a transfer, e.g. an encoded receipt image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfPayment(String);

impl ProofOfPayment {
    pub fn new(attachment: String) -> Result<Self, DomainError> {
        if attachment.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "proof of payment attachment is empty".to_string(),
            ));
        }
        Ok(Self(attachment))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Immutable settlement batch for one affiliate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOut {
    pub id: Uuid,
    pub affiliate_id: String,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub orders_covered_ids: Vec<Uuid>,
    pub total_sales: BigDecimal,
    pub total_commission: BigDecimal,
    pub total_delivery_fees: BigDecimal,
    /// Positive: affiliate paid admin. Negative: admin paid affiliate.
    pub balance: BigDecimal,
    pub status: CashOutStatus,
    #[serde(rename = "adminPaymentReceiptImage")]
    pub proof_of_payment: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_date: DateTime<Utc>,
}

impl CashOut {
    /// The affiliate acknowledges receipt of the admin's transfer.
    pub fn confirm(&self) -> Result<(), DomainError> {
        if self.status != CashOutStatus::PendingAffiliateConfirmation {
            return Err(DomainError::invalid_transition(
                "CashOut",
                self.id,
                format!("cannot confirm a {} cash-out", self.status),
            ));
        }
        Ok(())
    }
}

/// Balance of an affiliate's unsettled finished orders, before anything is
/// locked into a cash-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementPreview {
    pub affiliate_id: String,
    pub orders: Vec<Order>,
    pub total_sales: BigDecimal,
    pub total_commission: BigDecimal,
    pub total_delivery_fees: BigDecimal,
    pub balance: BigDecimal,
}

impl SettlementPreview {
    /// Aggregates the unsettled set of `affiliate_id` out of `orders`.
    /// Orders belonging to other affiliates are ignored.
    pub fn compute<I>(affiliate_id: &str, orders: I, commission_rate_cents: i64) -> Self
    where
        I: IntoIterator<Item = Order>,
    {
        let mut unsettled: Vec<Order> = orders
            .into_iter()
            .filter(|o| o.affiliate_id == affiliate_id && o.is_unsettled_finished())
            .collect();
        unsettled.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let zero = || BigDecimal::from(0);
        let (mut total_sales, mut total_commission, mut total_delivery_fees, mut balance) =
            (zero(), zero(), zero(), zero());
        for order in &unsettled {
            total_sales += money::customer_total(order);
            total_commission += money::commission(order, commission_rate_cents);
            total_delivery_fees += &order.delivery_fee_applied;
            balance += money::balance_contribution(order, commission_rate_cents);
        }

        Self {
            affiliate_id: affiliate_id.to_string(),
            orders: unsettled,
            total_sales,
            total_commission,
            total_delivery_fees,
            balance,
        }
    }

    pub fn direction(&self) -> SettlementDirection {
        if self.balance >= BigDecimal::from(0) {
            SettlementDirection::AffiliatePaysAdmin
        } else {
            SettlementDirection::AdminPaysAffiliate
        }
    }

    pub fn order_ids(&self) -> Vec<Uuid> {
        self.orders.iter().map(|o| o.id).collect()
    }

    /// Earliest and latest creation time of the covered orders.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.orders.iter().map(|o| o.created_at).min()?;
        let end = self.orders.iter().map(|o| o.created_at).max()?;
        Some((start, end))
    }

    /// Locks the preview into a cash-out record.
    ///
    /// Refuses an empty unsettled set, and a negative balance without proof of
    /// the admin's transfer.
    pub fn into_cash_out(
        self,
        proof: Option<ProofOfPayment>,
        now: DateTime<Utc>,
    ) -> Result<CashOut, DomainError> {
        let Some((start_date, end_date)) = self.window() else {
            return Err(DomainError::PreconditionFailed(format!(
                "affiliate {} has no unsettled finished orders",
                self.affiliate_id
            )));
        };

        let (status, proof_of_payment) = match (self.direction(), proof) {
            (SettlementDirection::AffiliatePaysAdmin, _) => (CashOutStatus::Completed, None),
            (SettlementDirection::AdminPaysAffiliate, Some(proof)) => (
                CashOutStatus::PendingAffiliateConfirmation,
                Some(proof.into_inner()),
            ),
            (SettlementDirection::AdminPaysAffiliate, None) => {
                return Err(DomainError::PreconditionFailed(format!(
                    "a transfer of {} to affiliate {} requires proof of payment",
                    -&self.balance, self.affiliate_id
                )));
            }
        };

        Ok(CashOut {
            id: Uuid::new_v4(),
            orders_covered_ids: self.order_ids(),
            affiliate_id: self.affiliate_id,
            created_at: now,
            total_sales: self.total_sales,
            total_commission: self.total_commission,
            total_delivery_fees: self.total_delivery_fees,
            balance: self.balance,
            status,
            proof_of_payment,
            start_date,
            end_date,
        })
    }
}

/// A disagreement between order settlement marks and cash-out coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SettlementInconsistency {
    /// Listed by a cash-out but the order was never marked.
    #[serde(rename_all = "camelCase")]
    UnmarkedOrder { order_id: Uuid, cash_out_id: Uuid },
    /// Marked with a cash-out that does not list it, or does not exist.
    #[serde(rename_all = "camelCase")]
    OrphanMark { order_id: Uuid, cash_out_id: Uuid },
    /// Listed by more than one cash-out.
    #[serde(rename_all = "camelCase")]
    DuplicateCoverage { order_id: Uuid, cash_out_ids: Vec<Uuid> },
    /// Marked with one cash-out but listed by another.
    #[serde(rename_all = "camelCase")]
    ConflictingMark {
        order_id: Uuid,
        marked: Uuid,
        listed_by: Uuid,
    },
    /// Listed by a cash-out but missing, or not finished.
    #[serde(rename_all = "camelCase")]
    UnsettleableOrder { order_id: Uuid, cash_out_id: Uuid },
}

impl SettlementInconsistency {
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            SettlementInconsistency::UnmarkedOrder { .. }
                | SettlementInconsistency::OrphanMark { .. }
        )
    }
}

/// Outcome of a reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub repaired: Vec<SettlementInconsistency>,
    /// Left untouched; need an operator.
    pub conflicts: Vec<SettlementInconsistency>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty() && self.conflicts.is_empty()
    }
}

/// Cross-checks every order mark against every cash-out's covered list.
pub fn find_settlement_inconsistencies(
    orders: &[Order],
    cash_outs: &[CashOut],
) -> Vec<SettlementInconsistency> {
    let mut listed_by: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    for cash_out in cash_outs {
        for order_id in &cash_out.orders_covered_ids {
            listed_by.entry(*order_id).or_default().push(cash_out.id);
        }
    }
    let orders_by_id: HashMap<Uuid, &Order> = orders.iter().map(|o| (o.id, o)).collect();

    let mut found = Vec::new();
    for (order_id, cash_out_ids) in &listed_by {
        if cash_out_ids.len() > 1 {
            found.push(SettlementInconsistency::DuplicateCoverage {
                order_id: *order_id,
                cash_out_ids: cash_out_ids.clone(),
            });
            continue;
        }
        let cash_out_id = cash_out_ids[0];
        match orders_by_id.get(order_id) {
            Some(order) => match order.settled_in_cash_out_id {
                Some(marked) if marked == cash_out_id => {}
                Some(marked) => found.push(SettlementInconsistency::ConflictingMark {
                    order_id: *order_id,
                    marked,
                    listed_by: cash_out_id,
                }),
                None if order.status == OrderStatus::Finished => {
                    found.push(SettlementInconsistency::UnmarkedOrder {
                        order_id: *order_id,
                        cash_out_id,
                    })
                }
                None => found.push(SettlementInconsistency::UnsettleableOrder {
                    order_id: *order_id,
                    cash_out_id,
                }),
            },
            None => found.push(SettlementInconsistency::UnsettleableOrder {
                order_id: *order_id,
                cash_out_id,
            }),
        }
    }

    for order in orders {
        let Some(marked) = order.settled_in_cash_out_id else {
            continue;
        };
        if !listed_by.contains_key(&order.id) {
            found.push(SettlementInconsistency::OrphanMark {
                order_id: order.id,
                cash_out_id: marked,
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::test_support::order_with;
    use crate::domain::order::PaymentMethod;
    use chrono::Duration;

    fn finished(payment_method: PaymentMethod, quantity: u32, subtotal: &str, fee: &str) -> Order {
        let mut order = order_with(payment_method, quantity, subtotal, fee, "0");
        order.status = OrderStatus::Finished;
        order
    }

    fn proof() -> ProofOfPayment {
        ProofOfPayment::new("data:image/png;base64,AAAA".to_string()).expect("proof")
    }

    #[test]
    fn cash_balance_settles_immediately() {
        let preview = SettlementPreview::compute(
            "5599990000",
            vec![finished(PaymentMethod::Cash, 10, "120", "0")],
            100,
        );
        assert_eq!(preview.balance, BigDecimal::from(110));
        assert_eq!(preview.direction(), SettlementDirection::AffiliatePaysAdmin);

        let cash_out = preview.into_cash_out(None, Utc::now()).expect("cash-out failed");
        assert_eq!(cash_out.status, CashOutStatus::Completed);
        assert!(cash_out.proof_of_payment.is_none());
    }

    #[test]
    fn negative_balance_requires_proof() {
        let orders = vec![finished(PaymentMethod::Transfer, 10, "120", "20")];
        let preview = SettlementPreview::compute("5599990000", orders, 100);
        assert_eq!(preview.balance, BigDecimal::from(-30));

        assert!(matches!(
            preview.clone().into_cash_out(None, Utc::now()),
            Err(DomainError::PreconditionFailed(_))
        ));
        let cash_out = preview
            .into_cash_out(Some(proof()), Utc::now())
            .expect("cash-out failed");
        assert_eq!(cash_out.status, CashOutStatus::PendingAffiliateConfirmation);
    }

    #[test]
    fn zero_balance_counts_as_affiliate_paying() {
        // 12 cash owed minus 1 commission offsets a transfer owing 1 + 10 delivery
        let orders = vec![
            finished(PaymentMethod::Cash, 1, "12", "0"),
            finished(PaymentMethod::Transfer, 1, "12", "10"),
        ];
        let preview = SettlementPreview::compute("5599990000", orders, 100);
        assert_eq!(preview.balance, BigDecimal::from(0));
        assert_eq!(preview.direction(), SettlementDirection::AffiliatePaysAdmin);
    }

    #[test]
    fn empty_unsettled_set_is_refused() {
        let mut settled = finished(PaymentMethod::Cash, 10, "120", "0");
        settled.settled_in_cash_out_id = Some(Uuid::new_v4());
        let active = order_with(PaymentMethod::Cash, 1, "12", "0", "0");

        let preview = SettlementPreview::compute("5599990000", vec![settled, active], 100);
        assert!(preview.orders.is_empty());
        assert!(matches!(
            preview.into_cash_out(None, Utc::now()),
            Err(DomainError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn preview_ignores_other_affiliates_and_sorts_by_time() {
        let now = Utc::now();
        let mut late = finished(PaymentMethod::Cash, 1, "12", "0");
        late.created_at = now;
        let mut early = finished(PaymentMethod::Cash, 2, "24", "0");
        early.created_at = now - Duration::hours(3);
        let mut foreign = finished(PaymentMethod::Cash, 5, "60", "0");
        foreign.affiliate_id = "5500000000".to_string();

        let orders = vec![late.clone(), foreign, early.clone()];
        let preview = SettlementPreview::compute("5599990000", orders, 100);
        assert_eq!(preview.order_ids(), vec![early.id, late.id]);
        assert_eq!(preview.window(), Some((early.created_at, late.created_at)));
        assert_eq!(preview.total_sales, BigDecimal::from(36));
        assert_eq!(preview.total_commission, BigDecimal::from(3));
    }

    #[test]
    fn cash_out_confirms_once() {
        let preview = SettlementPreview::compute(
            "5599990000",
            vec![finished(PaymentMethod::Transfer, 10, "120", "20")],
            100,
        );
        let mut cash_out = preview
            .into_cash_out(Some(proof()), Utc::now())
            .expect("cash-out failed");
        assert!(cash_out.confirm().is_ok());
        cash_out.status = CashOutStatus::Completed;
        assert!(matches!(
            cash_out.confirm(),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn consistent_state_has_no_findings() {
        let order = finished(PaymentMethod::Cash, 10, "120", "0");
        let mut cash_out =
            SettlementPreview::compute("5599990000", vec![order.clone()], 100)
                .into_cash_out(None, Utc::now())
                .expect("cash-out failed");
        cash_out.orders_covered_ids = vec![order.id];
        let mut marked = order;
        marked.settled_in_cash_out_id = Some(cash_out.id);

        assert!(find_settlement_inconsistencies(&[marked], &[cash_out]).is_empty());
    }

    #[test]
    fn detects_half_applied_settlements() {
        let unmarked = finished(PaymentMethod::Cash, 10, "120", "0");
        let cash_out = SettlementPreview::compute("5599990000", vec![unmarked.clone()], 100)
            .into_cash_out(None, Utc::now())
            .expect("cash-out failed");
        let mut orphan = finished(PaymentMethod::Cash, 1, "12", "0");
        orphan.settled_in_cash_out_id = Some(Uuid::new_v4());

        let found = find_settlement_inconsistencies(
            &[unmarked.clone(), orphan.clone()],
            &[cash_out.clone()],
        );
        assert_eq!(found.len(), 2);
        assert!(found.contains(&SettlementInconsistency::UnmarkedOrder {
            order_id: unmarked.id,
            cash_out_id: cash_out.id,
        }));
        assert!(found.iter().all(SettlementInconsistency::is_repairable));
        assert!(found.iter().any(|f| matches!(
            f,
            SettlementInconsistency::OrphanMark { order_id, .. } if *order_id == orphan.id
        )));
    }

    #[test]
    fn duplicate_coverage_is_not_repairable() {
        let order = finished(PaymentMethod::Cash, 10, "120", "0");
        let first = SettlementPreview::compute("5599990000", vec![order.clone()], 100)
            .into_cash_out(None, Utc::now())
            .expect("cash-out failed");
        let second = SettlementPreview::compute("5599990000", vec![order.clone()], 100)
            .into_cash_out(None, Utc::now())
            .expect("cash-out failed");

        let found = find_settlement_inconsistencies(&[order], &[first, second]);
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_repairable());
    }
}
