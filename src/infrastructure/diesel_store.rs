use diesel::dsl::now;
use diesel::pg::upsert::excluded;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::affiliate::Affiliate;
use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::cash_out::CashOut;
use crate::domain::errors::DomainError;
use crate::domain::inventory::InventoryChange;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::MarketplaceStore;
use crate::domain::referral::{Coupon, Customer, Referral};
use crate::domain::settings::Settings;
use crate::schema::{
    affiliates, cash_outs, coupons, customers, inventory_changes, marketplace_outbox, orders,
    referrals, settings,
};

use super::models::{
    AffiliateRow, CashOutRow, CouponRow, CustomerRow, InventoryChangeRow, OrderRow,
    OutboxEventRow, ReferralRow, SettingsRow, SETTINGS_ROW_ID,
};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// Postgres-backed store. A batch runs in one transaction; every guarded
/// mutation is an `UPDATE ... WHERE <guard>` whose affected-row count decides
/// whether the guard held.
pub struct DieselStore {
    pool: DbPool,
}

impl DieselStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn load<R, T>(rows: Vec<R>) -> Result<Vec<T>, DomainError>
    where
        T: TryFrom<R, Error = DomainError>,
    {
        rows.into_iter().map(T::try_from).collect()
    }
}

/// Turns a zero-row guarded write into `NotFound` or `InvalidTransition`,
/// depending on whether the row exists at all.
fn guarded(
    affected: usize,
    entity: &'static str,
    id: impl ToString,
    expected: &str,
    current: Option<String>,
) -> Result<(), DomainError> {
    if affected > 0 {
        return Ok(());
    }
    match current {
        None => Err(DomainError::not_found(entity, id)),
        Some(found) => Err(DomainError::invalid_transition(
            entity,
            id,
            format!("expected {} but found {}", expected, found),
        )),
    }
}

fn found(affected: usize, entity: &'static str, id: impl ToString) -> Result<(), DomainError> {
    if affected == 0 {
        return Err(DomainError::not_found(entity, id));
    }
    Ok(())
}

fn locked_affiliate(conn: &mut PgConnection, id: &str) -> Result<Affiliate, DomainError> {
    affiliates::table
        .find(id)
        .select(AffiliateRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("Affiliate", id))
        .and_then(Affiliate::try_from)
}

fn order_status(conn: &mut PgConnection, id: Uuid) -> Result<Option<String>, DomainError> {
    Ok(orders::table
        .find(id)
        .select(orders::status)
        .first(conn)
        .optional()?)
}

fn apply(conn: &mut PgConnection, mutation: Mutation) -> Result<(), DomainError> {
    match mutation {
        Mutation::InsertOrder(order) => {
            diesel::insert_into(orders::table)
                .values(&OrderRow::try_from(order)?)
                .execute(conn)?;
        }
        Mutation::SetOrderStatus {
            order_id,
            expected,
            status,
        } => {
            let affected = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::status.eq(expected.as_str())),
            )
            .set((
                orders::status.eq(status.as_str()),
                orders::updated_at.eq(now),
            ))
            .execute(conn)?;
            if affected == 0 {
                let current = order_status(conn, order_id)?;
                guarded(0, "Order", order_id, expected.as_str(), current)?;
            }
        }
        Mutation::MarkOrderSettled {
            order_id,
            cash_out_id,
        } => {
            let affected = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::status.eq(OrderStatus::Finished.as_str()))
                    .filter(orders::settled_in_cash_out_id.is_null()),
            )
            .set((
                orders::settled_in_cash_out_id.eq(Some(cash_out_id)),
                orders::updated_at.eq(now),
            ))
            .execute(conn)?;
            if affected == 0 {
                let current = order_status(conn, order_id)?;
                guarded(0, "Order", order_id, "an unsettled Finished order", current)?;
            }
        }
        Mutation::ClearOrderSettlement {
            order_id,
            cash_out_id,
        } => {
            let affected = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::settled_in_cash_out_id.eq(cash_out_id)),
            )
            .set((
                orders::settled_in_cash_out_id.eq(None::<Uuid>),
                orders::updated_at.eq(now),
            ))
            .execute(conn)?;
            if affected == 0 {
                let current = orders::table
                    .find(order_id)
                    .select(orders::settled_in_cash_out_id)
                    .first::<Option<Uuid>>(conn)
                    .optional()?
                    .map(|mark| format!("{:?}", mark));
                guarded(
                    0,
                    "Order",
                    order_id,
                    &format!("a mark of cash-out {}", cash_out_id),
                    current,
                )?;
            }
        }
        Mutation::ClearCoveredLowInventoryFlags { affiliate_id } => {
            let inventory: i64 = affiliates::table
                .find(&affiliate_id)
                .select(affiliates::inventory)
                .first(conn)
                .optional()?
                .ok_or_else(|| DomainError::not_found("Affiliate", &affiliate_id))?;
            let covered = i32::try_from(inventory)
                .unwrap_or(if inventory < 0 { i32::MIN } else { i32::MAX });
            diesel::update(
                orders::table
                    .filter(orders::affiliate_id.eq(&affiliate_id))
                    .filter(orders::status.eq(OrderStatus::Active.as_str()))
                    .filter(orders::is_low_inventory_order.eq(true))
                    .filter(orders::quantity.le(covered)),
            )
            .set((
                orders::is_low_inventory_order.eq(false),
                orders::updated_at.eq(now),
            ))
            .execute(conn)?;
        }

        Mutation::InsertAffiliate(affiliate) => {
            let exists: i64 = affiliates::table
                .filter(affiliates::id.eq(&affiliate.id))
                .count()
                .get_result(conn)?;
            if exists > 0 {
                return Err(DomainError::PreconditionFailed(format!(
                    "affiliate {} is already registered",
                    affiliate.id
                )));
            }
            diesel::insert_into(affiliates::table)
                .values(&AffiliateRow::try_from(affiliate)?)
                .execute(conn)?;
        }
        Mutation::AdjustInventory {
            affiliate_id,
            delta,
        } => {
            let affiliate = locked_affiliate(conn, &affiliate_id)?;
            let inventory =
                Affiliate::shifted_inventory(&affiliate.id, affiliate.inventory, delta)?;
            diesel::update(affiliates::table.find(&affiliate_id))
                .set(affiliates::inventory.eq(inventory))
                .execute(conn)?;
        }
        Mutation::SetAffiliateStatus {
            affiliate_id,
            status,
        } => {
            let affected = diesel::update(affiliates::table.find(&affiliate_id))
                .set(affiliates::status.eq(status.as_str()))
                .execute(conn)?;
            found(affected, "Affiliate", &affiliate_id)?;
        }
        Mutation::UpdateAffiliateSettings {
            affiliate_id,
            settings,
        } => {
            let mut affiliate = locked_affiliate(conn, &affiliate_id)?;
            settings.apply_to(&mut affiliate);
            let row = AffiliateRow::try_from(affiliate)?;
            diesel::update(affiliates::table.find(&affiliate_id))
                .set((
                    affiliates::has_delivery_service.eq(row.has_delivery_service),
                    affiliates::delivery_cost.eq(row.delivery_cost),
                    affiliates::is_temporarily_closed.eq(row.is_temporarily_closed),
                    affiliates::bank_details.eq(row.bank_details),
                    affiliates::address.eq(row.address),
                    affiliates::schedule.eq(row.schedule),
                ))
                .execute(conn)?;
        }
        Mutation::DeleteAffiliate { affiliate_id } => {
            locked_affiliate(conn, &affiliate_id)?;
            let orders: i64 = orders::table
                .filter(orders::affiliate_id.eq(&affiliate_id))
                .count()
                .get_result(conn)?;
            let changes: i64 = inventory_changes::table
                .filter(inventory_changes::affiliate_id.eq(&affiliate_id))
                .count()
                .get_result(conn)?;
            let cash_outs: i64 = cash_outs::table
                .filter(cash_outs::affiliate_id.eq(&affiliate_id))
                .count()
                .get_result(conn)?;
            if orders + changes + cash_outs > 0 {
                return Err(DomainError::PreconditionFailed(format!(
                    "affiliate {} is referenced by its history",
                    affiliate_id
                )));
            }
            diesel::delete(affiliates::table.find(&affiliate_id)).execute(conn)?;
        }

        Mutation::InsertInventoryChange(change) => {
            diesel::insert_into(inventory_changes::table)
                .values(&InventoryChangeRow::from(change))
                .execute(conn)?;
        }
        Mutation::SetInventoryChangeStatus {
            change_id,
            expected,
            status,
        } => {
            let affected = diesel::update(
                inventory_changes::table
                    .find(change_id)
                    .filter(inventory_changes::status.eq(expected.as_str())),
            )
            .set(inventory_changes::status.eq(status.as_str()))
            .execute(conn)?;
            if affected == 0 {
                let current = inventory_changes::table
                    .find(change_id)
                    .select(inventory_changes::status)
                    .first(conn)
                    .optional()?;
                guarded(0, "InventoryChange", change_id, expected.as_str(), current)?;
            }
        }
        Mutation::DeleteInventoryChange {
            change_id,
            expected,
        } => {
            let affected = diesel::delete(
                inventory_changes::table
                    .find(change_id)
                    .filter(inventory_changes::status.eq(expected.as_str())),
            )
            .execute(conn)?;
            if affected == 0 {
                let current = inventory_changes::table
                    .find(change_id)
                    .select(inventory_changes::status)
                    .first(conn)
                    .optional()?;
                guarded(0, "InventoryChange", change_id, expected.as_str(), current)?;
            }
        }

        Mutation::InsertCashOut(cash_out) => {
            diesel::insert_into(cash_outs::table)
                .values(&CashOutRow::from(cash_out))
                .execute(conn)?;
        }
        Mutation::SetCashOutStatus {
            cash_out_id,
            expected,
            status,
        } => {
            let affected = diesel::update(
                cash_outs::table
                    .find(cash_out_id)
                    .filter(cash_outs::status.eq(expected.as_str())),
            )
            .set(cash_outs::status.eq(status.as_str()))
            .execute(conn)?;
            if affected == 0 {
                let current = cash_outs::table
                    .find(cash_out_id)
                    .select(cash_outs::status)
                    .first(conn)
                    .optional()?;
                guarded(0, "CashOut", cash_out_id, expected.as_str(), current)?;
            }
        }

        Mutation::InsertReferral(referral) => {
            diesel::insert_into(referrals::table)
                .values(&ReferralRow::try_from(referral)?)
                .execute(conn)?;
        }
        Mutation::SetReferralStatus {
            referral_id,
            expected,
            status,
        } => {
            let affected = diesel::update(
                referrals::table
                    .find(referral_id)
                    .filter(referrals::status.eq(expected.as_str())),
            )
            .set(referrals::status.eq(status.as_str()))
            .execute(conn)?;
            if affected == 0 {
                let current = referrals::table
                    .find(referral_id)
                    .select(referrals::status)
                    .first(conn)
                    .optional()?;
                guarded(0, "Referral", referral_id, expected.as_str(), current)?;
            }
        }

        Mutation::InsertCoupon(coupon) => {
            let inserted = diesel::insert_into(coupons::table)
                .values(&CouponRow::from(coupon.clone()))
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted == 0 {
                return Err(DomainError::PreconditionFailed(format!(
                    "coupon {} already exists",
                    coupon.code
                )));
            }
        }
        Mutation::ConsumeCoupon { code } => {
            let affected = diesel::update(
                coupons::table
                    .find(&code)
                    .filter(coupons::is_used.eq(false))
                    .filter(coupons::is_active.eq(true)),
            )
            .set(coupons::is_used.eq(true))
            .execute(conn)?;
            if affected == 0 {
                let current = coupons::table
                    .find(&code)
                    .select((coupons::is_used, coupons::is_active))
                    .first::<(bool, bool)>(conn)
                    .optional()?
                    .map(|(used, active)| format!("used={} active={}", used, active));
                guarded(0, "Coupon", &code, "an active unused coupon", current)?;
            }
        }
        Mutation::SetCouponActive { code, active } => {
            let affected = diesel::update(
                coupons::table
                    .find(&code)
                    .filter(coupons::is_used.eq(false)),
            )
            .set(coupons::is_active.eq(active))
            .execute(conn)?;
            if affected == 0 {
                let current = coupons::table
                    .find(&code)
                    .select(coupons::is_used)
                    .first::<bool>(conn)
                    .optional()?
                    .map(|_| "a used coupon".to_string());
                guarded(0, "Coupon", &code, "an unused coupon", current)?;
            }
        }
        Mutation::DeleteCoupon { code } => {
            let affected = diesel::delete(coupons::table.find(&code)).execute(conn)?;
            found(affected, "Coupon", &code)?;
        }

        Mutation::UpsertCustomer(customer) => {
            diesel::insert_into(customers::table)
                .values(&CustomerRow::from(customer))
                .on_conflict(customers::phone)
                .do_update()
                .set(customers::name.eq(excluded(customers::name)))
                .execute(conn)?;
        }
        Mutation::PutSettings(settings) => {
            let row = SettingsRow::try_from(settings)?;
            diesel::insert_into(settings::table)
                .values(&row)
                .on_conflict(settings::id)
                .do_update()
                .set(&row)
                .execute(conn)?;
        }
        Mutation::AppendEvent(event) => {
            diesel::insert_into(marketplace_outbox::table)
                .values(&OutboxEventRow::from(event))
                .execute(conn)?;
        }
    }
    Ok(())
}

impl MarketplaceStore for DieselStore {
    fn find_order(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Order::try_from)
            .transpose()
    }

    fn list_orders(&self) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = orders::table
            .select(OrderRow::as_select())
            .order(orders::created_at.desc())
            .then_order_by(orders::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn orders_for_affiliate(&self, affiliate_id: &str) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = orders::table
            .filter(orders::affiliate_id.eq(affiliate_id))
            .select(OrderRow::as_select())
            .order(orders::created_at.desc())
            .then_order_by(orders::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn orders_for_phone(&self, phone: &str) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = orders::table
            .filter(orders::phone.eq(phone))
            .select(OrderRow::as_select())
            .order(orders::created_at.desc())
            .then_order_by(orders::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn find_affiliate(&self, id: &str) -> Result<Option<Affiliate>, DomainError> {
        let mut conn = self.pool.get()?;
        affiliates::table
            .find(id)
            .select(AffiliateRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Affiliate::try_from)
            .transpose()
    }

    fn list_affiliates(&self) -> Result<Vec<Affiliate>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = affiliates::table
            .select(AffiliateRow::as_select())
            .order(affiliates::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn find_inventory_change(&self, id: Uuid) -> Result<Option<InventoryChange>, DomainError> {
        let mut conn = self.pool.get()?;
        inventory_changes::table
            .find(id)
            .select(InventoryChangeRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(InventoryChange::try_from)
            .transpose()
    }

    fn list_inventory_changes(&self) -> Result<Vec<InventoryChange>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = inventory_changes::table
            .select(InventoryChangeRow::as_select())
            .order(inventory_changes::created_at.desc())
            .then_order_by(inventory_changes::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn find_cash_out(&self, id: Uuid) -> Result<Option<CashOut>, DomainError> {
        let mut conn = self.pool.get()?;
        cash_outs::table
            .find(id)
            .select(CashOutRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(CashOut::try_from)
            .transpose()
    }

    fn list_cash_outs(&self) -> Result<Vec<CashOut>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = cash_outs::table
            .select(CashOutRow::as_select())
            .order(cash_outs::created_at.desc())
            .then_order_by(cash_outs::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn find_referral(&self, id: Uuid) -> Result<Option<Referral>, DomainError> {
        let mut conn = self.pool.get()?;
        referrals::table
            .find(id)
            .select(ReferralRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Referral::try_from)
            .transpose()
    }

    fn referral_for_order(&self, order_id: Uuid) -> Result<Option<Referral>, DomainError> {
        let mut conn = self.pool.get()?;
        referrals::table
            .filter(referrals::referee_order_id.eq(order_id))
            .select(ReferralRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Referral::try_from)
            .transpose()
    }

    fn list_referrals(&self) -> Result<Vec<Referral>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = referrals::table
            .select(ReferralRow::as_select())
            .order(referrals::created_at.desc())
            .then_order_by(referrals::id.asc())
            .load(&mut conn)?;
        Self::load(rows)
    }

    fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(coupons::table
            .find(code)
            .select(CouponRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Coupon::from))
    }

    fn list_coupons(&self) -> Result<Vec<Coupon>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = coupons::table
            .select(CouponRow::as_select())
            .order(coupons::code.asc())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(Coupon::from).collect())
    }

    fn list_customers(&self) -> Result<Vec<Customer>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = customers::table
            .select(CustomerRow::as_select())
            .order(customers::phone.asc())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    fn settings(&self) -> Result<Option<Settings>, DomainError> {
        let mut conn = self.pool.get()?;
        settings::table
            .find(SETTINGS_ROW_ID)
            .select(SettingsRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Settings::try_from)
            .transpose()
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            for mutation in batch.into_mutations() {
                apply(conn, mutation)?;
            }
            Ok(())
        })
    }
}
