use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::order::DeliveryChoice;

string_enum! {
    pub enum AffiliateStatus {
        Pending,
        Approved,
        Rejected,
        Suspended,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub is_open: bool,
    /// "HH:MM"
    pub open_time: String,
    /// "HH:MM"
    pub close_time: String,
}

impl DaySchedule {
    fn validate(&self, day: &str) -> Result<(), DomainError> {
        for time in [&self.open_time, &self.close_time] {
            NaiveTime::parse_from_str(time, "%H:%M").map_err(|e| {
                DomainError::InvalidInput(format!("invalid time '{}' for {}: {}", time, day, e))
            })?;
        }
        Ok(())
    }
}

/// A vendor with a stock counter and payout configuration.
///
/// `inventory` is only ever changed by finishing an order or completing an
/// inventory change, both through guarded store mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: String,
    #[serde(rename = "customerName")]
    pub name: String,
    pub phone: String,
    pub address: String,
    pub status: AffiliateStatus,
    pub inventory: i64,
    pub has_delivery_service: bool,
    pub delivery_cost: BigDecimal,
    pub schedule: BTreeMap<String, DaySchedule>,
    pub is_temporarily_closed: bool,
    pub bank_details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AffiliateApplication {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub has_delivery_service: bool,
    pub delivery_cost: BigDecimal,
    pub schedule: BTreeMap<String, DaySchedule>,
    pub bank_details: Option<String>,
}

/// Editable payout and service settings. Never carries stock or status.
///
/// `address` and `schedule` are left untouched when `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffiliateSettings {
    pub has_delivery_service: bool,
    pub delivery_cost: BigDecimal,
    pub is_temporarily_closed: bool,
    pub bank_details: Option<String>,
    pub address: Option<String>,
    pub schedule: Option<BTreeMap<String, DaySchedule>>,
}

impl AffiliateSettings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.delivery_cost < BigDecimal::from(0) {
            return Err(DomainError::InvalidInput(
                "delivery cost must not be negative".to_string(),
            ));
        }
        if matches!(&self.address, Some(address) if address.trim().is_empty()) {
            return Err(DomainError::InvalidInput(
                "address must not be blank".to_string(),
            ));
        }
        for (day, schedule) in self.schedule.iter().flatten() {
            schedule.validate(day)?;
        }
        Ok(())
    }

    /// Copies the settings onto `affiliate`.
    pub fn apply_to(self, affiliate: &mut Affiliate) {
        affiliate.has_delivery_service = self.has_delivery_service;
        affiliate.delivery_cost = self.delivery_cost;
        affiliate.is_temporarily_closed = self.is_temporarily_closed;
        affiliate.bank_details = self.bank_details;
        if let Some(address) = self.address {
            affiliate.address = address.trim().to_string();
        }
        if let Some(schedule) = self.schedule {
            affiliate.schedule = schedule;
        }
    }
}

impl Affiliate {
    /// Affiliate ids are the digits of the registration phone number.
    pub fn id_from_phone(phone: &str) -> String {
        phone.chars().filter(char::is_ascii_digit).collect()
    }

    pub fn apply(application: AffiliateApplication) -> Result<Self, DomainError> {
        let id = Self::id_from_phone(&application.phone);
        if id.is_empty() {
            return Err(DomainError::InvalidInput(
                "phone must contain digits".to_string(),
            ));
        }
        if application.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("name is required".to_string()));
        }
        if application.delivery_cost < BigDecimal::from(0) {
            return Err(DomainError::InvalidInput(
                "delivery cost must not be negative".to_string(),
            ));
        }
        for (day, schedule) in &application.schedule {
            schedule.validate(day)?;
        }

        Ok(Self {
            id,
            name: application.name.trim().to_string(),
            phone: application.phone,
            address: application.address,
            status: AffiliateStatus::Pending,
            inventory: 0,
            has_delivery_service: application.has_delivery_service,
            delivery_cost: application.delivery_cost,
            schedule: application.schedule,
            is_temporarily_closed: false,
            bank_details: application.bank_details,
        })
    }

    pub fn ensure_accepts_orders(&self) -> Result<(), DomainError> {
        if self.status != AffiliateStatus::Approved {
            return Err(DomainError::PreconditionFailed(format!(
                "affiliate {} is {}",
                self.id, self.status
            )));
        }
        if self.is_temporarily_closed {
            return Err(DomainError::PreconditionFailed(format!(
                "affiliate {} is temporarily closed",
                self.id
            )));
        }
        Ok(())
    }

    pub fn delivery_fee_for(&self, choice: DeliveryChoice) -> BigDecimal {
        match choice {
            DeliveryChoice::Delivery if self.has_delivery_service => self.delivery_cost.clone(),
            _ => BigDecimal::from(0),
        }
    }

    pub fn is_low_stock(&self, threshold: i64) -> bool {
        self.inventory <= threshold
    }

    /// Stock counter after applying `delta`. Refused when the result does not
    /// fit the counter.
    pub fn shifted_inventory(id: &str, current: i64, delta: i64) -> Result<i64, DomainError> {
        current.checked_add(delta).ok_or_else(|| {
            DomainError::InvalidInput(format!(
                "inventory change of {} does not fit the stock of affiliate {} ({})",
                delta, id, current
            ))
        })
    }
}

/// Operational stock view of one affiliate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockIndicators {
    pub affiliate_id: String,
    pub affiliate_name: String,
    pub inventory: i64,
    pub low_stock: bool,
    /// Has active orders that exceeded stock when they were placed.
    pub urgent: bool,
    pub pending_requests: usize,
    pub awaiting_confirmation: usize,
}


#[cfg(test)]
mod tests {
    use super::test_support::approved_affiliate;
    use super::*;

    fn application(phone: &str) -> AffiliateApplication {
        let mut schedule = BTreeMap::new();
        schedule.insert(
            "monday".to_string(),
            DaySchedule {
                is_open: true,
                open_time: "08:00".to_string(),
                close_time: "14:30".to_string(),
            },
        );
        AffiliateApplication {
            name: "  Tortilleria Sol ".to_string(),
            phone: phone.to_string(),
            address: "Av. Central 10".to_string(),
            has_delivery_service: false,
            delivery_cost: BigDecimal::from(0),
            schedule,
            bank_details: None,
        }
    }

    #[test]
    fn id_is_derived_from_phone_digits() {
        assert_eq!(Affiliate::id_from_phone("(55) 1234-5678"), "5512345678");
    }

    #[test]
    fn applications_start_pending_with_empty_stock() {
        let affiliate = Affiliate::apply(application("55 1234 5678")).expect("apply failed");
        assert_eq!(affiliate.status, AffiliateStatus::Pending);
        assert_eq!(affiliate.inventory, 0);
        assert_eq!(affiliate.name, "Tortilleria Sol");
    }

    #[test]
    fn malformed_schedule_is_rejected() {
        let mut app = application("5512345678");
        if let Some(day) = app.schedule.get_mut("monday") {
            day.close_time = "25:99".to_string();
        }
        assert!(matches!(
            Affiliate::apply(app),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn delivery_fee_only_applies_when_offered() {
        let mut affiliate = approved_affiliate("5599990000");
        assert_eq!(
            affiliate.delivery_fee_for(DeliveryChoice::Delivery),
            BigDecimal::from(20)
        );
        assert_eq!(
            affiliate.delivery_fee_for(DeliveryChoice::Pickup),
            BigDecimal::from(0)
        );
        affiliate.has_delivery_service = false;
        assert_eq!(
            affiliate.delivery_fee_for(DeliveryChoice::Delivery),
            BigDecimal::from(0)
        );
    }

    fn settings() -> AffiliateSettings {
        AffiliateSettings {
            has_delivery_service: true,
            delivery_cost: BigDecimal::from(25),
            is_temporarily_closed: false,
            bank_details: None,
            address: None,
            schedule: None,
        }
    }

    #[test]
    fn settings_keep_address_and_schedule_when_omitted() {
        let mut affiliate = approved_affiliate("5599990000");
        affiliate.schedule = application("5599990000").schedule;
        settings().apply_to(&mut affiliate);
        assert_eq!(affiliate.address, "Av. Central 10");
        assert!(affiliate.schedule.contains_key("monday"));
        assert_eq!(affiliate.delivery_cost, BigDecimal::from(25));

        let mut moved = settings();
        moved.address = Some(" Calle Norte 4 ".to_string());
        moved.schedule = Some(BTreeMap::new());
        moved.apply_to(&mut affiliate);
        assert_eq!(affiliate.address, "Calle Norte 4");
        assert!(affiliate.schedule.is_empty());
    }

    #[test]
    fn settings_validate_schedule_times() {
        let mut bad = settings();
        bad.schedule = Some(application("5599990000").schedule);
        assert!(bad.validate().is_ok());
        if let Some(day) = bad.schedule.as_mut().and_then(|s| s.get_mut("monday")) {
            day.open_time = "8am".to_string();
        }
        assert!(matches!(bad.validate(), Err(DomainError::InvalidInput(_))));

        let mut blank = settings();
        blank.address = Some("  ".to_string());
        assert!(blank.validate().is_err());
    }

    #[test]
    fn stock_shift_refuses_overflow() {
        assert_eq!(
            Affiliate::shifted_inventory("1", 10, -15).expect("fits"),
            -5
        );
        assert!(matches!(
            Affiliate::shifted_inventory("1", 10, i64::MAX),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(Affiliate::shifted_inventory("1", -10, i64::MIN).is_err());
    }

    #[test]
    fn closed_or_unapproved_affiliates_refuse_orders() {
        let mut affiliate = approved_affiliate("5599990000");
        assert!(affiliate.ensure_accepts_orders().is_ok());
        affiliate.is_temporarily_closed = true;
        assert!(affiliate.ensure_accepts_orders().is_err());
        affiliate.is_temporarily_closed = false;
        affiliate.status = AffiliateStatus::Suspended;
        assert!(matches!(
            affiliate.ensure_accepts_orders(),
            Err(DomainError::PreconditionFailed(_))
        ));
    }
}
