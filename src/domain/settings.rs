use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Tenant-wide configuration read at command and query time.
///
/// The commission rate is deliberately not copied onto orders: every balance
/// is computed from the rate in force when it is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Commission per unit sold, in cents.
    pub commission_rate_cents: i64,
    pub unit_price: BigDecimal,
    /// Units granted by a referral reward coupon.
    pub reward_units: u32,
    pub low_stock_threshold: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            commission_rate_cents: 100,
            unit_price: BigDecimal::from(12),
            reward_units: 10,
            low_stock_threshold: 20,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.commission_rate_cents < 0 {
            return Err(DomainError::InvalidInput(
                "commission rate must not be negative".to_string(),
            ));
        }
        if self.unit_price <= BigDecimal::from(0) {
            return Err(DomainError::InvalidInput(
                "unit price must be positive".to_string(),
            ));
        }
        if self.reward_units == 0 {
            return Err(DomainError::InvalidInput(
                "reward units must be positive".to_string(),
            ));
        }
        if self.low_stock_threshold < 0 {
            return Err(DomainError::InvalidInput(
                "low stock threshold must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Value of a referral reward coupon minted under these settings.
    pub fn reward_amount(&self) -> BigDecimal {
        BigDecimal::from(self.reward_units) * &self.unit_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_unit_price_is_rejected() {
        let settings = Settings {
            unit_price: BigDecimal::from(0),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn reward_amount_is_units_times_price() {
        assert_eq!(Settings::default().reward_amount(), BigDecimal::from(120));
    }
}
