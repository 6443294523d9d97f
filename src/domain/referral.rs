use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{Order, OrderStatus};
use super::settings::Settings;

const COUPON_PREFIX: &str = "REGALO-";
const COUPON_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ01256789";
const COUPON_SUFFIX_LEN: usize = 6;

string_enum! {
    pub enum ReferralStatus {
        ActiveOrder,
        Completed,
        Cancelled,
    }
}

/// A customer known by name and phone. Their referral code is derived, not
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "customerName")]
    pub name: String,
    pub phone: String,
}

impl Customer {
    pub fn referral_code(&self) -> String {
        referral_code(&self.name, &self.phone)
    }
}

/// First four letters of the first name, uppercased, followed by the last
/// four characters of the phone.
pub fn referral_code(name: &str, phone: &str) -> String {
    let name_part: String = name
        .trim()
        .split(' ')
        .next()
        .unwrap_or_default()
        .chars()
        .take(4)
        .collect::<String>()
        .to_uppercase();
    let phone_chars: Vec<char> = phone.chars().collect();
    let phone_part: String = phone_chars[phone_chars.len().saturating_sub(4)..]
        .iter()
        .collect();
    format!("{}{}", name_part, phone_part)
}

pub fn generate_coupon_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = (0..COUPON_SUFFIX_LEN)
        .map(|_| COUPON_ALPHABET[rng.gen_range(0..COUPON_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", COUPON_PREFIX, suffix)
}

/// Links a referrer to the first order of the customer they brought in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: Uuid,
    pub referrer_code: String,
    pub referrer_name: String,
    pub referrer_phone: String,
    pub referee_order_id: Uuid,
    pub referee_name: String,
    pub referee_phone: String,
    pub referee_order_quantity: u32,
    pub status: ReferralStatus,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Referral {
    pub fn for_order(referrer: &Customer, order: &Order, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            referrer_code: referrer.referral_code(),
            referrer_name: referrer.name.clone(),
            referrer_phone: referrer.phone.clone(),
            referee_order_id: order.id,
            referee_name: order.customer_name.clone(),
            referee_phone: order.phone.clone(),
            referee_order_quantity: order.quantity,
            status: ReferralStatus::ActiveOrder,
            created_at: now,
        }
    }

    /// Reward is due once the referred order is finished.
    pub fn ensure_completable(&self, order: &Order) -> Result<(), DomainError> {
        if self.status != ReferralStatus::ActiveOrder {
            return Err(DomainError::invalid_transition(
                "Referral",
                self.id,
                format!("cannot complete a {} referral", self.status),
            ));
        }
        if order.id != self.referee_order_id {
            return Err(DomainError::Internal(format!(
                "referral {} does not point at order {}",
                self.id, order.id
            )));
        }
        if order.status != OrderStatus::Finished {
            return Err(DomainError::PreconditionFailed(format!(
                "referred order {} is {}, not Finished",
                order.id, order.status
            )));
        }
        Ok(())
    }
}

/// Single-use discount bound to the phone it was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    pub is_used: bool,
    pub reward_amount: BigDecimal,
    pub generated_for_phone: Option<String>,
    pub is_active: bool,
}

impl Coupon {
    /// Reward value is frozen at mint time.
    pub fn mint(code: String, referral: &Referral, settings: &Settings) -> Self {
        Self {
            code,
            is_used: false,
            reward_amount: settings.reward_amount(),
            generated_for_phone: Some(referral.referrer_phone.clone()),
            is_active: true,
        }
    }

    pub fn ensure_redeemable_by(&self, phone: &str) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::PreconditionFailed(format!(
                "coupon {} is deactivated",
                self.code
            )));
        }
        if self.is_used {
            return Err(DomainError::PreconditionFailed(format!(
                "coupon {} was already used",
                self.code
            )));
        }
        match &self.generated_for_phone {
            Some(bound) if bound != phone => Err(DomainError::PreconditionFailed(format!(
                "coupon {} belongs to another customer",
                self.code
            ))),
            _ => Ok(()),
        }
    }

    pub fn ensure_toggleable(&self) -> Result<(), DomainError> {
        if self.is_used {
            return Err(DomainError::invalid_transition(
                "Coupon",
                &self.code,
                "a used coupon cannot be re-activated or deactivated",
            ));
        }
        Ok(())
    }
}
