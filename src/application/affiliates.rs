use serde_json::json;

use crate::domain::affiliate::{Affiliate, AffiliateApplication, AffiliateSettings, AffiliateStatus};
use crate::domain::batch::{Mutation, WriteBatch};
use crate::domain::errors::DomainError;
use crate::domain::events::OutboxEvent;
use crate::domain::settings::Settings;

use super::MarketplaceService;

impl MarketplaceService {
    pub(crate) fn register_affiliate(
        &self,
        application: AffiliateApplication,
    ) -> Result<String, DomainError> {
        let affiliate = Affiliate::apply(application)?;
        if self.store.find_affiliate(&affiliate.id)?.is_some() {
            return Err(DomainError::PreconditionFailed(format!(
                "affiliate {} is already registered",
                affiliate.id
            )));
        }

        let id = affiliate.id.clone();
        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::InsertAffiliate(affiliate.clone()))
            .event(OutboxEvent::new(
                "Affiliate",
                &id,
                "AffiliateRegistered",
                json!({ "affiliateId": id, "name": affiliate.name }),
            ));
        self.store.commit(batch)?;

        log::info!("Affiliate {} registered, awaiting approval", id);
        Ok(id)
    }

    pub(crate) fn set_affiliate_status(
        &self,
        affiliate_id: &str,
        status: AffiliateStatus,
    ) -> Result<(), DomainError> {
        let affiliate = self.load_affiliate(affiliate_id)?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::SetAffiliateStatus {
                affiliate_id: affiliate.id.clone(),
                status,
            })
            .event(OutboxEvent::new(
                "Affiliate",
                &affiliate.id,
                "AffiliateStatusChanged",
                json!({
                    "affiliateId": affiliate.id,
                    "from": affiliate.status,
                    "to": status,
                }),
            ));
        self.store.commit(batch)?;

        log::info!(
            "Affiliate {} moved {} -> {}",
            affiliate.id,
            affiliate.status,
            status
        );
        Ok(())
    }

    pub(crate) fn update_affiliate_settings(
        &self,
        affiliate_id: &str,
        settings: AffiliateSettings,
    ) -> Result<(), DomainError> {
        settings.validate()?;
        let affiliate = self.load_affiliate(affiliate_id)?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::UpdateAffiliateSettings {
                affiliate_id: affiliate.id.clone(),
                settings: settings.clone(),
            })
            .event(OutboxEvent::new(
                "Affiliate",
                &affiliate.id,
                "AffiliateSettingsUpdated",
                json!({
                    "affiliateId": affiliate.id,
                    "hasDeliveryService": settings.has_delivery_service,
                    "deliveryCost": settings.delivery_cost.to_string(),
                    "isTemporarilyClosed": settings.is_temporarily_closed,
                    "address": settings.address,
                    "schedule": settings.schedule,
                }),
            ));
        self.store.commit(batch)?;

        log::info!("Affiliate {} updated its settings", affiliate.id);
        Ok(())
    }

    /// Removes an affiliate that never traded. Anything with orders,
    /// inventory changes or cash-outs is retired through its status instead.
    pub(crate) fn delete_affiliate(&self, affiliate_id: &str) -> Result<(), DomainError> {
        let affiliate = self.load_affiliate(affiliate_id)?;
        let orders = self.store.orders_for_affiliate(&affiliate.id)?.len();
        let changes = self
            .store
            .list_inventory_changes()?
            .iter()
            .filter(|c| c.affiliate_id == affiliate.id)
            .count();
        let cash_outs = self
            .store
            .list_cash_outs()?
            .iter()
            .filter(|c| c.affiliate_id == affiliate.id)
            .count();
        if orders + changes + cash_outs > 0 {
            return Err(DomainError::PreconditionFailed(format!(
                "affiliate {} has {} orders, {} inventory changes and {} cash-outs",
                affiliate.id, orders, changes, cash_outs
            )));
        }

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::DeleteAffiliate {
                affiliate_id: affiliate.id.clone(),
            })
            .event(OutboxEvent::new(
                "Affiliate",
                &affiliate.id,
                "AffiliateDeleted",
                json!({ "affiliateId": affiliate.id, "status": affiliate.status }),
            ));
        self.store.commit(batch)?;

        log::info!("Affiliate {} deleted", affiliate.id);
        Ok(())
    }

    pub(crate) fn update_settings(&self, settings: Settings) -> Result<(), DomainError> {
        settings.validate()?;

        let mut batch = WriteBatch::new();
        batch
            .push(Mutation::PutSettings(settings.clone()))
            .event(OutboxEvent::new(
                "Settings",
                "tenant",
                "SettingsUpdated",
                json!(settings),
            ));
        self.store.commit(batch)?;

        log::info!("Tenant settings updated");
        Ok(())
    }
}
