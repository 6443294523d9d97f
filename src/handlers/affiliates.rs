use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{blocking, no_content, parse_enum, parse_money, unexpected};
use crate::application::MarketplaceService;
use crate::domain::affiliate::{
    AffiliateApplication, AffiliateSettings, AffiliateStatus, DaySchedule,
};
use crate::domain::cash_out::{SettlementDirection, SettlementPreview};
use crate::domain::command::{Command, CommandOutcome};
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScheduleDay {
    pub is_open: bool,
    /// "HH:MM"
    pub open_time: String,
    /// "HH:MM"
    pub close_time: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterAffiliateRequest {
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub has_delivery_service: bool,
    /// Decimal as a string, e.g. "15.00"
    pub delivery_cost: Option<String>,
    /// Keyed by day name.
    #[serde(default)]
    pub schedule: BTreeMap<String, ScheduleDay>,
    pub bank_details: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterAffiliateResponse {
    pub id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetAffiliateStatusRequest {
    /// "Pending", "Approved", "Rejected" or "Suspended"
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AffiliateSettingsRequest {
    pub has_delivery_service: bool,
    pub delivery_cost: String,
    pub is_temporarily_closed: bool,
    pub bank_details: Option<String>,
    /// Omit to keep the current address.
    pub address: Option<String>,
    /// Replaces the whole weekly schedule. Omit to keep it.
    pub schedule: Option<BTreeMap<String, ScheduleDay>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementPreviewResponse {
    #[serde(flatten)]
    preview: SettlementPreview,
    direction: SettlementDirection,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    start_date: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    end_date: Option<DateTime<Utc>>,
}

impl From<SettlementPreview> for SettlementPreviewResponse {
    fn from(preview: SettlementPreview) -> Self {
        let window = preview.window();
        Self {
            direction: preview.direction(),
            start_date: window.map(|(start, _)| start),
            end_date: window.map(|(_, end)| end),
            preview,
        }
    }
}

fn into_schedule(days: BTreeMap<String, ScheduleDay>) -> BTreeMap<String, DaySchedule> {
    days.into_iter()
        .map(|(day, s)| {
            (
                day,
                DaySchedule {
                    is_open: s.is_open,
                    open_time: s.open_time,
                    close_time: s.close_time,
                },
            )
        })
        .collect()
}

impl RegisterAffiliateRequest {
    fn into_application(self) -> Result<AffiliateApplication, AppError> {
        let delivery_cost = match self.delivery_cost.as_deref() {
            Some(cost) => parse_money("delivery_cost", cost)?,
            None => 0.into(),
        };
        Ok(AffiliateApplication {
            name: self.name,
            phone: self.phone,
            address: self.address,
            has_delivery_service: self.has_delivery_service,
            delivery_cost,
            schedule: into_schedule(self.schedule),
            bank_details: self.bank_details,
        })
    }
}

/// POST /affiliates
///
/// Registers a vendor. New affiliates wait for admin approval.
#[utoipa::path(
    post,
    path = "/affiliates",
    request_body = RegisterAffiliateRequest,
    responses(
        (status = 201, description = "Affiliate registered", body = RegisterAffiliateResponse),
        (status = 400, description = "Malformed application"),
        (status = 422, description = "Phone already registered"),
    ),
    tag = "affiliates"
)]
pub async fn register_affiliate(
    service: web::Data<MarketplaceService>,
    body: web::Json<RegisterAffiliateRequest>,
) -> Result<HttpResponse, AppError> {
    let application = body.into_inner().into_application()?;
    let outcome = blocking(service, move |s| {
        s.execute(Command::RegisterAffiliate(application))
    })
    .await?;
    match outcome {
        CommandOutcome::AffiliateRegistered { affiliate_id } => {
            Ok(HttpResponse::Created().json(RegisterAffiliateResponse { id: affiliate_id }))
        }
        other => Err(unexpected(other)),
    }
}

#[utoipa::path(
    get,
    path = "/affiliates",
    responses((status = 200, description = "All affiliates")),
    tag = "affiliates"
)]
pub async fn list_affiliates(
    service: web::Data<MarketplaceService>,
) -> Result<HttpResponse, AppError> {
    let affiliates = blocking(service, |s| s.affiliates()).await?;
    Ok(HttpResponse::Ok().json(affiliates))
}

#[utoipa::path(
    get,
    path = "/affiliates/{id}",
    params(("id" = String, Path, description = "Affiliate id")),
    responses(
        (status = 200, description = "Affiliate found"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "affiliates"
)]
pub async fn get_affiliate(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let affiliate = blocking(service, move |s| s.affiliate(&affiliate_id)).await?;
    Ok(HttpResponse::Ok().json(affiliate))
}

#[utoipa::path(
    put,
    path = "/affiliates/{id}/status",
    params(("id" = String, Path, description = "Affiliate id")),
    request_body = SetAffiliateStatusRequest,
    responses(
        (status = 204, description = "Status changed"),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "affiliates"
)]
pub async fn set_affiliate_status(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
    body: web::Json<SetAffiliateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let status: AffiliateStatus = parse_enum("status", &body.status)?;
    let outcome = blocking(service, move |s| {
        s.execute(Command::SetAffiliateStatus {
            affiliate_id,
            status,
        })
    })
    .await?;
    no_content(outcome)
}

/// PUT /affiliates/{id}/settings
///
/// Delivery service, temporary closure, payout details, address and weekly
/// schedule. Stock and status are not editable here.
#[utoipa::path(
    put,
    path = "/affiliates/{id}/settings",
    params(("id" = String, Path, description = "Affiliate id")),
    request_body = AffiliateSettingsRequest,
    responses(
        (status = 204, description = "Settings updated"),
        (status = 400, description = "Invalid settings"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "affiliates"
)]
pub async fn update_affiliate_settings(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
    body: web::Json<AffiliateSettingsRequest>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let body = body.into_inner();
    let settings = AffiliateSettings {
        has_delivery_service: body.has_delivery_service,
        delivery_cost: parse_money("delivery_cost", &body.delivery_cost)?,
        is_temporarily_closed: body.is_temporarily_closed,
        bank_details: body.bank_details,
        address: body.address,
        schedule: body.schedule.map(into_schedule),
    };
    let outcome = blocking(service, move |s| {
        s.execute(Command::UpdateAffiliateSettings {
            affiliate_id,
            settings,
        })
    })
    .await?;
    no_content(outcome)
}

/// DELETE /affiliates/{id}
///
/// Only affiliates with no orders, inventory changes or cash-outs can be
/// removed. Others are retired by status.
#[utoipa::path(
    delete,
    path = "/affiliates/{id}",
    params(("id" = String, Path, description = "Affiliate id")),
    responses(
        (status = 204, description = "Affiliate deleted"),
        (status = 404, description = "Affiliate not found"),
        (status = 422, description = "Affiliate has trading history"),
    ),
    tag = "affiliates"
)]
pub async fn delete_affiliate(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::DeleteAffiliate { affiliate_id })
    })
    .await?;
    no_content(outcome)
}

/// GET /affiliates/{id}/settlement-preview
///
/// The unsettled finished orders and the balance a cash-out would record now.
#[utoipa::path(
    get,
    path = "/affiliates/{id}/settlement-preview",
    params(("id" = String, Path, description = "Affiliate id")),
    responses(
        (status = 200, description = "Settlement preview"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "affiliates"
)]
pub async fn settlement_preview(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let preview = blocking(service, move |s| s.settlement_preview(&affiliate_id)).await?;
    Ok(HttpResponse::Ok().json(SettlementPreviewResponse::from(preview)))
}

#[utoipa::path(
    get,
    path = "/stock-indicators",
    responses((status = 200, description = "Stock view of every approved affiliate")),
    tag = "affiliates"
)]
pub async fn stock_indicators(
    service: web::Data<MarketplaceService>,
) -> Result<HttpResponse, AppError> {
    let indicators = blocking(service, |s| s.stock_indicators()).await?;
    Ok(HttpResponse::Ok().json(indicators))
}
