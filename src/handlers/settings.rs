use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{blocking, no_content, parse_money};
use crate::application::queries::DateRange;
use crate::application::MarketplaceService;
use crate::domain::command::Command;
use crate::domain::settings::Settings;
use crate::errors::AppError;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettingsBody {
    /// Affiliate commission per unit, in cents.
    pub commission_rate_cents: i64,
    /// Decimal as a string, e.g. "12.00"
    pub unit_price: String,
    /// Units a referral reward coupon is worth.
    pub reward_units: u32,
    pub low_stock_threshold: i64,
}

impl From<Settings> for SettingsBody {
    fn from(settings: Settings) -> Self {
        Self {
            commission_rate_cents: settings.commission_rate_cents,
            unit_price: settings.unit_price.to_string(),
            reward_units: settings.reward_units,
            low_stock_threshold: settings.low_stock_threshold,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OverviewParams {
    /// Earliest order creation time, epoch milliseconds.
    pub start: Option<i64>,
    /// Latest order creation time, epoch milliseconds.
    pub end: Option<i64>,
}

fn timestamp(field: &str, millis: Option<i64>) -> Result<Option<DateTime<Utc>>, AppError> {
    millis
        .map(|ms| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| AppError::BadRequest(format!("{} is out of range", field)))
        })
        .transpose()
}

#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Settings in force", body = SettingsBody)),
    tag = "settings"
)]
pub async fn get_settings(
    service: web::Data<MarketplaceService>,
) -> Result<HttpResponse, AppError> {
    let settings = blocking(service, |s| s.settings()).await?;
    Ok(HttpResponse::Ok().json(SettingsBody::from(settings)))
}

/// PUT /settings
///
/// New values apply to every balance computed afterwards, including orders
/// placed earlier.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = SettingsBody,
    responses(
        (status = 204, description = "Settings stored"),
        (status = 400, description = "Invalid settings"),
    ),
    tag = "settings"
)]
pub async fn update_settings(
    service: web::Data<MarketplaceService>,
    body: web::Json<SettingsBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let settings = Settings {
        commission_rate_cents: body.commission_rate_cents,
        unit_price: parse_money("unit_price", &body.unit_price)?,
        reward_units: body.reward_units,
        low_stock_threshold: body.low_stock_threshold,
    };
    let outcome = blocking(service, move |s| {
        s.execute(Command::UpdateSettings(settings))
    })
    .await?;
    no_content(outcome)
}

#[utoipa::path(
    get,
    path = "/admin/overview",
    params(OverviewParams),
    responses(
        (status = 200, description = "Marketplace counters"),
        (status = 400, description = "Timestamp out of range"),
    ),
    tag = "settings"
)]
pub async fn admin_overview(
    service: web::Data<MarketplaceService>,
    query: web::Query<OverviewParams>,
) -> Result<HttpResponse, AppError> {
    let range = DateRange {
        start: timestamp("start", query.start)?,
        end: timestamp("end", query.end)?,
    };
    let overview = blocking(service, move |s| s.admin_overview(range)).await?;
    Ok(HttpResponse::Ok().json(overview))
}
