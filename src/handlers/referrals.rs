use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{blocking, no_content, unexpected};
use crate::application::MarketplaceService;
use crate::domain::command::{Command, CommandOutcome};
use crate::domain::referral::Customer;
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetCouponActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub customer_name: String,
    pub phone: String,
    pub referral_code: String,
}

impl From<Customer> for CustomerResponse {
    fn from(customer: Customer) -> Self {
        Self {
            referral_code: customer.referral_code(),
            customer_name: customer.name,
            phone: customer.phone,
        }
    }
}

#[utoipa::path(
    get,
    path = "/referrals",
    responses((status = 200, description = "All referrals")),
    tag = "referrals"
)]
pub async fn list_referrals(
    service: web::Data<MarketplaceService>,
) -> Result<HttpResponse, AppError> {
    let referrals = blocking(service, |s| s.referrals()).await?;
    Ok(HttpResponse::Ok().json(referrals))
}

/// POST /referrals/{id}/complete
///
/// Rewards the referrer with a coupon once the referred order is finished.
#[utoipa::path(
    post,
    path = "/referrals/{id}/complete",
    params(("id" = Uuid, Path, description = "Referral UUID")),
    responses(
        (status = 201, description = "Coupon minted for the referrer"),
        (status = 404, description = "Referral not found"),
        (status = 409, description = "Referral already completed or cancelled"),
        (status = 422, description = "Referred order is not finished"),
    ),
    tag = "referrals"
)]
pub async fn complete_referral(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let referral_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::CompleteReferral { referral_id })
    })
    .await?;
    match outcome {
        CommandOutcome::CouponMinted(coupon) => Ok(HttpResponse::Created().json(coupon)),
        other => Err(unexpected(other)),
    }
}

#[utoipa::path(
    get,
    path = "/coupons",
    responses((status = 200, description = "All coupons")),
    tag = "referrals"
)]
pub async fn list_coupons(
    service: web::Data<MarketplaceService>,
) -> Result<HttpResponse, AppError> {
    let coupons = blocking(service, |s| s.coupons()).await?;
    Ok(HttpResponse::Ok().json(coupons))
}

#[utoipa::path(
    put,
    path = "/coupons/{code}/active",
    params(("code" = String, Path, description = "Coupon code")),
    request_body = SetCouponActiveRequest,
    responses(
        (status = 204, description = "Coupon toggled"),
        (status = 404, description = "Coupon not found"),
        (status = 409, description = "Coupon already used"),
    ),
    tag = "referrals"
)]
pub async fn set_coupon_active(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
    body: web::Json<SetCouponActiveRequest>,
) -> Result<HttpResponse, AppError> {
    let code = path.into_inner();
    let active = body.active;
    let outcome = blocking(service, move |s| {
        s.execute(Command::SetCouponActive { code, active })
    })
    .await?;
    no_content(outcome)
}

#[utoipa::path(
    delete,
    path = "/coupons/{code}",
    params(("code" = String, Path, description = "Coupon code")),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 404, description = "Coupon not found"),
    ),
    tag = "referrals"
)]
pub async fn delete_coupon(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let code = path.into_inner();
    let outcome = blocking(service, move |s| s.execute(Command::DeleteCoupon { code })).await?;
    no_content(outcome)
}

#[utoipa::path(
    get,
    path = "/customers",
    responses(
        (status = 200, description = "Known customers and their referral codes", body = [CustomerResponse]),
    ),
    tag = "referrals"
)]
pub async fn list_customers(
    service: web::Data<MarketplaceService>,
) -> Result<HttpResponse, AppError> {
    let customers = blocking(service, |s| s.customers()).await?;
    let body: Vec<CustomerResponse> = customers.into_iter().map(CustomerResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
