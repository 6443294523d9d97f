use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{blocking, no_content, unexpected};
use crate::application::MarketplaceService;
use crate::domain::cash_out::ProofOfPayment;
use crate::domain::command::{Command, CommandOutcome};
use crate::errors::AppError;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PerformCashOutRequest {
    /// Receipt of the admin's transfer. Required when the admin owes the
    /// affiliate, ignored otherwise.
    pub proof_of_payment: Option<String>,
}

/// POST /affiliates/{id}/cash-outs
///
/// Settles every unsettled finished order of the affiliate in one record.
#[utoipa::path(
    post,
    path = "/affiliates/{id}/cash-outs",
    params(("id" = String, Path, description = "Affiliate id")),
    request_body = PerformCashOutRequest,
    responses(
        (status = 201, description = "Cash-out recorded"),
        (status = 404, description = "Affiliate not found"),
        (status = 422, description = "Nothing to settle, or proof of payment missing"),
        (status = 500, description = "Settlement records disagree; run reconciliation"),
    ),
    tag = "cash-outs"
)]
pub async fn perform_cash_out(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
    body: web::Json<PerformCashOutRequest>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let proof = body
        .into_inner()
        .proof_of_payment
        .map(ProofOfPayment::new)
        .transpose()?;
    let outcome = blocking(service, move |s| {
        s.execute(Command::PerformCashOut {
            affiliate_id,
            proof,
        })
    })
    .await?;
    match outcome {
        CommandOutcome::CashOutCreated(cash_out) => Ok(HttpResponse::Created().json(cash_out)),
        other => Err(unexpected(other)),
    }
}

#[utoipa::path(
    get,
    path = "/affiliates/{id}/cash-outs",
    params(("id" = String, Path, description = "Affiliate id")),
    responses(
        (status = 200, description = "Cash-outs, newest first"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "cash-outs"
)]
pub async fn cash_out_history(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let history = blocking(service, move |s| s.cash_out_history(&affiliate_id)).await?;
    Ok(HttpResponse::Ok().json(history))
}

#[utoipa::path(
    get,
    path = "/cash-outs/{id}",
    params(("id" = Uuid, Path, description = "Cash-out UUID")),
    responses(
        (status = 200, description = "Cash-out found"),
        (status = 404, description = "Cash-out not found"),
    ),
    tag = "cash-outs"
)]
pub async fn get_cash_out(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let cash_out_id = path.into_inner();
    let cash_out = blocking(service, move |s| s.cash_out(cash_out_id)).await?;
    Ok(HttpResponse::Ok().json(cash_out))
}

/// POST /cash-outs/{id}/confirm
///
/// The affiliate acknowledges the admin's transfer.
#[utoipa::path(
    post,
    path = "/cash-outs/{id}/confirm",
    params(("id" = Uuid, Path, description = "Cash-out UUID")),
    responses(
        (status = 204, description = "Cash-out completed"),
        (status = 404, description = "Cash-out not found"),
        (status = 409, description = "Cash-out is not awaiting confirmation"),
    ),
    tag = "cash-outs"
)]
pub async fn confirm_cash_out(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let cash_out_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::ConfirmCashOut { cash_out_id })
    })
    .await?;
    no_content(outcome)
}

/// POST /reconciliation
///
/// Repairs settlement marks that disagree with cash-out coverage and reports
/// the conflicts it cannot repair.
#[utoipa::path(
    post,
    path = "/reconciliation",
    responses((status = 200, description = "Reconciliation report")),
    tag = "cash-outs"
)]
pub async fn reconcile(service: web::Data<MarketplaceService>) -> Result<HttpResponse, AppError> {
    let outcome = blocking(service, |s| s.execute(Command::ReconcileSettlements)).await?;
    match outcome {
        CommandOutcome::Reconciled(report) => Ok(HttpResponse::Ok().json(report)),
        other => Err(unexpected(other)),
    }
}
