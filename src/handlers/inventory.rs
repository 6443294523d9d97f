use std::num::{NonZeroI64, NonZeroU32};

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{blocking, no_content, unexpected};
use crate::application::MarketplaceService;
use crate::domain::command::{Command, CommandOutcome};
use crate::domain::inventory::Resolution;
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryRequest {
    /// Units the affiliate asks for. Must be positive.
    pub amount: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustmentRequest {
    /// Signed correction. Must not be zero.
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveInventoryRequest {
    /// "Approve" or "Reject"
    pub resolution: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryChangeCreated {
    pub id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListInventoryChangesParams {
    pub affiliate_id: Option<String>,
}

fn created(outcome: CommandOutcome) -> Result<HttpResponse, AppError> {
    match outcome {
        CommandOutcome::InventoryChangeCreated { change_id } => {
            Ok(HttpResponse::Created().json(InventoryChangeCreated { id: change_id }))
        }
        other => Err(unexpected(other)),
    }
}

#[utoipa::path(
    get,
    path = "/inventory-changes",
    params(ListInventoryChangesParams),
    responses((status = 200, description = "Inventory changes, newest first")),
    tag = "inventory"
)]
pub async fn list_inventory_changes(
    service: web::Data<MarketplaceService>,
    query: web::Query<ListInventoryChangesParams>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = query.into_inner().affiliate_id;
    let changes = blocking(service, move |s| {
        s.inventory_changes(affiliate_id.as_deref())
    })
    .await?;
    Ok(HttpResponse::Ok().json(changes))
}

/// POST /affiliates/{id}/inventory-requests
///
/// An affiliate asks for more stock. Nothing moves until the admin approves
/// and the affiliate confirms receipt.
#[utoipa::path(
    post,
    path = "/affiliates/{id}/inventory-requests",
    params(("id" = String, Path, description = "Affiliate id")),
    request_body = InventoryRequest,
    responses(
        (status = 201, description = "Request recorded", body = InventoryChangeCreated),
        (status = 400, description = "Amount is zero"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "inventory"
)]
pub async fn request_inventory(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
    body: web::Json<InventoryRequest>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let amount = NonZeroU32::new(body.amount)
        .ok_or_else(|| AppError::BadRequest("amount must be positive".to_string()))?;
    let outcome = blocking(service, move |s| {
        s.execute(Command::RequestInventoryChange {
            affiliate_id,
            amount,
        })
    })
    .await?;
    created(outcome)
}

/// POST /affiliates/{id}/inventory-adjustments
///
/// Admin-issued correction. Waits for the affiliate's confirmation like any
/// approved request.
#[utoipa::path(
    post,
    path = "/affiliates/{id}/inventory-adjustments",
    params(("id" = String, Path, description = "Affiliate id")),
    request_body = InventoryAdjustmentRequest,
    responses(
        (status = 201, description = "Adjustment issued", body = InventoryChangeCreated),
        (status = 400, description = "Amount is zero"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "inventory"
)]
pub async fn adjust_inventory(
    service: web::Data<MarketplaceService>,
    path: web::Path<String>,
    body: web::Json<InventoryAdjustmentRequest>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = path.into_inner();
    let amount = NonZeroI64::new(body.amount)
        .ok_or_else(|| AppError::BadRequest("amount must not be zero".to_string()))?;
    let outcome = blocking(service, move |s| {
        s.execute(Command::AdminAdjustInventory {
            affiliate_id,
            amount,
        })
    })
    .await?;
    created(outcome)
}

#[utoipa::path(
    put,
    path = "/inventory-changes/{id}/resolution",
    params(("id" = Uuid, Path, description = "Inventory change UUID")),
    request_body = ResolveInventoryRequest,
    responses(
        (status = 204, description = "Request approved or rejected"),
        (status = 404, description = "Inventory change not found"),
        (status = 409, description = "Request is no longer pending"),
    ),
    tag = "inventory"
)]
pub async fn resolve_inventory_change(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
    body: web::Json<ResolveInventoryRequest>,
) -> Result<HttpResponse, AppError> {
    let change_id = path.into_inner();
    let resolution = match body.resolution.as_str() {
        "Approve" => Resolution::Approve,
        "Reject" => Resolution::Reject,
        other => {
            return Err(AppError::BadRequest(format!(
                "invalid resolution '{}'",
                other
            )))
        }
    };
    let outcome = blocking(service, move |s| {
        s.execute(Command::ResolveInventoryChange {
            change_id,
            resolution,
        })
    })
    .await?;
    no_content(outcome)
}

/// POST /inventory-changes/{id}/confirm
///
/// The affiliate confirms receipt; only now is stock credited.
#[utoipa::path(
    post,
    path = "/inventory-changes/{id}/confirm",
    params(("id" = Uuid, Path, description = "Inventory change UUID")),
    responses(
        (status = 204, description = "Stock applied"),
        (status = 404, description = "Inventory change not found"),
        (status = 409, description = "Change is not approved"),
    ),
    tag = "inventory"
)]
pub async fn confirm_inventory_change(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let change_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::ConfirmInventoryChange { change_id })
    })
    .await?;
    no_content(outcome)
}

#[utoipa::path(
    delete,
    path = "/inventory-changes/{id}",
    params(("id" = Uuid, Path, description = "Inventory change UUID")),
    responses(
        (status = 204, description = "Pending request withdrawn"),
        (status = 404, description = "Inventory change not found"),
        (status = 409, description = "Request is no longer pending"),
    ),
    tag = "inventory"
)]
pub async fn cancel_inventory_request(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let change_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::CancelInventoryRequest { change_id })
    })
    .await?;
    no_content(outcome)
}
