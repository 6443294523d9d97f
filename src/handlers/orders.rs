use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{blocking, no_content, parse_enum, unexpected};
use crate::application::MarketplaceService;
use crate::domain::command::{Command, CommandOutcome, CreateOrder};
use crate::domain::order::{DeliveryChoice, OrderStatus, PlaceOrder};
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub affiliate_id: String,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub quantity: u32,
    /// "Cash" or "Transfer"
    pub payment_method: String,
    /// "Delivery" or "Pickup". Defaults to pickup.
    pub delivery_choice: Option<String>,
    pub referral_code: Option<String>,
    pub coupon_code: Option<String>,
    /// Transfer receipt attachment.
    pub payment_receipt: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetOrderStatusRequest {
    /// "Finished" or "Cancelled"
    pub status: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListOrdersParams {
    /// Only orders of this affiliate.
    pub affiliate_id: Option<String>,
}

impl CreateOrderRequest {
    fn into_command(self) -> Result<CreateOrder, AppError> {
        let payment_method = parse_enum("payment_method", &self.payment_method)?;
        let delivery_choice = match self.delivery_choice.as_deref() {
            Some(choice) => parse_enum("delivery_choice", choice)?,
            None => DeliveryChoice::Pickup,
        };
        let order = PlaceOrder {
            customer_name: self.customer_name,
            phone: self.phone,
            address: self.address,
            quantity: self.quantity,
            payment_method,
            delivery_choice,
            referral_code: self.referral_code,
            payment_receipt: self.payment_receipt,
        };
        Ok(CreateOrder::new(self.affiliate_id, order, self.coupon_code)?)
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Places an order against an approved affiliate. Cash orders start active,
/// transfer orders wait for payment confirmation.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Malformed order"),
        (status = 404, description = "Affiliate not found"),
        (status = 422, description = "Affiliate closed, coupon or referral rejected"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    service: web::Data<MarketplaceService>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let command = body.into_inner().into_command()?;

    let outcome = blocking(service, move |s| {
        s.execute(Command::CreateOrder(command))
    })
    .await?;
    match outcome {
        CommandOutcome::OrderCreated { order_id } => {
            Ok(HttpResponse::Created().json(CreateOrderResponse { id: order_id }))
        }
        other => Err(unexpected(other)),
    }
}

/// GET /orders
///
/// Newest first.
#[utoipa::path(
    get,
    path = "/orders",
    params(ListOrdersParams),
    responses(
        (status = 200, description = "Orders"),
        (status = 404, description = "Affiliate not found"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    service: web::Data<MarketplaceService>,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let affiliate_id = query.into_inner().affiliate_id;
    let orders = blocking(service, move |s| match affiliate_id {
        Some(id) => s.affiliate_orders(&id),
        None => s.orders(),
    })
    .await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = blocking(service, move |s| s.order(order_id)).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// GET /orders/{id}/bill
///
/// Customer bill and settlement amounts at the current commission rate.
#[utoipa::path(
    get,
    path = "/orders/{id}/bill",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Bill breakdown"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order_bill(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let bill = blocking(service, move |s| s.order_bill(order_id)).await?;
    Ok(HttpResponse::Ok().json(bill))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/confirm-payment",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 204, description = "Transfer confirmed, order active"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not awaiting confirmation"),
    ),
    tag = "orders"
)]
pub async fn confirm_payment(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::ConfirmTransferPayment { order_id })
    })
    .await?;
    no_content(outcome)
}

/// PUT /orders/{id}/status
///
/// Finishing debits the affiliate's stock. Cancelling cancels a linked
/// referral.
#[utoipa::path(
    put,
    path = "/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = SetOrderStatusRequest,
    responses(
        (status = 204, description = "Status changed"),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "orders"
)]
pub async fn set_order_status(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
    body: web::Json<SetOrderStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let status: OrderStatus = parse_enum("status", &body.status)?;
    let outcome = blocking(service, move |s| {
        s.execute(Command::SetOrderStatus { order_id, status })
    })
    .await?;
    no_content(outcome)
}

#[utoipa::path(
    post,
    path = "/orders/{id}/reverse-cancellation",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 204, description = "Order active again"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not cancelled"),
    ),
    tag = "orders"
)]
pub async fn reverse_cancellation(
    service: web::Data<MarketplaceService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let outcome = blocking(service, move |s| {
        s.execute(Command::ReverseCancellation { order_id })
    })
    .await?;
    no_content(outcome)
}
