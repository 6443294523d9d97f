pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::application::MarketplaceService;
use crate::domain::errors::DomainError;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), DomainError> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DomainError::Internal(format!("failed to run migrations: {}", e)))?;
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::create_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::get_order_bill,
        handlers::orders::confirm_payment,
        handlers::orders::set_order_status,
        handlers::orders::reverse_cancellation,
        handlers::affiliates::register_affiliate,
        handlers::affiliates::list_affiliates,
        handlers::affiliates::get_affiliate,
        handlers::affiliates::set_affiliate_status,
        handlers::affiliates::update_affiliate_settings,
        handlers::affiliates::delete_affiliate,
        handlers::affiliates::settlement_preview,
        handlers::affiliates::stock_indicators,
        handlers::inventory::list_inventory_changes,
        handlers::inventory::request_inventory,
        handlers::inventory::adjust_inventory,
        handlers::inventory::resolve_inventory_change,
        handlers::inventory::confirm_inventory_change,
        handlers::inventory::cancel_inventory_request,
        handlers::cash_outs::perform_cash_out,
        handlers::cash_outs::cash_out_history,
        handlers::cash_outs::get_cash_out,
        handlers::cash_outs::confirm_cash_out,
        handlers::cash_outs::reconcile,
        handlers::referrals::list_referrals,
        handlers::referrals::complete_referral,
        handlers::referrals::list_coupons,
        handlers::referrals::set_coupon_active,
        handlers::referrals::delete_coupon,
        handlers::referrals::list_customers,
        handlers::settings::get_settings,
        handlers::settings::update_settings,
        handlers::settings::admin_overview,
    ),
    tags(
        (name = "orders", description = "Order lifecycle"),
        (name = "affiliates", description = "Vendors and their stock"),
        (name = "inventory", description = "Two-party stock changes"),
        (name = "cash-outs", description = "Settlement and reconciliation"),
        (name = "referrals", description = "Referrals, coupons and customers"),
        (name = "settings", description = "Tenant settings and admin overview"),
    )
)]
pub struct ApiDoc;

/// Route table, shared by the server and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    use handlers::{affiliates, cash_outs, inventory, orders, referrals, settings};

    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(orders::create_order))
            .route("", web::get().to(orders::list_orders))
            .route("/{id}", web::get().to(orders::get_order))
            .route("/{id}/bill", web::get().to(orders::get_order_bill))
            .route("/{id}/confirm-payment", web::post().to(orders::confirm_payment))
            .route("/{id}/status", web::put().to(orders::set_order_status))
            .route(
                "/{id}/reverse-cancellation",
                web::post().to(orders::reverse_cancellation),
            ),
    )
    .service(
        web::scope("/affiliates")
            .route("", web::post().to(affiliates::register_affiliate))
            .route("", web::get().to(affiliates::list_affiliates))
            .route("/{id}", web::get().to(affiliates::get_affiliate))
            .route("/{id}", web::delete().to(affiliates::delete_affiliate))
            .route("/{id}/status", web::put().to(affiliates::set_affiliate_status))
            .route(
                "/{id}/settings",
                web::put().to(affiliates::update_affiliate_settings),
            )
            .route(
                "/{id}/settlement-preview",
                web::get().to(affiliates::settlement_preview),
            )
            .route(
                "/{id}/inventory-requests",
                web::post().to(inventory::request_inventory),
            )
            .route(
                "/{id}/inventory-adjustments",
                web::post().to(inventory::adjust_inventory),
            )
            .route("/{id}/cash-outs", web::post().to(cash_outs::perform_cash_out))
            .route("/{id}/cash-outs", web::get().to(cash_outs::cash_out_history)),
    )
    .service(
        web::scope("/inventory-changes")
            .route("", web::get().to(inventory::list_inventory_changes))
            .route(
                "/{id}/resolution",
                web::put().to(inventory::resolve_inventory_change),
            )
            .route(
                "/{id}/confirm",
                web::post().to(inventory::confirm_inventory_change),
            )
            .route("/{id}", web::delete().to(inventory::cancel_inventory_request)),
    )
    .service(
        web::scope("/cash-outs")
            .route("/{id}", web::get().to(cash_outs::get_cash_out))
            .route("/{id}/confirm", web::post().to(cash_outs::confirm_cash_out)),
    )
    .service(
        web::scope("/referrals")
            .route("", web::get().to(referrals::list_referrals))
            .route("/{id}/complete", web::post().to(referrals::complete_referral)),
    )
    .service(
        web::scope("/coupons")
            .route("", web::get().to(referrals::list_coupons))
            .route("/{code}/active", web::put().to(referrals::set_coupon_active))
            .route("/{code}", web::delete().to(referrals::delete_coupon)),
    )
    .route("/customers", web::get().to(referrals::list_customers))
    .route("/stock-indicators", web::get().to(affiliates::stock_indicators))
    .route("/reconciliation", web::post().to(cash_outs::reconcile))
    .route("/settings", web::get().to(settings::get_settings))
    .route("/settings", web::put().to(settings::update_settings))
    .route("/admin/overview", web::get().to(settings::admin_overview));
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    service: web::Data<MarketplaceService>,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let openapi = ApiDoc::openapi();
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .configure(configure)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
