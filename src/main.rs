use std::fs;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use dotenvy::dotenv;
use tortilla_settlement::application::MarketplaceService;
use tortilla_settlement::config::{AppConfig, StoreBackend};
use tortilla_settlement::domain::ports::MarketplaceStore;
use tortilla_settlement::infrastructure::diesel_store::DieselStore;
use tortilla_settlement::infrastructure::memory_store::MemoryStore;
use tortilla_settlement::infrastructure::snapshot::load_snapshot;
use tortilla_settlement::{build_server, create_pool, run_migrations};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().expect("Invalid configuration");

    let store: Arc<dyn MarketplaceStore> = match config.backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set");
            let pool = create_pool(database_url).expect("Failed to create DB pool");
            run_migrations(&pool).expect("Failed to run database migrations");
            Arc::new(DieselStore::new(pool))
        }
        StoreBackend::Memory => {
            let store = Arc::new(match &config.snapshot_path {
                Some(path) => {
                    let text = fs::read_to_string(path).expect("Failed to read snapshot");
                    let snapshot = load_snapshot(&text).expect("Failed to load snapshot");
                    log::info!(
                        "Loaded snapshot {} ({} orders, {} affiliates)",
                        path,
                        snapshot.orders.len(),
                        snapshot.affiliates.len()
                    );
                    MemoryStore::from_snapshot(snapshot)
                }
                None => MemoryStore::new(),
            });
            spawn_outbox_relay(store.clone());
            store
        }
    };

    let service = web::Data::new(MarketplaceService::new(store, config.default_settings));

    log::info!(
        "Starting server at http://{}:{} ({:?} store)",
        config.host,
        config.port,
        config.backend
    );

    build_server(service, &config.host, config.port)?.await
}

/// Stands in for the CDC connector on the memory backend: drains the outbox
/// and logs each event.
fn spawn_outbox_relay(store: Arc<MemoryStore>) {
    actix_web::rt::spawn(async move {
        let mut tick = actix_web::rt::time::interval(Duration::from_secs(5));
        loop {
            tick.tick().await;
            for event in store.drain_outbox(500) {
                log::info!(
                    "Outbox {} {} {}: {}",
                    event.aggregate_type,
                    event.aggregate_id,
                    event.event_type,
                    event.payload
                );
            }
        }
    });
}
