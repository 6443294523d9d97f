pub mod diesel_store;
pub mod memory_store;
pub mod models;
pub mod snapshot;
