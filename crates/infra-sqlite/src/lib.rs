// Strata Infrastructure - SQLite Adapter
// Implements: Store (transactions, typed selects, set-based writes)

mod config;
mod connection;
mod error;
mod migration;
mod sql;
mod store;

pub use config::StoreConfig;
pub use connection::create_pool;
pub use error::map_sqlx_error;
pub use migration::run_migrations;
pub use store::SqliteStore;

// Note: sqlx::Error conversion is handled by map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
