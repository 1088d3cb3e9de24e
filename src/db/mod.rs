mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{Config, CustomerIdConflictPolicy, LemonSqueezyConfig};
use crate::payments::LemonSqueezyClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub lemonsqueezy: LemonSqueezyConfig,
    pub customer_id_conflict: CustomerIdConflictPolicy,
    /// Read-only client for the LemonSqueezy API (pricing, portal URLs)
    pub client: LemonSqueezyClient,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Self {
        Self {
            db,
            lemonsqueezy: config.lemonsqueezy.clone(),
            customer_id_conflict: config.customer_id_conflict,
            client: LemonSqueezyClient::new(&config.lemonsqueezy),
        }
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
    Pool::builder().max_size(10).build(manager)
}
