//! Database layer
//!
//! SQLite is the default backend; MySQL is available for larger
//! deployments. The driver is selected by configuration.
//!
//! ```ignore
//! use techinsights::config::DatabaseConfig;
//! use techinsights::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
