//! A library responsible for interacting with the database.
//!
//! The [`Database`] is the key-value adapter and the only point of contact with the filesystem.
//! The [`HeaderStore`] layers typed batch and rollup persistence and head maintenance on top.

mod db;
pub use db::{Database, WriteBatch};

mod error;
pub use error::DatabaseError;

pub mod keys;

mod metrics;

mod models;

pub mod retry;
pub use retry::{retry_while, RetryConfig};

mod store;
pub use store::{HeadUpdate, HeaderStore};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use sea_orm::DbErr;

use obscuro_migration::{Migrator, MigratorTrait};

/// Connects to the database at the provided URL and applies pending migrations.
pub async fn open(database_url: &str) -> Result<Database, DatabaseError> {
    let db = Database::new(database_url).await?;
    Migrator::up(db.connection(), None).await?;
    Ok(db)
}
