//! Test utilities for the database crate.

use crate::{Database, HeaderStore};
use obscuro_migration::{Migrator, MigratorTrait};
use std::sync::Arc;

/// Instantiates a new in-memory database and runs the migrations
/// to set up the schema.
pub async fn setup_test_db() -> Database {
    let database_url = "sqlite::memory:";
    let connection = sea_orm::Database::connect(database_url).await.unwrap();
    Migrator::up(&connection, None).await.unwrap();

    Database::from(connection)
}

/// Instantiates a [`HeaderStore`] over a fresh in-memory database.
pub async fn setup_test_store() -> HeaderStore {
    HeaderStore::new(Arc::new(setup_test_db().await))
}
