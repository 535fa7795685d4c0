use crate::{error::DatabaseError, models::kv};

use sea_orm::{
    sea_query::OnConflict, ActiveValue, Database as SeaOrmDatabase, DatabaseConnection,
    EntityTrait, PaginatorTrait, TransactionTrait,
};
use std::collections::BTreeMap;

/// The [`Database`] struct is the key-value adapter of the node.
///
/// It wraps a [`sea_orm::DatabaseConnection`] and exposes an ordered byte-keyed map. Reads go
/// straight to the connection. Writes are staged in a [`WriteBatch`] and land atomically on
/// [`WriteBatch::commit`]; a batch dropped without commit writes nothing.
#[derive(Debug)]
pub struct Database {
    /// The underlying database connection.
    connection: DatabaseConnection,
    /// The amount of upcoming commits to fail.
    #[cfg(any(test, feature = "test-utils"))]
    failing_commits: std::sync::atomic::AtomicUsize,
}

impl Database {
    /// Creates a new [`Database`] instance associated with the provided database URL.
    pub async fn new(database_url: &str) -> Result<Self, DatabaseError> {
        tracing::info!(target: "obscuro::db", url = database_url, "Connecting to database");
        let connection = SeaOrmDatabase::connect(database_url).await?;
        Ok(connection.into())
    }

    /// Returns true if a value is stored under the key.
    pub async fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(kv::Entity::find_by_id(key.to_vec()).count(&self.connection).await? > 0)
    }

    /// Returns the value stored under the key, if any.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        Ok(kv::Entity::find_by_id(key.to_vec()).one(&self.connection).await?.map(|m| m.value))
    }

    /// Returns a new empty [`WriteBatch`] on the database.
    pub const fn new_batch(&self) -> WriteBatch<'_> {
        WriteBatch { db: self, puts: BTreeMap::new() }
    }

    /// Returns the underlying connection.
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Makes the next `n` commits fail with a connection error before touching the database.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn check_commit_failure(&self) -> Result<(), DatabaseError> {
        use std::sync::atomic::Ordering;
        let failed = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal(
                "injected commit failure".to_string(),
            ))
            .into())
        }
        Ok(())
    }
}

impl From<DatabaseConnection> for Database {
    fn from(connection: DatabaseConnection) -> Self {
        Self {
            connection,
            #[cfg(any(test, feature = "test-utils"))]
            failing_commits: Default::default(),
        }
    }
}

/// A set of puts staged against a [`Database`] and committed atomically.
///
/// Later puts to the same key replace earlier ones.
#[derive(Debug)]
#[must_use = "a write batch does nothing unless committed"]
pub struct WriteBatch<'a> {
    db: &'a Database,
    puts: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl WriteBatch<'_> {
    /// Stages a put of the value under the key.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.insert(key.into(), value.into());
    }

    /// Returns the number of staged puts.
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    /// Commits all staged puts in a single transaction. Either all of them land or none do.
    pub async fn commit(self) -> Result<(), DatabaseError> {
        if self.puts.is_empty() {
            return Ok(())
        }

        #[cfg(any(test, feature = "test-utils"))]
        self.db.check_commit_failure()?;

        tracing::trace!(target: "obscuro::db", puts = self.puts.len(), "Committing write batch");
        let tx = self.db.connection.begin().await?;
        for (key, value) in self.puts {
            let record = kv::ActiveModel { key: ActiveValue::Set(key), value: ActiveValue::Set(value) };
            kv::Entity::insert(record)
                .on_conflict(
                    OnConflict::column(kv::Column::Key)
                        .update_column(kv::Column::Value)
                        .to_owned(),
                )
                .exec(&tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
