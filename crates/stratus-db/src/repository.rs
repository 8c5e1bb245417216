//! Document repository backed by a PostgreSQL JSONB table.
//!
//! Every logical database/collection pair shares one `documents` table keyed
//! by `(database_name, collection, doc_id)`. A [`WriteBatch`] runs inside a
//! single transaction, so either all of its operations land or none do.

use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use stratus_core::error::AppError;
use stratus_core::models::{WriteBatch, WriteOp};
use tracing::debug;

use crate::classify::store_error;

/// Schema statements, executed one by one by [`DocumentRepository::migrate`].
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS documents (
        database_name TEXT NOT NULL,
        collection TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        data JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (database_name, collection, doc_id)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents (database_name, collection, updated_at)",
];

/// Shallow merge: top-level fields in the new payload win, others are kept.
const MERGE_QUERY: &str = r#"
    INSERT INTO documents (database_name, collection, doc_id, data)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (database_name, collection, doc_id)
    DO UPDATE SET
        data = documents.data || EXCLUDED.data,
        updated_at = NOW()
"#;

const REPLACE_QUERY: &str = r#"
    INSERT INTO documents (database_name, collection, doc_id, data)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (database_name, collection, doc_id)
    DO UPDATE SET
        data = EXCLUDED.data,
        updated_at = NOW()
"#;

const DELETE_QUERY: &str =
    "DELETE FROM documents WHERE database_name = $1 AND collection = $2 AND doc_id = $3";

/// Default logical database name.
pub const DEFAULT_DATABASE: &str = "default";

/// Repository for keyed JSON documents in PostgreSQL.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use stratus_db::DocumentRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/stratus")
///     .await?;
///
/// let repo = DocumentRepository::new(pool, "cost-db");
/// repo.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentRepository {
    pool: Pool<Postgres>,
    database: String,
}

impl DocumentRepository {
    pub fn new(pool: PgPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    /// Returns a repository on the same pool scoped to another database.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            pool: self.pool.clone(),
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Creates the `documents` table and its indexes if missing.
    pub async fn migrate(&self) -> Result<(), AppError> {
        for migration in MIGRATIONS {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        }
        Ok(())
    }

    /// Applies every operation in the batch inside one transaction.
    ///
    /// The transaction is rolled back when any statement fails.
    pub async fn commit(&self, batch: &WriteBatch) -> Result<(), AppError> {
        let collection = batch.collection();
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for op in batch.ops() {
            match op {
                WriteOp::Set { key, fields, merge } => {
                    let query = if *merge { MERGE_QUERY } else { REPLACE_QUERY };
                    sqlx::query(query)
                        .bind(&self.database)
                        .bind(collection)
                        .bind(key.as_str())
                        .bind(Json(fields))
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error)?;
                }
                WriteOp::Delete { key } => {
                    sqlx::query(DELETE_QUERY)
                        .bind(&self.database)
                        .bind(collection)
                        .bind(key.as_str())
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error)?;
                }
            }
        }

        tx.commit().await.map_err(store_error)?;
        debug!(
            database = self.database.as_str(),
            collection,
            ops = batch.len(),
            "Committed transaction"
        );
        Ok(())
    }

    /// Returns a single document's fields.
    pub async fn get(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Map<String, Value>>, AppError> {
        let row: Option<(Json<Map<String, Value>>,)> = sqlx::query_as(
            "SELECT data FROM documents WHERE database_name = $1 AND collection = $2 AND doc_id = $3",
        )
        .bind(&self.database)
        .bind(collection)
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(|(data,)| data.0))
    }

    /// Lists document ids in a collection, ordered by id.
    pub async fn list_keys(&self, collection: &str) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar(
            "SELECT doc_id FROM documents WHERE database_name = $1 AND collection = $2 ORDER BY doc_id",
        )
        .bind(&self.database)
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)
    }

    /// Fetches every document in a collection, ordered by id.
    pub async fn fetch_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Map<String, Value>)>, AppError> {
        let rows: Vec<(String, Json<Map<String, Value>>)> = sqlx::query_as(
            "SELECT doc_id, data FROM documents WHERE database_name = $1 AND collection = $2 ORDER BY doc_id",
        )
        .bind(&self.database)
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(|(id, data)| (id, data.0)).collect())
    }

    /// Counts documents in a collection.
    pub async fn count(&self, collection: &str) -> Result<i64, AppError> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE database_name = $1 AND collection = $2",
        )
        .bind(&self.database)
        .bind(collection)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }

    /// Checks database connectivity by executing a simple query.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

// =============================================================================
// Trait Implementation: DocumentStore
// =============================================================================

impl stratus_core::traits::DocumentStore for DocumentRepository {
    async fn commit(&self, batch: &WriteBatch) -> Result<(), AppError> {
        DocumentRepository::commit(self, batch).await
    }

    async fn list_keys(&self, collection: &str) -> Result<Vec<String>, AppError> {
        DocumentRepository::list_keys(self, collection).await
    }

    async fn fetch_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, Map<String, Value>)>, AppError> {
        DocumentRepository::fetch_documents(self, collection).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        DocumentRepository::health_check(self).await
    }
}
