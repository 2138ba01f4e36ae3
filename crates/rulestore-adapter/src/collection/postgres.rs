//! Postgres-backed rule collection.
//!
//! # What this module is
//! A document collection stored in a single Postgres table. Each row holds one
//! rule document as JSONB next to a `BIGSERIAL` id that records insertion order:
//!
//! ```sql
//! CREATE TABLE casbin_rules (id BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL);
//! ```
//!
//! # Key invariants
//! - Documents always carry all seven keys, so JSONB containment (`doc @> $1`)
//!   with a selector object is exactly equality on the selected keys. The empty
//!   object `{}` is contained in every document.
//! - Reads are ordered by `id`, which is insertion order.
//! - `replace_all` deletes and re-inserts inside one transaction. Readers see the
//!   old rule set or the new one, and a failed insert rolls the delete back.
//!
//! # Security notes
//! - Database URLs may contain credentials; avoid logging them.
//! - Selector values are always bound parameters. The only SQL text is fixed at
//!   compile time.
//!
//! # Concurrency model
//! - `sqlx::PgPool` manages connections; each call acquires one from the pool.
//! - A `find` stream holds its pooled connection until it is dropped.
use super::{CollectionError, CollectionResult, DocumentStream, RuleCollection};
use crate::codec::StoredDocument;
use crate::config::PostgresConfig;
use crate::selector::Selector;
use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

const FIND_SQL: &str = "SELECT doc FROM casbin_rules WHERE doc @> $1::jsonb ORDER BY id";
const INSERT_ONE_SQL: &str = "INSERT INTO casbin_rules (doc) VALUES ($1::jsonb)";
const INSERT_MANY_SQL: &str = "INSERT INTO casbin_rules (doc) \
     SELECT elem FROM jsonb_array_elements($1::jsonb) WITH ORDINALITY AS t(elem, ord) \
     ORDER BY ord";
const DELETE_ONE_SQL: &str = "DELETE FROM casbin_rules WHERE id = \
     (SELECT id FROM casbin_rules WHERE doc @> $1::jsonb ORDER BY id LIMIT 1)";
const DELETE_MANY_SQL: &str = "DELETE FROM casbin_rules WHERE doc @> $1::jsonb";
const DROP_SQL: &str = "DELETE FROM casbin_rules";

impl From<sqlx::Error> for CollectionError {
    fn from(err: sqlx::Error) -> Self {
        CollectionError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for CollectionError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CollectionError::Unexpected(err.into())
    }
}

/// Durable rule collection backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use rulestore_adapter::config::PostgresConfig;
/// use rulestore_adapter::collection::postgres::PostgresCollection;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresCollection::connect(&pg).await;
/// }
/// ```
pub struct PostgresCollection {
    pool: PgPool,
}

impl PostgresCollection {
    /// Connect, then apply the embedded migrations.
    pub async fn connect(pg: &PostgresConfig) -> CollectionResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect to a database whose schema is managed elsewhere.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> CollectionResult<Self> {
        Self::connect_internal(pg, false).await
    }

    /// Wrap an existing pool. The `casbin_rules` table must already exist.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn connect_internal(
        pg: &PostgresConfig,
        run_migrations: bool,
    ) -> CollectionResult<Self> {
        // `acquire_timeout` bounds how long a call waits for a pooled connection and
        // `connect_timeout` bounds establishing a new one. Avoid logging `pg.url`.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = tokio::time::timeout(
            Duration::from_millis(pg.connect_timeout_ms),
            PgPoolOptions::new()
                .max_connections(pg.max_connections)
                .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
                .connect_with(connect_options),
        )
        .await
        .map_err(|_| anyhow!("timed out connecting to postgres"))??;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_json<T: serde::Serialize + ?Sized>(doc: &T) -> CollectionResult<Value> {
    serde_json::to_value(doc).map_err(|err| CollectionError::Unexpected(err.into()))
}

fn decode_row(value: Value) -> CollectionResult<StoredDocument> {
    Ok(StoredDocument::from_json(value)?)
}

#[async_trait]
impl RuleCollection for PostgresCollection {
    async fn find<'a>(&'a self, selector: &Selector) -> CollectionResult<DocumentStream<'a>> {
        let rows = sqlx::query_scalar::<_, Value>(FIND_SQL)
            .bind(selector.to_json())
            .fetch(&self.pool);
        Ok(rows
            .map(|row| row.map_err(CollectionError::from).and_then(decode_row))
            .boxed())
    }

    async fn insert_one(&self, doc: StoredDocument) -> CollectionResult<()> {
        sqlx::query(INSERT_ONE_SQL)
            .bind(to_json(&doc)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_many(&self, docs: Vec<StoredDocument>) -> CollectionResult<u64> {
        let batch = to_json(&docs)?;
        let result = sqlx::query(INSERT_MANY_SQL)
            .bind(batch)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_one(&self, selector: &Selector) -> CollectionResult<bool> {
        let result = sqlx::query(DELETE_ONE_SQL)
            .bind(selector.to_json())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, selector: &Selector) -> CollectionResult<u64> {
        let result = sqlx::query(DELETE_MANY_SQL)
            .bind(selector.to_json())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn drop_all(&self) -> CollectionResult<()> {
        sqlx::query(DROP_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn replace_all(&self, docs: Vec<StoredDocument>) -> CollectionResult<u64> {
        let batch = to_json(&docs)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(DROP_SQL).execute(&mut *tx).await?;
        let result = sqlx::query(INSERT_MANY_SQL)
            .bind(batch)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> CollectionResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
