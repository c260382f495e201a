//! Metadata store that records content hashes of completed uploads.

use crate::models::hash_record::HashRecord;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("table name `{0}` is not a valid identifier")]
    InvalidTableName(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Sink for [`HashRecord`]s. Writes are fire-and-forget: nothing is read back.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_record(&self, record: &HashRecord) -> MetadataResult<()>;

    /// Cheap connectivity check used by the readiness probe.
    async fn check_ready(&self) -> MetadataResult<()>;
}

/// Hash records in a SQLite table whose name comes from configuration.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    db: Arc<SqlitePool>,
    table: String,
}

impl SqliteMetadataStore {
    /// The table name is interpolated into SQL, so it must be a plain
    /// identifier: `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn new(db: Arc<SqlitePool>, table: impl Into<String>) -> MetadataResult<Self> {
        let table = table.into();
        let mut chars = table.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(MetadataError::InvalidTableName(table));
        }
        Ok(Self { db, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the hash table if it does not exist yet.
    pub async fn migrate(&self) -> MetadataResult<()> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    filename TEXT NOT NULL,
                    hash TEXT NOT NULL,
                    uploaded_at TEXT NOT NULL
                )",
                self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_filename ON {0} (filename)",
                self.table
            ),
        ];

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn put_record(&self, record: &HashRecord) -> MetadataResult<()> {
        let sql = format!(
            "INSERT INTO {} (filename, hash, uploaded_at) VALUES (?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.filename)
            .bind(&record.hash)
            .bind(record.uploaded_at_iso())
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn check_ready(&self) -> MetadataResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}
