//! Invoice storage using SQLite
//!
//! [`InvoiceDb`] is a handle over a SQLite pool. The caller opens it, hands it
//! to the ingestion orchestrator and closes it; nothing in here holds global
//! state. Table loading lives in `materialize`, ad-hoc queries in `query`.

mod materialize;
mod query;

pub use materialize::*;
pub use query::*;

use crate::config::{Config, DatabaseConfig};
use crate::error::Result;
use crate::schema::{quote_ident, REGISTRY};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Row count of one registry table
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub table: &'static str,
    pub exists: bool,
    pub rows: i64,
}

/// Invoice database handle
#[derive(Clone)]
pub struct InvoiceDb {
    pool: SqlitePool,
}

impl InvoiceDb {
    /// Connect to the database configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open_with(&config.paths.db_file, &config.database).await
    }

    /// Open a database file with default connection settings
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &DatabaseConfig::default()).await
    }

    async fn open_with(db_path: &Path, settings: &DatabaseConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Foreign keys are declared but not enforced: replacing the header
        // table must not be blocked by the previous run's items.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(settings.busy_timeout_secs))
            .foreign_keys(false);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Close every pooled connection
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Closed SQLite pool");
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create every registry table that does not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        for entity in REGISTRY {
            self.ensure_schema(entity)
                .await
                .map_err(|e| crate::error::Error::Database(e.source))?;
        }
        Ok(())
    }

    /// Check if every registry table exists
    pub async fn is_initialized(&self) -> Result<bool> {
        for entity in REGISTRY {
            if !self.table_exists(entity.table).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Row counts for the registry tables, in load order
    pub async fn table_stats(&self) -> Result<Vec<TableStats>> {
        let mut stats = Vec::with_capacity(REGISTRY.len());
        for entity in REGISTRY {
            let exists = self.table_exists(entity.table).await?;
            let rows = if exists {
                self.count_rows(entity.table).await?
            } else {
                0
            };
            stats.push(TableStats {
                table: entity.table,
                exists,
                rows,
            });
        }
        Ok(stats)
    }

    /// `CREATE TABLE` text of every user table, as stored by SQLite,
    /// separated by blank lines. Empty when no table exists.
    pub async fn describe_schema(&self) -> Result<String> {
        let tables: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut parts = Vec::with_capacity(tables.len());
        for (name, sql) in tables {
            match sql {
                Some(sql) if !sql.trim().is_empty() => parts.push(sql),
                _ => parts.push(self.describe_from_pragma(&name).await?),
            }
        }
        Ok(parts.join("\n\n"))
    }

    async fn describe_from_pragma(&self, table: &str) -> Result<String> {
        let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&format!("PRAGMA table_info({})", quote_ident(table)))
                .fetch_all(&self.pool)
                .await?;

        let defs: Vec<String> = columns
            .into_iter()
            .map(|(_, name, ty, not_null, _, pk)| {
                let mut def = format!("{} {}", quote_ident(&name), ty);
                if pk > 0 {
                    def.push_str(" PRIMARY KEY");
                }
                if not_null != 0 {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        Ok(format!(
            "CREATE TABLE {} (\n    {}\n)",
            quote_ident(table),
            defs.join(",\n    ")
        ))
    }
}
