//! Table materialization: schema creation and transactional batch loads

use super::InvoiceDb;
use crate::config::IngestConfig;
use crate::error::LoadFailure;
use crate::ingest::{NormalizedRecordBatch, Value};
use crate::progress::{abandon_progress, advance_progress, finish_progress, start_row_progress};
use crate::schema::{quote_ident, schema_statements, EntityDescriptor, LoadMode};
use indicatif::ProgressBar;
use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::{debug, info, warn};

/// SQLite's bound-parameter ceiling per statement
const MAX_BIND_PARAMS: usize = 32_766;

/// Insert sizing for table loads
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Rows per multi-row INSERT (further capped by the parameter limit)
    pub batch_rows: usize,
    pub show_progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_rows: crate::config::default_insert_batch_rows(),
            show_progress: false,
        }
    }
}

impl From<&IngestConfig> for LoadOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_rows: config.insert_batch_rows,
            show_progress: config.show_progress,
        }
    }
}

impl LoadOptions {
    fn rows_per_statement(&self, columns: usize) -> usize {
        self.batch_rows
            .min(MAX_BIND_PARAMS / columns.max(1))
            .max(1)
    }
}

impl InvoiceDb {
    /// Create an entity's table and foreign-key indexes if missing.
    /// Existing tables and their rows are left untouched.
    pub async fn ensure_schema(&self, entity: &EntityDescriptor) -> Result<(), LoadFailure> {
        let table = entity.table;
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| LoadFailure::new(table, e))?;

        for statement in schema_statements(entity) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| LoadFailure::new(table, e))?;
        }

        tx.commit().await.map_err(|e| LoadFailure::new(table, e))?;
        debug!(table, "Schema ensured");
        Ok(())
    }

    /// Replace the contents of an entity's table with `batch` in one
    /// transaction. On any error the transaction is rolled back and the table
    /// keeps its previous contents.
    ///
    /// [`LoadMode::Replace`] also restarts the table's autoincrement sequence;
    /// [`LoadMode::AppendAfterClear`] keeps it, so new keys continue after the
    /// highest key ever assigned.
    pub async fn load(
        &self,
        batch: &NormalizedRecordBatch,
        entity: &EntityDescriptor,
        mode: LoadMode,
        options: &LoadOptions,
    ) -> Result<u64, LoadFailure> {
        let table = entity.table;
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| LoadFailure::new(table, e))?;

        let progress = start_row_progress(options.show_progress, batch.len(), table);

        let written = write_batch(&mut tx, batch, entity, mode, options, &progress).await;
        let result = match written {
            Ok(inserted) => tx.commit().await.map(|_| inserted),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(table, "Rollback failed: {}", rollback);
                }
                Err(e)
            }
        };

        match result {
            Ok(inserted) => {
                finish_progress(progress, table);
                info!(table, rows = inserted, mode = %mode, "Loaded table");
                Ok(inserted)
            }
            Err(e) => {
                abandon_progress(progress);
                warn!(table, "Load rolled back: {}", e);
                Err(LoadFailure::new(table, e))
            }
        }
    }

    /// Delete every row of an entity's table in its own transaction
    pub async fn clear_table(&self, entity: &EntityDescriptor) -> Result<u64, LoadFailure> {
        let table = entity.table;
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| LoadFailure::new(table, e))?;

        let deleted = sqlx::query(&format!("DELETE FROM {}", quote_ident(table)))
            .execute(&mut *tx)
            .await
            .map_err(|e| LoadFailure::new(table, e))?
            .rows_affected();

        tx.commit().await.map_err(|e| LoadFailure::new(table, e))?;
        debug!(table, deleted, "Cleared table");
        Ok(deleted)
    }
}

async fn write_batch(
    tx: &mut Transaction<'_, Sqlite>,
    batch: &NormalizedRecordBatch,
    entity: &EntityDescriptor,
    mode: LoadMode,
    options: &LoadOptions,
    progress: &Option<ProgressBar>,
) -> Result<u64, sqlx::Error> {
    let table = entity.table;

    let deleted = sqlx::query(&format!("DELETE FROM {}", quote_ident(table)))
        .execute(&mut **tx)
        .await?
        .rows_affected();

    if mode == LoadMode::Replace && entity.auto_increment_key().is_some() {
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
            .bind(table)
            .execute(&mut **tx)
            .await?;
    }
    debug!(table, deleted, mode = %mode, "Cleared previous rows");

    if batch.is_empty() {
        return Ok(0);
    }

    let insert = format!(
        "INSERT INTO {} ({}) ",
        quote_ident(table),
        batch
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let chunk_rows = options.rows_per_statement(batch.columns.len());

    let mut inserted = 0;
    for chunk in batch.rows.chunks(chunk_rows) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&insert);
        builder.push_values(chunk, |mut row_builder, row| {
            for value in row {
                match value {
                    Value::Text(s) => {
                        row_builder.push_bind(s.as_str());
                    }
                    Value::Integer(i) => {
                        row_builder.push_bind(*i);
                    }
                    Value::Real(r) => {
                        row_builder.push_bind(*r);
                    }
                    Value::Missing => {
                        row_builder.push_bind(None::<String>);
                    }
                }
            }
        });

        inserted += builder.build().execute(&mut **tx).await?.rows_affected();
        advance_progress(progress, chunk.len());
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{normalize, Delimiter, RawRecordBatch};
    use crate::schema::{ColumnType, HEADER, ITEM, REGISTRY};
    use tempfile::TempDir;

    async fn setup_test_db() -> (InvoiceDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = InvoiceDb::open(&tmp.path().join("test.db")).await.unwrap();
        for entity in REGISTRY {
            db.ensure_schema(entity).await.unwrap();
        }
        (db, tmp)
    }

    /// Batch keyed by the given values; other cells get type-appropriate filler
    fn batch_for(entity: &'static EntityDescriptor, keys: &[&str]) -> NormalizedRecordBatch {
        let columns: Vec<String> = entity.sourced_columns().map(|c| c.name.to_string()).collect();
        let rows: Vec<Vec<String>> = keys
            .iter()
            .map(|key| {
                entity
                    .sourced_columns()
                    .map(|c| match (c.name, c.ty) {
                        ("CHAVE_DE_ACESSO", _) => key.to_string(),
                        (_, ColumnType::Integer) => "1".to_string(),
                        (_, ColumnType::Real) => "10,5".to_string(),
                        (_, ColumnType::Text) => "x".to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        let raw = RawRecordBatch {
            columns,
            rows,
            delimiter: Delimiter::Semicolon,
        };
        normalize(&raw, entity).unwrap()
    }

    async fn keys(db: &InvoiceDb, table: &str) -> Vec<String> {
        sqlx::query_scalar(&format!(
            "SELECT CHAVE_DE_ACESSO FROM {} ORDER BY CHAVE_DE_ACESSO",
            table
        ))
        .fetch_all(db.pool())
        .await
        .unwrap()
    }

    async fn item_ids(db: &InvoiceDb) -> Vec<i64> {
        sqlx::query_scalar("SELECT ID_ITEM FROM nfs_itens ORDER BY ID_ITEM")
            .fetch_all(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions::default();
        db.load(&batch_for(&HEADER, &["K1"]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap();

        for entity in REGISTRY {
            db.ensure_schema(entity).await.unwrap();
        }
        assert_eq!(db.count_rows(HEADER.table).await.unwrap(), 1);
        assert!(db.table_exists(ITEM.table).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_leaves_only_new_batch() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions::default();

        db.load(&batch_for(&HEADER, &["K1", "K2", "K3"]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap();
        let inserted = db
            .load(&batch_for(&HEADER, &["K4"]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(keys(&db, HEADER.table).await, vec!["K4"]);
    }

    #[tokio::test]
    async fn test_values_are_stored_typed() {
        let (db, _tmp) = setup_test_db().await;
        db.load(&batch_for(&HEADER, &["K1"]), &HEADER, LoadMode::Replace, &LoadOptions::default())
            .await
            .unwrap();

        let (serie, valor): (i64, f64) =
            sqlx::query_as("SELECT SERIE, VALOR_NOTA_FISCAL FROM nfs_cabecalho")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(serie, 1);
        assert_eq!(valor, 10.5);
    }

    #[tokio::test]
    async fn test_append_after_clear_never_reuses_keys() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions::default();

        let batch = batch_for(&ITEM, &["K1", "K1"]);
        db.load(&batch, &ITEM, LoadMode::AppendAfterClear, &options)
            .await
            .unwrap();
        assert_eq!(item_ids(&db).await, vec![1, 2]);

        db.load(&batch, &ITEM, LoadMode::AppendAfterClear, &options)
            .await
            .unwrap();
        assert_eq!(item_ids(&db).await, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_replace_restarts_sequence() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions::default();

        let batch = batch_for(&ITEM, &["K1", "K2"]);
        db.load(&batch, &ITEM, LoadMode::AppendAfterClear, &options)
            .await
            .unwrap();
        db.load(&batch, &ITEM, LoadMode::Replace, &options)
            .await
            .unwrap();
        assert_eq!(item_ids(&db).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_load_rolls_back() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions::default();
        db.load(&batch_for(&HEADER, &["K1"]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap();

        let err = db
            .load(&batch_for(&HEADER, &["K2", "K2"]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap_err();

        assert_eq!(err.table, HEADER.table);
        assert_eq!(keys(&db, HEADER.table).await, vec!["K1"]);
    }

    #[tokio::test]
    async fn test_inserts_are_chunked() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions {
            batch_rows: 2,
            show_progress: false,
        };
        let inserted = db
            .load(
                &batch_for(&HEADER, &["A", "B", "C", "D", "E"]),
                &HEADER,
                LoadMode::Replace,
                &options,
            )
            .await
            .unwrap();

        assert_eq!(inserted, 5);
        assert_eq!(db.count_rows(HEADER.table).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_empty_batch_clears_table() {
        let (db, _tmp) = setup_test_db().await;
        let options = LoadOptions::default();
        db.load(&batch_for(&HEADER, &["K1"]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap();
        db.load(&batch_for(&HEADER, &[]), &HEADER, LoadMode::Replace, &options)
            .await
            .unwrap();
        assert_eq!(db.count_rows(HEADER.table).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_table() {
        let (db, _tmp) = setup_test_db().await;
        db.load(
            &batch_for(&ITEM, &["K1", "K2"]),
            &ITEM,
            LoadMode::AppendAfterClear,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(db.clear_table(&ITEM).await.unwrap(), 2);
        assert_eq!(db.count_rows(ITEM.table).await.unwrap(), 0);
    }

    #[test]
    fn test_rows_per_statement_respects_parameter_limit() {
        let options = LoadOptions {
            batch_rows: 10_000,
            show_progress: false,
        };
        assert_eq!(options.rows_per_statement(10), 3_276);
        assert_eq!(options.rows_per_statement(1), 10_000);
        let tiny = LoadOptions {
            batch_rows: 0,
            show_progress: false,
        };
        assert_eq!(tiny.rows_per_statement(10), 1);
    }
}
