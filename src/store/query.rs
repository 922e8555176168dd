//! Verbatim read queries with dynamically typed results

use super::InvoiceDb;
use crate::error::{Error, Result};
use futures::TryStreamExt;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

/// One result cell, typed by its SQLite storage class
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Rows returned by [`InvoiceDb::run_query`]
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// More rows were available than the limit allowed
    pub truncated: bool,
}

impl InvoiceDb {
    /// Run `sql` exactly as given and collect at most `limit` rows.
    pub async fn run_query(&self, sql: &str, limit: usize) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(Error::Query("empty query".to_string()));
        }

        let statement = self.pool().prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut truncated = false;
        let mut stream = statement.query().fetch(self.pool());
        while let Some(row) = stream.try_next().await? {
            if rows.len() == limit {
                truncated = true;
                break;
            }
            rows.push(decode_row(&row)?);
        }

        debug!(rows = rows.len(), truncated, "Query finished");
        Ok(QueryResult {
            columns,
            rows,
            truncated,
        })
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Cell>> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn decode_cell(row: &SqliteRow, idx: usize) -> Result<Cell> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }

    let cell = match raw.type_info().name() {
        "INTEGER" | "BOOLEAN" => Cell::Integer(row.try_get(idx)?),
        "REAL" => Cell::Real(row.try_get(idx)?),
        "BLOB" => Cell::Blob(row.try_get(idx)?),
        _ => Cell::Text(row.try_get(idx)?),
    };
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (InvoiceDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = InvoiceDb::open(&tmp.path().join("test.db")).await.unwrap();
        db.init_schema().await.unwrap();
        sqlx::query(
            "INSERT INTO nfs_cabecalho (CHAVE_DE_ACESSO, SERIE, VALOR_NOTA_FISCAL, MODELO) VALUES \
             ('K1', 1, 10.5, '55'), ('K2', NULL, 2.25, NULL), ('K3', 3, NULL, '65')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_cells_follow_storage_class() {
        let (db, _tmp) = setup_test_db().await;
        let result = db
            .run_query(
                "SELECT CHAVE_DE_ACESSO, SERIE, VALOR_NOTA_FISCAL, X'00FF' AS raw \
                 FROM nfs_cabecalho ORDER BY CHAVE_DE_ACESSO",
                10,
            )
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["CHAVE_DE_ACESSO", "SERIE", "VALOR_NOTA_FISCAL", "raw"]);
        assert_eq!(result.rows.len(), 3);
        assert!(!result.truncated);
        assert_eq!(
            result.rows[0],
            vec![
                Cell::Text("K1".to_string()),
                Cell::Integer(1),
                Cell::Real(10.5),
                Cell::Blob(vec![0x00, 0xFF]),
            ]
        );
        assert_eq!(result.rows[1][1], Cell::Null);
        assert_eq!(result.rows[2][2], Cell::Null);
    }

    #[tokio::test]
    async fn test_limit_marks_truncation() {
        let (db, _tmp) = setup_test_db().await;
        let result = db
            .run_query("SELECT CHAVE_DE_ACESSO FROM nfs_cabecalho", 2)
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let (db, _tmp) = setup_test_db().await;
        let result = db
            .run_query("SELECT MODELO, NUMERO FROM nfs_cabecalho WHERE 0", 10)
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["MODELO", "NUMERO"]);
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_bad_sql_is_an_error() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.run_query("SELECT * FROM missing_table", 10).await.is_err());
        assert!(matches!(db.run_query("   ", 10).await, Err(Error::Query(_))));
    }

    #[test]
    fn test_cells_serialize_as_plain_json() {
        let json = serde_json::to_string(&vec![
            Cell::Null,
            Cell::Integer(5),
            Cell::Real(1.5),
            Cell::Text("a".to_string()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,5,1.5,"a"]"#);
    }
}
