//! Status and schema command implementations

use crate::config::Config;
use crate::error::Result;
use crate::store::{InvoiceDb, TableStats};
use serde::Serialize;
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    /// Config file and database file exist and every table is present
    pub initialized: bool,
    pub tables: Vec<TableStats>,
}

/// Live schema description
#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub schema: String,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &InvoiceDb) -> Result<StatusInfo> {
    info!("Getting status");

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        initialized: config.is_initialized() && db.is_initialized().await?,
        tables: db.table_stats().await?,
    })
}

/// Describe the tables as they exist in the database right now
pub async fn cmd_schema(db: &InvoiceDb) -> Result<SchemaInfo> {
    Ok(SchemaInfo {
        schema: db.describe_schema().await?,
    })
}

pub fn print_status(status: &StatusInfo) {
    println!("\n📊 notas Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("\nTables:");
    for table in &status.tables {
        if table.exists {
            println!("  {}: {} rows", table.table, table.rows);
        } else {
            println!("  {}: (missing)", table.table);
        }
    }
    if !status.initialized {
        println!("\nNot fully initialized. Run 'notas init' to create the config and tables.");
    }
}

pub fn print_schema(info: &SchemaInfo) {
    if info.schema.is_empty() {
        println!("No tables yet.");
    } else {
        println!("{}", info.schema);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_and_schema() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        let db = InvoiceDb::connect(&config).await.unwrap();

        let status = cmd_status(&config, &db).await.unwrap();
        assert!(!status.initialized);
        assert!(cmd_schema(&db).await.unwrap().schema.is_empty());

        // Tables alone are not enough without a config file
        db.init_schema().await.unwrap();
        assert!(!cmd_status(&config, &db).await.unwrap().initialized);

        config.save().unwrap();
        let status = cmd_status(&config, &db).await.unwrap();
        assert!(status.initialized);
        assert_eq!(status.tables[0].table, "nfs_cabecalho");
        assert_eq!(status.tables[1].rows, 0);
        assert!(cmd_schema(&db).await.unwrap().schema.contains("nfs_itens"));
    }
}
