//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::InvoiceDb;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Where `init` put things
#[derive(Debug, Clone, Serialize)]
pub struct InitInfo {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

/// Write a default config and create the database with both tables.
///
/// An existing database is kept; its tables are only created if missing.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitInfo> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.config_file.display().to_string(),
        ));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.save()?;

    let db = InvoiceDb::connect(&config).await?;
    db.init_schema().await?;
    db.close().await;

    info!("Initialized notas at {:?}", config.paths.base_dir);
    Ok(InitInfo {
        base_dir: config.paths.base_dir.clone(),
        config_path: config.paths.config_file.clone(),
        db_path: config.paths.db_file.clone(),
    })
}

pub fn print_init_info(info: &InitInfo) {
    println!("✓ Initialized notas at {}", info.base_dir.display());
    println!("\nConfiguration: {}", info.config_path.display());
    println!("Database: {}", info.db_path.display());
    println!("\nNext steps:");
    println!("  notas ingest header_nfs_cabecalho.csv items_nfs_itens.csv");
    println!("  notas ingest --dir ./exports");
    println!("  notas query \"SELECT UF_EMITENTE, SUM(VALOR_NOTA_FISCAL) FROM nfs_cabecalho GROUP BY 1\"");
}
