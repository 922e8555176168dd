//! Configuration management for notas
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! Everything the ingestion core needs is handed to it explicitly from here;
//! nothing reads process-wide state at ingestion time.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::ingest::SourceEncoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// CSV ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Query output settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file name, relative to the config directory (or absolute)
    #[serde(default = "default_db_file_name")]
    pub file_name: String,

    /// Seconds to wait on a locked database before failing
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Maximum pooled connections. SQLite has a single writer.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// CSV ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Rows per multi-row INSERT statement
    #[serde(default = "default_insert_batch_rows")]
    pub insert_batch_rows: usize,

    /// Text encoding of the source files ("utf-8" or "windows-1252")
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Show progress bars while loading tables
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,

    /// Filename suffix identifying the invoice header export
    #[serde(default = "default_header_suffix")]
    pub header_suffix: String,

    /// Filename suffix identifying the invoice item export
    #[serde(default = "default_item_suffix")]
    pub item_suffix: String,
}

/// Query output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum rows printed for a query
    #[serde(default = "default_query_max_rows")]
    pub max_rows: usize,

    /// Render numbers as 1.234,56 instead of 1234.56
    #[serde(default = "default_brazilian_numbers")]
    pub brazilian_numbers: bool,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for notas data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file_name: default_db_file_name(),
            busy_timeout_secs: default_busy_timeout_secs(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            insert_batch_rows: default_insert_batch_rows(),
            encoding: default_encoding(),
            show_progress: default_show_progress(),
            header_suffix: default_header_suffix(),
            item_suffix: default_item_suffix(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_rows: default_query_max_rows(),
            brazilian_numbers: default_brazilian_numbers(),
        }
    }
}

impl IngestConfig {
    /// Parse the configured encoding name
    pub fn source_encoding(&self) -> Result<SourceEncoding> {
        self.encoding.parse()
    }
}

impl Config {
    /// Get the default base directory for notas (~/.notas)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".notas")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join(&self.database.file_name),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Paths are relative to the config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join(&config.database.file_name),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if notas is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.file_name.trim().is_empty() {
            return Err(Error::Config(
                "database.file_name must not be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if self.ingest.insert_batch_rows == 0 {
            return Err(Error::Config(
                "ingest.insert_batch_rows must be at least 1".to_string(),
            ));
        }

        self.ingest.source_encoding()?;

        if self.ingest.header_suffix.is_empty() || self.ingest.item_suffix.is_empty() {
            return Err(Error::Config(
                "ingest.header_suffix and ingest.item_suffix must not be empty".to_string(),
            ));
        }

        if self
            .ingest
            .header_suffix
            .eq_ignore_ascii_case(&self.ingest.item_suffix)
        {
            return Err(Error::Config(
                "ingest.header_suffix and ingest.item_suffix must differ".to_string(),
            ));
        }

        if self.query.max_rows == 0 {
            return Err(Error::Config(
                "query.max_rows must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.encoding, "utf-8");
        assert_eq!(config.ingest.header_suffix, "_nfs_cabecalho.csv");
        assert_eq!(config.ingest.item_suffix, "_nfs_itens.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.ingest.insert_batch_rows = 42;
        config.query.brazilian_numbers = true;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.ingest.insert_batch_rows, 42);
        assert!(loaded.query.brazilian_numbers);
        assert_eq!(loaded.paths.base_dir, tmp.path());
        assert_eq!(
            loaded.paths.db_file,
            tmp.path().join(&loaded.database.file_name)
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[ingest]\nencoding = \"windows-1252\"\n").unwrap();
        assert_eq!(config.ingest.encoding, "windows-1252");
        assert_eq!(config.ingest.insert_batch_rows, default_insert_batch_rows());
        assert_eq!(config.query.max_rows, default_query_max_rows());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.ingest.insert_batch_rows = 0;
        assert!(config.validate().is_err());
        config.ingest.insert_batch_rows = 100;
        assert!(config.validate().is_ok());

        config.ingest.encoding = "ebcdic".to_string();
        assert!(config.validate().is_err());
        config.ingest.encoding = "latin1".to_string();
        assert!(config.validate().is_ok());

        config.ingest.item_suffix = config.ingest.header_suffix.to_uppercase();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let result = Config::load(&tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
