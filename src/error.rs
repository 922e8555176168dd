//! Error types for notas
//!
//! The ingestion pipeline has its own taxonomy (malformed input, schema
//! mismatch, load failure) wrapped by [`IngestionError`], which names the
//! step that failed. Everything else funnels into [`Error`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for notas operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("Source discovery failed: {0}")]
    Discovery(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not initialized: run 'notas init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),
}

/// Result type alias for notas
pub type Result<T> = std::result::Result<T, Error>;

/// A source file could not be parsed as delimited text with either candidate
/// delimiter.
#[derive(Error, Debug)]
#[error(
    "{} is not valid delimited text: with ',' -> {comma}; with ';' -> {semicolon}",
    .path.display()
)]
pub struct MalformedInputError {
    pub path: PathBuf,
    pub comma: String,
    pub semicolon: String,
}

/// Failure to read a source file at all.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("cannot open {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Malformed(#[from] MalformedInputError),
}

/// The source columns of a file do not line up with the entity descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatchError {
    #[error("{table}: required columns missing from source: {}", .missing.join(", "))]
    MissingColumns {
        table: &'static str,
        missing: Vec<&'static str>,
        found: Vec<String>,
    },

    #[error("{table}: column {column} matched by several source columns: {}", .sources.join(", "))]
    AmbiguousColumn {
        table: &'static str,
        column: &'static str,
        sources: Vec<String>,
    },
}

/// A transactional write into the store failed and was rolled back.
#[derive(Error, Debug)]
#[error("load into {table} failed: {source}")]
pub struct LoadFailure {
    pub table: &'static str,
    #[source]
    pub source: sqlx::Error,
}

impl LoadFailure {
    pub fn new(table: &'static str, source: sqlx::Error) -> Self {
        Self { table, source }
    }
}

/// Step of an ingestion run that was being attempted when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    EnsureSchema,
    LoadHeaders,
    LoadItems,
}

impl fmt::Display for IngestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStep::EnsureSchema => write!(f, "ensure_schema"),
            IngestStep::LoadHeaders => write!(f, "load_headers"),
            IngestStep::LoadItems => write!(f, "load_items"),
        }
    }
}

/// Progress of an ingestion run. Advances strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestState {
    Started,
    SchemaEnsured,
    HeaderLoaded,
    ItemsLoaded,
    Complete,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestState::Started => write!(f, "started"),
            IngestState::SchemaEnsured => write!(f, "schema_ensured"),
            IngestState::HeaderLoaded => write!(f, "header_loaded"),
            IngestState::ItemsLoaded => write!(f, "items_loaded"),
            IngestState::Complete => write!(f, "complete"),
        }
    }
}

/// Underlying cause of a failed ingestion step.
#[derive(Error, Debug)]
pub enum StepFailure {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error(transparent)]
    Load(#[from] LoadFailure),
}

/// Umbrella failure of an ingestion run.
#[derive(Error, Debug)]
#[error("ingestion failed at step {step} (reached {reached}){}: {cause}", file_suffix(.file))]
pub struct IngestionError {
    pub step: IngestStep,
    pub reached: IngestState,
    pub file: Option<PathBuf>,
    #[source]
    pub cause: StepFailure,
}

fn file_suffix(file: &Option<PathBuf>) -> String {
    file.as_ref()
        .map(|p| format!(" [{}]", p.display()))
        .unwrap_or_default()
}

impl IngestionError {
    /// True when the source file could not be parsed with either delimiter.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self.cause, StepFailure::Read(ReadError::Malformed(_)))
    }
}
