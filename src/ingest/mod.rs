//! Ingestion pipeline: read, normalize and load the two invoice exports
//!
//! [`Ingestor::ingest`] runs the steps strictly in order:
//!
//! 1. ensure both tables exist
//! 2. read, normalize and load headers (Replace)
//! 3. read, normalize and load items (AppendAfterClear)
//!
//! A failed step stops the run. A header failure happens before the item file
//! is opened. An item failure leaves the new headers in place and the item
//! table empty.

mod normalize;
mod reader;

pub use normalize::*;
pub use reader::*;

use crate::config::IngestConfig;
use crate::error::{IngestState, IngestStep, IngestionError, ReadError, Result, StepFailure};
use crate::schema::{EntityDescriptor, EntityKind, CHAVE_DE_ACESSO, HEADER, ITEM, REGISTRY};
use crate::store::{InvoiceDb, LoadOptions};
use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Construction-time settings for an [`Ingestor`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    pub encoding: SourceEncoding,
    pub load: LoadOptions,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self {
            encoding: config.source_encoding()?,
            load: LoadOptions::from(config),
        })
    }
}

/// What was loaded into one table
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub entity: EntityKind,
    pub table: &'static str,
    pub source: PathBuf,
    /// BLAKE3 of the source file, hex
    pub checksum: String,
    pub delimiter: Delimiter,
    pub rows: u64,
    pub warnings: Vec<CoercionWarning>,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub header: TableReport,
    pub items: TableReport,
    /// Items whose access key is not among the loaded headers
    pub orphan_items: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl IngestReport {
    pub fn warning_count(&self) -> usize {
        self.header.warnings.len() + self.items.warnings.len()
    }
}

/// A source file read and normalized, ready to load
struct Staged {
    batch: NormalizedRecordBatch,
    delimiter: Delimiter,
    checksum: String,
}

/// Drives one ingestion run against a caller-owned store
pub struct Ingestor<'a, S: RecordSource = FlexibleCsvReader> {
    db: &'a InvoiceDb,
    source: S,
    load: LoadOptions,
}

impl<'a> Ingestor<'a, FlexibleCsvReader> {
    pub fn new(db: &'a InvoiceDb, options: IngestOptions) -> Self {
        Self::with_source(db, FlexibleCsvReader::new(options.encoding), options.load)
    }
}

impl<'a, S: RecordSource> Ingestor<'a, S> {
    pub fn with_source(db: &'a InvoiceDb, source: S, load: LoadOptions) -> Self {
        Self { db, source, load }
    }

    pub async fn ingest(
        &self,
        header_path: &Path,
        item_path: &Path,
    ) -> std::result::Result<IngestReport, IngestionError> {
        let started_at = Utc::now();
        info!(
            header = %header_path.display(),
            items = %item_path.display(),
            "Starting ingestion"
        );

        // Step 1
        for entity in REGISTRY {
            self.db
                .ensure_schema(entity)
                .await
                .map_err(|e| failure(IngestStep::EnsureSchema, IngestState::Started, None, e.into()))?;
        }
        debug!(state = %IngestState::SchemaEnsured, "Schema ensured");

        // Step 2
        let (header, header_rows) = self
            .load_entity(&HEADER, header_path)
            .await
            .map_err(|cause| {
                failure(
                    IngestStep::LoadHeaders,
                    IngestState::SchemaEnsured,
                    Some(header_path),
                    cause,
                )
            })?;
        debug!(state = %IngestState::HeaderLoaded, rows = header_rows, "Headers loaded");

        // Step 3
        let (items, item_rows) = match self.load_entity(&ITEM, item_path).await {
            Ok(loaded) => loaded,
            Err(cause) => {
                // Old items must not survive against the new header set
                match self.db.clear_table(&ITEM).await {
                    Ok(_) => warn!(table = ITEM.table, "Item table cleared after failed load"),
                    Err(e) => error!(table = ITEM.table, "Could not clear item table: {}", e),
                }
                return Err(failure(
                    IngestStep::LoadItems,
                    IngestState::HeaderLoaded,
                    Some(item_path),
                    cause,
                ));
            }
        };
        debug!(state = %IngestState::ItemsLoaded, rows = item_rows, "Items loaded");

        let header_keys = header.batch.text_keys(CHAVE_DE_ACESSO);
        let orphan_items = items.batch.count_unmatched(CHAVE_DE_ACESSO, &header_keys);
        if orphan_items > 0 {
            warn!(
                orphans = orphan_items,
                "Items reference access keys missing from the header file"
            );
        }

        let report = IngestReport {
            header: table_report(&HEADER, header_path, header, header_rows),
            items: table_report(&ITEM, item_path, items, item_rows),
            orphan_items,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            state = %IngestState::Complete,
            headers = report.header.rows,
            items = report.items.rows,
            warnings = report.warning_count(),
            "Ingestion complete"
        );
        Ok(report)
    }

    async fn load_entity(
        &self,
        entity: &'static EntityDescriptor,
        path: &Path,
    ) -> std::result::Result<(Staged, u64), StepFailure> {
        let staged = self.stage(entity, path)?;
        let rows = self
            .db
            .load(&staged.batch, entity, entity.load_mode, &self.load)
            .await?;
        Ok((staged, rows))
    }

    fn stage(
        &self,
        entity: &'static EntityDescriptor,
        path: &Path,
    ) -> std::result::Result<Staged, StepFailure> {
        let raw = self.source.read(path)?;
        let checksum = file_checksum(path).map_err(|source| ReadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let batch = normalize(&raw, entity)?;

        if !batch.warnings.is_empty() {
            warn!(
                table = entity.table,
                count = batch.warnings.len(),
                "Values could not be coerced and were stored as NULL"
            );
            for w in batch.warnings.iter().take(5) {
                debug!(row = w.row, column = w.column, raw = %w.raw, "Coercion failed");
            }
        }

        Ok(Staged {
            batch,
            delimiter: raw.delimiter,
            checksum,
        })
    }
}

fn failure(
    step: IngestStep,
    reached: IngestState,
    file: Option<&Path>,
    cause: StepFailure,
) -> IngestionError {
    let err = IngestionError {
        step,
        reached,
        file: file.map(Path::to_path_buf),
        cause,
    };
    error!("{}", err);
    err
}

fn table_report(
    entity: &'static EntityDescriptor,
    path: &Path,
    staged: Staged,
    rows: u64,
) -> TableReport {
    TableReport {
        entity: entity.kind,
        table: entity.table,
        source: path.to_path_buf(),
        checksum: staged.checksum,
        delimiter: staged.delimiter,
        rows,
        warnings: staged.batch.warnings,
    }
}

/// BLAKE3 of a file's bytes, hex encoded
pub fn file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
