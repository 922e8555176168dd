//! Ingest command implementation

use crate::config::Config;
use crate::discovery::{discover_sources, SourceConventions, SourcePair};
use crate::error::Result;
use crate::ingest::{IngestOptions, IngestReport, Ingestor, SourceEncoding, TableReport};
use crate::store::InvoiceDb;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where the two exports come from
#[derive(Debug, Clone)]
pub enum IngestInput {
    /// Paths labeled by the caller
    Files { header: PathBuf, items: PathBuf },
    /// A directory searched by filename convention
    Dir(PathBuf),
}

impl IngestInput {
    fn resolve(self, config: &Config) -> Result<SourcePair> {
        match self {
            IngestInput::Files { header, items } => Ok(SourcePair { header, items }),
            IngestInput::Dir(dir) => {
                discover_sources(&dir, &SourceConventions::from(&config.ingest))
            }
        }
    }
}

/// Load a header/item pair into the database
pub async fn cmd_ingest(config: &Config, db: &InvoiceDb, input: IngestInput) -> Result<IngestReport> {
    let sources = input.resolve(config)?;
    info!(
        "Ingesting {} and {}",
        sources.header.display(),
        sources.items.display()
    );

    let options = IngestOptions::from_config(&config.ingest)?;
    let report = Ingestor::new(db, options)
        .ingest(&sources.header, &sources.items)
        .await
        .inspect_err(|e| {
            if e.is_malformed_input() && options.encoding == SourceEncoding::Utf8 {
                warn!("If the export is not UTF-8, set ingest.encoding = \"windows-1252\"");
            }
        })?;
    Ok(report)
}

fn print_table_report(label: &str, table: &TableReport) {
    println!("  {} ({})", label, table.table);
    println!("    Source: {}", table.source.display());
    println!("    Delimiter: {}", table.delimiter);
    println!("    Rows loaded: {}", table.rows);
    println!("    BLAKE3: {}", table.checksum);
    if !table.warnings.is_empty() {
        println!("    Values stored as NULL: {}", table.warnings.len());
        for w in table.warnings.iter().take(5) {
            println!(
                "      row {} {}: {:?} is not {}",
                w.row, w.column, w.raw, w.expected
            );
        }
        if table.warnings.len() > 5 {
            println!("      ...");
        }
    }
}

pub fn print_ingest_report(report: &IngestReport) {
    println!("\n✓ Ingestion complete");
    print_table_report("Headers", &report.header);
    print_table_report("Items", &report.items);
    if report.orphan_items > 0 {
        println!(
            "  ⚠️  {} items reference access keys missing from the header file",
            report.orphan_items
        );
    }
    let elapsed = report.completed_at - report.started_at;
    println!("  Took {} ms", elapsed.num_milliseconds());
}
