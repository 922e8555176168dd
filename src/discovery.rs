//! Locating the header and item exports inside a directory
//!
//! Exports are recognized by filename suffix alone (case-insensitive), e.g.
//! `202401_NFs_Cabecalho.csv` and `202401_NFs_Itens.csv`. Exactly one file per
//! entity must match.

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Filename suffixes identifying each export
#[derive(Debug, Clone)]
pub struct SourceConventions {
    pub header_suffix: String,
    pub item_suffix: String,
}

impl From<&IngestConfig> for SourceConventions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            header_suffix: config.header_suffix.clone(),
            item_suffix: config.item_suffix.clone(),
        }
    }
}

/// The two files of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePair {
    pub header: PathBuf,
    pub items: PathBuf,
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase().ends_with(&suffix.to_lowercase()))
        .unwrap_or(false)
}

/// Find the header and item exports under `dir`
pub fn discover_sources(dir: &Path, conventions: &SourceConventions) -> Result<SourcePair> {
    if !dir.is_dir() {
        return Err(Error::Discovery(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut headers = Vec::new();
    let mut items = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if has_suffix(path, &conventions.header_suffix) {
            headers.push(path.to_path_buf());
        } else if has_suffix(path, &conventions.item_suffix) {
            items.push(path.to_path_buf());
        }
    }

    debug!(
        headers = headers.len(),
        items = items.len(),
        "Scanned {}",
        dir.display()
    );

    let pair = SourcePair {
        header: single(headers, &conventions.header_suffix, dir)?,
        items: single(items, &conventions.item_suffix, dir)?,
    };
    info!(
        header = %pair.header.display(),
        items = %pair.items.display(),
        "Discovered source files"
    );
    Ok(pair)
}

fn single(mut found: Vec<PathBuf>, suffix: &str, dir: &Path) -> Result<PathBuf> {
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::Discovery(format!(
            "no file ending in {} under {}",
            suffix,
            dir.display()
        ))),
        n => Err(Error::Discovery(format!(
            "{} files ending in {} under {}: {}",
            n,
            suffix,
            dir.display(),
            found
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
