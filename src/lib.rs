//! notas - invoice CSV exports into a queryable SQLite database
//!
//! This crate provides:
//! - A static schema registry for invoice headers (`nfs_cabecalho`) and items (`nfs_itens`)
//! - A comma/semicolon tolerant CSV reader with column-name normalization and type coercion
//! - Transactional table loads with an ordered, all-or-nothing ingestion pipeline
//! - CLI commands for ingesting, inspecting and querying the database

pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ingest;
pub mod progress;
pub mod schema;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
