//! Default values for configuration

use crate::schema::{HEADER, ITEM};

/// Default SQLite database file name, placed next to the config file
pub fn default_db_file_name() -> String {
    std::env::var("NOTAS_DB_FILE").unwrap_or_else(|_| "notas_fiscais.db".to_string())
}

/// Default busy timeout for SQLite locks
pub fn default_busy_timeout_secs() -> u64 {
    5
}

/// Default maximum pool connections
pub fn default_max_connections() -> u32 {
    1
}

/// Default rows per INSERT statement
pub fn default_insert_batch_rows() -> usize {
    500
}

/// Default source file encoding
pub fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Default: show progress bars while loading
pub fn default_show_progress() -> bool {
    true
}

/// Default filename suffix of the invoice header export
pub fn default_header_suffix() -> String {
    HEADER.source_file.to_string()
}

/// Default filename suffix of the invoice item export
pub fn default_item_suffix() -> String {
    ITEM.source_file.to_string()
}

/// Default maximum rows printed by `notas query`
pub fn default_query_max_rows() -> usize {
    200
}

/// Default: format numbers the Brazilian way (1.234,56)
pub fn default_brazilian_numbers() -> bool {
    false
}
