//! Flexible CSV reader
//!
//! Exports come either comma- or semicolon-delimited. The reader tries a
//! comma first and falls back to a semicolon only when the comma attempt
//! fails outright; no other delimiters are considered. A row with more fields
//! than the header fails the attempt, a shorter one is padded with empty cells.

use crate::error::{Error, MalformedInputError, ReadError};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Delimiters the reader will try, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Semicolon,
}

impl Delimiter {
    pub const CANDIDATES: [Delimiter; 2] = [Delimiter::Comma, Delimiter::Semicolon];

    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.as_byte() as char)
    }
}

/// Text encoding of the source files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SourceEncoding {
    /// Strict UTF-8; invalid bytes fail the parse attempt
    #[default]
    Utf8,
    /// Windows-1252 (Latin-1 superset), as written by older spreadsheet exports
    Windows1252,
}

impl SourceEncoding {
    fn decode(self, bytes: &[u8]) -> std::result::Result<String, String> {
        match self {
            SourceEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| format!("invalid UTF-8: {}", e)),
            SourceEncoding::Windows1252 => Ok(encoding_rs::WINDOWS_1252
                .decode_without_bom_handling(bytes)
                .0
                .into_owned()),
        }
    }
}

impl FromStr for SourceEncoding {
    type Err = Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(SourceEncoding::Utf8),
            "windows-1252" | "cp1252" | "latin1" | "iso-8859-1" => Ok(SourceEncoding::Windows1252),
            _ => Err(Error::Config(format!("Unsupported source encoding: {}", s))),
        }
    }
}

/// A delimited file as read, before any type coercion.
///
/// Column names are kept exactly as they appear in the file (only a leading
/// byte-order mark is dropped); every row has one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub delimiter: Delimiter,
}

impl RawRecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything that can produce a raw batch from a path
pub trait RecordSource {
    fn read(&self, path: &Path) -> std::result::Result<RawRecordBatch, ReadError>;
}

/// Comma-then-semicolon CSV reader
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleCsvReader {
    encoding: SourceEncoding,
}

impl FlexibleCsvReader {
    pub fn new(encoding: SourceEncoding) -> Self {
        Self { encoding }
    }

    /// One parse attempt with a fixed delimiter. Errors are flattened to
    /// messages since they only ever end up in a [`MalformedInputError`].
    fn read_with(
        &self,
        path: &Path,
        delimiter: Delimiter,
    ) -> std::result::Result<RawRecordBatch, String> {
        let file = File::open(path).map_err(|e| e.to_string())?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let header = reader.byte_headers().map_err(|e| e.to_string())?.clone();
        let mut columns = Vec::with_capacity(header.len());
        for (idx, field) in header.iter().enumerate() {
            let field = if idx == 0 {
                field.strip_prefix(UTF8_BOM).unwrap_or(field)
            } else {
                field
            };
            columns.push(
                self.encoding
                    .decode(field)
                    .map_err(|e| format!("header: {}", e))?,
            );
        }

        if columns.iter().all(|c| c.trim().is_empty()) {
            return Err("no header row".to_string());
        }

        let mut rows = Vec::new();
        let mut record = csv::ByteRecord::new();
        while reader
            .read_byte_record(&mut record)
            .map_err(|e| e.to_string())?
        {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            // Short rows lost trailing empty cells; long rows mean a wrong delimiter
            if record.len() > columns.len() {
                return Err(format!(
                    "line {}: found record with {} fields, but the header has {}",
                    line,
                    record.len(),
                    columns.len()
                ));
            }
            let mut row = record
                .iter()
                .map(|field| self.encoding.decode(field))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| format!("line {}: {}", line, e))?;
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        Ok(RawRecordBatch {
            columns,
            rows,
            delimiter,
        })
    }
}

impl RecordSource for FlexibleCsvReader {
    fn read(&self, path: &Path) -> std::result::Result<RawRecordBatch, ReadError> {
        // A missing or unreadable file is not a delimiter problem
        File::open(path).map_err(|source| ReadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut failures = Vec::with_capacity(Delimiter::CANDIDATES.len());
        for delimiter in Delimiter::CANDIDATES {
            match self.read_with(path, delimiter) {
                Ok(batch) => {
                    info!(
                        path = %path.display(),
                        delimiter = %delimiter,
                        columns = batch.columns.len(),
                        rows = batch.len(),
                        "Read CSV"
                    );
                    return Ok(batch);
                }
                Err(message) => {
                    warn!(
                        path = %path.display(),
                        delimiter = %delimiter,
                        "CSV parse failed: {}",
                        message
                    );
                    failures.push(message);
                }
            }
        }

        debug!(path = %path.display(), "No candidate delimiter could parse the file");
        let mut failures = failures.into_iter();
        Err(MalformedInputError {
            path: path.to_path_buf(),
            comma: failures.next().unwrap_or_default(),
            semicolon: failures.next().unwrap_or_default(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn test_comma_file_reads_on_first_attempt() {
        let file = create_temp_csv(b"CHAVE DE ACESSO,MODELO,VALOR NOTA FISCAL\nK1,55,10.50\nK2,55,3\n");
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();

        assert_eq!(batch.delimiter, Delimiter::Comma);
        assert_eq!(batch.columns, vec!["CHAVE DE ACESSO", "MODELO", "VALOR NOTA FISCAL"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows[0], vec!["K1", "55", "10.50"]);
    }

    #[test]
    fn test_semicolon_file_falls_back() {
        // Decimal commas make the comma split ragged
        let file = create_temp_csv("CHAVE DE ACESSO;SÉRIE;VALOR NOTA FISCAL\nK1;1;10,50\nK2;1;1.234,00\n".as_bytes());
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();

        assert_eq!(batch.delimiter, Delimiter::Semicolon);
        assert_eq!(batch.columns, vec!["CHAVE DE ACESSO", "SÉRIE", "VALOR NOTA FISCAL"]);
        assert_eq!(batch.rows[1], vec!["K2", "1", "1.234,00"]);
    }

    #[test]
    fn test_short_comma_row_is_padded() {
        // Trailing empty cell dropped by the exporter
        let file = create_temp_csv(b"CHAVE DE ACESSO,MODELO,VALOR NOTA FISCAL\nK1,55,10.5\nK2,55\n");
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();

        assert_eq!(batch.delimiter, Delimiter::Comma);
        assert_eq!(batch.columns.len(), 3);
        assert_eq!(batch.rows[0], vec!["K1", "55", "10.5"]);
        assert_eq!(batch.rows[1], vec!["K2", "55", ""]);
    }

    #[test]
    fn test_row_longer_than_header_triggers_fallback() {
        // Only the second row carries a decimal comma
        let file = create_temp_csv(b"CHAVE DE ACESSO;VALOR NOTA FISCAL\nK1;10\nK2;2,5\n");
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();

        assert_eq!(batch.delimiter, Delimiter::Semicolon);
        assert_eq!(batch.columns, vec!["CHAVE DE ACESSO", "VALOR NOTA FISCAL"]);
        assert_eq!(batch.rows[1], vec!["K2", "2,5"]);
    }

    #[test]
    fn test_semicolon_file_without_commas_reads_as_single_column() {
        // Not a parse failure, so no fallback: the schema check rejects it later
        let file = create_temp_csv(b"A;B\n1;2\n");
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();

        assert_eq!(batch.delimiter, Delimiter::Comma);
        assert_eq!(batch.columns, vec!["A;B"]);
    }

    #[test]
    fn test_binary_garbage_reports_both_attempts() {
        let file = create_temp_csv(&[0xFF, 0xFE, 0x00, 0x81, b',', 0xC3, b';', 0x28, b'\n', 0x9F, 0x92]);
        let err = FlexibleCsvReader::default().read(file.path()).unwrap_err();

        match err {
            ReadError::Malformed(e) => {
                assert!(e.comma.contains("UTF-8"), "comma: {}", e.comma);
                assert!(e.semicolon.contains("UTF-8"), "semicolon: {}", e.semicolon);
                assert_eq!(e.path, file.path());
            }
            other => panic!("expected malformed input, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_file_is_malformed() {
        let file = create_temp_csv(b"");
        let err = FlexibleCsvReader::default().read(file.path()).unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FlexibleCsvReader::default()
            .read(&dir.path().join("absent.csv"))
            .unwrap_err();
        assert!(matches!(err, ReadError::Unreadable { .. }));
    }

    #[test]
    fn test_bom_is_stripped_but_names_are_untrimmed() {
        let file = create_temp_csv(b"\xEF\xBB\xBF CHAVE DE ACESSO ,UF\nK1,SP\n");
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();
        assert_eq!(batch.columns, vec![" CHAVE DE ACESSO ", "UF"]);
    }

    #[test]
    fn test_quoted_delimiters_survive() {
        let file = create_temp_csv(b"DESCRICAO,UNIDADE\n\"PARAFUSO, 3/8\",UN\n");
        let batch = FlexibleCsvReader::default().read(file.path()).unwrap();
        assert_eq!(batch.rows[0], vec!["PARAFUSO, 3/8", "UN"]);
    }

    #[test]
    fn test_windows_1252_decoding() {
        // "SÉRIE" with É as 0xC9
        let file = create_temp_csv(b"S\xC9RIE;VALOR\n1;2,5\n");
        let strict = FlexibleCsvReader::default().read(file.path());
        assert!(matches!(strict, Err(ReadError::Malformed(_))));

        let latin = FlexibleCsvReader::new(SourceEncoding::Windows1252)
            .read(file.path())
            .unwrap();
        assert_eq!(latin.columns, vec!["SÉRIE", "VALOR"]);
        assert_eq!(latin.delimiter, Delimiter::Semicolon);
        assert_eq!(latin.rows[0], vec!["1", "2,5"]);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("UTF-8".parse::<SourceEncoding>().unwrap(), SourceEncoding::Utf8);
        assert_eq!(
            "latin1".parse::<SourceEncoding>().unwrap(),
            SourceEncoding::Windows1252
        );
        assert!("utf-16".parse::<SourceEncoding>().is_err());
    }
}
