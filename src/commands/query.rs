//! Query command implementation

use crate::config::Config;
use crate::error::Result;
use crate::store::{Cell, InvoiceDb, QueryResult};
use tracing::info;

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Maximum rows to return (defaults to `query.max_rows`)
    pub limit: Option<usize>,
}

/// Execute a query exactly as written
pub async fn cmd_query(
    config: &Config,
    db: &InvoiceDb,
    sql: &str,
    options: QueryOptions,
) -> Result<QueryResult> {
    info!("Querying: {}", sql);
    let limit = options.limit.unwrap_or(config.query.max_rows);
    db.run_query(sql, limit).await
}

/// Format a number the way Brazilian reports do: `1.234` and `1.234,56`
pub fn format_brazilian_number(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Integer(i) => Some(group_thousands(*i < 0, &i.unsigned_abs().to_string())),
        Cell::Real(r) => {
            let fixed = format!("{:.2}", r.abs());
            let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
            let negative = *r < 0.0 && fixed != "0.00";
            Some(format!("{},{}", group_thousands(negative, int_part), frac_part))
        }
        _ => None,
    }
}

fn group_thousands(negative: bool, digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if negative {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

fn format_cell(cell: &Cell, brazilian: bool) -> String {
    if brazilian {
        if let Some(formatted) = format_brazilian_number(cell) {
            return formatted;
        }
    }
    match cell {
        Cell::Null => "NULL".to_string(),
        Cell::Integer(i) => i.to_string(),
        Cell::Real(r) => r.to_string(),
        Cell::Text(s) => s.replace('\n', " "),
        Cell::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Render a result as an aligned text table
pub fn render_table(result: &QueryResult, brazilian: bool) -> String {
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|c| format_cell(c, brazilian)).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    // Numbers right-aligned, everything else left-aligned
    let numeric: Vec<bool> = (0..result.columns.len())
        .map(|i| {
            result
                .rows
                .iter()
                .filter_map(|r| r.get(i))
                .filter(|c| !matches!(c, Cell::Null))
                .all(|c| matches!(c, Cell::Integer(_) | Cell::Real(_)))
        })
        .collect();

    let pad = |text: &str, i: usize| {
        let fill = widths[i].saturating_sub(text.chars().count());
        if numeric[i] {
            format!("{}{}", " ".repeat(fill), text)
        } else {
            format!("{}{}", text, " ".repeat(fill))
        }
    };

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(
        result
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| pad(c, i))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &cells {
        lines.push(
            row.iter()
                .enumerate()
                .map(|(i, c)| pad(c, i))
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }

    lines
        .into_iter()
        .map(|l| l.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print query results to console
pub fn print_query_results(result: &QueryResult, brazilian: bool) {
    if result.columns.is_empty() {
        println!("Statement returned no columns.");
        return;
    }

    println!("{}", render_table(result, brazilian));
    println!();
    if result.truncated {
        println!(
            "{} rows shown (limit reached; use --limit to see more)",
            result.rows.len()
        );
    } else {
        println!("{} rows", result.rows.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> QueryResult {
        QueryResult {
            columns: vec!["UF".to_string(), "TOTAL".to_string()],
            rows: vec![
                vec![Cell::Text("SP".to_string()), Cell::Real(1234567.891)],
                vec![Cell::Text("RJ".to_string()), Cell::Null],
            ],
            truncated: false,
        }
    }

    #[test]
    fn test_brazilian_numbers() {
        assert_eq!(format_brazilian_number(&Cell::Integer(1234)).unwrap(), "1.234");
        assert_eq!(format_brazilian_number(&Cell::Integer(-1234567)).unwrap(), "-1.234.567");
        assert_eq!(format_brazilian_number(&Cell::Integer(12)).unwrap(), "12");
        assert_eq!(format_brazilian_number(&Cell::Real(1234.5)).unwrap(), "1.234,50");
        assert_eq!(format_brazilian_number(&Cell::Real(-0.5)).unwrap(), "-0,50");
        assert_eq!(format_brazilian_number(&Cell::Real(-0.001)).unwrap(), "0,00");
        assert!(format_brazilian_number(&Cell::Text("1".to_string())).is_none());
    }

    #[test]
    fn test_render_plain_table() {
        let table = render_table(&result(), false);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "UF |       TOTAL");
        assert_eq!(lines[1], "---+------------");
        assert_eq!(lines[2], "SP | 1234567.891");
        assert_eq!(lines[3], "RJ |        NULL");
    }

    #[test]
    fn test_render_brazilian_table() {
        let table = render_table(&result(), true);
        assert!(table.contains("SP | 1.234.567,89"));
    }

    #[test]
    fn test_render_blob_and_newlines() {
        let result = QueryResult {
            columns: vec!["a".to_string()],
            rows: vec![
                vec![Cell::Blob(vec![1, 2, 3])],
                vec![Cell::Text("x\ny".to_string())],
            ],
            truncated: true,
        };
        let table = render_table(&result, false);
        assert!(table.contains("<3 bytes>"));
        assert!(table.contains("x y"));
    }
}
