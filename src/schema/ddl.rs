//! SQLite DDL generation from entity descriptors
//!
//! Pure string rendering; executing the statements is the materializer's job.

use super::{ColumnRole, ColumnSpec, EntityDescriptor};

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_definition(col: &ColumnSpec) -> String {
    let mut def = format!("{} {}", quote_ident(col.name), col.ty.sql_type());
    match col.role {
        ColumnRole::AutoIncrementKey => def.push_str(" PRIMARY KEY AUTOINCREMENT"),
        // SQLite lets non-INTEGER primary keys hold NULL unless told otherwise
        ColumnRole::PrimaryKey => def.push_str(" PRIMARY KEY NOT NULL"),
        ColumnRole::Data if col.not_null => def.push_str(" NOT NULL"),
        ColumnRole::Data => {}
    }
    def
}

/// `CREATE TABLE IF NOT EXISTS` statement for an entity
pub fn create_table_sql(entity: &EntityDescriptor) -> String {
    let mut defs: Vec<String> = entity.columns.iter().map(column_definition).collect();

    for fk in entity.foreign_keys {
        defs.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(fk.column),
            quote_ident(fk.references.descriptor().table),
            quote_ident(fk.references_column)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(entity.table),
        defs.join(",\n    ")
    )
}

/// `CREATE INDEX IF NOT EXISTS` statements for every foreign-key column
pub fn create_index_sql(entity: &EntityDescriptor) -> Vec<String> {
    entity
        .foreign_keys
        .iter()
        .map(|fk| {
            let index = format!("idx_{}_{}", entity.table, fk.column.to_lowercase());
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index),
                quote_ident(entity.table),
                quote_ident(fk.column)
            )
        })
        .collect()
}

/// All statements needed to create an entity's table and indexes, in order
pub fn schema_statements(entity: &EntityDescriptor) -> Vec<String> {
    let mut statements = vec![create_table_sql(entity)];
    statements.extend(create_index_sql(entity));
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{HEADER, ITEM};

    #[test]
    fn test_header_table_sql() {
        let sql = create_table_sql(&HEADER);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"nfs_cabecalho\" ("));
        assert!(sql.contains("\"CHAVE_DE_ACESSO\" TEXT PRIMARY KEY NOT NULL"));
        assert!(sql.contains("\"SERIE\" INTEGER,"));
        assert!(sql.contains("\"VALOR_NOTA_FISCAL\" REAL\n)"));
        assert!(!sql.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_item_table_sql() {
        let sql = create_table_sql(&ITEM);
        assert!(sql.contains("\"ID_ITEM\" INTEGER PRIMARY KEY AUTOINCREMENT,"));
        assert!(sql.contains("\"CHAVE_DE_ACESSO\" TEXT NOT NULL,"));
        assert!(sql.ends_with(
            "FOREIGN KEY (\"CHAVE_DE_ACESSO\") REFERENCES \"nfs_cabecalho\" (\"CHAVE_DE_ACESSO\")\n)"
        ));

        // Columns appear in declaration order
        let positions: Vec<usize> = ITEM
            .columns
            .iter()
            .map(|c| sql.find(&quote_ident(c.name)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_index_statements() {
        assert!(create_index_sql(&HEADER).is_empty());
        assert_eq!(
            create_index_sql(&ITEM),
            vec![
                "CREATE INDEX IF NOT EXISTS \"idx_nfs_itens_chave_de_acesso\" ON \"nfs_itens\" (\"CHAVE_DE_ACESSO\")"
                    .to_string()
            ]
        );
        assert_eq!(schema_statements(&ITEM).len(), 2);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
