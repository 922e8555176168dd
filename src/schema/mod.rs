//! Static schema registry for the two invoice entities
//!
//! Each entity is a table-driven [`EntityDescriptor`]: an ordered list of
//! [`ColumnSpec`]s with their declared type, key role and the source spellings
//! accepted from the CSV exports. Column names are constants so that foreign
//! keys and lookups are checked by the compiler rather than by string typing.

mod ddl;

pub use ddl::*;

use serde::Serialize;
use std::fmt;

/// Declared semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    /// SQLite type affinity keyword
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// Key role of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnRole {
    Data,
    /// Primary key supplied by the source file
    PrimaryKey,
    /// Primary key assigned by the store; never read from the source file
    AutoIncrementKey,
}

/// How a batch replaces the previous contents of its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadMode {
    /// Discard every row and restart the key sequence, then insert
    Replace,
    /// Discard every row but keep the key sequence running, then insert
    AppendAfterClear,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Replace => write!(f, "replace"),
            LoadMode::AppendAfterClear => write!(f, "append-after-clear"),
        }
    }
}

/// Entities known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Header,
    Item,
}

impl EntityKind {
    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            EntityKind::Header => &HEADER,
            EntityKind::Item => &ITEM,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Header => write!(f, "header"),
            EntityKind::Item => write!(f, "item"),
        }
    }
}

/// One column of an entity
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub role: ColumnRole,
    pub not_null: bool,
    /// Source spellings matched after trimming, case-insensitively
    pub aliases: &'static [&'static str],
}

impl ColumnSpec {
    const fn data(name: &'static str, ty: ColumnType, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            ty,
            role: ColumnRole::Data,
            not_null: false,
            aliases,
        }
    }

    const fn required(mut self) -> Self {
        self.not_null = true;
        self
    }

    const fn primary_key(mut self) -> Self {
        self.role = ColumnRole::PrimaryKey;
        self.not_null = true;
        self
    }

    const fn auto_increment(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Integer,
            role: ColumnRole::AutoIncrementKey,
            not_null: true,
            aliases: &[],
        }
    }

    /// Whether the column is expected in the source file
    pub fn is_sourced(&self) -> bool {
        self.role != ColumnRole::AutoIncrementKey
    }

    /// Whether a source column name refers to this column
    pub fn matches(&self, source_name: &str) -> bool {
        let key = match_key(source_name);
        self.aliases.iter().any(|alias| match_key(alias) == key)
    }
}

/// Comparison key for column names: surrounding whitespace (and a stray
/// byte-order mark) removed, Unicode lowercase.
pub fn match_key(name: &str) -> String {
    name.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
        .to_lowercase()
}

/// A declared foreign key
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: EntityKind,
    pub references_column: &'static str,
}

/// Static description of one entity and its destination table
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub table: &'static str,
    pub columns: &'static [ColumnSpec],
    pub foreign_keys: &'static [ForeignKey],
    /// Filename suffix of the export this entity is loaded from
    pub source_file: &'static str,
    pub load_mode: LoadMode,
}

impl EntityDescriptor {
    /// Columns read from the source file, in declaration order
    pub fn sourced_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.is_sourced())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn auto_increment_key(&self) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.role == ColumnRole::AutoIncrementKey)
    }

    /// Check the structural invariants of the descriptor.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let keys = self
            .columns
            .iter()
            .filter(|c| c.role != ColumnRole::Data)
            .count();
        if keys > 1 {
            return Err(format!("{}: more than one primary key column", self.table));
        }

        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(format!("{}: duplicate column {}", self.table, col.name));
            }
            match col.role {
                ColumnRole::AutoIncrementKey => {
                    if col.ty != ColumnType::Integer || !col.aliases.is_empty() {
                        return Err(format!(
                            "{}: auto-increment key {} must be an unsourced INTEGER",
                            self.table, col.name
                        ));
                    }
                }
                _ => {
                    if col.aliases.is_empty() {
                        return Err(format!(
                            "{}: column {} has no source spelling",
                            self.table, col.name
                        ));
                    }
                }
            }
        }

        for fk in self.foreign_keys {
            if self.column(fk.column).is_none() {
                return Err(format!("{}: foreign key on unknown column {}", self.table, fk.column));
            }
            let target = fk.references.descriptor();
            if target.column(fk.references_column).is_none() {
                return Err(format!(
                    "{}: foreign key references unknown column {}.{}",
                    self.table, target.table, fk.references_column
                ));
            }
        }

        Ok(())
    }
}

/// Entities in load order: referenced entities first.
pub static REGISTRY: [&EntityDescriptor; 2] = [&HEADER, &ITEM];

// Canonical column names shared between the entities
pub const CHAVE_DE_ACESSO: &str = "CHAVE_DE_ACESSO";
pub const ID_ITEM: &str = "ID_ITEM";

use ColumnType::{Integer, Real, Text};

const HEADER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::data(CHAVE_DE_ACESSO, Text, &["CHAVE DE ACESSO", CHAVE_DE_ACESSO]).primary_key(),
    ColumnSpec::data("MODELO", Text, &["MODELO"]),
    ColumnSpec::data("SERIE", Integer, &["SÉRIE", "SERIE"]),
    ColumnSpec::data("NUMERO", Integer, &["NÚMERO", "NUMERO"]),
    ColumnSpec::data(
        "NATUREZA_DA_OPERACAO",
        Text,
        &["NATUREZA DA OPERAÇÃO", "NATUREZA DA OPERACAO", "NATUREZA_DA_OPERACAO"],
    ),
    ColumnSpec::data("DATA_EMISSAO", Text, &["DATA EMISSÃO", "DATA EMISSAO", "DATA_EMISSAO"]),
    ColumnSpec::data(
        "EVENTO_MAIS_RECENTE",
        Text,
        &["EVENTO MAIS RECENTE", "EVENTO_MAIS_RECENTE"],
    ),
    ColumnSpec::data(
        "DATA_HORA_EVENTO_MAIS_RECENTE",
        Text,
        &["DATA/HORA EVENTO MAIS RECENTE", "DATA_HORA_EVENTO_MAIS_RECENTE"],
    ),
    ColumnSpec::data(
        "CPF_CNPJ_EMITENTE",
        Text,
        &["CPF/CNPJ Emitente", "CPF_CNPJ_EMITENTE"],
    ),
    ColumnSpec::data(
        "RAZAO_SOCIAL_EMITENTE",
        Text,
        &["RAZÃO SOCIAL EMITENTE", "RAZAO SOCIAL EMITENTE", "RAZAO_SOCIAL_EMITENTE"],
    ),
    ColumnSpec::data(
        "INSCRICAO_ESTADUAL_EMITENTE",
        Text,
        &[
            "INSCRIÇÃO ESTADUAL EMITENTE",
            "INSCRICAO ESTADUAL EMITENTE",
            "INSCRICAO_ESTADUAL_EMITENTE",
        ],
    ),
    ColumnSpec::data("UF_EMITENTE", Text, &["UF EMITENTE", "UF_EMITENTE"]),
    ColumnSpec::data(
        "MUNICIPIO_EMITENTE",
        Text,
        &["MUNICÍPIO EMITENTE", "MUNICIPIO EMITENTE", "MUNICIPIO_EMITENTE"],
    ),
    ColumnSpec::data(
        "CNPJ_DESTINATARIO",
        Text,
        &["CNPJ DESTINATÁRIO", "CNPJ DESTINATARIO", "CNPJ_DESTINATARIO"],
    ),
    ColumnSpec::data(
        "NOME_DESTINATARIO",
        Text,
        &["NOME DESTINATÁRIO", "NOME DESTINATARIO", "NOME_DESTINATARIO"],
    ),
    ColumnSpec::data(
        "UF_DESTINATARIO",
        Text,
        &["UF DESTINATÁRIO", "UF DESTINATARIO", "UF_DESTINATARIO"],
    ),
    ColumnSpec::data(
        "INDICADOR_IE_DESTINATARIO",
        Text,
        &[
            "INDICADOR IE DESTINATÁRIO",
            "INDICADOR IE DESTINATARIO",
            "INDICADOR_IE_DESTINATARIO",
        ],
    ),
    ColumnSpec::data(
        "DESTINO_DA_OPERACAO",
        Text,
        &["DESTINO DA OPERAÇÃO", "DESTINO DA OPERACAO", "DESTINO_DA_OPERACAO"],
    ),
    ColumnSpec::data("CONSUMIDOR_FINAL", Text, &["CONSUMIDOR FINAL", "CONSUMIDOR_FINAL"]),
    ColumnSpec::data(
        "PRESENCA_DO_COMPRADOR",
        Text,
        &["PRESENÇA DO COMPRADOR", "PRESENCA DO COMPRADOR", "PRESENCA_DO_COMPRADOR"],
    ),
    ColumnSpec::data("VALOR_NOTA_FISCAL", Real, &["VALOR NOTA FISCAL", "VALOR_NOTA_FISCAL"]),
];

const ITEM_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::auto_increment(ID_ITEM),
    ColumnSpec::data(CHAVE_DE_ACESSO, Text, &["CHAVE DE ACESSO", CHAVE_DE_ACESSO]).required(),
    ColumnSpec::data(
        "NUMERO_PRODUTO",
        Integer,
        &["NÚMERO PRODUTO", "NUMERO PRODUTO", "NUMERO_PRODUTO"],
    ),
    ColumnSpec::data(
        "DESCRICAO_PRODUTO_SERVICO",
        Text,
        &[
            "DESCRIÇÃO DO PRODUTO/SERVIÇO",
            "DESCRICAO DO PRODUTO/SERVICO",
            "DESCRICAO_PRODUTO_SERVICO",
        ],
    ),
    ColumnSpec::data("CODIGO_NCM_SH", Text, &["CÓDIGO NCM/SH", "CODIGO NCM/SH", "CODIGO_NCM_SH"]),
    ColumnSpec::data(
        "NCM_SH_TIPO_PRODUTO",
        Text,
        &["NCM/SH (TIPO DE PRODUTO)", "NCM_SH_TIPO_PRODUTO"],
    ),
    ColumnSpec::data("CFOP", Integer, &["CFOP"]),
    ColumnSpec::data("QUANTIDADE", Real, &["QUANTIDADE"]),
    ColumnSpec::data("UNIDADE", Text, &["UNIDADE"]),
    ColumnSpec::data(
        "VALOR_UNITARIO",
        Real,
        &["VALOR UNITÁRIO", "VALOR UNITARIO", "VALOR_UNITARIO"],
    ),
    ColumnSpec::data("VALOR_TOTAL", Real, &["VALOR TOTAL", "VALOR_TOTAL"]),
];

/// Invoice header: one row per document, keyed by its access key
pub static HEADER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Header,
    table: "nfs_cabecalho",
    columns: HEADER_COLUMNS,
    foreign_keys: &[],
    source_file: "_nfs_cabecalho.csv",
    load_mode: LoadMode::Replace,
};

/// Invoice line item, linked to its header by access key
pub static ITEM: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Item,
    table: "nfs_itens",
    columns: ITEM_COLUMNS,
    foreign_keys: &[ForeignKey {
        column: CHAVE_DE_ACESSO,
        references: EntityKind::Header,
        references_column: CHAVE_DE_ACESSO,
    }],
    source_file: "_nfs_itens.csv",
    load_mode: LoadMode::AppendAfterClear,
};
