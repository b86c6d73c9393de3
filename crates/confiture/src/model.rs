//! StructuralFacts: the parser-neutral table/column/FK record shape produced
//! by both the DDL Parser (§4.2) and the Catalog Introspector (§4.3).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One column of a table, as extracted from DDL text or live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// PostgreSQL type text, preserved verbatim (e.g. `character varying(255)`).
    pub pg_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub default_expression: Option<String>,
}

/// A foreign key reference between two tables, resolved by ordinal column
/// pairing so composite keys are represented correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FKReference {
    pub from_table: String,
    pub via_columns: Vec<String>,
    pub to_table: String,
    pub on_columns: Vec<String>,
}

/// Non-prescriptive naming-convention hints on a table (spec §4.3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHints {
    pub surrogate_pk: Option<String>,
    pub natural_id: Option<String>,
}

/// One table, with its columns in source/ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<TableHints>,
}

impl Table {
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One column's validation requirements within a [`SchemaContext`] table
/// entry (spec §3 SchemaContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnContext {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    /// `(table, column)` this column must reference.
    #[serde(default)]
    pub foreign_key: Option<(String, String)>,
    /// Which identifier pattern, if any, values in this column must match.
    #[serde(default)]
    pub pattern: Option<PatternTag>,
}

/// Domain-specific identifier pattern a column's values may be required to
/// follow (spec §4.10-R).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTag {
    Enumerated,
    TestPlaceholder,
    EitherPattern,
}

/// One table's validation requirements within a [`SchemaContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContext {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_rows: Option<usize>,
    #[serde(default)]
    pub columns: IndexMap<String, ColumnContext>,
}

/// The declarative description against which seed data is validated
/// (spec §3 SchemaContext). Produced upstream; consumed read-only by the
/// Seed Validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaContext {
    pub tables: IndexMap<String, TableContext>,
}

/// The full structural fact set for a schema — declared or live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFacts {
    pub tables: Vec<Table>,
    pub foreign_keys: Vec<FKReference>,
}

impl StructuralFacts {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Validate the invariants spec §3 requires of any StructuralFacts value:
    /// unique column names per table, each PK column in exactly one PK set,
    /// and FK endpoints referring to columns that exist.
    pub fn validate(&self) -> Result<(), String> {
        for table in &self.tables {
            let mut seen = std::collections::HashSet::new();
            for col in &table.columns {
                if !seen.insert(col.name.as_str()) {
                    return Err(format!(
                        "table {:?} has duplicate column {:?}",
                        table.name, col.name
                    ));
                }
            }
        }
        for fk in &self.foreign_keys {
            let from = self.table(&fk.from_table).ok_or_else(|| {
                format!("FK references unknown table {:?}", fk.from_table)
            })?;
            for col in &fk.via_columns {
                if from.column(col).is_none() {
                    return Err(format!(
                        "FK column {:?} does not exist on table {:?}",
                        col, fk.from_table
                    ));
                }
            }
            let to = self
                .table(&fk.to_table)
                .ok_or_else(|| format!("FK references unknown table {:?}", fk.to_table))?;
            for col in &fk.on_columns {
                if to.column(col).is_none() {
                    return Err(format!(
                        "FK target column {:?} does not exist on table {:?}",
                        col, fk.to_table
                    ));
                }
            }
        }
        Ok(())
    }
}
