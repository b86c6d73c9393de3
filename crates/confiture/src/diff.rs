//! Schema Comparator (spec §4.9): compares two [`StructuralFacts`] values
//! table-by-table and column-by-column and emits a typed change list.
//!
//! Grounded in `original_source/core/differ.py`'s comparison shape,
//! rebuilt against [`crate::model::StructuralFacts`] instead of the
//! teacher's facet-derived `Schema`/`Table`/`Column` types.

use crate::model::{Column, StructuralFacts, Table};

/// One structural difference between a "before" and "after" schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    AddTable { table: String },
    DropTable { table: String },
    RenameTable { from: String, to: String },
    AddColumn { table: String, column: String },
    DropColumn { table: String, column: String },
    RenameColumn { table: String, from: String, to: String },
    ChangeColumnType { table: String, column: String, from: String, to: String },
    ChangeColumnNullable { table: String, column: String, from: bool, to: bool },
    ChangeColumnDefault { table: String, column: String, from: Option<String>, to: Option<String> },
}

/// Full result of comparing `before` against `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub changes: Vec<SchemaChange>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compare two StructuralFacts values and emit the full change list.
pub fn diff(before: &StructuralFacts, after: &StructuralFacts) -> SchemaDiff {
    let mut changes = Vec::new();

    let (table_changes, renamed_pairs) = diff_table_presence(before, after);
    changes.extend(table_changes);

    for after_table in &after.tables {
        let before_name = renamed_pairs
            .iter()
            .find(|(_, to)| *to == after_table.name.as_str())
            .map(|(from, _)| from.to_string())
            .unwrap_or_else(|| after_table.name.clone());

        if let Some(before_table) = before.table(&before_name) {
            changes.extend(diff_columns(&before_table.name, before_table, after_table));
        }
    }

    SchemaDiff { changes }
}

/// Decides which tables were added/dropped/renamed, returning the change
/// list plus the `(from, to)` pairs classified as renames so column diffing
/// can pair the right before/after tables.
fn diff_table_presence(
    before: &StructuralFacts,
    after: &StructuralFacts,
) -> (Vec<SchemaChange>, Vec<(String, String)>) {
    let mut changes = Vec::new();
    let mut renamed = Vec::new();

    let mut dropped: Vec<&Table> = before
        .tables
        .iter()
        .filter(|t| after.table(&t.name).is_none())
        .collect();
    let mut added: Vec<&Table> = after
        .tables
        .iter()
        .filter(|t| before.table(&t.name).is_none())
        .collect();

    let mut consumed_dropped = vec![false; dropped.len()];
    let mut consumed_added = vec![false; added.len()];

    for (di, drop_table) in dropped.iter().enumerate() {
        for (ai, add_table) in added.iter().enumerate() {
            if consumed_added[ai] {
                continue;
            }
            if table_signature(drop_table) == table_signature(add_table) {
                changes.push(SchemaChange::RenameTable {
                    from: drop_table.name.clone(),
                    to: add_table.name.clone(),
                });
                renamed.push((drop_table.name.clone(), add_table.name.clone()));
                consumed_dropped[di] = true;
                consumed_added[ai] = true;
                break;
            }
        }
    }

    for (i, table) in dropped.drain(..).enumerate() {
        if !consumed_dropped[i] {
            changes.push(SchemaChange::DropTable {
                table: table.name.clone(),
            });
        }
    }
    for (i, table) in added.drain(..).enumerate() {
        if !consumed_added[i] {
            changes.push(SchemaChange::AddTable {
                table: table.name.clone(),
            });
        }
    }

    (changes, renamed)
}

/// A table's "shape" ignoring its name: ordered (type, nullable, default)
/// per column. Used only for the conservative rename heuristic.
fn table_signature(table: &Table) -> Vec<(String, bool, Option<String>)> {
    table
        .columns
        .iter()
        .map(|c| (c.pg_type.clone(), c.nullable, c.default_expression.clone()))
        .collect()
}

fn diff_columns(table_name: &str, before: &Table, after: &Table) -> Vec<SchemaChange> {
    let mut changes = Vec::new();

    let mut dropped: Vec<&Column> = before
        .columns
        .iter()
        .filter(|c| after.column(&c.name).is_none())
        .collect();
    let mut added: Vec<&Column> = after
        .columns
        .iter()
        .filter(|c| before.column(&c.name).is_none())
        .collect();

    let mut consumed_dropped = vec![false; dropped.len()];
    let mut consumed_added = vec![false; added.len()];

    for (di, drop_col) in dropped.iter().enumerate() {
        let drop_pos = before.columns.iter().position(|c| c.name == drop_col.name);
        for (ai, add_col) in added.iter().enumerate() {
            if consumed_added[ai] {
                continue;
            }
            let add_pos = after.columns.iter().position(|c| c.name == add_col.name);
            let same_signature = drop_col.pg_type == add_col.pg_type
                && drop_col.nullable == add_col.nullable
                && drop_col.default_expression == add_col.default_expression;
            if same_signature && drop_pos == add_pos {
                changes.push(SchemaChange::RenameColumn {
                    table: table_name.to_string(),
                    from: drop_col.name.clone(),
                    to: add_col.name.clone(),
                });
                consumed_dropped[di] = true;
                consumed_added[ai] = true;
                break;
            }
        }
    }

    for (i, col) in dropped.drain(..).enumerate() {
        if !consumed_dropped[i] {
            changes.push(SchemaChange::DropColumn {
                table: table_name.to_string(),
                column: col.name.clone(),
            });
        }
    }
    for (i, col) in added.drain(..).enumerate() {
        if !consumed_added[i] {
            changes.push(SchemaChange::AddColumn {
                table: table_name.to_string(),
                column: col.name.clone(),
            });
        }
    }

    for before_col in &before.columns {
        let Some(after_col) = after.column(&before_col.name) else {
            continue;
        };
        if before_col.pg_type != after_col.pg_type {
            changes.push(SchemaChange::ChangeColumnType {
                table: table_name.to_string(),
                column: before_col.name.clone(),
                from: before_col.pg_type.clone(),
                to: after_col.pg_type.clone(),
            });
        }
        if before_col.nullable != after_col.nullable {
            changes.push(SchemaChange::ChangeColumnNullable {
                table: table_name.to_string(),
                column: before_col.name.clone(),
                from: before_col.nullable,
                to: after_col.nullable,
            });
        }
        if before_col.default_expression != after_col.default_expression {
            changes.push(SchemaChange::ChangeColumnDefault {
                table: table_name.to_string(),
                column: before_col.name.clone(),
                from: before_col.default_expression.clone(),
                to: after_col.default_expression.clone(),
            });
        }
    }

    changes
}
