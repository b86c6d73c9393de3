//! Catalog Introspector (spec §4.3): reads the live database's `pg_catalog`
//! (never `information_schema`) to produce the same [`StructuralFacts`]
//! shape the DDL Parser produces.
//!
//! Grounded in `original_source/core/introspector.py`'s `pg_catalog`
//! queries — `pg_attribute` + `format_type()` for exact type text,
//! `pg_index` for primary keys, and `pg_constraint` joined through
//! `unnest(...) WITH ORDINALITY` for composite foreign keys, which
//! `information_schema` cannot represent correctly.

use std::collections::HashMap;

use tokio_postgres::Client;

use crate::error::Result;
use crate::model::{Column, FKReference, StructuralFacts, Table, TableHints};

/// Introspect all regular tables in `schema`.
///
/// When `table_prefix` is `Some`, only tables whose name starts with that
/// prefix are listed (mirrors the teacher's `tb_%` convention filter);
/// `None` lists every base table.
pub async fn introspect(
    client: &Client,
    schema: &str,
    table_prefix: Option<&str>,
    include_hints: bool,
) -> Result<StructuralFacts> {
    let table_names = list_tables(client, schema, table_prefix).await?;

    let mut tables = Vec::with_capacity(table_names.len());
    let mut foreign_keys = Vec::new();

    for name in &table_names {
        let pk_cols = primary_key_columns(client, schema, name).await?;
        let columns = columns_for_table(client, schema, name, &pk_cols).await?;
        let hints = if include_hints {
            detect_hints(&columns)
        } else {
            None
        };
        let outbound = outbound_foreign_keys(client, schema, name).await?;
        foreign_keys.extend(outbound);

        tables.push(Table {
            name: name.clone(),
            columns,
            hints,
        });
    }

    Ok(StructuralFacts {
        tables,
        foreign_keys,
    })
}

async fn list_tables(
    client: &Client,
    schema: &str,
    table_prefix: Option<&str>,
) -> Result<Vec<String>> {
    let rows = match table_prefix {
        Some(prefix) => {
            let pattern = format!("{}%", prefix.replace('_', "\\_").replace('%', "\\%"));
            client
                .query(
                    "SELECT c.relname
                     FROM pg_class c
                     JOIN pg_namespace n ON n.oid = c.relnamespace
                     WHERE n.nspname = $1 AND c.relkind = 'r'
                       AND c.relname LIKE $2
                     ORDER BY c.relname",
                    &[&schema, &pattern],
                )
                .await?
        }
        None => {
            client
                .query(
                    "SELECT c.relname
                     FROM pg_class c
                     JOIN pg_namespace n ON n.oid = c.relnamespace
                     WHERE n.nspname = $1 AND c.relkind = 'r'
                     ORDER BY c.relname",
                    &[&schema],
                )
                .await?
        }
    };
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn primary_key_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<std::collections::HashSet<String>> {
    let rows = client
        .query(
            "SELECT a.attname
             FROM pg_index i
             JOIN pg_class c ON c.oid = i.indrelid
             JOIN pg_namespace n ON n.oid = c.relnamespace
             JOIN pg_attribute a
                 ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
             WHERE n.nspname = $1 AND c.relname = $2
               AND i.indisprimary",
            &[&schema, &table],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

async fn columns_for_table(
    client: &Client,
    schema: &str,
    table: &str,
    pk_cols: &std::collections::HashSet<String>,
) -> Result<Vec<Column>> {
    let rows = client
        .query(
            "SELECT
                 a.attname,
                 pg_catalog.format_type(a.atttypid, a.atttypmod),
                 NOT a.attnotnull,
                 pg_get_expr(d.adbin, d.adrelid)
             FROM pg_attribute a
             JOIN pg_class c ON c.oid = a.attrelid
             JOIN pg_namespace n ON n.oid = c.relnamespace
             LEFT JOIN pg_attrdef d
                 ON d.adrelid = a.attrelid AND d.adnum = a.attnum
             WHERE n.nspname = $1 AND c.relname = $2
               AND a.attnum > 0 AND NOT a.attisdropped
             ORDER BY a.attnum",
            &[&schema, &table],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let pg_type: String = row.get(1);
            let nullable: bool = row.get(2);
            let default_expression: Option<String> = row.get(3);
            let is_primary_key = pk_cols.contains(&name);
            Column {
                name,
                pg_type,
                nullable: nullable && !is_primary_key,
                is_primary_key,
                default_expression,
            }
        })
        .collect())
}

async fn outbound_foreign_keys(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<FKReference>> {
    let rows = client
        .query(
            "SELECT
                 con.conname,
                 src_att.attname  AS local_column,
                 tgt_cls.relname  AS referenced_table,
                 tgt_att.attname  AS referenced_column
             FROM pg_constraint con
             JOIN pg_class src_cls ON src_cls.oid = con.conrelid
             JOIN pg_namespace src_ns ON src_ns.oid = src_cls.relnamespace
             JOIN pg_class tgt_cls ON tgt_cls.oid = con.confrelid
             JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS sk(n, ord) ON true
             JOIN pg_attribute src_att
                 ON src_att.attrelid = con.conrelid AND src_att.attnum = sk.n
             JOIN LATERAL unnest(con.confkey) WITH ORDINALITY AS tk(n, ord)
                 ON sk.ord = tk.ord
             JOIN pg_attribute tgt_att
                 ON tgt_att.attrelid = con.confrelid AND tgt_att.attnum = tk.n
             WHERE con.contype = 'f'
               AND src_ns.nspname = $1 AND src_cls.relname = $2
             ORDER BY con.conname, sk.ord",
            &[&schema, &table],
        )
        .await?;

    // Group ordinal (local_column, referenced_column) pairs by constraint
    // name so a composite FK becomes one FKReference, not N.
    let mut by_constraint: indexmap::IndexMap<String, (String, Vec<String>, Vec<String>)> =
        indexmap::IndexMap::new();

    for row in &rows {
        let conname: String = row.get(0);
        let local_column: String = row.get(1);
        let referenced_table: String = row.get(2);
        let referenced_column: String = row.get(3);

        let entry = by_constraint
            .entry(conname)
            .or_insert_with(|| (referenced_table, Vec::new(), Vec::new()));
        entry.1.push(local_column);
        entry.2.push(referenced_column);
    }

    Ok(by_constraint
        .into_values()
        .map(|(to_table, via_columns, on_columns)| FKReference {
            from_table: table.to_string(),
            via_columns,
            to_table,
            on_columns,
        })
        .collect())
}

/// Detect surrogate-PK / natural-ID naming conventions (spec §4.3: "without
/// prescribing action").
fn detect_hints(columns: &[Column]) -> Option<TableHints> {
    let surrogate_pk = columns
        .iter()
        .find(|c| c.is_primary_key && c.name.starts_with("pk_"))
        .map(|c| c.name.clone());
    let natural_id = columns
        .iter()
        .find(|c| c.name == "id")
        .map(|c| c.name.clone());

    if surrogate_pk.is_some() || natural_id.is_some() {
        Some(TableHints {
            surrogate_pk,
            natural_id,
        })
    } else {
        None
    }
}

/// Render a [`StructuralFacts`] value back into `CREATE TABLE` SQL text,
/// one block per table in source order. Used by the Baseline Detector
/// (spec §4.9) to compare live introspection against declared snapshots at
/// the same textual altitude.
pub fn to_create_table_sql(facts: &StructuralFacts) -> String {
    let pk_by_table: HashMap<&str, Vec<&str>> = facts
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t.primary_key_columns()))
        .collect();

    facts
        .tables
        .iter()
        .map(|table| {
            let mut col_defs: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    let null_clause = if c.nullable { "" } else { " not null" };
                    format!("  {} {}{}", c.name, c.pg_type, null_clause)
                })
                .collect();
            if let Some(pk) = pk_by_table.get(table.name.as_str()) {
                if !pk.is_empty() {
                    col_defs.push(format!("  primary key ({})", pk.join(", ")));
                }
            }
            format!("create table {} (\n{}\n);", table.name, col_defs.join(",\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn col(name: &str, pg_type: &str, nullable: bool, pk: bool) -> Column {
        Column {
            name: name.to_string(),
            pg_type: pg_type.to_string(),
            nullable,
            is_primary_key: pk,
            default_expression: None,
        }
    }

    #[test]
    fn detect_hints_recognizes_surrogate_pk_and_natural_id() {
        let columns = vec![
            col("pk_users", "bigint", false, true),
            col("id", "uuid", false, false),
        ];
        let hints = detect_hints(&columns).expect("hints present");
        assert_eq!(hints.surrogate_pk.as_deref(), Some("pk_users"));
        assert_eq!(hints.natural_id.as_deref(), Some("id"));
    }

    #[test]
    fn detect_hints_is_none_without_conventions() {
        let columns = vec![col("name", "text", true, false)];
        assert!(detect_hints(&columns).is_none());
    }

    #[test]
    fn to_create_table_sql_includes_primary_key_clause() {
        let facts = StructuralFacts {
            tables: vec![Table {
                name: "users".to_string(),
                columns: vec![
                    col("id", "integer", false, true),
                    col("email", "text", false, false),
                ],
                hints: None,
            }],
            foreign_keys: vec![],
        };
        let sql = to_create_table_sql(&facts);
        assert!(sql.contains("create table users"));
        assert!(sql.contains("primary key (id)"));
        assert!(sql.contains("email text not null"));
    }
}
