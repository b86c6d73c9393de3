//! DDL Parser (spec §4.2): extracts [`StructuralFacts`](crate::model::StructuralFacts)
//! from `CREATE TABLE` statements. Parse-only — never executes SQL.
//!
//! Grounded in `original_source/core/differ.py`'s statement-walking shape,
//! reimplemented over `scanner::split_statements` instead of `sqlparse`
//! (there is no pack-wide SQL-AST crate; the scanner is the only tokenizer
//! this workspace has, and it already solves the quoting problem).

use crate::ddl_tokenize::{split_top_level, tokenize};
use crate::model::{Column, FKReference, StructuralFacts, Table};
use crate::scanner;

const CONSTRAINT_KEYWORDS: &[&str] = &[
    "NOT", "NULL", "DEFAULT", "PRIMARY", "UNIQUE", "REFERENCES", "CHECK", "COLLATE",
    "CONSTRAINT", "GENERATED",
];

/// Result of parsing a DDL corpus: the best-effort fact set plus any
/// non-fatal diagnostics encountered along the way.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub facts: StructuralFacts,
    pub diagnostics: Vec<String>,
}

/// Parse DDL text into [`StructuralFacts`]. Non-`CREATE TABLE` statements
/// are ignored at this layer; malformed `CREATE TABLE` statements are
/// skipped with a diagnostic rather than aborting the whole parse.
pub fn parse(ddl_text: &str) -> ParseResult {
    let mut result = ParseResult::default();

    for stmt in scanner::split_statements(ddl_text) {
        let trimmed = stmt.trim();
        if !is_create_table(trimmed) {
            continue;
        }
        match parse_create_table(trimmed) {
            Ok((table, fks)) => {
                result.facts.tables.push(table);
                result.facts.foreign_keys.extend(fks);
            }
            Err(reason) => {
                result
                    .diagnostics
                    .push(format!("skipped malformed CREATE TABLE: {reason}"));
            }
        }
    }

    result
}

fn is_create_table(stmt: &str) -> bool {
    let upper = stmt.trim_start();
    upper.len() >= 12 && upper[..12].eq_ignore_ascii_case("create table")
}

fn parse_create_table(stmt: &str) -> Result<(Table, Vec<FKReference>), String> {
    let tokens = tokenize(stmt);
    let mut idx = 0usize;

    expect_keyword(&tokens, &mut idx, "CREATE")?;
    expect_keyword(&tokens, &mut idx, "TABLE")?;
    skip_if_not_exists(&tokens, &mut idx);

    let name_tok = tokens
        .get(idx)
        .ok_or_else(|| "missing table name".to_string())?;
    let table_name = unquote(name_tok);
    idx += 1;

    let body_tok = tokens
        .get(idx)
        .filter(|t| t.starts_with('('))
        .ok_or_else(|| format!("missing column list for table {table_name:?}"))?;
    let body = strip_outer_parens(body_tok);

    let mut columns = Vec::new();
    let mut foreign_keys = Vec::new();
    let mut pk_columns: Vec<String> = Vec::new();

    for fragment in split_top_level(&body, ',') {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        let frag_tokens = tokenize(fragment);
        let Some(first) = frag_tokens.first() else {
            continue;
        };

        if is_table_constraint_keyword(first) {
            parse_table_constraint(&table_name, &frag_tokens, &mut pk_columns, &mut foreign_keys);
            continue;
        }

        let (column, inline_fk) = parse_column_def(&table_name, &frag_tokens)?;
        if column.is_primary_key {
            pk_columns.push(column.name.clone());
        }
        columns.push(column);
        if let Some(fk) = inline_fk {
            foreign_keys.push(fk);
        }
    }

    for name in &pk_columns {
        if let Some(col) = columns.iter_mut().find(|c| &c.name == name) {
            col.is_primary_key = true;
            col.nullable = false;
        }
    }

    Ok((
        Table {
            name: table_name,
            columns,
            hints: None,
        },
        foreign_keys,
    ))
}

fn is_table_constraint_keyword(tok: &str) -> bool {
    matches!(
        tok.to_ascii_uppercase().as_str(),
        "PRIMARY" | "UNIQUE" | "FOREIGN" | "CHECK" | "CONSTRAINT" | "EXCLUDE"
    )
}

fn parse_table_constraint(
    table_name: &str,
    tokens: &[String],
    pk_columns: &mut Vec<String>,
    foreign_keys: &mut Vec<FKReference>,
) {
    let mut i = 0usize;
    if eq_kw(&tokens[i], "CONSTRAINT") {
        i += 2; // CONSTRAINT <name>
    }
    let Some(kw) = tokens.get(i) else { return };

    if eq_kw(kw, "PRIMARY") {
        // PRIMARY KEY (cols...)
        if let Some(cols_tok) = tokens.get(i + 2) {
            pk_columns.extend(
                split_top_level(&strip_outer_parens(cols_tok), ',')
                    .into_iter()
                    .map(|c| unquote(c.trim())),
            );
        }
        return;
    }

    if eq_kw(kw, "FOREIGN") {
        // FOREIGN KEY (cols...) REFERENCES table (cols...)
        let Some(via_tok) = tokens.get(i + 2) else {
            return;
        };
        let via_columns: Vec<String> = split_top_level(&strip_outer_parens(via_tok), ',')
            .into_iter()
            .map(|c| unquote(c.trim()))
            .collect();

        let mut j = i + 3;
        if tokens.get(j).map(|t| eq_kw(t, "REFERENCES")).unwrap_or(false) {
            j += 1;
        }
        let Some(to_table_tok) = tokens.get(j) else {
            return;
        };
        let to_table = unquote(to_table_tok);
        let on_columns = tokens
            .get(j + 1)
            .filter(|t| t.starts_with('('))
            .map(|t| {
                split_top_level(&strip_outer_parens(t), ',')
                    .into_iter()
                    .map(|c| unquote(c.trim()))
                    .collect()
            })
            .unwrap_or_default();

        foreign_keys.push(FKReference {
            from_table: table_name.to_string(),
            via_columns,
            to_table,
            on_columns,
        });
    }
    // CHECK / UNIQUE / EXCLUDE table constraints don't affect StructuralFacts today.
}

fn parse_column_def(
    table_name: &str,
    tokens: &[String],
) -> Result<(Column, Option<FKReference>), String> {
    let name = unquote(
        tokens
            .first()
            .ok_or_else(|| "empty column definition".to_string())?,
    );

    let mut i = 1usize;
    let type_start = i;
    while i < tokens.len() && !is_constraint_keyword(&tokens[i]) {
        i += 1;
    }
    let pg_type = tokens[type_start..i].join(" ");

    let mut nullable = true;
    let mut is_primary_key = false;
    let mut default_expression = None;
    let mut fk = None;

    while i < tokens.len() {
        let tok = &tokens[i];
        if eq_kw(tok, "NOT") && tokens.get(i + 1).map(|t| eq_kw(t, "NULL")).unwrap_or(false) {
            nullable = false;
            i += 2;
        } else if eq_kw(tok, "NULL") {
            i += 1;
        } else if eq_kw(tok, "PRIMARY") {
            is_primary_key = true;
            nullable = false;
            i += if tokens.get(i + 1).map(|t| eq_kw(t, "KEY")).unwrap_or(false) {
                2
            } else {
                1
            };
        } else if eq_kw(tok, "DEFAULT") {
            let start = i + 1;
            let mut end = start;
            while end < tokens.len() && !is_constraint_keyword(&tokens[end]) {
                end += 1;
            }
            default_expression = Some(tokens[start..end].join(" "));
            i = end;
        } else if eq_kw(tok, "REFERENCES") {
            let to_table = tokens
                .get(i + 1)
                .map(|t| unquote(t))
                .ok_or_else(|| "REFERENCES without a target table".to_string())?;
            let on_columns = tokens
                .get(i + 2)
                .filter(|t| t.starts_with('('))
                .map(|t| {
                    split_top_level(&strip_outer_parens(t), ',')
                        .into_iter()
                        .map(|c| unquote(c.trim()))
                        .collect()
                })
                .unwrap_or_default();
            fk = Some(FKReference {
                from_table: table_name.to_string(),
                via_columns: vec![name.clone()],
                to_table,
                on_columns,
            });
            i += if tokens.get(i + 2).map(|t| t.starts_with('(')).unwrap_or(false) {
                3
            } else {
                2
            };
        } else {
            // UNIQUE, COLLATE, GENERATED ... — not modeled structurally, skip the token.
            i += 1;
        }
    }

    Ok((
        Column {
            name,
            pg_type,
            nullable,
            is_primary_key,
            default_expression,
        },
        fk,
    ))
}

fn is_constraint_keyword(tok: &str) -> bool {
    let upper = tok.to_ascii_uppercase();
    CONSTRAINT_KEYWORDS.contains(&upper.as_str())
}

fn eq_kw(tok: &str, kw: &str) -> bool {
    tok.eq_ignore_ascii_case(kw)
}

fn expect_keyword(tokens: &[String], idx: &mut usize, kw: &str) -> Result<(), String> {
    match tokens.get(*idx) {
        Some(t) if eq_kw(t, kw) => {
            *idx += 1;
            Ok(())
        }
        other => Err(format!("expected {kw:?}, found {other:?}")),
    }
}

fn skip_if_not_exists(tokens: &[String], idx: &mut usize) {
    if tokens.get(*idx).map(|t| eq_kw(t, "IF")).unwrap_or(false)
        && tokens.get(*idx + 1).map(|t| eq_kw(t, "NOT")).unwrap_or(false)
        && tokens.get(*idx + 2).map(|t| eq_kw(t, "EXISTS")).unwrap_or(false)
    {
        *idx += 3;
    }
}

fn unquote(tok: &str) -> String {
    if tok.starts_with('"') && tok.ends_with('"') && tok.len() >= 2 {
        tok[1..tok.len() - 1].replace("\"\"", "\"")
    } else {
        tok.to_string()
    }
}

fn strip_outer_parens(tok: &str) -> String {
    let t = tok.trim();
    if t.starts_with('(') && t.ends_with(')') {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_table() {
        let sql = "CREATE TABLE users (id int primary key, email text not null);";
        let result = parse(sql);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.facts.tables.len(), 1);
        let table = &result.facts.tables[0];
        assert_eq!(table.name, "users");
        assert_eq!(table.columns.len(), 2);
        assert!(table.columns[0].is_primary_key);
        assert!(!table.columns[0].nullable);
        assert!(!table.columns[1].nullable);
    }

    #[test]
    fn preserves_type_text_verbatim() {
        let sql = "CREATE TABLE t (name character varying(255));";
        let result = parse(sql);
        assert_eq!(result.facts.tables[0].columns[0].pg_type, "character varying(255)");
    }

    #[test]
    fn if_not_exists_is_skipped_without_affecting_name() {
        let sql = "CREATE TABLE IF NOT EXISTS widgets (id int);";
        let result = parse(sql);
        assert_eq!(result.facts.tables[0].name, "widgets");
    }

    #[test]
    fn table_level_primary_key_marks_columns() {
        let sql = "CREATE TABLE t (a int, b int, PRIMARY KEY (a, b));";
        let result = parse(sql);
        let table = &result.facts.tables[0];
        assert!(table.columns[0].is_primary_key);
        assert!(table.columns[1].is_primary_key);
    }

    #[test]
    fn table_level_foreign_key_is_extracted() {
        let sql = "CREATE TABLE orders (id int, customer_id int, \
                    FOREIGN KEY (customer_id) REFERENCES users (id));";
        let result = parse(sql);
        assert_eq!(result.facts.foreign_keys.len(), 1);
        let fk = &result.facts.foreign_keys[0];
        assert_eq!(fk.from_table, "orders");
        assert_eq!(fk.via_columns, vec!["customer_id"]);
        assert_eq!(fk.to_table, "users");
        assert_eq!(fk.on_columns, vec!["id"]);
    }

    #[test]
    fn inline_references_produces_a_single_column_fk() {
        let sql = "CREATE TABLE orders (customer_id int REFERENCES users(id));";
        let result = parse(sql);
        assert_eq!(result.facts.foreign_keys.len(), 1);
        assert_eq!(result.facts.foreign_keys[0].via_columns, vec!["customer_id"]);
    }

    #[test]
    fn default_expression_is_captured_up_to_next_constraint() {
        let sql = "CREATE TABLE t (created_at timestamptz DEFAULT now() NOT NULL);";
        let result = parse(sql);
        let col = &result.facts.tables[0].columns[0];
        assert_eq!(col.default_expression.as_deref(), Some("now()"));
        assert!(!col.nullable);
    }

    #[test]
    fn non_create_table_statements_are_ignored() {
        let sql = "CREATE INDEX idx_a ON t (a); CREATE TABLE t2 (id int);";
        let result = parse(sql);
        assert_eq!(result.facts.tables.len(), 1);
        assert_eq!(result.facts.tables[0].name, "t2");
    }

    #[test]
    fn malformed_create_table_yields_diagnostic_not_panic() {
        let sql = "CREATE TABLE;";
        let result = parse(sql);
        assert!(result.facts.tables.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn schema_qualified_table_name_is_preserved() {
        let sql = "CREATE TABLE app.users (id int);";
        let result = parse(sql);
        assert_eq!(result.facts.tables[0].name, "app.users");
    }
}
