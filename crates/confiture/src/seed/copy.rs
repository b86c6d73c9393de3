//! Seed Copy Converter (spec §4.11): rewrites eligible multi-row INSERTs
//! into `COPY ... FROM stdin;` blocks.
//!
//! Eligibility mirrors `original_source/core/seed/insert_validator.py`'s
//! `InsertValidator.can_convert_to_copy` (no `ON CONFLICT`, no
//! `RETURNING`, no function calls/subqueries/CASE/operators/casts in
//! VALUES) without an AST library: this workspace has no SQL-AST crate,
//! so eligibility is decided the same way `ddl.rs` parses columns — a
//! small hand-rolled tokenizer over each VALUES tuple.

use crate::ddl_tokenize::{find_top_level_keyword, split_top_level, split_top_level_keyword, tokenize};

/// One parsed `INSERT ... VALUES ...` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Why a statement couldn't be converted to COPY form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    NotAnInsert,
    HasOnConflict,
    HasReturning,
    NotValuesBased,
    ContainsFunctionCall,
    ContainsSubquery,
    ContainsCase,
    ContainsOperator,
    ContainsCast,
}

/// Parse one INSERT statement and decide COPY-eligibility.
pub fn parse_insert(stmt: &str) -> Result<InsertStatement, Ineligible> {
    let trimmed = stmt.trim().trim_end_matches(';');
    let upper = trimmed.to_ascii_uppercase();
    if !upper.trim_start().starts_with("INSERT INTO") && !upper.trim_start().starts_with("INSERT ") {
        return Err(Ineligible::NotAnInsert);
    }
    if upper.contains("ON CONFLICT") {
        return Err(Ineligible::HasOnConflict);
    }
    if upper.contains("RETURNING") {
        return Err(Ineligible::HasReturning);
    }
    if upper.contains(" SELECT ") {
        return Err(Ineligible::NotValuesBased);
    }

    let values_pos = upper
        .find("VALUES")
        .ok_or(Ineligible::NotValuesBased)?;
    let head = trimmed[..values_pos].trim();
    let values_body = trimmed[values_pos + "VALUES".len()..].trim();

    let (table, columns) = parse_head(head)?;
    let row_tuples = split_top_level(values_body, ',');

    let mut rows = Vec::with_capacity(row_tuples.len());
    for tuple in row_tuples {
        let tuple = tuple.trim();
        if tuple.is_empty() {
            continue;
        }
        let inner = tuple
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .unwrap_or(tuple);
        let values = split_top_level(inner, ',');
        let mut row = Vec::with_capacity(values.len());
        for raw in values {
            row.push(eligible_literal(raw.trim())?);
        }
        rows.push(row);
    }

    Ok(InsertStatement {
        table,
        columns,
        rows,
    })
}

fn parse_head(head: &str) -> Result<(String, Vec<String>), Ineligible> {
    let without_insert = head
        .trim_start()
        .strip_prefix("insert into ")
        .or_else(|| head.trim_start().strip_prefix("INSERT INTO "))
        .unwrap_or(head.trim_start());
    let tokens = tokenize(without_insert);
    let table = tokens.first().cloned().unwrap_or_default();
    let columns = tokens
        .get(1)
        .filter(|t| t.starts_with('('))
        .map(|t| {
            split_top_level(&t[1..t.len() - 1], ',')
                .into_iter()
                .map(|c| c.trim().to_string())
                .collect()
        })
        .unwrap_or_default();
    Ok((table, columns))
}

/// Reject a value fragment that isn't a plain literal: function calls,
/// subqueries (nested parens after stripping one literal group),
/// CASE expressions, arithmetic/string operators, and casts.
fn eligible_literal(fragment: &str) -> Result<Option<String>, Ineligible> {
    let f = fragment.trim();
    if f.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    if f.starts_with('\'') && f.ends_with('\'') && f.len() >= 2 {
        return Ok(Some(unescape_sql_string(&f[1..f.len() - 1])));
    }
    if f.eq_ignore_ascii_case("true") || f.eq_ignore_ascii_case("false") {
        return Ok(Some(f.to_lowercase()));
    }
    if f.parse::<f64>().is_ok() {
        return Ok(Some(f.to_string()));
    }

    let upper = f.to_ascii_uppercase();
    if upper.contains("CASE") {
        return Err(Ineligible::ContainsCase);
    }
    if f.contains("::") {
        return Err(Ineligible::ContainsCast);
    }
    if f.contains('(') {
        // A bare identifier followed by a paren is a function call; a
        // leading paren with no identifier before it is a subquery/group.
        return if f.starts_with('(') {
            Err(Ineligible::ContainsSubquery)
        } else {
            Err(Ineligible::ContainsFunctionCall)
        };
    }
    if f.contains("||") || f.contains('+') || f.contains('-') || f.contains('*') || f.contains('/') {
        return Err(Ineligible::ContainsOperator);
    }

    Err(Ineligible::ContainsFunctionCall)
}

fn unescape_sql_string(s: &str) -> String {
    s.replace("''", "'")
}

/// Extract `(table, branches)` from an `INSERT INTO tbl (cols) SELECT ...
/// UNION [ALL] SELECT ...` statement, for the `UNION_NULL_TYPE_MISMATCH`
/// shape check (spec §4.10). Each branch holds that `SELECT`'s value list
/// in column order; `None` marks a bare, untyped `NULL`. Returns `None`
/// for anything that isn't a UNION-shaped INSERT.
///
/// Ported in spirit from
/// `original_source/core/seed_validation/data_extractor.py`'s
/// `_extract_from_select`: a naive top-level `UNION` split, then
/// per-branch comma-separated value extraction with alias stripping —
/// this is a statement-shape check, not a full SQL parse.
pub fn extract_union_branches(stmt: &str) -> Option<(String, Vec<Vec<Option<String>>>)> {
    let trimmed = stmt.trim().trim_end_matches(';').trim();
    if !trimmed.to_ascii_uppercase().starts_with("INSERT") {
        return None;
    }
    let select_pos = find_top_level_keyword(trimmed, "select")?;
    let head = trimmed[..select_pos].trim();
    let table = parse_union_head_table(head)?;

    let body = trimmed[select_pos..].trim();
    let branch_texts = split_top_level_keyword(body, "union");
    if branch_texts.len() < 2 {
        return None;
    }

    let mut branches = Vec::with_capacity(branch_texts.len());
    for branch in &branch_texts {
        let branch = strip_leading_all(branch.trim());
        branches.push(extract_select_list(branch)?);
    }
    Some((table, branches))
}

fn parse_union_head_table(head: &str) -> Option<String> {
    let upper = head.to_ascii_uppercase();
    let rest = if upper.starts_with("INSERT INTO") {
        &head["INSERT INTO".len()..]
    } else if upper.starts_with("INSERT") {
        &head["INSERT".len()..]
    } else {
        return None;
    };
    tokenize(rest.trim_start()).into_iter().next()
}

fn strip_leading_all(branch: &str) -> &str {
    let upper = branch.to_ascii_uppercase();
    if upper.starts_with("ALL") {
        let after = &branch["ALL".len()..];
        if after.is_empty() || after.starts_with(|c: char| c.is_whitespace()) {
            return after.trim_start();
        }
    }
    branch
}

/// Extract the positional value list from one `SELECT <v1>, <v2>, ...
/// [FROM ...]` branch: the part between `SELECT` and its first top-level
/// `FROM`/`WHERE`/`GROUP`/`ORDER` clause (or the branch's end), split on
/// top-level commas with any trailing `AS alias` stripped from each value.
fn extract_select_list(branch: &str) -> Option<Vec<Option<String>>> {
    if !branch.to_ascii_uppercase().starts_with("SELECT") {
        return None;
    }
    let after_select = branch["SELECT".len()..].trim_start();

    let mut end = after_select.len();
    for clause in ["FROM", "WHERE", "GROUP", "ORDER"] {
        if let Some(pos) = find_top_level_keyword(after_select, clause) {
            end = end.min(pos);
        }
    }
    let list = after_select[..end].trim();
    if list.is_empty() {
        return None;
    }

    Some(
        split_top_level(list, ',')
            .into_iter()
            .map(|raw| select_value(raw.trim()))
            .collect(),
    )
}

/// Unlike `eligible_literal`, a UNION branch value may legitimately be an
/// expression or a `NULL::type` cast — only the untyped-vs-typed `NULL`
/// distinction matters for this check, so anything but a bare `NULL` is
/// kept as its own alias-stripped source text.
fn select_value(fragment: &str) -> Option<String> {
    let stripped = strip_alias(fragment);
    if stripped.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn strip_alias(value: &str) -> &str {
    match find_top_level_keyword(value, "as") {
        Some(pos) => value[..pos].trim_end(),
        None => value,
    }
}

/// TSV-escape one value for a COPY row: backslash, newline, tab, carriage
/// return, and a literal backslash-dot at start-of-row are all escaped;
/// `NULL` renders as `\N`.
pub fn escape_tsv(value: &Option<String>, is_first_column: bool) -> String {
    match value {
        None => "\\N".to_string(),
        Some(s) => {
            let mut out = s
                .replace('\\', "\\\\")
                .replace('\n', "\\n")
                .replace('\t', "\\t")
                .replace('\r', "\\r");
            if is_first_column && out.starts_with("\\.") {
                out = format!("\\{out}");
            }
            out
        }
    }
}

/// Render a group of same-table, same-columns rows as one `COPY ...`
/// block.
pub fn render_copy(table: &str, columns: &[String], rows: &[Vec<Option<String>>]) -> String {
    let mut out = String::new();
    let cols = columns.join(", ");
    out.push_str(&format!("COPY {table} ({cols}) FROM stdin;\n"));
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| escape_tsv(v, i == 0))
            .collect();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out.push_str("\\.\n");
    out
}

/// Merge consecutive eligible `InsertStatement`s against the same table
/// with identical column lists into single grouped units ready for
/// `render_copy`.
pub fn merge_consecutive(inserts: Vec<InsertStatement>) -> Vec<InsertStatement> {
    let mut merged: Vec<InsertStatement> = Vec::new();
    for insert in inserts {
        if let Some(last) = merged.last_mut() {
            if last.table == insert.table && last.columns == insert.columns {
                last.rows.extend(insert.rows);
                continue;
            }
        }
        merged.push(insert);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_multi_row_insert() {
        let sql = "INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob');";
        let insert = parse_insert(sql).unwrap();
        assert_eq!(insert.table, "users");
        assert_eq!(insert.columns, vec!["id", "name"]);
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.rows[0][1], Some("Alice".to_string()));
    }

    #[test]
    fn rejects_on_conflict() {
        let sql = "INSERT INTO t (id) VALUES (1) ON CONFLICT DO NOTHING;";
        assert_eq!(parse_insert(sql), Err(Ineligible::HasOnConflict));
    }

    #[test]
    fn rejects_function_calls_in_values() {
        let sql = "INSERT INTO t (created_at) VALUES (now());";
        assert_eq!(parse_insert(sql), Err(Ineligible::ContainsFunctionCall));
    }

    #[test]
    fn rejects_returning_clause() {
        let sql = "INSERT INTO t (id) VALUES (1) RETURNING id;";
        assert_eq!(parse_insert(sql), Err(Ineligible::HasReturning));
    }

    #[test]
    fn null_literal_becomes_none() {
        let sql = "INSERT INTO t (a) VALUES (NULL);";
        let insert = parse_insert(sql).unwrap();
        assert_eq!(insert.rows[0][0], None);
    }

    #[test]
    fn escape_tsv_handles_control_characters_and_null() {
        assert_eq!(escape_tsv(&None, false), "\\N");
        assert_eq!(
            escape_tsv(&Some("a\tb\nc".to_string()), false),
            "a\\tb\\nc"
        );
    }

    #[test]
    fn escape_tsv_escapes_leading_backslash_dot() {
        assert_eq!(escape_tsv(&Some("\\.weird".to_string()), true), "\\\\.weird");
    }

    #[test]
    fn render_copy_emits_header_rows_and_terminator() {
        let rows = vec![vec![Some("1".to_string()), Some("Alice".to_string())]];
        let rendered = render_copy("users", &["id".to_string(), "name".to_string()], &rows);
        assert!(rendered.starts_with("COPY users (id, name) FROM stdin;\n"));
        assert!(rendered.contains("1\tAlice"));
        assert!(rendered.trim_end().ends_with("\\."));
    }

    #[test]
    fn merges_consecutive_inserts_against_same_table_and_columns() {
        let a = parse_insert("INSERT INTO t (id) VALUES (1);").unwrap();
        let b = parse_insert("INSERT INTO t (id) VALUES (2);").unwrap();
        let merged = merge_consecutive(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].rows.len(), 2);
    }

    #[test]
    fn does_not_merge_across_different_column_lists() {
        let a = parse_insert("INSERT INTO t (id) VALUES (1);").unwrap();
        let b = parse_insert("INSERT INTO t (id, name) VALUES (2, 'x');").unwrap();
        let merged = merge_consecutive(vec![a, b]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn extract_union_branches_splits_select_lists_by_position() {
        let sql = "INSERT INTO accounts (id, nickname) \
                   SELECT 1, NULL \
                   UNION ALL \
                   SELECT 2, NULL::text;";
        let (table, branches) = extract_union_branches(sql).unwrap();
        assert_eq!(table, "accounts");
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0], vec![Some("1".to_string()), None]);
        assert_eq!(
            branches[1],
            vec![Some("2".to_string()), Some("NULL::text".to_string())]
        );
    }

    #[test]
    fn extract_union_branches_strips_aliases_and_where_clause() {
        let sql = "INSERT INTO t (a, b) \
                   SELECT 1 AS a, 'x' AS b WHERE 1 = 1 \
                   UNION SELECT 2, 'y';";
        let (_, branches) = extract_union_branches(sql).unwrap();
        assert_eq!(branches[0], vec![Some("1".to_string()), Some("'x'".to_string())]);
    }

    #[test]
    fn extract_union_branches_returns_none_for_plain_values_insert() {
        let sql = "INSERT INTO t (id) VALUES (1);";
        assert_eq!(extract_union_branches(sql), None);
    }

    #[test]
    fn extract_union_branches_returns_none_without_a_second_branch() {
        let sql = "INSERT INTO t (id) SELECT 1;";
        assert_eq!(extract_union_branches(sql), None);
    }
}
