//! Seed Engine (spec §4.12): discovers seed files, routes each file's
//! eligible INSERT groups through the Copy Converter when they clear a row
//! threshold, applies each file within its own savepoint, and aggregates
//! the result.
//!
//! Grounded in the teacher's transaction/savepoint style (same discipline
//! `migrate.rs` uses per unit) applied to §4.12's per-file savepoint rule.

use std::path::{Path, PathBuf};

use tokio_postgres::Transaction;
use tracing::{info, warn};

use crate::error::{Error, Result, SeedError};
use crate::scanner;
use crate::seed::copy::{self, InsertStatement};

/// Discover `.sql` seed files under `dir`, recursively, in lexical path
/// order (spec §6 "ordering by lexical path").
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Config(crate::error::ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Config(crate::error::ConfigError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            out.push(path);
        }
    }
    Ok(())
}

/// A savepoint-safe identifier derived from a seed file's name: only
/// alphanumerics and underscores survive, everything else collapses to
/// `_`, since `sp_<filename>` is injected directly into `SAVEPOINT ...`.
fn savepoint_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("seed");
    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("sp_{sanitized}")
}

/// Per-file outcome.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub rows_loaded: usize,
    pub used_copy: bool,
    pub error: Option<String>,
}

/// Aggregate result across a `seed apply` run (spec §4.12).
#[derive(Debug, Clone, Default)]
pub struct SeedApplyResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_files: Vec<PathBuf>,
    pub file_results: Vec<FileResult>,
}

/// Options governing how the engine routes and tolerates failures.
#[derive(Debug, Clone)]
pub struct SeedApplyOptions {
    /// Row-count threshold above which an eligible INSERT group is
    /// rewritten to `COPY` form.
    pub copy_threshold: usize,
    /// Keep going after a file fails instead of aborting the run.
    pub continue_on_error: bool,
}

impl Default for SeedApplyOptions {
    fn default() -> Self {
        SeedApplyOptions {
            copy_threshold: 100,
            continue_on_error: false,
        }
    }
}

/// Apply every discovered seed file inside `tx`. Each file runs under its
/// own `sp_<filename>` savepoint; on failure the savepoint is rolled back
/// and the file is either fatal (default) or recorded and skipped
/// (`continue_on_error`). The caller decides whether to commit `tx` based
/// on the returned result (spec §4.12: commit only if nothing failed, or
/// `continue_on_error` is set and at least one file succeeded).
pub async fn apply_all(
    tx: &Transaction<'_>,
    files: &[PathBuf],
    options: &SeedApplyOptions,
) -> Result<SeedApplyResult> {
    let mut result = SeedApplyResult {
        total: files.len(),
        ..Default::default()
    };

    for path in files {
        match apply_one(tx, path, options).await {
            Ok(file_result) => {
                result.succeeded += 1;
                result.file_results.push(file_result);
            }
            Err(err) => {
                result.failed += 1;
                result.failed_files.push(path.clone());
                result.file_results.push(FileResult {
                    path: path.clone(),
                    rows_loaded: 0,
                    used_copy: false,
                    error: Some(err.to_string()),
                });
                if !options.continue_on_error {
                    return Err(err);
                }
                warn!(path = %path.display(), error = %err, "seed file failed; continuing (continue_on_error)");
            }
        }
    }

    Ok(result)
}

async fn apply_one(
    tx: &Transaction<'_>,
    path: &Path,
    options: &SeedApplyOptions,
) -> Result<FileResult> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Seed(SeedError::LoadFailed {
            path: path.to_path_buf(),
            underlying: Box::new(Error::Config(crate::error::ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })),
        })
    })?;

    let groups = parse_insert_groups(&text);
    let savepoint = savepoint_name(path);

    tx.batch_execute(&format!("SAVEPOINT {savepoint}"))
        .await
        .map_err(Error::from)?;

    let outcome = execute_groups(tx, &groups, options).await;

    match outcome {
        Ok((rows_loaded, used_copy)) => {
            tx.batch_execute(&format!("RELEASE SAVEPOINT {savepoint}"))
                .await
                .map_err(Error::from)?;
            info!(path = %path.display(), rows_loaded, used_copy, "seed file loaded");
            Ok(FileResult {
                path: path.to_path_buf(),
                rows_loaded,
                used_copy,
                error: None,
            })
        }
        Err(err) => {
            tx.batch_execute(&format!("ROLLBACK TO SAVEPOINT {savepoint}"))
                .await
                .map_err(Error::from)?;
            Err(Error::Seed(SeedError::LoadFailed {
                path: path.to_path_buf(),
                underlying: Box::new(err),
            }))
        }
    }
}

/// Statement kind after routing: either a group of eligible, same-shape
/// INSERTs (candidate for COPY) or an opaque raw statement executed
/// verbatim (ineligible INSERTs, and anything that isn't an INSERT at
/// all).
enum Group {
    Eligible(InsertStatement),
    Raw(String),
}

fn parse_insert_groups(text: &str) -> Vec<Group> {
    let statements = scanner::split_statements(text);
    let mut parsed: Vec<Group> = Vec::with_capacity(statements.len());
    for stmt in statements {
        let trimmed = stmt.trim();
        if trimmed.is_empty() {
            continue;
        }
        match copy::parse_insert(trimmed) {
            Ok(insert) => parsed.push(Group::Eligible(insert)),
            Err(_) => parsed.push(Group::Raw(stmt)),
        }
    }
    parsed
}

async fn execute_groups(
    tx: &Transaction<'_>,
    groups: &[Group],
    options: &SeedApplyOptions,
) -> Result<(usize, bool)> {
    let mut rows_loaded = 0usize;
    let mut used_copy = false;

    // Merge consecutive eligible inserts against the same table/columns
    // before deciding COPY-eligibility, so a file written as many
    // single-row INSERTs against one table still crosses the threshold.
    let mut pending_eligible: Vec<InsertStatement> = Vec::new();

    async fn flush_eligible(
        tx: &Transaction<'_>,
        pending: &mut Vec<InsertStatement>,
        options: &SeedApplyOptions,
        rows_loaded: &mut usize,
        used_copy: &mut bool,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let merged = copy::merge_consecutive(std::mem::take(pending));
        for insert in merged {
            *rows_loaded += insert.rows.len();
            if insert.rows.len() > options.copy_threshold {
                let rendered = copy::render_copy(&insert.table, &insert.columns, &insert.rows);
                execute_copy(tx, &insert.table, &insert.columns, &rendered).await?;
                *used_copy = true;
            } else {
                let rendered = render_values_insert(&insert);
                tx.batch_execute(&rendered).await.map_err(Error::from)?;
            }
        }
        Ok(())
    }

    for group in groups {
        match group {
            Group::Eligible(insert) => pending_eligible.push(insert.clone()),
            Group::Raw(stmt) => {
                flush_eligible(tx, &mut pending_eligible, options, &mut rows_loaded, &mut used_copy)
                    .await?;
                tx.batch_execute(stmt).await.map_err(Error::from)?;
            }
        }
    }
    flush_eligible(tx, &mut pending_eligible, options, &mut rows_loaded, &mut used_copy).await?;

    Ok((rows_loaded, used_copy))
}

fn render_values_insert(insert: &InsertStatement) -> String {
    let cols = insert.columns.join(", ");
    let rows: Vec<String> = insert
        .rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row
                .iter()
                .map(|v| match v {
                    None => "NULL".to_string(),
                    Some(s) => format!("'{}'", s.replace('\'', "''")),
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({cols}) VALUES {};",
        insert.table,
        rows.join(", ")
    )
}

/// `tx.copy_in` wants a raw byte stream of the COPY payload with the
/// `COPY ... FROM stdin;` header stripped — the header itself is sent as
/// the statement passed to `copy_in`.
async fn execute_copy(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[String],
    rendered: &str,
) -> Result<()> {
    use futures_util::SinkExt;

    let header_end = rendered.find('\n').unwrap_or(rendered.len());
    let body = &rendered[header_end + 1..];
    let cols = columns.join(", ");
    let statement = format!("COPY {table} ({cols}) FROM stdin");

    let sink = tx.copy_in(&statement).await.map_err(Error::from)?;
    tokio::pin!(sink);
    sink.send(bytes::Bytes::copy_from_slice(body.as_bytes()))
        .await
        .map_err(Error::from)?;
    sink.close().await.map_err(Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn discovers_seed_files_recursively_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "b/002_orders.sql", "-- seed");
        write_file(dir.path(), "a/001_users.sql", "-- seed");

        let files = discover(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a/001_users.sql"));
        assert!(files[1].ends_with("b/002_orders.sql"));
    }

    #[test]
    fn savepoint_name_sanitizes_non_identifier_characters() {
        let path = Path::new("db/seeds/01-users.seed.sql");
        assert_eq!(savepoint_name(path), "sp_01_users_seed");
    }

    #[test]
    fn parse_insert_groups_separates_eligible_from_raw() {
        let text = "INSERT INTO t (id) VALUES (1);\nINSERT INTO t (id) VALUES (now());";
        let groups = parse_insert_groups(text);
        assert_eq!(groups.len(), 2);
        assert!(matches!(groups[0], Group::Eligible(_)));
        assert!(matches!(groups[1], Group::Raw(_)));
    }

    #[test]
    fn render_values_insert_quotes_strings_and_escapes_quotes() {
        let insert = InsertStatement {
            table: "t".to_string(),
            columns: vec!["name".to_string()],
            rows: vec![vec![Some("O'Brien".to_string())]],
        };
        let rendered = render_values_insert(&insert);
        assert!(rendered.contains("'O''Brien'"));
    }
}
