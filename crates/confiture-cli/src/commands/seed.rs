//! `seed apply|convert|benchmark|validate` (spec §6).

use std::path::Path;
use std::time::{Duration, Instant};

use owo_colors::OwoColorize;

use confiture::config::Config;
use confiture::error::Error;
use confiture::model::{ColumnContext, SchemaContext, StructuralFacts, TableContext};
use confiture::scanner;
use confiture::seed::copy::{self, InsertStatement};
use confiture::seed::engine::{self, SeedApplyOptions};
use confiture::seed::pattern;
use confiture::seed::validator::{self, PatternContext, SeedData, ValidationReport};
use confiture::Result;

use crate::config::ProjectDirs;
use crate::connect;

/// `seed apply [--copy-format] [--copy-threshold N] [--continue-on-error]`.
///
/// `--copy-format` forces every eligible group through COPY regardless of
/// row count, by dropping the threshold to zero.
pub async fn apply(
    config: &Config,
    dirs: &ProjectDirs,
    copy_format: bool,
    copy_threshold: usize,
    continue_on_error: bool,
) -> Result<bool> {
    let files = engine::discover(&dirs.seeds_dir)?;
    let options = SeedApplyOptions {
        copy_threshold: if copy_format { 0 } else { copy_threshold },
        continue_on_error,
    };

    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;

    let result = engine::apply_all(&tx, &files, &options).await?;

    let should_commit = result.failed == 0 || (continue_on_error && result.succeeded > 0);
    if should_commit {
        tx.commit().await.map_err(Error::from)?;
    } else {
        tx.rollback().await.map_err(Error::from)?;
    }

    for file_result in &result.file_results {
        let label = if file_result.error.is_some() {
            "failed".red().bold().to_string()
        } else {
            "loaded".green().bold().to_string()
        };
        println!(
            "{label} {} ({} row(s), {})",
            file_result.path.display(),
            file_result.rows_loaded,
            if file_result.used_copy { "copy" } else { "values" }
        );
        if let Some(err) = &file_result.error {
            println!("  {err}");
        }
    }

    println!(
        "{}/{} file(s) succeeded",
        result.succeeded, result.total
    );
    Ok(result.failed == 0)
}

/// `seed convert` — print each seed file's eligible INSERT groups rewritten
/// to COPY form, with ineligible statements left unchanged. Pure; no
/// database contact.
pub fn convert(dirs: &ProjectDirs, copy_threshold: usize) -> Result<()> {
    let files = engine::discover(&dirs.seeds_dir)?;
    for path in &files {
        println!("-- {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(confiture::error::ConfigError::Io {
                path: path.clone(),
                source: e,
            })
        })?;
        println!("{}", convert_text(&text, copy_threshold));
    }
    Ok(())
}

fn convert_text(text: &str, copy_threshold: usize) -> String {
    let statements = scanner::split_statements(text);
    let mut eligible: Vec<InsertStatement> = Vec::new();
    let mut out = String::new();

    let flush = |eligible: &mut Vec<InsertStatement>, out: &mut String| {
        if eligible.is_empty() {
            return;
        }
        let merged = copy::merge_consecutive(std::mem::take(eligible));
        for insert in merged {
            if insert.rows.len() > copy_threshold {
                out.push_str(&copy::render_copy(&insert.table, &insert.columns, &insert.rows));
            } else {
                out.push_str(&render_values(&insert));
                out.push('\n');
            }
        }
    };

    for stmt in statements {
        let trimmed = stmt.trim();
        if trimmed.is_empty() {
            continue;
        }
        match copy::parse_insert(trimmed) {
            Ok(insert) => eligible.push(insert),
            Err(_) => {
                flush(&mut eligible, &mut out);
                out.push_str(trimmed);
                out.push_str(";\n");
            }
        }
    }
    flush(&mut eligible, &mut out);
    out
}

fn render_values(insert: &InsertStatement) -> String {
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
    format!("INSERT INTO {} ({cols}) VALUES {};", insert.table, rows.join(", "))
}

/// `seed benchmark` — time each seed file's VALUES-based load against its
/// COPY-based load, each inside its own rolled-back transaction so neither
/// run leaves data behind.
pub async fn benchmark(config: &Config, dirs: &ProjectDirs) -> Result<()> {
    let files = engine::discover(&dirs.seeds_dir)?;

    for path in &files {
        let values_elapsed = time_load(config, path, usize::MAX).await?;
        let copy_elapsed = time_load(config, path, 0).await?;
        println!(
            "{} values={:?} copy={:?}",
            path.display(),
            values_elapsed,
            copy_elapsed
        );
    }
    Ok(())
}

async fn time_load(config: &Config, path: &Path, copy_threshold: usize) -> Result<Duration> {
    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;

    let options = SeedApplyOptions {
        copy_threshold,
        continue_on_error: false,
    };
    let start = Instant::now();
    let outcome = engine::apply_all(&tx, std::slice::from_ref(&path.to_path_buf()), &options).await;
    let elapsed = start.elapsed();
    tx.rollback().await.map_err(Error::from)?;
    outcome?;
    Ok(elapsed)
}

/// `seed validate [--uuid-validation]` — validate each seed file against a
/// schema context synthesized from the declared schema's structural facts
/// (not-null columns become `required`, foreign keys become `foreign_key`
/// bindings); `--uuid-validation` additionally enables the identifier
/// pattern detector by tagging every text column with `PatternTag::EitherPattern`.
pub async fn validate(
    config: &Config,
    dirs: &ProjectDirs,
    declared_facts: &StructuralFacts,
    uuid_validation: bool,
) -> Result<bool> {
    let _ = config;
    let schema_context = synthesize_schema_context(declared_facts, uuid_validation);
    let files = engine::discover(&dirs.seeds_dir)?;

    let mut clean = true;
    for path in &files {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(confiture::error::ConfigError::Io {
                path: path.clone(),
                source: e,
            })
        })?;
        let seed_data = parse_seed_data(&text)?;
        let pattern_ctx = PatternContext {
            schema_entity: pattern::schema_entity(path),
            directory: pattern::directory_code(path),
        };

        let report = validator::validate(&seed_data, &schema_context, &pattern_ctx, false);
        print_report(path, &report);
        if report.has_errors() {
            clean = false;
        }
    }

    if clean {
        println!("{} all seed files valid", "ok".green().bold());
    }
    Ok(clean)
}

fn print_report(path: &Path, report: &ValidationReport) {
    for violation in &report.violations {
        let label = if matches!(violation.severity, confiture::seed::validator::Severity::Error) {
            "error".red().bold().to_string()
        } else {
            "warn".yellow().bold().to_string()
        };
        println!("{label} {}: {}", path.display(), violation.message);
    }
}

fn parse_seed_data(text: &str) -> Result<SeedData> {
    let mut seed_data = SeedData::new();
    for stmt in scanner::split_statements(text) {
        let trimmed = stmt.trim();
        if trimmed.is_empty() {
            continue;
        }
        match copy::parse_insert(trimmed) {
            Ok(insert) => {
                for row in &insert.rows {
                    let mut map = indexmap::IndexMap::new();
                    for (column, value) in insert.columns.iter().zip(row.iter()) {
                        map.insert(column.clone(), value.clone());
                    }
                    seed_data.insert_row(&insert.table, map);
                }
            }
            Err(_) => {
                if let Some((table, branches)) = copy::extract_union_branches(trimmed) {
                    seed_data.push_union_group(&table, branches);
                }
            }
        }
    }
    Ok(seed_data)
}

fn synthesize_schema_context(facts: &StructuralFacts, uuid_validation: bool) -> SchemaContext {
    let mut context = SchemaContext::default();
    for table in &facts.tables {
        let mut table_ctx = TableContext::default();
        for column in &table.columns {
            let mut col_ctx = ColumnContext {
                required: !column.nullable,
                ..Default::default()
            };
            if uuid_validation && column.pg_type.contains("uuid") {
                col_ctx.pattern = Some(confiture::model::PatternTag::EitherPattern);
            }
            table_ctx.columns.insert(column.name.clone(), col_ctx);
        }
        context.tables.insert(table.name.clone(), table_ctx);
    }
    for fk in &facts.foreign_keys {
        let Some(table_ctx) = context.tables.get_mut(&fk.from_table) else {
            continue;
        };
        for (via, on) in fk.via_columns.iter().zip(fk.on_columns.iter()) {
            if let Some(col_ctx) = table_ctx.columns.get_mut(via) {
                col_ctx.foreign_key = Some((fk.to_table.clone(), on.clone()));
            }
        }
    }
    context
}
