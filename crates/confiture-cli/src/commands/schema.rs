//! `build`, `introspect`, and `lint` (spec §6).

use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use confiture::config::Config;
use confiture::error::{Error, SchemaError};
use confiture::snapshot::{self, SourceFile};
use confiture::{Result, scanner};

use crate::config::ProjectDirs;
use crate::{connect, schema_files};

/// `build` — concatenate declared schema files, hash them, write a
/// snapshot under `db/schema_history/`, keyed by the highest discovered
/// migration version.
pub fn build(dirs: &ProjectDirs) -> Result<()> {
    let files = schema_files::collect(&dirs.schema_dir)?;
    let source_files: Vec<SourceFile<'_>> = files
        .iter()
        .map(|f| SourceFile {
            relative_path: &f.relative_path,
            contents: &f.contents,
        })
        .collect();

    let environment = std::env::var("CONFITURE_ENV").unwrap_or_else(|_| "development".to_string());
    let text = snapshot::build(&environment, Utc::now(), &source_files)?;

    let version = latest_migration_version(&dirs.migrations_dir).unwrap_or_else(|| "000".to_string());
    let name = format!("{version}_schema_snapshot.sql");
    let out_path = dirs.schema_history_dir.join(&name);
    snapshot::write_snapshot(&out_path, &text)?;

    println!("{} wrote {}", "ok".green().bold(), out_path.display());
    println!("  files included: {}", files.len());
    Ok(())
}

fn latest_migration_version(dir: &Path) -> Option<String> {
    let units = confiture::migrate::discover(dir).ok()?;
    units.last().map(|u| u.version.clone())
}

/// `introspect` — emit the live schema's StructuralFacts, as JSON or as
/// reconstructed `CREATE TABLE` SQL.
pub async fn introspect(config: &Config, schema: &str, as_sql: bool) -> Result<()> {
    let client = connect::connect(&config.database_url).await?;
    let facts = confiture::introspect::introspect(&client, schema, None, true).await?;

    if as_sql {
        println!("{}", confiture::introspect::to_create_table_sql(&facts));
    } else {
        let json = serde_json::to_string_pretty(&facts).expect("StructuralFacts always serializes");
        println!("{json}");
    }
    Ok(())
}

/// `lint` — run comment-balance validation once per schema file and once
/// more over the full concatenation, per the redundancy note in the
/// comment validator's docs.
pub fn lint(dirs: &ProjectDirs, fail_on_warning: bool) -> Result<()> {
    let files = schema_files::collect(&dirs.schema_dir)?;
    let mut total = 0usize;

    for file in &files {
        let text = String::from_utf8_lossy(&file.contents);
        let diagnostics = scanner::validate_comments(&text);
        for d in &diagnostics {
            println!(
                "{} {}:{} {:?} — {}",
                "warn".yellow().bold(),
                file.relative_path,
                d.line,
                d.kind,
                d.snippet
            );
        }
        total += diagnostics.len();
    }

    let concatenated = schema_files::concatenate(&files);
    let whole_file_diagnostics = scanner::validate_comments(&concatenated);
    for d in &whole_file_diagnostics {
        println!(
            "{} concatenated schema:{} {:?} — {}",
            "warn".yellow().bold(),
            d.line,
            d.kind,
            d.snippet
        );
    }
    total += whole_file_diagnostics.len();

    if total == 0 {
        println!("{} no comment-balance issues found", "ok".green().bold());
        return Ok(());
    }

    println!("{total} issue(s) found");
    if fail_on_warning {
        return Err(Error::Schema(SchemaError::LintFailed { count: total }));
    }
    Ok(())
}
