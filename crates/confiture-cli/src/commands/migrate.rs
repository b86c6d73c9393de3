//! `migrate status|up|down|rebuild|reinit|diff|validate` (spec §6).

use std::path::{Path, PathBuf};
use std::time::Duration;

use owo_colors::OwoColorize;

use confiture::config::Config;
use confiture::dry_run;
use confiture::error::RebuildError;
use confiture::hooks::HookRegistry;
use confiture::lock::AdvisoryLock;
use confiture::migrate::{MigrationEngine, MigrationStatus, MigrationUnit};
use confiture::tracking::TrackingStore;
use confiture::{Error, Result};

use crate::config::ProjectDirs;
use crate::{connect, schema_files};

const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

fn build_engine(config: &Config, dirs: &ProjectDirs) -> Result<(Vec<MigrationUnit>, MigrationEngine)> {
    let units = confiture::migrate::discover(&dirs.migrations_dir)?;
    let tracking = TrackingStore::new(config.migration.tracking_table.clone())?;
    let engine = MigrationEngine::new(units.clone(), tracking, HookRegistry::new());
    Ok((units, engine))
}

/// Returns `true` if every discovered unit is applied (no pending work
/// left), which `main.rs` uses to decide the process exit code.
pub async fn status(config: &Config, dirs: &ProjectDirs) -> Result<bool> {
    let (_, engine) = build_engine(config, dirs)?;
    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;

    let entries = engine.status(&tx).await?;
    tx.rollback().await.map_err(Error::from)?;

    let mut any_pending = false;
    for entry in &entries {
        let label = match entry.status {
            MigrationStatus::Applied => "applied".green().to_string(),
            MigrationStatus::Pending => {
                any_pending = true;
                "pending".yellow().to_string()
            }
            MigrationStatus::Orphaned => "orphaned".red().to_string(),
        };
        println!("{:<20} {:<40} {}", entry.version, entry.name, label);
    }

    Ok(!any_pending)
}

pub async fn up(config: &Config, dirs: &ProjectDirs, target: Option<&str>, dry_run: bool) -> Result<()> {
    let (units, engine) = build_engine(config, dirs)?;

    if dry_run {
        let mut client = connect::connect(&config.database_url).await?;
        let tx = client.transaction().await.map_err(Error::from)?;
        let applied_versions: std::collections::HashSet<String> = engine
            .status(&tx)
            .await
            .map(|entries| {
                entries
                    .into_iter()
                    .filter(|e| e.status == MigrationStatus::Applied)
                    .map(|e| e.version)
                    .collect()
            })
            .unwrap_or_default();
        tx.rollback().await.map_err(Error::from)?;

        let pending: Vec<&MigrationUnit> = units
            .iter()
            .filter(|u| !applied_versions.contains(&u.version))
            .filter(|u| target.map(|t| u.version.as_str() <= t).unwrap_or(true))
            .collect();

        print_dry_run(&pending);
        return Ok(());
    }

    // The advisory lock is held on its own session (spec §4.6: "session-
    // scoped"); a second, separate connection carries the actual
    // transaction, since `tokio_postgres::Client::transaction` needs `&mut
    // Client` and can't coexist with the lock's borrow of the same client.
    let lock_client = connect::connect(&config.database_url).await?;
    let mut lock = AdvisoryLock::acquire(&lock_client, &config.migration.tracking_table, LOCK_TIMEOUT).await?;

    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;

    let applied = engine.up(&tx, target).await;
    match applied {
        Ok(versions) => {
            tx.commit().await.map_err(Error::from)?;
            for v in &versions {
                println!("{} {v}", "applied".green().bold());
            }
            if versions.is_empty() {
                println!("nothing to apply");
            }
            lock.release().await?;
            Ok(())
        }
        Err(e) => {
            tx.rollback().await.map_err(Error::from)?;
            lock.release().await?;
            Err(e)
        }
    }
}

pub async fn down(config: &Config, dirs: &ProjectDirs, steps: usize, dry_run: bool) -> Result<()> {
    let (units, engine) = build_engine(config, dirs)?;

    if dry_run {
        let mut client = connect::connect(&config.database_url).await?;
        let tx = client.transaction().await.map_err(Error::from)?;
        let mut applied = confiture::tracking::TrackingStore::new(config.migration.tracking_table.clone())?
            .applied_records(&tx)
            .await
            .unwrap_or_default();
        tx.rollback().await.map_err(Error::from)?;

        applied.sort_by(|a, b| b.version.cmp(&a.version));
        let targets: Vec<&MigrationUnit> = applied
            .into_iter()
            .take(steps.max(1))
            .filter_map(|r| units.iter().find(|u| u.version == r.version))
            .collect();
        let reports: Vec<_> = targets.iter().map(|u| (u, dry_run::analyze(&u.down_sql))).collect();
        for (unit, report) in &reports {
            println!(
                "{} {} ({:?})",
                unit.version,
                unit.name,
                report.worst_classification()
            );
        }
        return Ok(());
    }

    let lock_client = connect::connect(&config.database_url).await?;
    let mut lock = AdvisoryLock::acquire(&lock_client, &config.migration.tracking_table, LOCK_TIMEOUT).await?;

    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;

    match engine.down(&tx, steps).await {
        Ok(versions) => {
            tx.commit().await.map_err(Error::from)?;
            for v in &versions {
                println!("{} {v}", "rolled back".yellow().bold());
            }
            lock.release().await?;
            Ok(())
        }
        Err(e) => {
            tx.rollback().await.map_err(Error::from)?;
            lock.release().await?;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn rebuild(
    config: &Config,
    dirs: &ProjectDirs,
    drop_schemas: &[String],
    seed: bool,
    backup_tracking: bool,
    verify: bool,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    let (_, engine) = build_engine(config, dirs)?;
    let files = schema_files::collect(&dirs.schema_dir)?;
    let declared_ddl = schema_files::concatenate(&files);

    let schemas = if drop_schemas.is_empty() {
        vec!["public".to_string()]
    } else {
        drop_schemas.to_vec()
    };

    if dry_run {
        let report = dry_run::analyze(&declared_ddl);
        print_dry_run_statements(&report);
        println!(
            "would drop and recreate schema(s): {}",
            schemas.join(", ")
        );
        return Ok(());
    }

    if !yes {
        return Err(RebuildError::ConfirmationRequired.into());
    }

    let lock_client = connect::connect(&config.database_url).await?;
    let mut lock = AdvisoryLock::acquire(&lock_client, &config.migration.tracking_table, LOCK_TIMEOUT).await?;

    let mut client_handle = connect::connect(&config.database_url).await?;
    let tx = client_handle.transaction().await.map_err(Error::from)?;

    let preserved = if backup_tracking {
        let tracking = TrackingStore::new(config.migration.tracking_table.clone())?;
        tracking.applied_records(&tx).await.unwrap_or_default()
    } else {
        Vec::new()
    };

    let result = engine.rebuild(&tx, &schemas, &declared_ddl, true, seed).await;
    let mut result = match result {
        Ok(r) => r,
        Err(e) => {
            tx.rollback().await.map_err(Error::from)?;
            lock.release().await?;
            return Err(e);
        }
    };

    if backup_tracking {
        let tracking = TrackingStore::new(config.migration.tracking_table.clone())?;
        for record in &preserved {
            let qualified = confiture::identifier::quote_qualified(tracking.table_name());
            let sql = format!("UPDATE {qualified} SET applied_at = $1 WHERE version = $2");
            tx.execute(&sql, &[&record.applied_at, &record.version])
                .await
                .map_err(Error::from)?;
        }
    }

    tx.commit().await.map_err(Error::from)?;

    // Structural verification reads the post-commit catalog state through
    // the plain `Client`, not the now-consumed `Transaction`: `introspect`
    // takes `&Client` (it's also used outside any transaction by
    // `confiture introspect`), so this check necessarily runs after commit
    // rather than as part of the rebuild's atomic scope.
    if verify {
        let live_facts = confiture::introspect::introspect(&client_handle, "public", None, false).await?;
        let declared_facts = confiture::ddl::parse(&declared_ddl).facts;
        let diff = confiture::diff::diff(&declared_facts, &live_facts);
        result.structural_verification_passed = Some(diff.is_empty());
        if !diff.is_empty() {
            lock.release().await?;
            return Err(RebuildError::VerificationFailed {
                message: format!("{} structural difference(s) remain after rebuild", diff.changes.len()),
            }
            .into());
        }
    }

    lock.release().await?;

    println!("{} rebuild complete", "ok".green().bold());
    println!("  schemas dropped: {}", result.schemas_dropped.join(", "));
    println!("  ddl statements executed: {}", result.ddl_statements_executed);
    println!("  units marked applied: {}", result.units_marked_applied);
    if let Some(passed) = result.structural_verification_passed {
        println!("  structural verification: {}", if passed { "passed" } else { "failed" });
    }
    Ok(())
}

pub async fn reinit(config: &Config, dirs: &ProjectDirs, through: Option<&str>, dry_run: bool) -> Result<()> {
    let (units, engine) = build_engine(config, dirs)?;

    if dry_run {
        let count = units
            .iter()
            .filter(|u| through.map(|t| u.version.as_str() <= t).unwrap_or(true))
            .count();
        println!("would mark {count} unit(s) applied without executing SQL");
        return Ok(());
    }

    let lock_client = connect::connect(&config.database_url).await?;
    let mut lock = AdvisoryLock::acquire(&lock_client, &config.migration.tracking_table, LOCK_TIMEOUT).await?;

    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;

    match engine.reinit(&tx, through).await {
        Ok(marked) => {
            tx.commit().await.map_err(Error::from)?;
            lock.release().await?;
            println!("{} marked {marked} unit(s) applied", "ok".green().bold());
            Ok(())
        }
        Err(e) => {
            tx.rollback().await.map_err(Error::from)?;
            lock.release().await?;
            Err(e)
        }
    }
}

pub async fn diff(config: &Config, dirs: &ProjectDirs, a: &str, b: &str) -> Result<()> {
    let before = resolve_side(config, dirs, a).await?;
    let after = resolve_side(config, dirs, b).await?;

    let schema_diff = confiture::diff::diff(&before, &after);
    if schema_diff.is_empty() {
        println!("{} no structural differences", "ok".green().bold());
        return Ok(());
    }
    for change in &schema_diff.changes {
        println!("{change:?}");
    }
    Ok(())
}

async fn resolve_side(
    config: &Config,
    dirs: &ProjectDirs,
    side: &str,
) -> Result<confiture::model::StructuralFacts> {
    if side == "live" {
        let client = connect::connect(&config.database_url).await?;
        confiture::introspect::introspect(&client, "public", None, false).await
    } else {
        let path = resolve_path(dirs, side);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(confiture::error::ConfigError::Io {
                path: path.clone(),
                source: e,
            })
        })?;
        Ok(confiture::ddl::parse(&text).facts)
    }
}

fn resolve_path(dirs: &ProjectDirs, side: &str) -> PathBuf {
    let candidate = Path::new(side);
    if candidate.is_absolute() || candidate.exists() {
        candidate.to_path_buf()
    } else {
        dirs.schema_history_dir.join(side)
    }
}

/// Returns `true` if no orphaned migrations were found. Duplicate
/// versions and name conflicts are caught earlier, by `build_engine`'s
/// call to `discover`, which fails the whole command outright.
pub async fn validate(config: &Config, dirs: &ProjectDirs) -> Result<bool> {
    let (_, engine) = build_engine(config, dirs)?;
    let mut client = connect::connect(&config.database_url).await?;
    let tx = client.transaction().await.map_err(Error::from)?;
    let entries = engine.status(&tx).await?;
    tx.rollback().await.map_err(Error::from)?;

    let orphaned: Vec<_> = entries
        .iter()
        .filter(|e| e.status == MigrationStatus::Orphaned)
        .collect();

    if orphaned.is_empty() {
        println!("{} no orphaned migrations, no duplicate versions", "ok".green().bold());
        return Ok(true);
    }

    for entry in &orphaned {
        println!(
            "{} {} {} (applied in the database, not discovered on disk)",
            "orphaned".red().bold(),
            entry.version,
            entry.name
        );
    }
    Ok(false)
}

fn print_dry_run(units: &[&MigrationUnit]) {
    for unit in units {
        let report = dry_run::analyze(&unit.up_sql);
        println!(
            "{} {} ({:?})",
            unit.version,
            unit.name,
            report.worst_classification()
        );
        for stmt in &report.statements {
            println!("    [{:?}] {}", stmt.classification, truncate(&stmt.statement, 80));
        }
    }
}

fn print_dry_run_statements(report: &dry_run::DryRunReport) {
    for stmt in &report.statements {
        println!("  [{:?}] {}", stmt.classification, truncate(&stmt.statement, 80));
    }
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    format!("{}…", &s[..cut])
}

